//! # Node Runtime
//!
//! Serves newline-delimited JSON envelopes: one inbound request per input
//! line, one forwarding decision per output line.
//!
//! ```text
//! in:  {"action","requestId","destinationId","networkPath","payload"}
//! out: {"requestId","action","result","payload"?,"rejectPayload"?,"logMessage"?}
//! ```
//!
//! Requests are decided concurrently; output lines appear in completion
//! order. After a `FORWARD` line is written, the decision's sent observers
//! are notified. A line that cannot be decoded, or whose handler panics, is
//! answered with a rejection; only a failing transport stops the loop.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use nn_02_forwarding::{
    error_payload, CancellationToken, ForwardingResult, InboundRequest, JsonForwardingDecision,
    RequestContext,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared_types::{ConnectionInfo, NetworkPath, NetworkingNodeId, RequestId, ResultCode, SendResult};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::container::NodeContainer;

/// Connection id of requests that do not name one.
pub const DEFAULT_CONNECTION_ID: &str = "stdin";

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cannot encode decision: {0}")]
    Encode(#[from] serde_json::Error),
}

/// One inbound request line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundEnvelope {
    pub action: String,
    #[serde(default)]
    pub request_id: Option<String>,
    pub destination_id: NetworkingNodeId,
    #[serde(default)]
    pub network_path: Vec<NetworkingNodeId>,
    #[serde(default)]
    pub connection_id: Option<String>,
    /// How long the originator waits for an answer.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    pub payload: Value,
}

impl InboundEnvelope {
    #[must_use]
    pub fn into_request(self) -> (String, InboundRequest) {
        let request_id = self
            .request_id
            .map_or_else(RequestId::random, RequestId::new);
        let network_path = NetworkPath::from_hops(self.network_path);

        let mut connection = ConnectionInfo::new(
            self.connection_id
                .unwrap_or_else(|| DEFAULT_CONNECTION_ID.to_string()),
        );
        if let Some(peer) = network_path.last_hop() {
            connection = connection.with_remote_node(peer.clone());
        }

        let mut context = RequestContext::new(request_id, self.destination_id, network_path, connection);
        if let Some(millis) = self.timeout_ms {
            context = context.with_timeout(Duration::from_millis(millis));
        }
        (self.action, InboundRequest::new(context, self.payload))
    }
}

/// One decision line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    pub result: ForwardingResult,
    /// Payload for the next hop.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    /// Answer for the sender.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reject_payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_message: Option<String>,
}

impl DecisionRecord {
    fn from_decision(request_id: &RequestId, decision: &JsonForwardingDecision) -> Self {
        Self {
            request_id: Some(request_id.to_string()),
            action: Some(decision.action.clone()),
            result: decision.result,
            payload: decision.payload.clone(),
            reject_payload: decision.reject_payload.clone(),
            log_message: decision.log_message.clone(),
        }
    }

    /// Rejection of a line that is not a valid envelope.
    fn malformed(reason: &str) -> Self {
        Self::error(None, None, ResultCode::FormationViolation, reason)
    }

    /// Rejection of a request whose handling failed.
    fn internal_error(request_id: Option<String>, action: Option<String>, reason: &str) -> Self {
        Self::error(request_id, action, ResultCode::InternalError, reason)
    }

    fn error(
        request_id: Option<String>,
        action: Option<String>,
        code: ResultCode,
        reason: &str,
    ) -> Self {
        Self {
            request_id,
            action,
            result: ForwardingResult::Reject,
            payload: None,
            reject_payload: Some(error_payload(code, reason)),
            log_message: Some(reason.to_string()),
        }
    }
}

/// Counters of one `run`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub forwarded: usize,
    pub rejected: usize,
    pub dropped: usize,
}

impl RunSummary {
    fn count(&mut self, result: ForwardingResult) {
        match result {
            ForwardingResult::Forward => self.forwarded += 1,
            ForwardingResult::Reject => self.rejected += 1,
            ForwardingResult::Drop => self.dropped += 1,
        }
    }
}

enum Outcome {
    Decided(DecisionRecord, JsonForwardingDecision),
    Failed(DecisionRecord),
}

/// The running node.
pub struct NodeRuntime {
    container: NodeContainer,
}

impl NodeRuntime {
    pub fn new(container: NodeContainer) -> Self {
        Self { container }
    }

    #[must_use]
    pub fn container(&self) -> &NodeContainer {
        &self.container
    }

    /// Decide one envelope.
    pub async fn handle(
        &self,
        envelope: InboundEnvelope,
        cancel: CancellationToken,
    ) -> (DecisionRecord, JsonForwardingDecision) {
        let (action, inbound) = envelope.into_request();
        let request_id = inbound.context.request_id.clone();
        let decision = self
            .container
            .dispatcher()
            .dispatch(&action, inbound, cancel)
            .await;
        (DecisionRecord::from_decision(&request_id, &decision), decision)
    }

    async fn handle_line(&self, line: &[u8], cancel: CancellationToken) -> Outcome {
        let line = match std::str::from_utf8(line) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "Inbound line is not UTF-8");
                return Outcome::Failed(DecisionRecord::malformed(&format!("malformed envelope: {e}")));
            }
        };
        let mut envelope = match serde_json::from_str::<InboundEnvelope>(line) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "Malformed inbound envelope");
                return Outcome::Failed(DecisionRecord::malformed(&format!("malformed envelope: {e}")));
            }
        };

        let request_id = envelope
            .request_id
            .get_or_insert_with(|| RequestId::random().to_string())
            .clone();
        let action = envelope.action.clone();

        match AssertUnwindSafe(self.handle(envelope, cancel)).catch_unwind().await {
            Ok((record, decision)) => Outcome::Decided(record, decision),
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                error!(request_id = %request_id, action = %action, reason = %reason, "Request handler panicked");
                Outcome::Failed(DecisionRecord::internal_error(
                    Some(request_id),
                    Some(action),
                    &format!("request handler panicked: {reason}"),
                ))
            }
        }
    }

    /// Serve `reader` until EOF or `shutdown`, writing decisions to `writer`.
    ///
    /// On shutdown no further lines are read; requests in flight are
    /// cancelled and their decisions are still written. A read error stops
    /// reading too; it is returned once the requests in flight are answered.
    pub async fn run<R, W>(
        self: &Arc<Self>,
        mut reader: R,
        mut writer: W,
        shutdown: CancellationToken,
    ) -> Result<RunSummary, RuntimeError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        info!(node_id = %self.container.config.node_id, "Serving requests");

        let mut tasks: JoinSet<Outcome> = JoinSet::new();
        let mut buffer = Vec::new();
        let mut reading = true;
        let mut read_error = None;
        let mut summary = RunSummary::default();

        while reading || !tasks.is_empty() {
            tokio::select! {
                biased;
                () = shutdown.cancelled(), if reading => {
                    info!(in_flight = tasks.len(), "Shutdown requested, no longer reading");
                    reading = false;
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    let outcome = joined.unwrap_or_else(|e| {
                        error!(error = %e, "Request task failed");
                        Outcome::Failed(DecisionRecord::internal_error(
                            None,
                            None,
                            &format!("request task failed: {e}"),
                        ))
                    });
                    self.write_outcome(&mut writer, outcome, &mut summary).await?;
                }
                read = reader.read_until(b'\n', &mut buffer), if reading => match read {
                    Ok(0) => {
                        debug!("Input closed");
                        reading = false;
                    }
                    Ok(_) => {
                        let line = std::mem::take(&mut buffer);
                        if !line.iter().all(u8::is_ascii_whitespace) {
                            let runtime = Arc::clone(self);
                            let cancel = shutdown.child_token();
                            tasks.spawn(async move { runtime.handle_line(&line, cancel).await });
                        }
                    }
                    Err(e) => {
                        error!(error = %e, in_flight = tasks.len(), "Reading input failed");
                        read_error = Some(e);
                        reading = false;
                    }
                },
            }
        }

        writer.flush().await?;
        info!(
            forwarded = summary.forwarded,
            rejected = summary.rejected,
            dropped = summary.dropped,
            "Stopped serving requests"
        );
        match read_error {
            Some(e) => Err(e.into()),
            None => Ok(summary),
        }
    }

    async fn write_outcome<W>(
        &self,
        writer: &mut W,
        outcome: Outcome,
        summary: &mut RunSummary,
    ) -> Result<(), RuntimeError>
    where
        W: AsyncWrite + Unpin,
    {
        let (record, decision) = match outcome {
            Outcome::Decided(record, decision) => (record, Some(decision)),
            Outcome::Failed(record) => (record, None),
        };
        summary.count(record.result);

        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');
        let written = match writer.write_all(&line).await {
            Ok(()) => writer.flush().await,
            Err(e) => Err(e),
        };

        if let Some(mut decision) = decision {
            if decision.result == ForwardingResult::Forward {
                let sent = match &written {
                    Ok(()) => SendResult::success(),
                    Err(e) => SendResult::failed(e.to_string()),
                };
                tokio::spawn(async move { decision.notify_sent(sent).await });
            }
        }

        written?;
        Ok(())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::NodeConfig;
    use async_trait::async_trait;
    use nn_02_forwarding::ForwardingHandler;
    use serde_json::json;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::{AsyncRead, AsyncReadExt, BufReader, ReadBuf};

    /// Handler whose every request panics.
    struct Explodes;

    #[async_trait]
    impl ForwardingHandler for Explodes {
        fn action(&self) -> &str {
            "Explode"
        }

        async fn handle(
            &self,
            _inbound: InboundRequest,
            _cancel: CancellationToken,
        ) -> JsonForwardingDecision {
            panic!("handler exploded")
        }
    }

    /// Input that fails on every read.
    struct BrokenInput;

    impl AsyncRead for BrokenInput {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            Poll::Ready(Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "input reset",
            )))
        }
    }

    fn runtime(config: NodeConfig) -> Arc<NodeRuntime> {
        Arc::new(NodeRuntime::new(NodeContainer::new(config).unwrap()))
    }

    async fn serve(runtime: &Arc<NodeRuntime>, input: &str) -> (RunSummary, Vec<DecisionRecord>) {
        let mut output = Vec::new();
        let summary = runtime
            .run(input.as_bytes(), &mut output, CancellationToken::new())
            .await
            .unwrap();
        let records = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        (summary, records)
    }

    fn line(value: Value) -> String {
        format!("{value}\n")
    }

    #[test]
    fn test_envelope_into_request() {
        let envelope: InboundEnvelope = serde_json::from_value(json!({
            "action": "Heartbeat",
            "requestId": "msg-1",
            "destinationId": "csms",
            "networkPath": ["cs-1", "lc-1"],
            "timeoutMs": 1500,
            "payload": {}
        }))
        .unwrap();

        let (action, inbound) = envelope.into_request();
        assert_eq!(action, "Heartbeat");
        assert_eq!(inbound.context.request_id, RequestId::new("msg-1"));
        assert_eq!(inbound.context.connection.connection_id, DEFAULT_CONNECTION_ID);
        assert_eq!(inbound.context.connection.remote_node, Some(NetworkingNodeId::new("lc-1")));
        assert_eq!(inbound.context.sender(), Some(&NetworkingNodeId::new("cs-1")));
        assert_eq!(inbound.context.timeout, Some(Duration::from_millis(1500)));
    }

    #[tokio::test]
    async fn test_run_forwards_configured_and_unknown_actions() {
        let runtime = runtime(NodeConfig::default());
        let input = line(json!({
            "action": "Heartbeat", "requestId": "1", "destinationId": "csms", "payload": {"a": 1}
        })) + &line(json!({
            "action": "DataTransfer", "requestId": "2", "destinationId": "csms", "payload": {"b": 2}
        }));

        let (summary, mut records) = serve(&runtime, &input).await;
        records.sort_by(|a, b| a.request_id.cmp(&b.request_id));

        assert_eq!(summary.forwarded, 2);
        assert_eq!(records[0].payload, Some(json!({"a": 1})));
        assert_eq!(records[1].payload, Some(json!({"b": 2})));
    }

    #[tokio::test]
    async fn test_run_rejects_by_default_when_configured() {
        let mut config = NodeConfig::default();
        config.forwarding.default_result = ForwardingResult::Reject;
        let runtime = runtime(config);

        let input = line(json!({
            "action": "BootNotification", "requestId": "1", "destinationId": "csms", "payload": {}
        }));
        let (summary, records) = serve(&runtime, &input).await;

        assert_eq!(summary.rejected, 1);
        assert_eq!(
            records[0].reject_payload,
            Some(json!({
                "status": "Rejected",
                "statusInfo": {"reasonCode": "Filtered", "additionalInfo": "Default handler"}
            }))
        );
        assert_eq!(records[0].log_message.as_deref(), Some("Default handler"));
    }

    #[tokio::test]
    async fn test_malformed_lines_are_answered_and_blank_lines_skipped() {
        let runtime = runtime(NodeConfig::default());
        let input = "not json\n\n".to_string()
            + &line(json!({"action": "Heartbeat", "destinationId": "csms", "payload": []}));

        let (summary, records) = serve(&runtime, &input).await;

        assert_eq!(summary.rejected, 2);
        assert_eq!(records.len(), 2);
        let codes: Vec<_> = records
            .iter()
            .map(|r| r.reject_payload.clone().unwrap())
            .collect();
        assert!(codes.iter().any(|p| p["errorCode"] == json!("FormationViolation")));
        assert!(codes
            .iter()
            .any(|p| p["statusInfo"]["reasonCode"] == json!("FormationViolation")));
    }

    #[tokio::test]
    async fn test_non_utf8_line_is_rejected_without_stopping() {
        let runtime = runtime(NodeConfig::default());
        let mut input = line(json!({
            "action": "Heartbeat", "requestId": "1", "destinationId": "csms", "payload": {}
        }))
        .into_bytes();
        input.extend_from_slice(b"\xff\xfe garbage\n");
        input.extend_from_slice(
            line(json!({
                "action": "Heartbeat", "requestId": "2", "destinationId": "csms", "payload": {}
            }))
            .as_bytes(),
        );

        let mut output = Vec::new();
        let summary = runtime
            .run(input.as_slice(), &mut output, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary.forwarded, 2);
        assert_eq!(summary.rejected, 1);
        let records: Vec<DecisionRecord> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        let rejected: Vec<_> = records.iter().filter(|r| r.request_id.is_none()).collect();
        assert_eq!(rejected.len(), 1);
        assert_eq!(
            rejected[0].reject_payload.as_ref().unwrap()["errorCode"],
            json!("FormationViolation")
        );
    }

    #[tokio::test]
    async fn test_panicking_handler_is_answered_with_internal_error() {
        let mut container = NodeContainer::new(NodeConfig::default()).unwrap();
        container.register_handler(Arc::new(Explodes)).unwrap();
        let runtime = Arc::new(NodeRuntime::new(container));

        let input = line(json!({
            "action": "Explode", "requestId": "boom", "destinationId": "csms", "payload": {}
        })) + &line(json!({
            "action": "Heartbeat", "requestId": "hb", "destinationId": "csms", "payload": {}
        }));

        let (summary, mut records) = tokio::time::timeout(Duration::from_secs(5), serve(&runtime, &input))
            .await
            .unwrap();
        records.sort_by(|a, b| a.request_id.cmp(&b.request_id));

        assert_eq!(summary.forwarded, 1);
        assert_eq!(summary.rejected, 1);
        assert_eq!(records[0].request_id.as_deref(), Some("boom"));
        assert_eq!(records[0].action.as_deref(), Some("Explode"));
        assert_eq!(
            records[0].reject_payload.as_ref().unwrap()["errorCode"],
            json!("InternalError")
        );
        assert_eq!(records[1].request_id.as_deref(), Some("hb"));
        assert_eq!(records[1].result, ForwardingResult::Forward);
    }

    #[tokio::test]
    async fn test_read_error_answers_requests_in_flight_first() {
        let runtime = runtime(NodeConfig::default());
        let first = line(json!({
            "action": "Heartbeat", "requestId": "1", "destinationId": "csms", "payload": {}
        }));
        let reader = BufReader::new(first.as_bytes().chain(BrokenInput));

        let mut output = Vec::new();
        let result = runtime
            .run(reader, &mut output, CancellationToken::new())
            .await;

        assert!(matches!(result, Err(RuntimeError::Io(_))));
        let written = String::from_utf8(output).unwrap();
        assert_eq!(written.lines().count(), 1);
        let record: DecisionRecord = serde_json::from_str(written.trim()).unwrap();
        assert_eq!(record.request_id.as_deref(), Some("1"));
        assert_eq!(record.result, ForwardingResult::Forward);
    }

    #[tokio::test]
    async fn test_shutdown_stops_reading() {
        let runtime = runtime(NodeConfig::default());
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let (client, server) = tokio::io::duplex(1024);
        let mut output = Vec::new();
        let summary = runtime
            .run(tokio::io::BufReader::new(server), &mut output, shutdown)
            .await
            .unwrap();

        drop(client);
        assert_eq!(summary, RunSummary::default());
        assert!(output.is_empty());
    }
}
