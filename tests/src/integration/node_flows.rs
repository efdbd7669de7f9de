//! # Node Flows
//!
//! The node built from configuration: policy and pipelines from JSON,
//! environment overrides, filters and sent observers attached to the
//! container's pipelines, and the NDJSON request loop.

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::{json, Value};

    use nn_01_signature_policy::{KeyMaterial, SigningCurve};
    use nn_02_forwarding::{
        CallbackError, CancellationToken, ForwardingDecision, ForwardingOperation,
        ForwardingResult, OperationDecision, RequestContext, RequestFilter, SentObserver,
    };
    use node_runtime::{
        DecisionRecord, InboundEnvelope, JsonMessage, JsonMessageOperation, NodeConfig,
        NodeContainer, NodeRuntime,
    };
    use shared_types::{ResultCode, SendResult, SendStatus};

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    fn key_config(curve: SigningCurve) -> Value {
        let key = KeyMaterial::generate(curve).unwrap();
        json!({
            "curve": curve.as_str(),
            "privateKey": key.private_key_base64().unwrap(),
            "publicKey": key.public_key_base64(),
            "name": "nn-1",
        })
    }

    fn envelope(action: &str, request_id: &str, payload: Value) -> InboundEnvelope {
        serde_json::from_value(json!({
            "action": action,
            "requestId": request_id,
            "destinationId": "csms",
            "networkPath": ["cs-1"],
            "payload": payload,
        }))
        .unwrap()
    }

    fn runtime(config: NodeConfig) -> Arc<NodeRuntime> {
        Arc::new(NodeRuntime::new(NodeContainer::new(config).unwrap()))
    }

    async fn decide(runtime: &NodeRuntime, envelope: InboundEnvelope) -> DecisionRecord {
        runtime.handle(envelope, CancellationToken::new()).await.0
    }

    /// Rejects heartbeats from blocked stations.
    struct BlockStations {
        blocked: Vec<&'static str>,
    }

    #[async_trait]
    impl RequestFilter<JsonMessageOperation> for BlockStations {
        async fn filter(
            &self,
            context: &RequestContext,
            request: &JsonMessage,
            _cancel: CancellationToken,
        ) -> Result<Option<OperationDecision<JsonMessageOperation>>, CallbackError> {
            let Some(sender) = context.sender() else {
                return Ok(None);
            };
            if !self.blocked.contains(&sender.as_str()) {
                return Ok(None);
            }
            let response = JsonMessageOperation::new("Heartbeat").reject_response(
                Some(request),
                ResultCode::Filtered,
                &format!("station {sender} is blocked"),
            );
            Ok(Some(ForwardingDecision::reject(Some(request.clone()), response)))
        }
    }

    #[derive(Default)]
    struct SentLog {
        sent: Mutex<Vec<(String, SendStatus)>>,
    }

    #[async_trait]
    impl SentObserver<JsonMessageOperation> for SentLog {
        async fn on_sent(
            &self,
            context: &RequestContext,
            _request: &JsonMessage,
            result: &SendResult,
        ) -> Result<(), CallbackError> {
            self.sent
                .lock()
                .push((context.request_id.to_string(), result.status));
            Ok(())
        }
    }

    // =============================================================================
    // CONFIGURATION-DRIVEN NODE
    // =============================================================================

    #[tokio::test]
    async fn test_configured_node_signs_default_rejections() {
        let config = NodeConfig::from_json(
            &json!({
                "nodeId": "nn-1",
                "forwarding": {"defaultResult": "REJECT", "defaultLogMessage": "Not routed"},
                "signatures": {
                    "defaultSignatureAction": "Sign",
                    "defaultKey": key_config(SigningCurve::Secp256r1)
                },
                "operations": [{"action": "Heartbeat"}]
            })
            .to_string(),
        )
        .unwrap();
        let runtime = runtime(config);

        let record = decide(&runtime, envelope("Heartbeat", "hb-1", json!({}))).await;

        assert_eq!(record.result, ForwardingResult::Reject);
        assert_eq!(record.request_id.as_deref(), Some("hb-1"));
        assert_eq!(record.log_message.as_deref(), Some("Not routed"));
        let payload = record.reject_payload.unwrap();
        assert_eq!(payload["statusInfo"]["additionalInfo"], json!("Not routed"));
        assert_eq!(payload["signatures"][0]["name"], json!("nn-1"));
    }

    #[tokio::test]
    async fn test_environment_can_require_signatures() {
        let vars: HashMap<&str, &str> = [("NN_DEFAULT_VERIFICATION", "Reject")].into();
        let mut config = NodeConfig::default();
        config
            .apply_overrides(|name| vars.get(name).map(|v| (*v).to_string()))
            .unwrap();
        let runtime = runtime(config);

        let record = decide(&runtime, envelope("StatusNotification", "sn-1", json!({}))).await;

        assert_eq!(record.result, ForwardingResult::Reject);
        assert_eq!(
            record.reject_payload.unwrap()["statusInfo"]["reasonCode"],
            json!("SecurityError")
        );
    }

    #[tokio::test]
    async fn test_unknown_action_is_not_implemented_when_rejecting() {
        let mut config = NodeConfig::default();
        config.forwarding.default_result = ForwardingResult::Reject;
        let runtime = runtime(config);

        let record = decide(&runtime, envelope("DataTransfer", "dt-1", json!({"vendorId": "x"}))).await;

        assert_eq!(record.result, ForwardingResult::Reject);
        assert_eq!(
            record.reject_payload.unwrap()["errorCode"],
            json!("NotImplemented")
        );
    }

    #[tokio::test]
    async fn test_filter_registered_on_container_pipeline() {
        let runtime = runtime(NodeConfig::default());
        runtime
            .container()
            .pipeline("Heartbeat")
            .unwrap()
            .add_filter("block-stations", Arc::new(BlockStations { blocked: vec!["cs-1"] }));

        let blocked = decide(&runtime, envelope("Heartbeat", "hb-1", json!({}))).await;
        assert_eq!(blocked.result, ForwardingResult::Reject);
        assert_eq!(
            blocked.reject_payload.unwrap()["statusInfo"]["additionalInfo"],
            json!("station cs-1 is blocked")
        );

        let other = decide(&runtime, envelope("MeterValues", "mv-1", json!({"evseId": 1}))).await;
        assert_eq!(other.result, ForwardingResult::Forward);
        assert_eq!(other.payload, Some(json!({"evseId": 1})));
    }

    // =============================================================================
    // REQUEST LOOP
    // =============================================================================

    #[tokio::test]
    async fn test_request_loop_notifies_sent_observers_after_writing() {
        let runtime = runtime(NodeConfig::default());
        let log = Arc::new(SentLog::default());
        runtime
            .container()
            .pipeline("Heartbeat")
            .unwrap()
            .on_sent("sent-log", log.clone());

        let input = [
            json!({"action": "Heartbeat", "requestId": "hb-1", "destinationId": "csms", "payload": {}}),
            json!({"action": "Heartbeat", "requestId": "hb-2", "destinationId": "csms", "payload": {}}),
        ]
        .iter()
        .map(|line| format!("{line}\n"))
        .collect::<String>();

        let mut output = Vec::new();
        let summary = runtime
            .run(input.as_bytes(), &mut output, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(summary.forwarded, 2);
        assert_eq!(String::from_utf8(output).unwrap().lines().count(), 2);

        tokio::time::timeout(Duration::from_secs(5), async {
            while log.sent.lock().len() < 2 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        let mut sent = log.sent.lock().clone();
        sent.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(
            sent,
            vec![
                ("hb-1".to_string(), SendStatus::Success),
                ("hb-2".to_string(), SendStatus::Success)
            ]
        );
    }
}
