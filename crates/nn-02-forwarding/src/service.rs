//! # Forwarding Pipeline Service
//!
//! Computes exactly one `ForwardingDecision` per inbound request:
//!
//! ```text
//! Decode -> Verify -> Received -> Filter -> Default -> Re-encode -> Filtered -> Sent
//! ```
//!
//! - A decode failure short-circuits to `REJECT` (`FormationViolation`).
//! - Signature verification runs on a blocking worker. The `Reject` and `Drop`
//!   verification actions replace the Filter stage; every other outcome is
//!   advisory and left to filters through the signature statuses.
//! - Filters run concurrently; the first decision in registration order wins.
//! - Callback failures, timeouts and panics are reported to the error sink and
//!   never change the decision.

use crate::domain::config::ForwardingConfig;
use crate::domain::decision::{ForwardingDecision, ForwardingResult, SentCallback};
use crate::domain::errors::{CallbackError, ForwardingError, ObserverError, PipelineStage};
use crate::domain::request::{InboundRequest, RequestContext};
use crate::events::{ObserverHandle, ObserverRegistry, Registered};
use crate::ports::inbound::{
    FilteredObserver, OperationDecision, ReceivedObserver, RequestFilter, SentObserver,
};
use crate::ports::outbound::{ForwardingOperation, ObserverErrorSink, TracingErrorSink};
use futures::future::join_all;
use futures::FutureExt;
use nn_01_signature_policy::{
    SignableMessage, SignaturePolicy, SignaturePolicyError, SigningIdentity, VerificationAction,
};
use serde_json::Value;
use shared_types::{ResultCode, SendResult};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const POLICY_REJECT_MESSAGE: &str = "Message rejected by signature policy";
const POLICY_DROP_MESSAGE: &str = "Message dropped by signature policy";

type SignFn<M> =
    fn(&SignaturePolicy, &mut M, &Value, &[SigningIdentity]) -> Result<usize, SignaturePolicyError>;

/// Forwarding pipeline of one OCPP operation.
pub struct ForwardingPipeline<Op: ForwardingOperation> {
    operation: Arc<Op>,
    config: ForwardingConfig,
    policy: Arc<SignaturePolicy>,
    observers: ObserverRegistry<Op>,
    error_sink: Arc<dyn ObserverErrorSink>,
}

impl<Op: ForwardingOperation> ForwardingPipeline<Op> {
    /// A pipeline that accepts unsigned messages and signs nothing.
    pub fn new(operation: Op, config: ForwardingConfig) -> Self {
        Self {
            operation: Arc::new(operation),
            config,
            policy: Arc::new(SignaturePolicy::accept_all()),
            observers: ObserverRegistry::new(),
            error_sink: Arc::new(TracingErrorSink),
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: Arc<SignaturePolicy>) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn with_error_sink(mut self, sink: Arc<dyn ObserverErrorSink>) -> Self {
        self.error_sink = sink;
        self
    }

    #[must_use]
    pub fn action(&self) -> &str {
        self.operation.action()
    }

    #[must_use]
    pub fn config(&self) -> &ForwardingConfig {
        &self.config
    }

    #[must_use]
    pub fn policy(&self) -> &Arc<SignaturePolicy> {
        &self.policy
    }

    #[must_use]
    pub fn observers(&self) -> &ObserverRegistry<Op> {
        &self.observers
    }

    pub fn on_received(
        &self,
        name: impl Into<String>,
        observer: Arc<dyn ReceivedObserver<Op>>,
    ) -> ObserverHandle {
        self.observers.add_received(name, observer)
    }

    pub fn add_filter(
        &self,
        name: impl Into<String>,
        filter: Arc<dyn RequestFilter<Op>>,
    ) -> ObserverHandle {
        self.observers.add_filter(name, filter)
    }

    pub fn on_filtered(
        &self,
        name: impl Into<String>,
        observer: Arc<dyn FilteredObserver<Op>>,
    ) -> ObserverHandle {
        self.observers.add_filtered(name, observer)
    }

    pub fn on_sent(
        &self,
        name: impl Into<String>,
        observer: Arc<dyn SentObserver<Op>>,
    ) -> ObserverHandle {
        self.observers.add_sent(name, observer)
    }

    pub fn remove_observer(&self, handle: ObserverHandle) -> bool {
        self.observers.remove(handle)
    }

    // =========================================================================
    // PIPELINE
    // =========================================================================

    /// Compute the forwarding decision for one inbound request.
    ///
    /// Never fails: every error becomes a reject decision or a reported
    /// callback failure.
    pub async fn process(
        &self,
        inbound: InboundRequest,
        cancel: CancellationToken,
    ) -> OperationDecision<Op> {
        let InboundRequest { context, json } = inbound;

        let request = match self.operation.parse_request(
            &json,
            &context.request_id,
            &context.destination,
            &context.network_path,
        ) {
            Ok(request) => request,
            Err(e) => return self.reject_undecodable(&context, &e),
        };

        let (request, verdict) = self.verify(&context, request, &json).await;

        self.notify_received(&context, &request).await;

        let mut decision = match verdict {
            Some(verdict) => verdict,
            None => {
                let candidate = self.run_filters(&context, &request, &cancel).await;
                self.resolve(candidate, &request)
            }
        };

        self.encode(&mut decision).await;

        self.notify_filtered(&context, &decision).await;

        if decision.is_forward() {
            let transmitted = decision.new_request.as_ref().unwrap_or(&request);
            decision.sent_callback = self.sent_callback(&context, transmitted);
        }

        info!(
            action = self.operation.action(),
            request_id = %context.request_id,
            tracking_id = %context.event_tracking_id,
            result = %decision.result,
            log_message = decision.log_message.as_deref().unwrap_or(""),
            "Forwarding decision made"
        );
        decision
    }

    fn reject_undecodable(
        &self,
        context: &RequestContext,
        failure: &ForwardingError,
    ) -> OperationDecision<Op> {
        let reason = match failure {
            ForwardingError::Decode(reason) => reason.clone(),
            other => other.to_string(),
        };
        warn!(
            action = self.operation.action(),
            request_id = %context.request_id,
            error = %reason,
            "Request could not be decoded"
        );

        let response = self
            .operation
            .reject_response(None, ResultCode::FormationViolation, &reason);
        let payload = self.encode_response_unsigned(&response);

        let mut decision = ForwardingDecision::reject(None, response).with_log_message(reason);
        decision.reject_payload = payload;
        decision
    }

    async fn verify(
        &self,
        context: &RequestContext,
        request: Op::Request,
        json: &Value,
    ) -> (Op::Request, Option<OperationDecision<Op>>) {
        let action = self
            .policy
            .get_highest_verification_policy(request.context())
            .action;

        let (request, result) = if request.signatures().is_empty() {
            let mut request = request;
            let result = self.policy.verify_request(&mut request, json);
            (request, result)
        } else {
            let policy = Arc::clone(&self.policy);
            let document = json.clone();
            let fallback = request.clone();
            let task = tokio::task::spawn_blocking(move || {
                let mut request = request;
                let result = policy.verify_request(&mut request, &document);
                (request, result)
            });
            match task.await {
                Ok(done) => done,
                Err(e) => {
                    error!(request_id = %context.request_id, error = %e, "Signature verification task failed");
                    let verdict = self.reject_with(&fallback, ResultCode::InternalError, "Signature verification failed");
                    return (fallback, Some(verdict));
                }
            }
        };

        if let Err(e) = &result {
            debug!(
                request_id = %context.request_id,
                context = request.context(),
                error = %e,
                "Signature verification did not pass"
            );
        }

        let verdict = match action {
            VerificationAction::Reject => {
                Some(self.reject_with(&request, ResultCode::SecurityError, POLICY_REJECT_MESSAGE))
            }
            VerificationAction::Drop => {
                Some(ForwardingDecision::drop_message(request.clone()).with_log_message(POLICY_DROP_MESSAGE))
            }
            _ => None,
        };
        (request, verdict)
    }

    async fn notify_received(&self, context: &RequestContext, request: &Op::Request) {
        let observers = self.observers.received();
        if observers.is_empty() {
            return;
        }

        let calls = observers.iter().map(|entry| {
            let call = AssertUnwindSafe(entry.callback.on_received(context, request)).catch_unwind();
            async move { (entry, call.await) }
        });
        for (entry, outcome) in join_all(calls).await {
            report_outcome(self.error_sink.as_ref(), PipelineStage::Received, &entry.name, outcome);
        }
    }

    async fn run_filters(
        &self,
        context: &RequestContext,
        request: &Op::Request,
        cancel: &CancellationToken,
    ) -> Option<OperationDecision<Op>> {
        let filters = self.observers.filters();
        if filters.is_empty() {
            return None;
        }

        let limit = shortest(self.config.filter_timeout, context.timeout);
        let calls = filters
            .iter()
            .map(|entry| self.run_filter(entry, context, request, cancel.child_token(), limit));

        join_all(calls).await.into_iter().flatten().next()
    }

    async fn run_filter(
        &self,
        entry: &Registered<dyn RequestFilter<Op>>,
        context: &RequestContext,
        request: &Op::Request,
        token: CancellationToken,
        limit: Option<Duration>,
    ) -> Option<OperationDecision<Op>> {
        let call =
            AssertUnwindSafe(entry.callback.filter(context, request, token.clone())).catch_unwind();
        let bounded = async {
            match limit {
                Some(limit) => tokio::time::timeout(limit, call).await.ok(),
                None => Some(call.await),
            }
        };

        let outcome = tokio::select! {
            biased;
            () = token.cancelled() => {
                debug!(filter = %entry.name, "Filter cancelled, no decision");
                return None;
            }
            outcome = bounded => outcome,
        };

        match outcome {
            None => {
                token.cancel();
                let timeout_ms = limit
                    .map(|l| u64::try_from(l.as_millis()).unwrap_or(u64::MAX))
                    .unwrap_or_default();
                self.error_sink.report(&ObserverError::TimedOut {
                    name: entry.name.clone(),
                    timeout_ms,
                });
                None
            }
            Some(Ok(Ok(decision))) => {
                if decision.is_some() {
                    debug!(filter = %entry.name, "Filter returned a decision");
                }
                decision
            }
            Some(failure) => {
                report_outcome(self.error_sink.as_ref(), PipelineStage::Filter, &entry.name, failure);
                None
            }
        }
    }

    fn resolve(
        &self,
        candidate: Option<OperationDecision<Op>>,
        request: &Op::Request,
    ) -> OperationDecision<Op> {
        let Some(mut decision) = candidate else {
            return match self.config.default_result {
                ForwardingResult::Forward => ForwardingDecision::forward(request.clone()),
                ForwardingResult::Reject | ForwardingResult::Drop => self.default_reject(request),
            };
        };

        if decision.request.is_none() {
            decision.request = Some(request.clone());
        }

        match decision.result {
            ForwardingResult::Reject if decision.reject_response.is_none() => {
                self.default_reject(request)
            }
            ForwardingResult::Drop => {
                warn!(action = self.operation.action(), "Filters cannot drop messages, rejecting instead");
                self.default_reject(request)
            }
            _ => decision,
        }
    }

    fn default_reject(&self, request: &Op::Request) -> OperationDecision<Op> {
        self.reject_with(request, ResultCode::Filtered, &self.config.default_log_message)
    }

    fn reject_with(
        &self,
        request: &Op::Request,
        code: ResultCode,
        description: &str,
    ) -> OperationDecision<Op> {
        let response = self.operation.reject_response(Some(request), code, description);
        ForwardingDecision::reject(Some(request.clone()), response).with_log_message(description)
    }

    async fn encode(&self, decision: &mut OperationDecision<Op>) {
        match decision.result {
            ForwardingResult::Forward => {
                if decision.new_request_payload.is_some() {
                    return;
                }
                let Some(mut replacement) = decision.new_request.take() else {
                    return;
                };
                if let Some(original) = decision.request.as_ref() {
                    strip_inherited_signatures(original, &mut replacement);
                }
                let signed = self
                    .sign_and_encode(replacement, Op::request_to_json, SignaturePolicy::sign_request)
                    .await;
                match signed {
                    Ok((replacement, payload)) => {
                        decision.new_request = Some(replacement);
                        decision.new_request_payload = Some(payload);
                    }
                    Err(e) => {
                        error!(action = self.operation.action(), error = %e, "Replacement request could not be encoded");
                        let description = e.to_string();
                        let response = self.operation.reject_response(
                            decision.request.as_ref(),
                            ResultCode::InternalError,
                            &description,
                        );
                        decision.result = ForwardingResult::Reject;
                        decision.reject_payload = self.encode_response_unsigned(&response);
                        decision.reject_response = Some(response);
                        decision.log_message = Some(description);
                    }
                }
            }
            ForwardingResult::Reject => {
                if decision.reject_payload.is_some() {
                    return;
                }
                let Some(response) = decision.reject_response.take() else {
                    return;
                };
                let signed = self
                    .sign_and_encode(
                        response.clone(),
                        Op::response_to_json,
                        SignaturePolicy::sign_response,
                    )
                    .await;
                match signed {
                    Ok((response, payload)) => {
                        decision.reject_response = Some(response);
                        decision.reject_payload = Some(payload);
                    }
                    Err(e) => {
                        warn!(action = self.operation.action(), error = %e, "Reject response sent unsigned");
                        decision.reject_payload = self.encode_response_unsigned(&response);
                        decision.reject_response = Some(response);
                    }
                }
            }
            ForwardingResult::Drop => {}
        }
    }

    /// Encode `message`, sign it, and encode it again with its signatures.
    async fn sign_and_encode<M>(
        &self,
        message: M,
        encode: fn(&Op, &M) -> Result<Value, ForwardingError>,
        sign: SignFn<M>,
    ) -> Result<(M, Value), ForwardingError>
    where
        M: SignableMessage + Send + 'static,
    {
        let operation = Arc::clone(&self.operation);
        let policy = Arc::clone(&self.policy);

        tokio::task::spawn_blocking(move || {
            let mut message = message;
            let document = encode(&*operation, &message)?;
            let added = sign(&*policy, &mut message, &document, &[])?;
            let payload = if added > 0 {
                encode(&*operation, &message)?
            } else {
                document
            };
            Ok((message, payload))
        })
        .await
        .map_err(|e| ForwardingError::Encode(format!("signing task failed: {e}")))?
    }

    fn encode_response_unsigned(&self, response: &Op::Response) -> Option<Value> {
        match self.operation.response_to_json(response) {
            Ok(payload) => Some(payload),
            Err(e) => {
                error!(action = self.operation.action(), error = %e, "Reject response could not be encoded");
                None
            }
        }
    }

    async fn notify_filtered(&self, context: &RequestContext, decision: &OperationDecision<Op>) {
        let observers = self.observers.filtered();
        if observers.is_empty() {
            return;
        }

        let calls = observers.iter().map(|entry| {
            let call = AssertUnwindSafe(entry.callback.on_filtered(
                context,
                decision.request.as_ref(),
                decision,
            ))
            .catch_unwind();
            async move { (entry, call.await) }
        });
        for (entry, outcome) in join_all(calls).await {
            report_outcome(self.error_sink.as_ref(), PipelineStage::Filtered, &entry.name, outcome);
        }
    }

    fn sent_callback(
        &self,
        context: &RequestContext,
        request: &Op::Request,
    ) -> Option<SentCallback> {
        let observers = self.observers.sent();
        if observers.is_empty() {
            return None;
        }

        let context = context.clone();
        let request = request.clone();
        let sink = Arc::clone(&self.error_sink);

        Some(Box::new(move |result: SendResult| {
            async move {
                debug!(request_id = %context.request_id, status = ?result.status, "Request sent");
                let calls = observers.iter().map(|entry| {
                    let call = AssertUnwindSafe(entry.callback.on_sent(&context, &request, &result))
                        .catch_unwind();
                    async move { (entry, call.await) }
                });
                for (entry, outcome) in join_all(calls).await {
                    report_outcome(sink.as_ref(), PipelineStage::Sent, &entry.name, outcome);
                }
            }
            .boxed()
        }))
    }
}

/// Signatures copied from the inbound request no longer cover a modified body.
fn strip_inherited_signatures<M: SignableMessage>(original: &M, replacement: &mut M) {
    let inherited = original.signatures();
    if inherited.is_empty() {
        return;
    }
    let before = replacement.signatures().len();
    replacement
        .signatures_mut()
        .retain(|signature| !inherited.contains_value(&signature.value));
    let removed = before - replacement.signatures().len();
    if removed > 0 {
        debug!(removed, "Dropped inherited signatures from replacement request");
    }
}

type CallbackOutcome<T> = Result<Result<T, CallbackError>, Box<dyn Any + Send>>;

fn report_outcome<T>(
    sink: &dyn ObserverErrorSink,
    stage: PipelineStage,
    name: &str,
    outcome: CallbackOutcome<T>,
) {
    let failure = match outcome {
        Ok(Ok(_)) => return,
        Ok(Err(e)) => ObserverError::Failed {
            stage,
            name: name.to_string(),
            reason: e.to_string(),
        },
        Err(panic) => ObserverError::Panicked {
            stage,
            name: name.to_string(),
            reason: panic_message(panic.as_ref()),
        },
    };
    sink.report(&failure);
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

fn shortest(a: Option<Duration>, b: Option<Duration>) -> Option<Duration> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}
