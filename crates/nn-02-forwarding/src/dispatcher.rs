//! # Dispatcher
//!
//! Routes inbound requests by OCPP action to the pipeline of that operation.
//! `ForwardingHandler` is the JSON-level, type-erased view of a pipeline, so
//! pipelines of different operations live in one map.

use crate::domain::decision::{ForwardingDecision, ForwardingResult, SentCallback};
use crate::domain::errors::ForwardingError;
use crate::domain::request::InboundRequest;
use crate::ports::outbound::ForwardingOperation;
use crate::service::ForwardingPipeline;
use async_trait::async_trait;
use serde_json::{json, Value};
use shared_types::{ResultCode, SendResult};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// A decision reduced to what the transport needs.
pub struct JsonForwardingDecision {
    pub action: String,
    pub result: ForwardingResult,
    /// Payload to send to the next hop when forwarding.
    pub payload: Option<Value>,
    /// Payload to send back to the sender when rejecting.
    pub reject_payload: Option<Value>,
    pub log_message: Option<String>,
    pub sent_callback: Option<SentCallback>,
}

impl JsonForwardingDecision {
    /// Reduce a typed decision. `original` is forwarded when there is no replacement.
    pub fn from_decision<Req, Resp>(
        action: impl Into<String>,
        decision: ForwardingDecision<Req, Resp>,
        original: Value,
    ) -> Self {
        let payload = match decision.result {
            ForwardingResult::Forward => Some(decision.new_request_payload.unwrap_or(original)),
            ForwardingResult::Reject | ForwardingResult::Drop => None,
        };
        Self {
            action: action.into(),
            result: decision.result,
            payload,
            reject_payload: decision.reject_payload,
            log_message: decision.log_message,
            sent_callback: decision.sent_callback,
        }
    }

    /// Run the sent callback, if any. Subsequent calls do nothing.
    pub async fn notify_sent(&mut self, result: SendResult) {
        if let Some(callback) = self.sent_callback.take() {
            callback(result).await;
        }
    }
}

impl fmt::Debug for JsonForwardingDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonForwardingDecision")
            .field("action", &self.action)
            .field("result", &self.result)
            .field("payload", &self.payload)
            .field("reject_payload", &self.reject_payload)
            .field("log_message", &self.log_message)
            .field("sent_callback", &self.sent_callback.is_some())
            .finish()
    }
}

/// JSON-level view of one operation's pipeline.
#[async_trait]
pub trait ForwardingHandler: Send + Sync {
    fn action(&self) -> &str;

    async fn handle(
        &self,
        inbound: InboundRequest,
        cancel: CancellationToken,
    ) -> JsonForwardingDecision;
}

#[async_trait]
impl<Op: ForwardingOperation> ForwardingHandler for ForwardingPipeline<Op> {
    fn action(&self) -> &str {
        ForwardingPipeline::action(self)
    }

    async fn handle(
        &self,
        inbound: InboundRequest,
        cancel: CancellationToken,
    ) -> JsonForwardingDecision {
        let original = inbound.json.clone();
        let decision = self.process(inbound, cancel).await;
        JsonForwardingDecision::from_decision(ForwardingPipeline::action(self), decision, original)
    }
}

/// Error payload for requests no operation handles.
#[must_use]
pub fn error_payload(code: ResultCode, description: &str) -> Value {
    json!({
        "errorCode": code.as_str(),
        "errorDescription": description,
    })
}

/// Maps OCPP action names to their pipelines.
pub struct ForwardingDispatcher {
    handlers: HashMap<String, Arc<dyn ForwardingHandler>>,
    default_result: ForwardingResult,
}

impl ForwardingDispatcher {
    /// `default_result` applies to actions without a registered handler.
    #[must_use]
    pub fn new(default_result: ForwardingResult) -> Self {
        Self {
            handlers: HashMap::new(),
            default_result,
        }
    }

    pub fn register(&mut self, handler: Arc<dyn ForwardingHandler>) -> Result<(), ForwardingError> {
        let action = handler.action().to_string();
        if self.handlers.contains_key(&action) {
            return Err(ForwardingError::DuplicateAction(action));
        }
        debug!(action = %action, "Forwarding handler registered");
        self.handlers.insert(action, handler);
        Ok(())
    }

    #[must_use]
    pub fn handler(&self, action: &str) -> Option<&Arc<dyn ForwardingHandler>> {
        self.handlers.get(action)
    }

    /// Registered actions, sorted.
    #[must_use]
    pub fn actions(&self) -> Vec<&str> {
        let mut actions: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        actions.sort_unstable();
        actions
    }

    pub async fn dispatch(
        &self,
        action: &str,
        inbound: InboundRequest,
        cancel: CancellationToken,
    ) -> JsonForwardingDecision {
        match self.handlers.get(action) {
            Some(handler) => handler.handle(inbound, cancel).await,
            None => self.unknown_action(action, inbound),
        }
    }

    fn unknown_action(&self, action: &str, inbound: InboundRequest) -> JsonForwardingDecision {
        let description = ForwardingError::UnknownAction(action.to_string()).to_string();

        if self.default_result == ForwardingResult::Forward {
            debug!(action, request_id = %inbound.context.request_id, "Forwarding unknown action unchanged");
            return JsonForwardingDecision {
                action: action.to_string(),
                result: ForwardingResult::Forward,
                payload: Some(inbound.json),
                reject_payload: None,
                log_message: Some(description),
                sent_callback: None,
            };
        }

        warn!(action, request_id = %inbound.context.request_id, "Rejecting unknown action");
        JsonForwardingDecision {
            action: action.to_string(),
            result: ForwardingResult::Reject,
            payload: None,
            reject_payload: Some(error_payload(ResultCode::NotImplemented, &description)),
            log_message: Some(description),
            sent_callback: None,
        }
    }
}
