//! # Forwarding Decision
//!
//! The single outcome computed for one inbound request at one hop.
//!
//! ## Invariants
//!
//! - `result == Reject` implies `reject_response` is present once the
//!   pipeline has resolved the decision.
//! - `request` is absent only when the inbound JSON could not be decoded.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared_types::SendResult;
use std::fmt;

/// Log message of decisions synthesized by the default policy.
pub const DEFAULT_LOG_MESSAGE: &str = "Default handler";

/// What happens to the inbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ForwardingResult {
    /// Send the request (or its replacement) on to the next hop.
    Forward,
    /// Answer locally with the reject response.
    Reject,
    /// Discard without answering. Only the signature policy produces this.
    Drop,
}

impl fmt::Display for ForwardingResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ForwardingResult::Forward => "FORWARD",
            ForwardingResult::Reject => "REJECT",
            ForwardingResult::Drop => "DROP",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for ForwardingResult {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "FORWARD" => Ok(ForwardingResult::Forward),
            "REJECT" => Ok(ForwardingResult::Reject),
            "DROP" => Ok(ForwardingResult::Drop),
            other => Err(format!("unknown forwarding result: {other}")),
        }
    }
}

/// Deferred callback the transport runs once the bytes are written (or the write failed).
pub type SentCallback = Box<dyn FnOnce(SendResult) -> BoxFuture<'static, ()> + Send + Sync>;

/// Outcome for one inbound request.
pub struct ForwardingDecision<Req, Resp> {
    pub request: Option<Req>,
    pub result: ForwardingResult,
    pub reject_response: Option<Resp>,
    /// Encoded `reject_response`, ready for the transport.
    pub reject_payload: Option<Value>,
    /// Replacement for the original request when forwarding.
    pub new_request: Option<Req>,
    /// Encoded `new_request`, ready for the transport.
    pub new_request_payload: Option<Value>,
    pub log_message: Option<String>,
    pub sent_callback: Option<SentCallback>,
}

impl<Req, Resp> ForwardingDecision<Req, Resp> {
    fn with_result(request: Option<Req>, result: ForwardingResult) -> Self {
        Self {
            request,
            result,
            reject_response: None,
            reject_payload: None,
            new_request: None,
            new_request_payload: None,
            log_message: None,
            sent_callback: None,
        }
    }

    /// Forward the request unchanged.
    pub fn forward(request: Req) -> Self {
        Self::with_result(Some(request), ForwardingResult::Forward)
    }

    /// Forward `replacement` instead of the original request.
    ///
    /// Signatures `replacement` shares with `request` are removed before it
    /// is re-signed; they do not cover the new body.
    pub fn forward_replacement(request: Req, replacement: Req) -> Self {
        let mut decision = Self::forward(request);
        decision.new_request = Some(replacement);
        decision
    }

    /// Answer locally with `response`.
    pub fn reject(request: Option<Req>, response: Resp) -> Self {
        let mut decision = Self::with_result(request, ForwardingResult::Reject);
        decision.reject_response = Some(response);
        decision
    }

    /// Ask the pipeline to reject with its default "filtered" response.
    pub fn reject_default(request: Req) -> Self {
        Self::with_result(Some(request), ForwardingResult::Reject)
    }

    /// Discard silently.
    pub fn drop_message(request: Req) -> Self {
        Self::with_result(Some(request), ForwardingResult::Drop)
    }

    #[must_use]
    pub fn with_log_message(mut self, message: impl Into<String>) -> Self {
        self.log_message = Some(message.into());
        self
    }

    #[must_use]
    pub fn is_forward(&self) -> bool {
        self.result == ForwardingResult::Forward
    }

    #[must_use]
    pub fn is_reject(&self) -> bool {
        self.result == ForwardingResult::Reject
    }

    /// Run the sent callback, if any. Subsequent calls do nothing.
    pub async fn notify_sent(&mut self, result: SendResult) {
        if let Some(callback) = self.sent_callback.take() {
            callback(result).await;
        }
    }
}

impl<Req: fmt::Debug, Resp: fmt::Debug> fmt::Debug for ForwardingDecision<Req, Resp> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForwardingDecision")
            .field("request", &self.request)
            .field("result", &self.result)
            .field("reject_response", &self.reject_response)
            .field("reject_payload", &self.reject_payload)
            .field("new_request", &self.new_request)
            .field("new_request_payload", &self.new_request_payload)
            .field("log_message", &self.log_message)
            .field("sent_callback", &self.sent_callback.is_some())
            .finish()
    }
}
