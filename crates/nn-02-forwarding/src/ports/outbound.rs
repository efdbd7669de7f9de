//! Outbound (Driven) ports for the forwarding pipeline.
//!
//! The codec of one OCPP operation, and the sink that receives isolated
//! callback failures.

use crate::domain::errors::{ForwardingError, ObserverError};
use nn_01_signature_policy::SignableMessage;
use serde_json::Value;
use shared_types::{NetworkPath, NetworkingNodeId, RequestId, ResultCode};
use tracing::{error, warn};

/// Codec of one OCPP operation.
///
/// The pipeline depends only on this shape, never on an operation's fields.
pub trait ForwardingOperation: Send + Sync + 'static {
    type Request: SignableMessage + Clone + Send + Sync + 'static;
    type Response: SignableMessage + Clone + Send + Sync + 'static;

    /// OCPP action name, e.g. `"BootNotification"`.
    fn action(&self) -> &str;

    /// Decode the inbound JSON into the typed request.
    fn parse_request(
        &self,
        json: &Value,
        request_id: &RequestId,
        destination: &NetworkingNodeId,
        network_path: &NetworkPath,
    ) -> Result<Self::Request, ForwardingError>;

    fn request_to_json(&self, request: &Self::Request) -> Result<Value, ForwardingError>;

    fn response_to_json(&self, response: &Self::Response) -> Result<Value, ForwardingError>;

    /// Build the response sent back when the request is rejected locally.
    ///
    /// `request` is `None` when the inbound JSON could not be decoded.
    fn reject_response(
        &self,
        request: Option<&Self::Request>,
        code: ResultCode,
        description: &str,
    ) -> Self::Response;
}

/// Receives every caught callback failure.
pub trait ObserverErrorSink: Send + Sync {
    fn report(&self, error: &ObserverError);
}

/// Default sink: logs through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingErrorSink;

impl ObserverErrorSink for TracingErrorSink {
    fn report(&self, failure: &ObserverError) {
        match failure {
            ObserverError::Panicked { .. } => {
                error!(stage = %failure.stage(), callback = failure.name(), error = %failure, "Callback panicked");
            }
            ObserverError::Failed { .. } | ObserverError::TimedOut { .. } => {
                warn!(stage = %failure.stage(), callback = failure.name(), error = %failure, "Callback failed");
            }
        }
    }
}
