//! # JSON Message Operation
//!
//! A pass-through `ForwardingOperation` for any OCPP action: the request is
//! its JSON object, with the `signatures` array lifted into a `SignatureSet`.
//! Rejections are answered with a generic OCPP status response:
//!
//! ```json
//! {"status": "Rejected", "statusInfo": {"reasonCode": "Filtered", "additionalInfo": "..."}}
//! ```

use nn_01_signature_policy::{SignableMessage, SignatureSet, SIGNATURES_PROPERTY};
use nn_02_forwarding::{ForwardingError, ForwardingOperation};
use serde_json::{json, Map, Value};
use shared_types::{NetworkPath, NetworkingNodeId, RequestId, ResultCode};

/// A decoded OCPP payload of one context.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonMessage {
    context: String,
    /// The payload without its `signatures` property.
    pub body: Map<String, Value>,
    pub signatures: SignatureSet,
}

impl JsonMessage {
    pub fn new(context: impl Into<String>, body: Map<String, Value>) -> Self {
        Self {
            context: context.into(),
            body,
            signatures: SignatureSet::new(),
        }
    }

    /// Split a JSON object into body and signatures.
    pub fn from_json(context: impl Into<String>, json: &Value) -> Result<Self, ForwardingError> {
        let mut body = json
            .as_object()
            .cloned()
            .ok_or_else(|| ForwardingError::Decode("payload is not a JSON object".to_string()))?;

        let signatures = match body.remove(SIGNATURES_PROPERTY) {
            None | Some(Value::Null) => SignatureSet::new(),
            Some(raw) => serde_json::from_value(raw)
                .map_err(|e| ForwardingError::Decode(format!("invalid signatures: {e}")))?,
        };

        Ok(Self {
            context: context.into(),
            body,
            signatures,
        })
    }

    /// The body with its signatures, if any, as the last property.
    pub fn to_json(&self) -> Result<Value, ForwardingError> {
        let mut body = self.body.clone();
        if !self.signatures.is_empty() {
            let signatures = serde_json::to_value(&self.signatures)
                .map_err(|e| ForwardingError::Encode(e.to_string()))?;
            body.insert(SIGNATURES_PROPERTY.to_string(), signatures);
        }
        Ok(Value::Object(body))
    }
}

impl SignableMessage for JsonMessage {
    fn context(&self) -> &str {
        &self.context
    }

    fn signatures(&self) -> &SignatureSet {
        &self.signatures
    }

    fn signatures_mut(&mut self) -> &mut SignatureSet {
        &mut self.signatures
    }
}

/// Pass-through codec of one OCPP action.
#[derive(Debug, Clone)]
pub struct JsonMessageOperation {
    action: String,
    request_context: String,
    response_context: String,
}

impl JsonMessageOperation {
    /// Contexts default to `<action>Request` and `<action>Response`.
    pub fn new(action: impl Into<String>) -> Self {
        let action = action.into();
        Self {
            request_context: format!("{action}Request"),
            response_context: format!("{action}Response"),
            action,
        }
    }

    #[must_use]
    pub fn with_contexts(
        mut self,
        request_context: impl Into<String>,
        response_context: impl Into<String>,
    ) -> Self {
        self.request_context = request_context.into();
        self.response_context = response_context.into();
        self
    }

    #[must_use]
    pub fn request_context(&self) -> &str {
        &self.request_context
    }

    #[must_use]
    pub fn response_context(&self) -> &str {
        &self.response_context
    }
}

impl ForwardingOperation for JsonMessageOperation {
    type Request = JsonMessage;
    type Response = JsonMessage;

    fn action(&self) -> &str {
        &self.action
    }

    fn parse_request(
        &self,
        json: &Value,
        _request_id: &RequestId,
        _destination: &NetworkingNodeId,
        _network_path: &NetworkPath,
    ) -> Result<JsonMessage, ForwardingError> {
        JsonMessage::from_json(self.request_context.as_str(), json)
    }

    fn request_to_json(&self, request: &JsonMessage) -> Result<Value, ForwardingError> {
        request.to_json()
    }

    fn response_to_json(&self, response: &JsonMessage) -> Result<Value, ForwardingError> {
        response.to_json()
    }

    fn reject_response(
        &self,
        _request: Option<&JsonMessage>,
        code: ResultCode,
        description: &str,
    ) -> JsonMessage {
        let body = json!({
            "status": "Rejected",
            "statusInfo": {
                "reasonCode": code.as_str(),
                "additionalInfo": description,
            }
        });
        let body = match body {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        JsonMessage::new(self.response_context.as_str(), body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nn_01_signature_policy::{KeyMaterial, SignaturePolicy, SigningCurve, SigningIdentity};

    fn parse(operation: &JsonMessageOperation, json: &Value) -> Result<JsonMessage, ForwardingError> {
        operation.parse_request(
            json,
            &RequestId::new("1"),
            &"csms".into(),
            &NetworkPath::new(),
        )
    }

    #[test]
    fn test_default_contexts() {
        let operation = JsonMessageOperation::new("BootNotification");
        assert_eq!(operation.action(), "BootNotification");
        assert_eq!(operation.request_context(), "BootNotificationRequest");
        assert_eq!(operation.response_context(), "BootNotificationResponse");
    }

    #[test]
    fn test_parse_requires_object() {
        let operation = JsonMessageOperation::new("Heartbeat");
        assert!(matches!(
            parse(&operation, &json!([1, 2])),
            Err(ForwardingError::Decode(_))
        ));
        assert!(matches!(
            parse(&operation, &json!({"signatures": "nope"})),
            Err(ForwardingError::Decode(_))
        ));
    }

    #[test]
    fn test_signatures_survive_parse_and_encode() {
        let operation = JsonMessageOperation::new("Heartbeat");
        let policy = SignaturePolicy::accept_all();
        let key = KeyMaterial::generate(SigningCurve::Secp256r1).unwrap();

        let mut request = parse(&operation, &json!({"value": 1})).unwrap();
        let document = operation.request_to_json(&request).unwrap();
        policy
            .sign_request(&mut request, &document, &[SigningIdentity::new(key)])
            .unwrap();

        let encoded = operation.request_to_json(&request).unwrap();
        assert_eq!(encoded["signatures"].as_array().map(Vec::len), Some(1));

        let decoded = parse(&operation, &encoded).unwrap();
        assert_eq!(decoded.body, request.body);
        assert_eq!(decoded.signatures.len(), 1);
        assert_eq!(decoded.context(), "HeartbeatRequest");
    }

    #[test]
    fn test_reject_response_shape() {
        let operation = JsonMessageOperation::new("Authorize").with_contexts("urn:auth", "urn:auth.response");
        let response = operation.reject_response(None, ResultCode::SecurityError, "bad signature");

        assert_eq!(response.context(), "urn:auth.response");
        assert_eq!(
            operation.response_to_json(&response).unwrap(),
            json!({
                "status": "Rejected",
                "statusInfo": {"reasonCode": "SecurityError", "additionalInfo": "bad signature"}
            })
        );
    }
}
