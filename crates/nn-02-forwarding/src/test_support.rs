//! Test operation shared by the unit tests of this crate.

use crate::domain::errors::ForwardingError;
use crate::domain::request::{InboundRequest, RequestContext};
use crate::ports::outbound::ForwardingOperation;
use nn_01_signature_policy::{SignableMessage, SignatureSet};
use serde_json::{json, Map, Value};
use shared_types::{ConnectionInfo, NetworkPath, NetworkingNodeId, RequestId, ResultCode};

#[derive(Debug, Clone, PartialEq)]
pub struct TestRequest {
    pub body: Map<String, Value>,
    pub signatures: SignatureSet,
}

impl SignableMessage for TestRequest {
    fn context(&self) -> &str {
        "HeartbeatRequest"
    }

    fn signatures(&self) -> &SignatureSet {
        &self.signatures
    }

    fn signatures_mut(&mut self) -> &mut SignatureSet {
        &mut self.signatures
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TestResponse {
    pub code: ResultCode,
    pub description: String,
    pub signatures: SignatureSet,
}

impl SignableMessage for TestResponse {
    fn context(&self) -> &str {
        "HeartbeatResponse"
    }

    fn signatures(&self) -> &SignatureSet {
        &self.signatures
    }

    fn signatures_mut(&mut self) -> &mut SignatureSet {
        &mut self.signatures
    }
}

/// Accepts any JSON object; `{"malformed": true}` fails to decode.
pub struct TestOperation;

impl ForwardingOperation for TestOperation {
    type Request = TestRequest;
    type Response = TestResponse;

    fn action(&self) -> &str {
        "Heartbeat"
    }

    fn parse_request(
        &self,
        json: &Value,
        _request_id: &RequestId,
        _destination: &NetworkingNodeId,
        _network_path: &NetworkPath,
    ) -> Result<TestRequest, ForwardingError> {
        let mut body = json
            .as_object()
            .cloned()
            .ok_or_else(|| ForwardingError::Decode("expected a JSON object".to_string()))?;
        if body.get("malformed") == Some(&Value::Bool(true)) {
            return Err(ForwardingError::Decode("malformed request".to_string()));
        }
        let signatures = match body.remove("signatures") {
            Some(raw) => serde_json::from_value(raw)
                .map_err(|e| ForwardingError::Decode(e.to_string()))?,
            None => SignatureSet::new(),
        };
        Ok(TestRequest { body, signatures })
    }

    fn request_to_json(&self, request: &TestRequest) -> Result<Value, ForwardingError> {
        let mut body = request.body.clone();
        if !request.signatures.is_empty() {
            let signatures = serde_json::to_value(&request.signatures)
                .map_err(|e| ForwardingError::Encode(e.to_string()))?;
            body.insert("signatures".to_string(), signatures);
        }
        Ok(Value::Object(body))
    }

    fn response_to_json(&self, response: &TestResponse) -> Result<Value, ForwardingError> {
        let mut body = json!({
            "code": response.code.as_str(),
            "description": response.description,
        });
        if !response.signatures.is_empty() {
            body["signatures"] = serde_json::to_value(&response.signatures)
                .map_err(|e| ForwardingError::Encode(e.to_string()))?;
        }
        Ok(body)
    }

    fn reject_response(
        &self,
        _request: Option<&TestRequest>,
        code: ResultCode,
        description: &str,
    ) -> TestResponse {
        TestResponse {
            code,
            description: description.to_string(),
            signatures: SignatureSet::new(),
        }
    }
}

pub fn inbound(json: Value) -> InboundRequest {
    let context = RequestContext::new(
        RequestId::new("req-1"),
        "csms".into(),
        NetworkPath::from_hops(vec!["cs-1".into()]),
        ConnectionInfo::new("conn-1"),
    );
    InboundRequest::new(context, json)
}
