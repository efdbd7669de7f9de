//! # Signed Forwarding Flows
//!
//! A charging station signs a request, the networking node verifies it,
//! runs its filters and either forwards the request (re-signed when a filter
//! replaces it) or answers with a rejection signed by the node key.
//!
//! ```text
//! Station --signed BootNotification--> Node [verify -> filter -> re-encode] --> CSMS
//!    ^                                      |
//!    +------------ signed rejection --------+
//! ```

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::{json, Value};

    use nn_01_signature_policy::{
        KeyMaterial, SignableMessage, SignatureAction, SignaturePolicy, SigningCurve,
        SigningIdentity, VerificationAction, VerificationStatus,
    };
    use nn_02_forwarding::{
        CallbackError, CancellationToken, FilteredObserver, ForwardingConfig, ForwardingDecision,
        ForwardingOperation, ForwardingPipeline, ForwardingResult, InboundRequest,
        OperationDecision, RequestContext, RequestFilter,
    };
    use node_runtime::{JsonMessage, JsonMessageOperation};
    use shared_types::{ConnectionInfo, NetworkPath, RequestId, ResultCode};

    const REQUEST_CONTEXT: &str = "BootNotificationRequest";
    const RESPONSE_CONTEXT: &str = "BootNotificationResponse";

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    fn operation() -> JsonMessageOperation {
        JsonMessageOperation::new("BootNotification")
    }

    fn boot_notification() -> Value {
        json!({
            "reason": "PowerUp",
            "chargingStation": {"model": "SingleSocketCharger", "vendorName": "VendorX"}
        })
    }

    /// The station signs `payload` with `key` and returns the wire JSON.
    fn station_signs(key: &KeyMaterial, context: &str, payload: &Value) -> Value {
        let policy = SignaturePolicy::accept_all();
        let mut message = JsonMessage::from_json(context, payload).unwrap();
        let document = message.to_json().unwrap();
        let added = policy
            .sign_request(&mut message, &document, &[SigningIdentity::new(key.clone())])
            .unwrap();
        assert_eq!(added, 1);
        message.to_json().unwrap()
    }

    fn verify_all(context: &str, payload: &Value) -> (bool, Vec<VerificationStatus>) {
        let policy =
            SignaturePolicy::new(SignatureAction::Skip, VerificationAction::VerifyAll, None).unwrap();
        let mut message = JsonMessage::from_json(context, payload).unwrap();
        let passed = policy.verify_message(&mut message, payload).is_ok();
        let statuses = message.signatures().iter().map(|s| s.status).collect();
        (passed, statuses)
    }

    fn inbound(payload: Value) -> InboundRequest {
        let context = RequestContext::new(
            RequestId::new("boot-1"),
            "csms".into(),
            NetworkPath::from_hops(vec!["cs-1".into()]),
            ConnectionInfo::new("ws-1").with_remote_node("cs-1".into()),
        );
        InboundRequest::new(context, payload)
    }

    fn node_policy(node_key: &KeyMaterial) -> SignaturePolicy {
        SignaturePolicy::new(
            SignatureAction::Sign,
            VerificationAction::VerifyAll,
            Some(SigningIdentity::new(node_key.clone()).with_name(|_| "nn-1".to_string())),
        )
        .unwrap()
    }

    /// Rejects requests whose signatures did not all verify.
    struct RequireValidSignatures;

    #[async_trait]
    impl RequestFilter<JsonMessageOperation> for RequireValidSignatures {
        async fn filter(
            &self,
            _context: &RequestContext,
            request: &JsonMessage,
            _cancel: CancellationToken,
        ) -> Result<Option<OperationDecision<JsonMessageOperation>>, CallbackError> {
            if request.signatures.all_valid() {
                return Ok(None);
            }
            let response = operation().reject_response(
                Some(request),
                ResultCode::SecurityError,
                "signature check failed",
            );
            Ok(Some(ForwardingDecision::reject(Some(request.clone()), response)))
        }
    }

    /// Forwards a copy of the request, station signature included, with the
    /// firmware version filled in.
    struct AddFirmwareVersion;

    #[async_trait]
    impl RequestFilter<JsonMessageOperation> for AddFirmwareVersion {
        async fn filter(
            &self,
            _context: &RequestContext,
            request: &JsonMessage,
            _cancel: CancellationToken,
        ) -> Result<Option<OperationDecision<JsonMessageOperation>>, CallbackError> {
            let mut replacement = request.clone();
            if let Some(Value::Object(station)) = replacement.body.get_mut("chargingStation") {
                station.insert("firmwareVersion".to_string(), json!("1.0.0"));
            }
            Ok(Some(ForwardingDecision::forward_replacement(request.clone(), replacement)))
        }
    }

    #[derive(Default)]
    struct DecisionLog {
        results: Mutex<Vec<ForwardingResult>>,
    }

    #[async_trait]
    impl FilteredObserver<JsonMessageOperation> for DecisionLog {
        async fn on_filtered(
            &self,
            _context: &RequestContext,
            _request: Option<&JsonMessage>,
            decision: &OperationDecision<JsonMessageOperation>,
        ) -> Result<(), CallbackError> {
            self.results.lock().push(decision.result);
            Ok(())
        }
    }

    // =============================================================================
    // SIGNATURE ROUND TRIP
    // =============================================================================

    #[test]
    fn test_signed_document_verifies_until_tampered() {
        let key = KeyMaterial::generate(SigningCurve::Secp256r1).unwrap();
        let signed = station_signs(&key, "ctx/a", &json!({"@context": "ctx/a", "value": 1}));

        assert_eq!(signed["signatures"][0]["algorithm"], json!("secp256r1"));
        assert_eq!(
            verify_all("ctx/a", &signed),
            (true, vec![VerificationStatus::ValidSignature])
        );

        let mut tampered = signed;
        tampered["value"] = json!(2);
        assert_eq!(
            verify_all("ctx/a", &tampered),
            (false, vec![VerificationStatus::InvalidSignature])
        );
    }

    // =============================================================================
    // NODE FLOWS
    // =============================================================================

    #[tokio::test]
    async fn test_valid_station_signature_is_forwarded_unchanged() {
        let station_key = KeyMaterial::generate(SigningCurve::Secp384r1).unwrap();
        let node_key = KeyMaterial::generate(SigningCurve::Secp256r1).unwrap();
        let pipeline = ForwardingPipeline::new(operation(), ForwardingConfig::forward_by_default())
            .with_policy(Arc::new(node_policy(&node_key)));
        pipeline.add_filter("require-valid-signatures", Arc::new(RequireValidSignatures));

        let signed = station_signs(&station_key, REQUEST_CONTEXT, &boot_notification());
        let decision = pipeline.process(inbound(signed), CancellationToken::new()).await;

        assert_eq!(decision.result, ForwardingResult::Forward);
        assert!(decision.new_request_payload.is_none());
        let request = decision.request.unwrap();
        assert!(request.signatures.all_valid());
        assert_eq!(request.context(), REQUEST_CONTEXT);
    }

    #[tokio::test]
    async fn test_tampered_request_gets_rejection_signed_by_node() {
        let station_key = KeyMaterial::generate(SigningCurve::Secp256r1).unwrap();
        let node_key = KeyMaterial::generate(SigningCurve::Secp521r1).unwrap();
        let pipeline = ForwardingPipeline::new(operation(), ForwardingConfig::forward_by_default())
            .with_policy(Arc::new(node_policy(&node_key)));
        pipeline.add_filter("require-valid-signatures", Arc::new(RequireValidSignatures));

        let mut tampered = station_signs(&station_key, REQUEST_CONTEXT, &boot_notification());
        tampered["reason"] = json!("Triggered");
        let decision = pipeline.process(inbound(tampered), CancellationToken::new()).await;

        assert_eq!(decision.result, ForwardingResult::Reject);
        let payload = decision.reject_payload.unwrap();
        assert_eq!(payload["status"], json!("Rejected"));
        assert_eq!(payload["statusInfo"]["reasonCode"], json!("SecurityError"));
        assert_eq!(payload["signatures"][0]["name"], json!("nn-1"));
        assert_eq!(payload["signatures"][0]["algorithm"], json!("secp521r1"));

        // The station can check the node's answer.
        assert_eq!(
            verify_all(RESPONSE_CONTEXT, &payload),
            (true, vec![VerificationStatus::ValidSignature])
        );
    }

    #[tokio::test]
    async fn test_replacement_is_signed_by_signing_rule() {
        let station_key = KeyMaterial::generate(SigningCurve::Secp256r1).unwrap();
        let rule_key = KeyMaterial::generate(SigningCurve::Secp384r1).unwrap();
        let mut policy = SignaturePolicy::accept_all();
        policy.add_signing_rule(REQUEST_CONTEXT, SigningIdentity::new(rule_key.clone()), None);

        let pipeline = ForwardingPipeline::new(operation(), ForwardingConfig::reject_by_default())
            .with_policy(Arc::new(policy));
        pipeline.add_filter("firmware", Arc::new(AddFirmwareVersion));

        let signed = station_signs(&station_key, REQUEST_CONTEXT, &boot_notification());
        let decision = pipeline.process(inbound(signed), CancellationToken::new()).await;

        assert_eq!(decision.result, ForwardingResult::Forward);
        let payload = decision.new_request_payload.unwrap();
        assert_eq!(payload["chargingStation"]["firmwareVersion"], json!("1.0.0"));
        assert_eq!(payload["signatures"].as_array().map(Vec::len), Some(1));
        assert_eq!(payload["signatures"][0]["keyId"], json!(rule_key.key_id_base64()));
        assert_eq!(
            verify_all(REQUEST_CONTEXT, &payload),
            (true, vec![VerificationStatus::ValidSignature])
        );
    }

    #[tokio::test]
    async fn test_unsigned_request_follows_verification_rules() {
        let mut policy =
            SignaturePolicy::new(SignatureAction::Skip, VerificationAction::Reject, None).unwrap();
        let strict = ForwardingPipeline::new(operation(), ForwardingConfig::forward_by_default())
            .with_policy(Arc::new(policy.clone()));

        let decision = strict
            .process(inbound(boot_notification()), CancellationToken::new())
            .await;
        assert_eq!(decision.result, ForwardingResult::Reject);
        assert_eq!(
            decision.reject_payload.unwrap()["statusInfo"]["reasonCode"],
            json!("SecurityError")
        );

        policy.add_verification_rule(REQUEST_CONTEXT, VerificationAction::AcceptUnverified, Some(1));
        let relaxed = ForwardingPipeline::new(operation(), ForwardingConfig::forward_by_default())
            .with_policy(Arc::new(policy));
        let decision = relaxed
            .process(inbound(boot_notification()), CancellationToken::new())
            .await;
        assert_eq!(decision.result, ForwardingResult::Forward);
    }

    #[tokio::test]
    async fn test_drop_rule_discards_silently() {
        let mut policy = SignaturePolicy::accept_all();
        policy.add_verification_rule(REQUEST_CONTEXT, VerificationAction::Drop, None);
        let pipeline = ForwardingPipeline::new(operation(), ForwardingConfig::forward_by_default())
            .with_policy(Arc::new(policy));
        let log = Arc::new(DecisionLog::default());
        pipeline.on_filtered("log", log.clone());

        let decision = pipeline
            .process(inbound(boot_notification()), CancellationToken::new())
            .await;

        assert_eq!(decision.result, ForwardingResult::Drop);
        assert!(decision.reject_payload.is_none());
        assert!(decision.sent_callback.is_none());
        assert_eq!(*log.results.lock(), vec![ForwardingResult::Drop]);
    }
}
