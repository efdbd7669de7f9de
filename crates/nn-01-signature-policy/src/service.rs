//! # Signature Policy Service
//!
//! The `SignaturePolicy` aggregate: signing and verification rules plus the
//! defaults applied when no rule matches a message context.
//!
//! ## Signing candidates
//!
//! Identities are collected in this order:
//!
//! 1. identities passed by the caller
//! 2. the message's own sign keys, then its sign infos
//! 3. only if 1 and 2 are empty: every `Sign` rule for the context
//! 4. only if still empty and the default action is `Sign`: the default identity
//!
//! All candidates are checked for a private key before anything is signed.

use crate::domain::canonical::{canonicalize, with_context};
use crate::domain::ecdsa;
use crate::domain::entities::{Signature, VerificationStatus};
use crate::domain::errors::SignaturePolicyError;
use crate::domain::keys::SigningIdentity;
use crate::domain::message::SignableMessage;
use crate::domain::rules::{
    SignatureAction, SigningRule, VerificationAction, VerificationRule,
};
use serde_json::Value;
use tracing::{debug, warn};

/// Signing and verification policy of a networking node.
#[derive(Debug, Clone)]
pub struct SignaturePolicy {
    signing_rules: Vec<SigningRule>,
    verification_rules: Vec<VerificationRule>,
    default_signature_action: SignatureAction,
    default_verification_action: VerificationAction,
    default_signing_identity: Option<SigningIdentity>,
}

impl SignaturePolicy {
    /// Create a policy.
    ///
    /// # Errors
    ///
    /// `MissingDefaultSigningIdentity` when the default action is `Sign` and
    /// no default identity is given.
    pub fn new(
        default_signature_action: SignatureAction,
        default_verification_action: VerificationAction,
        default_signing_identity: Option<SigningIdentity>,
    ) -> Result<Self, SignaturePolicyError> {
        if default_signature_action == SignatureAction::Sign && default_signing_identity.is_none()
        {
            return Err(SignaturePolicyError::MissingDefaultSigningIdentity);
        }

        Ok(Self {
            signing_rules: Vec::new(),
            verification_rules: Vec::new(),
            default_signature_action,
            default_verification_action,
            default_signing_identity,
        })
    }

    /// Never signs, accepts everything unverified.
    #[must_use]
    pub fn accept_all() -> Self {
        Self {
            signing_rules: Vec::new(),
            verification_rules: Vec::new(),
            default_signature_action: SignatureAction::Skip,
            default_verification_action: VerificationAction::AcceptUnverified,
            default_signing_identity: None,
        }
    }

    #[must_use]
    pub fn default_signature_action(&self) -> SignatureAction {
        self.default_signature_action
    }

    #[must_use]
    pub fn default_verification_action(&self) -> VerificationAction {
        self.default_verification_action
    }

    #[must_use]
    pub fn default_signing_identity(&self) -> Option<&SigningIdentity> {
        self.default_signing_identity.as_ref()
    }

    // =========================================================================
    // RULE CONFIGURATION
    // =========================================================================

    /// Sign messages of `context` with `identity`. Returns the assigned priority.
    pub fn add_signing_rule(
        &mut self,
        context: impl Into<String>,
        identity: SigningIdentity,
        priority: Option<u32>,
    ) -> u32 {
        self.add_signing_rule_with_action(context, SignatureAction::Sign, identity, priority)
    }

    /// Add a signing rule with an explicit action. Returns the assigned priority.
    ///
    /// Without a priority, the highest existing priority + 1 is used.
    pub fn add_signing_rule_with_action(
        &mut self,
        context: impl Into<String>,
        action: SignatureAction,
        identity: SigningIdentity,
        priority: Option<u32>,
    ) -> u32 {
        let priority = priority.unwrap_or_else(|| {
            next_priority(self.signing_rules.iter().map(|rule| rule.priority))
        });
        let context = context.into();
        debug!(context = %context, priority, key_id = %identity.key().key_id_base64(), "Signing rule added");

        self.signing_rules.push(SigningRule {
            priority,
            context,
            action,
            identity,
        });
        priority
    }

    /// Apply `action` to incoming messages of `context`. Returns the assigned priority.
    pub fn add_verification_rule(
        &mut self,
        context: impl Into<String>,
        action: VerificationAction,
        priority: Option<u32>,
    ) -> u32 {
        let priority = priority.unwrap_or_else(|| {
            next_priority(self.verification_rules.iter().map(|rule| rule.priority))
        });
        let context = context.into();
        debug!(context = %context, priority, action = %action, "Verification rule added");

        self.verification_rules.push(VerificationRule {
            priority,
            context,
            action,
        });
        priority
    }

    /// Signing rules for `context`, lowest priority first.
    #[must_use]
    pub fn signing_rules(&self, context: &str) -> Vec<&SigningRule> {
        let mut rules: Vec<&SigningRule> = self
            .signing_rules
            .iter()
            .filter(|rule| rule.context == context)
            .collect();
        rules.sort_by_key(|rule| rule.priority);
        rules
    }

    /// Verification rules for `context`, lowest priority first.
    #[must_use]
    pub fn verification_rules(&self, context: &str) -> Vec<&VerificationRule> {
        let mut rules: Vec<&VerificationRule> = self
            .verification_rules
            .iter()
            .filter(|rule| rule.context == context)
            .collect();
        rules.sort_by_key(|rule| rule.priority);
        rules
    }

    #[must_use]
    pub fn has_signing_rule(&self, context: &str) -> bool {
        self.signing_rules.iter().any(|rule| rule.context == context)
    }

    /// The verification rule in force for `context`: the one with the highest
    /// priority, else a synthetic rule carrying the default action.
    #[must_use]
    pub fn get_highest_verification_policy(&self, context: &str) -> VerificationRule {
        self.verification_rules
            .iter()
            .filter(|rule| rule.context == context)
            .max_by_key(|rule| rule.priority)
            .cloned()
            .unwrap_or_else(|| VerificationRule::default_for(self.default_verification_action))
    }

    // =========================================================================
    // SIGNING
    // =========================================================================

    /// Sign `message` over `document`. Returns the number of signatures added.
    ///
    /// Signing nothing is not an error: with no candidate identity and a
    /// `Skip` default, the message is left untouched.
    pub fn sign_message<M>(
        &self,
        message: &mut M,
        document: &Value,
        identities: &[SigningIdentity],
    ) -> Result<usize, SignaturePolicyError>
    where
        M: SignableMessage + ?Sized,
    {
        let context = message.context().to_string();
        let document = with_context(document, &context)?;
        let candidates = self.signing_candidates(message, &context, identities);

        if candidates.is_empty() {
            debug!(context = %context, "No signing identity applies, message left unsigned");
            return Ok(0);
        }

        if let Some(missing) = candidates.iter().find(|id| !id.key().has_private_key()) {
            return Err(SignaturePolicyError::MissingPrivateKey {
                key_id: missing.key().key_id_base64(),
            });
        }

        let canonical = canonicalize(&document)?;
        let mut added = 0;
        for identity in &candidates {
            let key = identity.key();
            let curve = key.curve();
            let value = key.sign_prehash(&ecdsa::digest(curve, &canonical))?;

            let mut signature = Signature::new(key.key_id().to_vec(), value, curve);
            signature.signer_name = identity.name_for(&document);
            signature.description = identity.description_for(&document);
            signature.timestamp = identity.timestamp_for(&document);

            if message.signatures_mut().insert(signature) {
                added += 1;
            }
        }

        debug!(context = %context, signatures = added, "Message signed");
        Ok(added)
    }

    fn signing_candidates<M>(
        &self,
        message: &M,
        context: &str,
        identities: &[SigningIdentity],
    ) -> Vec<SigningIdentity>
    where
        M: SignableMessage + ?Sized,
    {
        let mut candidates: Vec<SigningIdentity> = identities.to_vec();
        candidates.extend(message.sign_keys().iter().cloned().map(SigningIdentity::from));
        candidates.extend(message.sign_infos().iter().cloned());

        if candidates.is_empty() {
            candidates.extend(
                self.signing_rules(context)
                    .into_iter()
                    .filter(|rule| rule.action == SignatureAction::Sign)
                    .map(|rule| rule.identity.clone()),
            );
        }

        if candidates.is_empty() && self.default_signature_action == SignatureAction::Sign {
            candidates.extend(self.default_signing_identity.iter().cloned());
        }

        candidates
    }

    pub fn sign_request<M>(
        &self,
        request: &mut M,
        document: &Value,
        identities: &[SigningIdentity],
    ) -> Result<usize, SignaturePolicyError>
    where
        M: SignableMessage + ?Sized,
    {
        self.sign_message(request, document, identities)
    }

    pub fn sign_response<M>(
        &self,
        response: &mut M,
        document: &Value,
        identities: &[SigningIdentity],
    ) -> Result<usize, SignaturePolicyError>
    where
        M: SignableMessage + ?Sized,
    {
        self.sign_message(response, document, identities)
    }

    // =========================================================================
    // VERIFICATION
    // =========================================================================

    /// Verify the signatures of `message` against `document`.
    ///
    /// Every signature's status reflects the outcome afterwards. `Drop` and
    /// `Reject` succeed; the caller honors them through the statuses.
    pub fn verify_message<M>(
        &self,
        message: &mut M,
        document: &Value,
    ) -> Result<(), SignaturePolicyError>
    where
        M: SignableMessage + ?Sized,
    {
        let context = message.context().to_string();
        let rule = self.get_highest_verification_policy(&context);

        if message.signatures().is_empty() {
            if rule.action == VerificationAction::AcceptUnverified {
                return Ok(());
            }
            return Err(SignaturePolicyError::NoSignatures { context });
        }

        let document = with_context(document, &context)?;
        let canonical = canonicalize(&document)?;

        let signatures = message.signatures_mut();
        match rule.action {
            VerificationAction::AcceptUnverified => {
                signatures.mark_all(VerificationStatus::Unverified);
                Ok(())
            }
            VerificationAction::Drop => {
                signatures.mark_all(VerificationStatus::DropMessage);
                Ok(())
            }
            VerificationAction::Reject => {
                signatures.mark_all(VerificationStatus::RejectMessage);
                Ok(())
            }
            VerificationAction::VerifyAny => {
                let total = signatures.len();
                for signature in signatures.iter_mut() {
                    if check_signature(signature, &canonical, &context) {
                        return Ok(());
                    }
                }
                Err(SignaturePolicyError::NoValidSignature { total })
            }
            VerificationAction::VerifyAll => {
                let total = signatures.len();
                let invalid = signatures
                    .iter_mut()
                    .map(|signature| check_signature(signature, &canonical, &context))
                    .filter(|valid| !valid)
                    .count();
                if invalid == 0 {
                    Ok(())
                } else {
                    Err(SignaturePolicyError::InvalidSignatures { invalid, total })
                }
            }
        }
    }

    pub fn verify_request<M>(&self, request: &mut M, document: &Value) -> Result<(), SignaturePolicyError>
    where
        M: SignableMessage + ?Sized,
    {
        self.verify_message(request, document)
    }

    pub fn verify_response<M>(
        &self,
        response: &mut M,
        document: &Value,
    ) -> Result<(), SignaturePolicyError>
    where
        M: SignableMessage + ?Sized,
    {
        self.verify_message(response, document)
    }
}

/// Verify one signature and record the outcome in its status.
fn check_signature(signature: &mut Signature, canonical: &[u8], context: &str) -> bool {
    let curve = signature.algorithm;
    let prehash = ecdsa::digest(curve, canonical);
    let valid = match ecdsa::verify_prehash(curve, &signature.key_id, &prehash, &signature.value) {
        Ok(valid) => valid,
        Err(e) => {
            warn!(context = %context, error = %e, "Signature key id rejected");
            false
        }
    };

    signature.status = if valid {
        VerificationStatus::ValidSignature
    } else {
        VerificationStatus::InvalidSignature
    };
    valid
}

fn next_priority(existing: impl Iterator<Item = u32>) -> u32 {
    existing.max().map_or(0, |highest| highest.saturating_add(1))
}
