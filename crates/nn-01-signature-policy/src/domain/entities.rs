//! # Domain Entities
//!
//! Signature records attached to OCPP messages and the set that holds them.

use super::keys::SigningCurve;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::{base64::Base64, serde_as};
use shared_types::time::iso8601_millis_opt;

// =============================================================================
// VERIFICATION STATUS
// =============================================================================

/// Outcome of the last verification pass over a signature.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum VerificationStatus {
    /// No verification pass has run, or the policy accepts unverified messages.
    #[default]
    Unverified,
    ValidSignature,
    InvalidSignature,
    /// The policy says to discard the message silently.
    DropMessage,
    /// The policy says to reject the message.
    RejectMessage,
}

// =============================================================================
// SIGNATURE
// =============================================================================

/// One signature attached to a message.
///
/// Serialized as `{"keyId", "value", "algorithm", "encoding"?, "name"?,
/// "description"?, "timestamp"?}`; the verification status is local state
/// and never leaves the node.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signature {
    /// DER-encoded public key of the signer.
    #[serde_as(as = "Base64")]
    pub key_id: Vec<u8>,
    /// ECDSA signature, `r || s`.
    #[serde_as(as = "Base64")]
    pub value: Vec<u8>,
    pub algorithm: SigningCurve,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    #[serde(rename = "name", default, skip_serializing_if = "Option::is_none")]
    pub signer_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(
        default,
        with = "iso8601_millis_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub status: VerificationStatus,
}

impl Signature {
    pub fn new(key_id: Vec<u8>, value: Vec<u8>, algorithm: SigningCurve) -> Self {
        Self {
            key_id,
            value,
            algorithm,
            encoding: None,
            signer_name: None,
            description: None,
            timestamp: None,
            status: VerificationStatus::Unverified,
        }
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.status == VerificationStatus::ValidSignature
    }
}

// =============================================================================
// SIGNATURE SET
// =============================================================================

/// The signatures of one message: insertion-ordered, unique by value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Signature>", into = "Vec<Signature>")]
pub struct SignatureSet {
    signatures: Vec<Signature>,
}

impl SignatureSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a signature. Returns `false` if one with the same value is already present.
    pub fn insert(&mut self, signature: Signature) -> bool {
        if self.signatures.iter().any(|s| s.value == signature.value) {
            return false;
        }
        self.signatures.push(signature);
        true
    }

    #[must_use]
    pub fn contains_value(&self, value: &[u8]) -> bool {
        self.signatures.iter().any(|s| s.value == value)
    }

    /// Keep only the signatures for which `keep` returns `true`.
    pub fn retain(&mut self, keep: impl FnMut(&Signature) -> bool) {
        self.signatures.retain(keep);
    }

    pub fn mark_all(&mut self, status: VerificationStatus) {
        for signature in &mut self.signatures {
            signature.status = status;
        }
    }

    /// True when the set is non-empty and every signature verified.
    #[must_use]
    pub fn all_valid(&self) -> bool {
        !self.signatures.is_empty() && self.signatures.iter().all(Signature::is_valid)
    }

    #[must_use]
    pub fn any_valid(&self) -> bool {
        self.signatures.iter().any(Signature::is_valid)
    }

    #[must_use]
    pub fn contains_status(&self, status: VerificationStatus) -> bool {
        self.signatures.iter().any(|s| s.status == status)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Signature> {
        self.signatures.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Signature> {
        self.signatures.iter_mut()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }
}

impl From<Vec<Signature>> for SignatureSet {
    fn from(signatures: Vec<Signature>) -> Self {
        let mut set = Self::new();
        for signature in signatures {
            set.insert(signature);
        }
        set
    }
}

impl From<SignatureSet> for Vec<Signature> {
    fn from(set: SignatureSet) -> Self {
        set.signatures
    }
}

impl<'a> IntoIterator for &'a SignatureSet {
    type Item = &'a Signature;
    type IntoIter = std::slice::Iter<'a, Signature>;

    fn into_iter(self) -> Self::IntoIter {
        self.signatures.iter()
    }
}
