//! # Signature Policy Errors
//!
//! Every failure of a signing or verification pass is reported as one of these
//! named errors. None of them is ever raised past the operation boundary.

use thiserror::Error;

/// Errors produced by key handling, policy construction, signing and verification.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SignaturePolicyError {
    /// Default action `Sign` was configured without a default signing identity.
    #[error("Default signature action is Sign but no default signing identity is configured")]
    MissingDefaultSigningIdentity,

    /// A curve name that is not secp256r1, secp384r1 or secp521r1.
    #[error("Unknown signing curve: {0}")]
    UnknownCurve(String),

    /// Stored key bytes could not be decoded into a scalar or point.
    #[error("Invalid key material: {0}")]
    InvalidKeyMaterial(String),

    /// The private scalar does not generate the stored public point.
    #[error("Private key does not belong to the public key")]
    KeyMismatch,

    /// A candidate signing identity only holds a public key.
    #[error("Signing identity {key_id} has no private key")]
    MissingPrivateKey { key_id: String },

    /// The document handed in for canonicalization is not a JSON object.
    #[error("Message document is not a JSON object")]
    NotAnObject,

    /// The document could not be serialized to its canonical form.
    #[error("Canonicalization failed: {0}")]
    Canonicalization(String),

    /// The ECDSA primitive rejected the digest or key.
    #[error("Signing failed: {0}")]
    SigningFailed(String),

    /// A signature's key id is not a DER-encoded public key on its declared curve.
    #[error("Invalid key id: {0}")]
    InvalidKeyId(String),

    /// The message carries no signatures and the policy does not accept unverified messages.
    #[error("No signatures on message with context {context}")]
    NoSignatures { context: String },

    /// `VerifyAny` found no signature that validates.
    #[error("None of the {total} signatures is valid")]
    NoValidSignature { total: usize },

    /// `VerifyAll` found at least one invalid signature.
    #[error("{invalid} of {total} signatures are invalid")]
    InvalidSignatures { invalid: usize, total: usize },
}
