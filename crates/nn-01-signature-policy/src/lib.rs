//! # Signature Policy Engine (NN-01)
//!
//! Decides, per message context, whether and with which key material an OCPP
//! message is signed before it leaves the node, and how the signatures of an
//! inbound message are verified.
//!
//! ## Architecture
//!
//! - **Domain Layer** (`domain/`): key material, signature records, policy
//!   entries, canonical JSON and the raw ECDSA primitives. No I/O.
//! - **Service Layer** (`service.rs`): the `SignaturePolicy` aggregate exposing
//!   sign/verify for requests and responses.
//!
//! ## Canonical Form
//!
//! Messages are hashed over their JSON document with `signatures` removed,
//! `@context` present as the first property and every other object key in
//! sorted order. secp256r1 uses SHA-256, secp384r1 and secp521r1 use SHA-512;
//! the digest is signed as a prehash.
//!
//! ## Concurrency
//!
//! Rules are added through `&mut self` during node configuration. Once the
//! policy is shared (`Arc<SignaturePolicy>`) it is read-only, so sign and
//! verify never take locks.

pub mod domain;
pub mod service;

// Re-export public API
pub use domain::canonical::{canonicalize, with_context, CONTEXT_PROPERTY, SIGNATURES_PROPERTY};
pub use domain::entities::{Signature, SignatureSet, VerificationStatus};
pub use domain::errors::SignaturePolicyError;
pub use domain::keys::{KeyMaterial, SigningCurve, SigningIdentity};
pub use domain::message::SignableMessage;
pub use domain::rules::{
    SignatureAction, SigningRule, VerificationAction, VerificationRule, DEFAULT_CONTEXT,
};
pub use service::SignaturePolicy;
