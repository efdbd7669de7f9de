//! # Policy Entries
//!
//! Signing and verification rules, keyed by message context and ordered by
//! priority.

use super::keys::SigningIdentity;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Context of the synthetic verification rule used when no rule matches.
pub const DEFAULT_CONTEXT: &str = "default";

/// Whether outgoing messages get signed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignatureAction {
    Sign,
    Skip,
}

impl FromStr for SignatureAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sign" => Ok(SignatureAction::Sign),
            "skip" => Ok(SignatureAction::Skip),
            other => Err(format!("unknown signature action: {other}")),
        }
    }
}

/// What to do with the signatures of an incoming message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VerificationAction {
    AcceptUnverified,
    Drop,
    Reject,
    VerifyAny,
    VerifyAll,
}

impl fmt::Display for VerificationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VerificationAction::AcceptUnverified => "AcceptUnverified",
            VerificationAction::Drop => "Drop",
            VerificationAction::Reject => "Reject",
            VerificationAction::VerifyAny => "VerifyAny",
            VerificationAction::VerifyAll => "VerifyAll",
        };
        f.write_str(name)
    }
}

impl FromStr for VerificationAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "acceptunverified" => Ok(VerificationAction::AcceptUnverified),
            "drop" => Ok(VerificationAction::Drop),
            "reject" => Ok(VerificationAction::Reject),
            "verifyany" => Ok(VerificationAction::VerifyAny),
            "verifyall" => Ok(VerificationAction::VerifyAll),
            other => Err(format!("unknown verification action: {other}")),
        }
    }
}

/// Sign messages of `context` with `identity`.
#[derive(Debug, Clone)]
pub struct SigningRule {
    pub priority: u32,
    pub context: String,
    pub action: SignatureAction,
    pub identity: SigningIdentity,
}

/// Apply `action` to incoming messages of `context`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationRule {
    pub priority: u32,
    pub context: String,
    pub action: VerificationAction,
}

impl VerificationRule {
    /// The synthetic rule used when no rule exists for a context.
    #[must_use]
    pub fn default_for(action: VerificationAction) -> Self {
        Self {
            priority: 0,
            context: DEFAULT_CONTEXT.to_string(),
            action,
        }
    }
}
