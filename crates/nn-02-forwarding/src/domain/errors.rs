//! # Forwarding Errors
//!
//! Codec, configuration and dispatch errors, plus the isolated failures of
//! observer and filter callbacks.

use nn_01_signature_policy::SignaturePolicyError;
use std::fmt;
use thiserror::Error;

/// Error type returned by observer and filter callbacks.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ForwardingError {
    /// The inbound JSON is not a valid request of the operation.
    #[error("Decode failed: {0}")]
    Decode(String),

    /// A typed message could not be turned back into JSON.
    #[error("Encode failed: {0}")]
    Encode(String),

    #[error("Signature policy: {0}")]
    Policy(#[from] SignaturePolicyError),

    #[error("No handler registered for action {0}")]
    UnknownAction(String),

    #[error("A handler is already registered for action {0}")]
    DuplicateAction(String),

    #[error("Invalid forwarding configuration: {0}")]
    InvalidConfig(String),
}

/// Extension point a callback is registered on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    Received,
    Filter,
    Filtered,
    Sent,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Received => "received",
            PipelineStage::Filter => "filter",
            PipelineStage::Filtered => "filtered",
            PipelineStage::Sent => "sent",
        };
        f.write_str(name)
    }
}

/// A callback failure, caught and reported instead of propagated.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ObserverError {
    #[error("{stage} callback '{name}' failed: {reason}")]
    Failed {
        stage: PipelineStage,
        name: String,
        reason: String,
    },

    #[error("{stage} callback '{name}' panicked: {reason}")]
    Panicked {
        stage: PipelineStage,
        name: String,
        reason: String,
    },

    #[error("filter '{name}' gave no decision within {timeout_ms} ms")]
    TimedOut { name: String, timeout_ms: u64 },
}

impl ObserverError {
    #[must_use]
    pub fn stage(&self) -> PipelineStage {
        match self {
            ObserverError::Failed { stage, .. } | ObserverError::Panicked { stage, .. } => *stage,
            ObserverError::TimedOut { .. } => PipelineStage::Filter,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            ObserverError::Failed { name, .. }
            | ObserverError::Panicked { name, .. }
            | ObserverError::TimedOut { name, .. } => name,
        }
    }
}
