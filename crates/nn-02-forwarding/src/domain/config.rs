//! # Forwarding Configuration
//!
//! Node-wide defaults applied by every pipeline.

use super::decision::{ForwardingResult, DEFAULT_LOG_MESSAGE};
use super::errors::ForwardingError;
use std::time::Duration;

/// Default filter timeout.
pub const DEFAULT_FILTER_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardingConfig {
    /// Outcome when no filter decides. `Forward` or `Reject`.
    pub default_result: ForwardingResult,
    /// Log message and description of synthesized "filtered" rejections.
    pub default_log_message: String,
    /// Upper bound on a single filter invocation; `None` waits indefinitely.
    pub filter_timeout: Option<Duration>,
}

impl Default for ForwardingConfig {
    fn default() -> Self {
        Self {
            default_result: ForwardingResult::Forward,
            default_log_message: DEFAULT_LOG_MESSAGE.to_string(),
            filter_timeout: Some(DEFAULT_FILTER_TIMEOUT),
        }
    }
}

impl ForwardingConfig {
    #[must_use]
    pub fn forward_by_default() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn reject_by_default() -> Self {
        Self {
            default_result: ForwardingResult::Reject,
            ..Self::default()
        }
    }

    /// `Drop` is reserved for the signature policy and cannot be a default.
    pub fn validate(&self) -> Result<(), ForwardingError> {
        if self.default_result == ForwardingResult::Drop {
            return Err(ForwardingError::InvalidConfig(
                "default forwarding result must be FORWARD or REJECT".to_string(),
            ));
        }
        if self.filter_timeout == Some(Duration::ZERO) {
            return Err(ForwardingError::InvalidConfig(
                "filter timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drop_default_is_invalid() {
        let config = ForwardingConfig {
            default_result: ForwardingResult::Drop,
            ..ForwardingConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(ForwardingConfig::reject_by_default().validate().is_ok());
    }
}
