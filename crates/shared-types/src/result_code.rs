//! # Result Codes
//!
//! Machine-readable codes carried by every response the node synthesizes
//! instead of forwarding a request.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Reason code of a locally synthesized rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResultCode {
    /// A request filter or the node default policy refused to forward.
    Filtered,
    /// The request could not be decoded into the operation's typed request.
    FormationViolation,
    /// The signature policy demanded rejection.
    SecurityError,
    /// No handler is registered for the action.
    NotImplemented,
    /// An unexpected local failure.
    InternalError,
}

impl ResultCode {
    /// Wire name of the code.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultCode::Filtered => "Filtered",
            ResultCode::FormationViolation => "FormationViolation",
            ResultCode::SecurityError => "SecurityError",
            ResultCode::NotImplemented => "NotImplemented",
            ResultCode::InternalError => "InternalError",
        }
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names_match_serde() {
        for code in [
            ResultCode::Filtered,
            ResultCode::FormationViolation,
            ResultCode::SecurityError,
            ResultCode::NotImplemented,
            ResultCode::InternalError,
        ] {
            let json = serde_json::to_value(code).unwrap();
            assert_eq!(json.as_str(), Some(code.as_str()));
        }
    }
}
