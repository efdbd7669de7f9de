//! Cross-crate integration flows.

pub mod node_flows;
pub mod signed_forwarding;
