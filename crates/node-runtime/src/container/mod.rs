//! # Node Container
//!
//! Builds the node from its configuration: one shared signature policy, one
//! forwarding pipeline per configured action, and the dispatcher routing
//! inbound requests to them.

pub mod config;
pub mod pipelines;

pub use config::{
    ConfigError, ForwardingSettings, KeyConfig, NodeConfig, OperationConfig, SignatureSettings,
    SigningRuleConfig, VerificationRuleConfig,
};
pub use pipelines::{JsonPipeline, NodeContainer};
