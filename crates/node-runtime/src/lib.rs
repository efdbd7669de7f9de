//! # Node Runtime Library
//!
//! Exposes the building blocks of the `node-runtime` binary for embedding
//! and testing.
//!
//! - `container/`: node configuration and the container wiring the signature
//!   policy, the pipelines and the dispatcher
//! - `adapters/`: the JSON pass-through operation codec
//! - `runtime`: the newline-delimited JSON request loop

#![allow(clippy::module_name_repetitions)]

pub mod adapters;
pub mod container;
pub mod runtime;

pub use adapters::{JsonMessage, JsonMessageOperation};
pub use container::{ConfigError, NodeConfig, NodeContainer};
pub use runtime::{DecisionRecord, InboundEnvelope, NodeRuntime, RunSummary, RuntimeError};
