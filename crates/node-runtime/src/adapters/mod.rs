//! # Adapter Implementations
//!
//! Concrete implementations of the forwarding crate's outbound ports.
//!
//! - `json_message`: the pass-through `ForwardingOperation` used for every
//!   configured OCPP action

pub mod json_message;

pub use json_message::{JsonMessage, JsonMessageOperation};
