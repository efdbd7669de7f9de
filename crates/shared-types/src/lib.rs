//! # Shared Types Crate
//!
//! Vocabulary shared by every crate of the networking node.
//!
//! ## Contents
//!
//! - **identifiers**: `NetworkingNodeId`, `RequestId`, `EventTrackingId`, `NetworkPath`
//! - **connection**: the inbound connection descriptor and transport `SendResult`
//! - **result_code**: machine-readable codes carried by synthesized rejections
//! - **time**: the ISO-8601 millisecond timestamp format used on the wire

pub mod connection;
pub mod identifiers;
pub mod result_code;
pub mod time;

pub use connection::{ConnectionInfo, SendResult, SendStatus};
pub use identifiers::{EventTrackingId, NetworkPath, NetworkingNodeId, RequestId};
pub use result_code::ResultCode;
