//! # Connection Metadata
//!
//! What the transport layer tells the core about where a message came from,
//! and what it reports back once a message has been handed to the wire.

use crate::identifiers::NetworkingNodeId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Descriptor of the transport connection a message arrived on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    /// Transport-assigned connection identifier.
    pub connection_id: String,
    /// The authenticated peer on the other end, if known.
    pub remote_node: Option<NetworkingNodeId>,
    /// Remote socket address, for logging only.
    pub remote_address: Option<String>,
}

impl ConnectionInfo {
    pub fn new(connection_id: impl Into<String>) -> Self {
        Self {
            connection_id: connection_id.into(),
            remote_node: None,
            remote_address: None,
        }
    }

    #[must_use]
    pub fn with_remote_node(mut self, node: NetworkingNodeId) -> Self {
        self.remote_node = Some(node);
        self
    }

    #[must_use]
    pub fn with_remote_address(mut self, address: impl Into<String>) -> Self {
        self.remote_address = Some(address.into());
        self
    }
}

/// Transmission outcome reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SendStatus {
    /// Bytes confirmed written to the connection.
    Success,
    /// No connection to the destination existed.
    Offline,
    /// The write failed.
    Failed,
}

/// Result of handing one message to the transport layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendResult {
    pub status: SendStatus,
    /// When the transport finished the attempt.
    pub timestamp: DateTime<Utc>,
    pub error: Option<String>,
}

impl SendResult {
    #[must_use]
    pub fn success() -> Self {
        Self {
            status: SendStatus::Success,
            timestamp: Utc::now(),
            error: None,
        }
    }

    #[must_use]
    pub fn offline() -> Self {
        Self {
            status: SendStatus::Offline,
            timestamp: Utc::now(),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: SendStatus::Failed,
            timestamp: Utc::now(),
            error: Some(error.into()),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == SendStatus::Success
    }
}
