//! # Identifiers
//!
//! Names for the participants of the OCPP overlay network and for the
//! messages travelling through it.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of an OCPP participant (charging station, networking node, CSMS).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetworkingNodeId(String);

impl NetworkingNodeId {
    /// Create a node identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the identifier is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for NetworkingNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NetworkingNodeId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// OCPP message id correlating a request with its response.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Create a request id from an existing value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Create a fresh random request id.
    #[must_use]
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Correlates every log line and observer callback of one inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventTrackingId(Uuid);

impl EventTrackingId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventTrackingId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventTrackingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The overlay hops a message has traversed, oldest hop first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetworkPath(Vec<NetworkingNodeId>);

impl NetworkPath {
    /// An empty path (message originated at the previous hop's peer).
    #[must_use]
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Build a path from hops, oldest first.
    #[must_use]
    pub fn from_hops(hops: Vec<NetworkingNodeId>) -> Self {
        Self(hops)
    }

    #[must_use]
    pub fn hops(&self) -> &[NetworkingNodeId] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The originator of the message.
    #[must_use]
    pub fn source(&self) -> Option<&NetworkingNodeId> {
        self.0.first()
    }

    /// The most recent hop, i.e. the node that handed the message to us.
    #[must_use]
    pub fn last_hop(&self) -> Option<&NetworkingNodeId> {
        self.0.last()
    }

    /// A new path with `node` appended as the latest hop.
    #[must_use]
    pub fn append(&self, node: NetworkingNodeId) -> Self {
        let mut hops = self.0.clone();
        hops.push(node);
        Self(hops)
    }

    /// Whether `node` already appears on the path (loop detection).
    #[must_use]
    pub fn contains(&self, node: &NetworkingNodeId) -> bool {
        self.0.contains(node)
    }
}

impl fmt::Display for NetworkPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hops: Vec<&str> = self.0.iter().map(NetworkingNodeId::as_str).collect();
        write!(f, "[{}]", hops.join(" -> "))
    }
}
