//! # Inbound Requests
//!
//! A raw JSON request together with the routing metadata the transport
//! attaches to it.

use chrono::{DateTime, Utc};
use serde_json::Value;
use shared_types::{ConnectionInfo, EventTrackingId, NetworkPath, NetworkingNodeId, RequestId};
use std::time::Duration;

/// Routing metadata of one inbound request, handed to every observer and filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    /// When the request was received.
    pub timestamp: DateTime<Utc>,
    pub event_tracking_id: EventTrackingId,
    pub request_id: RequestId,
    /// Final destination of the request in the overlay network.
    pub destination: NetworkingNodeId,
    pub network_path: NetworkPath,
    pub connection: ConnectionInfo,
    /// How long the originator waits for a response.
    pub timeout: Option<Duration>,
}

impl RequestContext {
    pub fn new(
        request_id: RequestId,
        destination: NetworkingNodeId,
        network_path: NetworkPath,
        connection: ConnectionInfo,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            event_tracking_id: EventTrackingId::new(),
            request_id,
            destination,
            network_path,
            connection,
            timeout: None,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Originator of the request: the first hop of the path, else the peer of the connection.
    #[must_use]
    pub fn sender(&self) -> Option<&NetworkingNodeId> {
        self.network_path
            .source()
            .or(self.connection.remote_node.as_ref())
    }
}

/// One raw request awaiting a forwarding decision.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundRequest {
    pub context: RequestContext,
    pub json: Value,
}

impl InboundRequest {
    pub fn new(context: RequestContext, json: Value) -> Self {
        Self { context, json }
    }
}
