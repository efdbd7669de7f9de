//! # Forwarding Decision Pipeline (NN-02)
//!
//! Decides, before any business logic runs, what a networking node does with
//! a request received on one connection: forward it unchanged, forward a
//! replacement, or answer it locally with a synthesized rejection.
//!
//! ## Architecture
//!
//! - **Domain Layer** (`domain/`): decisions, inbound requests, configuration, errors.
//! - **Ports Layer** (`ports/`): the operation codec, the error sink, and the
//!   Received / Filter / Filtered / Sent extension points.
//! - **Observer Registry** (`events.rs`): named, ordered callback lists.
//! - **Service Layer** (`service.rs`): `ForwardingPipeline`.
//! - **Dispatcher** (`dispatcher.rs`): action-keyed, JSON-level routing.
//!
//! ## Concurrency
//!
//! Stages of one message run in order; callbacks within a stage run
//! concurrently and are joined. Separate messages never block one another.

pub mod dispatcher;
pub mod domain;
pub mod events;
pub mod ports;
pub mod service;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export public API
pub use dispatcher::{error_payload, ForwardingDispatcher, ForwardingHandler, JsonForwardingDecision};
pub use domain::config::{ForwardingConfig, DEFAULT_FILTER_TIMEOUT};
pub use domain::decision::{
    ForwardingDecision, ForwardingResult, SentCallback, DEFAULT_LOG_MESSAGE,
};
pub use domain::errors::{CallbackError, ForwardingError, ObserverError, PipelineStage};
pub use domain::request::{InboundRequest, RequestContext};
pub use events::{ObserverHandle, ObserverRegistry};
pub use ports::inbound::{
    FilteredObserver, OperationDecision, ReceivedObserver, RequestFilter, SentObserver,
};
pub use ports::outbound::{ForwardingOperation, ObserverErrorSink, TracingErrorSink};
pub use service::ForwardingPipeline;
pub use tokio_util::sync::CancellationToken;
