//! Inbound (Driving) ports: the extension points external code plugs into.
//!
//! Received, Filtered and Sent observers are advisory; only filters influence
//! the decision. Every callback runs concurrently with the other callbacks of
//! the same stage, and its failure never reaches the pipeline.

use crate::domain::decision::ForwardingDecision;
use crate::domain::errors::CallbackError;
use crate::domain::request::RequestContext;
use crate::ports::outbound::ForwardingOperation;
use async_trait::async_trait;
use shared_types::SendResult;
use tokio_util::sync::CancellationToken;

/// Typed decision of operation `Op`.
pub type OperationDecision<Op> = ForwardingDecision<
    <Op as ForwardingOperation>::Request,
    <Op as ForwardingOperation>::Response,
>;

/// Notified after a request is decoded, before any filter runs.
#[async_trait]
pub trait ReceivedObserver<Op: ForwardingOperation>: Send + Sync {
    async fn on_received(
        &self,
        context: &RequestContext,
        request: &Op::Request,
    ) -> Result<(), CallbackError>;
}

/// Proposes a decision for a request.
///
/// `Ok(None)` abstains. A filter that observes `cancel` should return
/// promptly; its result is ignored.
#[async_trait]
pub trait RequestFilter<Op: ForwardingOperation>: Send + Sync {
    async fn filter(
        &self,
        context: &RequestContext,
        request: &Op::Request,
        cancel: CancellationToken,
    ) -> Result<Option<OperationDecision<Op>>, CallbackError>;
}

/// Notified with the resolved decision.
#[async_trait]
pub trait FilteredObserver<Op: ForwardingOperation>: Send + Sync {
    async fn on_filtered(
        &self,
        context: &RequestContext,
        request: Option<&Op::Request>,
        decision: &OperationDecision<Op>,
    ) -> Result<(), CallbackError>;
}

/// Notified after the transport has written a forwarded request, or failed to.
#[async_trait]
pub trait SentObserver<Op: ForwardingOperation>: Send + Sync {
    async fn on_sent(
        &self,
        context: &RequestContext,
        request: &Op::Request,
        result: &SendResult,
    ) -> Result<(), CallbackError>;
}
