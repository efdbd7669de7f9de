//! # Observer Registry
//!
//! The named, ordered callback lists of one pipeline: Received, Filter,
//! Filtered and Sent.
//!
//! Registration returns an `ObserverHandle` for deregistration. Each stage
//! takes a snapshot of its list before invoking callbacks, so registration
//! never waits for in-flight messages and in-flight messages never see a
//! half-updated list.

use crate::domain::errors::PipelineStage;
use crate::ports::inbound::{FilteredObserver, ReceivedObserver, RequestFilter, SentObserver};
use crate::ports::outbound::ForwardingOperation;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Identifies one registered callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverHandle {
    id: u64,
    stage: PipelineStage,
}

impl ObserverHandle {
    #[must_use]
    pub fn stage(&self) -> PipelineStage {
        self.stage
    }
}

/// A callback together with its registration name.
pub struct Registered<T: ?Sized> {
    id: u64,
    pub name: String,
    pub callback: Arc<T>,
}

impl<T: ?Sized> Clone for Registered<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            name: self.name.clone(),
            callback: Arc::clone(&self.callback),
        }
    }
}

type CallbackList<T> = RwLock<Vec<Registered<T>>>;

/// Callback lists of one operation, in registration order.
pub struct ObserverRegistry<Op: ForwardingOperation> {
    next_id: AtomicU64,
    received: CallbackList<dyn ReceivedObserver<Op>>,
    filters: CallbackList<dyn RequestFilter<Op>>,
    filtered: CallbackList<dyn FilteredObserver<Op>>,
    sent: CallbackList<dyn SentObserver<Op>>,
}

impl<Op: ForwardingOperation> Default for ObserverRegistry<Op> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Op: ForwardingOperation> ObserverRegistry<Op> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            received: RwLock::new(Vec::new()),
            filters: RwLock::new(Vec::new()),
            filtered: RwLock::new(Vec::new()),
            sent: RwLock::new(Vec::new()),
        }
    }

    fn push<T: ?Sized>(
        &self,
        list: &CallbackList<T>,
        stage: PipelineStage,
        name: String,
        callback: Arc<T>,
    ) -> ObserverHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(stage = %stage, callback = %name, "Callback registered");
        list.write().push(Registered { id, name, callback });
        ObserverHandle { id, stage }
    }

    pub fn add_received(
        &self,
        name: impl Into<String>,
        observer: Arc<dyn ReceivedObserver<Op>>,
    ) -> ObserverHandle {
        self.push(&self.received, PipelineStage::Received, name.into(), observer)
    }

    pub fn add_filter(
        &self,
        name: impl Into<String>,
        filter: Arc<dyn RequestFilter<Op>>,
    ) -> ObserverHandle {
        self.push(&self.filters, PipelineStage::Filter, name.into(), filter)
    }

    pub fn add_filtered(
        &self,
        name: impl Into<String>,
        observer: Arc<dyn FilteredObserver<Op>>,
    ) -> ObserverHandle {
        self.push(&self.filtered, PipelineStage::Filtered, name.into(), observer)
    }

    pub fn add_sent(
        &self,
        name: impl Into<String>,
        observer: Arc<dyn SentObserver<Op>>,
    ) -> ObserverHandle {
        self.push(&self.sent, PipelineStage::Sent, name.into(), observer)
    }

    /// Deregister a callback. Returns `false` if it was already removed.
    pub fn remove(&self, handle: ObserverHandle) -> bool {
        let removed = match handle.stage {
            PipelineStage::Received => remove_from(&self.received, handle.id),
            PipelineStage::Filter => remove_from(&self.filters, handle.id),
            PipelineStage::Filtered => remove_from(&self.filtered, handle.id),
            PipelineStage::Sent => remove_from(&self.sent, handle.id),
        };
        if removed {
            debug!(stage = %handle.stage, "Callback deregistered");
        }
        removed
    }

    #[must_use]
    pub fn received(&self) -> Vec<Registered<dyn ReceivedObserver<Op>>> {
        self.received.read().clone()
    }

    #[must_use]
    pub fn filters(&self) -> Vec<Registered<dyn RequestFilter<Op>>> {
        self.filters.read().clone()
    }

    #[must_use]
    pub fn filtered(&self) -> Vec<Registered<dyn FilteredObserver<Op>>> {
        self.filtered.read().clone()
    }

    #[must_use]
    pub fn sent(&self) -> Vec<Registered<dyn SentObserver<Op>>> {
        self.sent.read().clone()
    }

    #[must_use]
    pub fn count(&self, stage: PipelineStage) -> usize {
        match stage {
            PipelineStage::Received => self.received.read().len(),
            PipelineStage::Filter => self.filters.read().len(),
            PipelineStage::Filtered => self.filtered.read().len(),
            PipelineStage::Sent => self.sent.read().len(),
        }
    }
}

fn remove_from<T: ?Sized>(list: &CallbackList<T>, id: u64) -> bool {
    let mut entries = list.write();
    let before = entries.len();
    entries.retain(|entry| entry.id != id);
    entries.len() != before
}
