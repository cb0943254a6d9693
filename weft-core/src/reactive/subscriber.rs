//! Subscriber types for the reactive system.
//!
//! A subscriber is any computation that depends on dependency nodes. In
//! practice that is a [`Watcher`](super::Watcher), but the runtime only sees
//! this trait, which keeps the fan-out testable in isolation.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::graph::{DepId, WatcherSnapshot};

/// Unique identifier for a subscriber.
///
/// Ids increase monotonically in creation order. The scheduler relies on this:
/// sorting by id runs parents before children and derived values before the
/// output that consumes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WatcherId(u64);

impl WatcherId {
    /// Generate a new unique subscriber ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for WatcherId {
    fn default() -> Self {
        Self::new()
    }
}

/// A computation that can be notified when a dependency changes.
pub trait Subscriber {
    /// The subscriber's id.
    fn id(&self) -> WatcherId;

    /// Record that `dep` was read during the current evaluation.
    ///
    /// Called through the tracking context; the subscriber decides whether the
    /// read turns into a subscription.
    fn add_dep(&self, dep: DepId);

    /// A dependency changed.
    fn update(&self);

    /// Describe this subscriber for a graph snapshot. Subscribers that are
    /// not watchers are left out.
    fn snapshot(&self) -> Option<WatcherSnapshot> {
        None
    }
}
