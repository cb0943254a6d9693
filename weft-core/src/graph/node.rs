//! Dependency Nodes
//!
//! The arena-side record of a dependency node. Nodes are addressed by
//! [`DepId`]; the owning [`Dep`](crate::reactive::Dep) handle releases its
//! node when dropped.

use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::reactive::WatcherId;

/// Unique identifier for a dependency node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DepId(u64);

impl DepId {
    /// Generate a new unique node ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for DepId {
    fn default() -> Self {
        Self::new()
    }
}

/// A publish point: the ordered set of subscribers reading one value.
#[derive(Debug, Default)]
pub struct DepNode {
    /// Subscribers in first-subscription order. A subscriber appears once.
    subscribers: IndexSet<WatcherId>,
}

impl DepNode {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscriber. Returns `false` if it was already present.
    pub fn add_subscriber(&mut self, id: WatcherId) -> bool {
        self.subscribers.insert(id)
    }

    /// Remove a subscriber, keeping the order of the rest.
    pub fn remove_subscriber(&mut self, id: WatcherId) -> bool {
        self.subscribers.shift_remove(&id)
    }

    pub fn subscribers(&self) -> &IndexSet<WatcherId> {
        &self.subscribers
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}
