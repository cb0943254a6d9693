//! Graph Snapshots
//!
//! A serializable picture of the per-thread dependency graph, for debugging
//! and devtools. Snapshots are plain data: nothing in them keeps the graph
//! alive.

use serde::{Deserialize, Serialize};

use crate::error::ReactiveError;
use crate::reactive::{Runtime, WatcherId, WatcherKind};

use super::node::DepId;
use super::scheduler;

/// One dependency node and its subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepSnapshot {
    pub id: DepId,
    pub subscribers: Vec<WatcherId>,
}

/// One live watcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatcherSnapshot {
    pub id: WatcherId,
    pub kind: WatcherKind,
    pub expression: String,
    pub deps: Vec<DepId>,
    pub dirty: bool,
    pub active: bool,
}

/// The dependency graph of the current thread.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub deps: Vec<DepSnapshot>,
    pub watchers: Vec<WatcherSnapshot>,
    /// Watchers queued for the next flush.
    pub pending: Vec<WatcherId>,
}

impl GraphSnapshot {
    /// Capture the current thread's graph. Nodes and watchers are sorted by id.
    pub fn capture() -> Self {
        let (mut deps, subscribers) = Runtime::with_arena(|arena| {
            let deps: Vec<DepSnapshot> = arena
                .deps
                .iter()
                .map(|(id, node)| DepSnapshot {
                    id: *id,
                    subscribers: node.subscribers().iter().copied().collect(),
                })
                .collect();
            let subscribers: Vec<_> = arena.subscribers.values().filter_map(|w| w.upgrade()).collect();
            (deps, subscribers)
        });
        deps.sort_by_key(|d| d.id);

        let mut watchers: Vec<WatcherSnapshot> = subscribers.iter().filter_map(|s| s.snapshot()).collect();
        watchers.sort_by_key(|w| w.id);

        Self {
            deps,
            watchers,
            pending: scheduler::pending_ids(),
        }
    }

    pub fn watcher(&self, id: WatcherId) -> Option<&WatcherSnapshot> {
        self.watchers.iter().find(|w| w.id == id)
    }

    pub fn dep(&self, id: DepId) -> Option<&DepSnapshot> {
        self.deps.iter().find(|d| d.id == id)
    }

    pub fn to_json(&self) -> Result<String, ReactiveError> {
        serde_json::to_string_pretty(self).map_err(|e| ReactiveError::Encode(e.to_string()))
    }

    pub fn to_msgpack(&self) -> Result<Vec<u8>, ReactiveError> {
        rmp_serde::to_vec_named(self).map_err(|e| ReactiveError::Encode(e.to_string()))
    }

    pub fn from_msgpack(bytes: &[u8]) -> Result<Self, ReactiveError> {
        rmp_serde::from_slice(bytes).map_err(|e| ReactiveError::Encode(e.to_string()))
    }
}
