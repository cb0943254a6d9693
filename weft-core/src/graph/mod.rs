//! Dependency Graph
//!
//! This module holds the graph-wide machinery around the reactive
//! primitives: the arena records for dependency nodes, the scheduler that
//! batches watcher re-runs, the tick that defers flushes, and serializable
//! snapshots of the whole graph.
//!
//! # Overview
//!
//! The graph is bipartite. Dependency nodes are publish points owned by
//! instrumented properties and containers; watchers are the computations
//! subscribed to them. Edges are stored on the node side only, as an ordered
//! set of watcher ids, and watchers keep their own list of node ids. Both
//! sides address each other by id, so neither keeps the other alive.
//!
//! # Design Decisions
//!
//! 1. Nodes live in a per-thread arena rather than inside the properties that
//!    own them, so teardown is an id removal and snapshots can walk
//!    everything.
//!
//! 2. Flushes are ordered by watcher id. Ids follow creation order, which is
//!    enough to run parents before children and derived values before the
//!    output that reads them, without a topological sort.

mod node;
pub mod scheduler;
mod snapshot;
mod tick;

pub use node::{DepId, DepNode};
pub use scheduler::{
    enqueue_post_patch, flush, is_flushing, pending_count, queue_activated_component, queue_watcher,
    AbortedFlush, FlushReport, MAX_UPDATE_COUNT,
};
pub use snapshot::{DepSnapshot, GraphSnapshot, WatcherSnapshot};
pub use tick::{has_pending, next_tick, pending_callbacks, run_microtasks, tick};
