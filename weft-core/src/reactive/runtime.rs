//! Reactive Runtime
//!
//! The runtime is the arena that connects dependency nodes and the
//! computations subscribed to them.
//!
//! # How It Works
//!
//! 1. Every [`Dep`](super::Dep) allocates a node in the arena, addressed by
//!    [`DepId`].
//!
//! 2. Every computation registers a weak reference to itself under its
//!    [`WatcherId`]. Nodes store subscriber ids, never the computations.
//!
//! 3. When a node is notified, the runtime snapshots its subscribers,
//!    upgrades them, releases the arena and then calls `update` on each.
//!
//! Because the graph only holds ids and weak references, dropping the last
//! handle to a computation is enough to take it out of the graph.
//!
//! # Threading
//!
//! The arena is thread-local. Reactive values are `!Send`; every thread that
//! uses the engine gets an independent graph.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use crate::graph::{DepId, DepNode};

use super::subscriber::{Subscriber, WatcherId};

#[derive(Default)]
pub(crate) struct Arena {
    pub(crate) deps: HashMap<DepId, DepNode>,
    pub(crate) subscribers: HashMap<WatcherId, Weak<dyn Subscriber>>,
}

thread_local! {
    static ARENA: RefCell<Arena> = RefCell::new(Arena::default());
}

/// Entry points into the per-thread dependency arena.
pub struct Runtime;

impl Runtime {
    /// Register a subscriber so dependency nodes can reach it by id.
    pub fn register(id: WatcherId, subscriber: Weak<dyn Subscriber>) {
        ARENA.with(|a| a.borrow_mut().subscribers.insert(id, subscriber));
    }

    /// Unregister a subscriber and drop it from the nodes in `deps`, the ones
    /// it is still subscribed to.
    pub fn unregister(id: WatcherId, deps: &[DepId]) {
        let _ = ARENA.try_with(|a| {
            let mut arena = a.borrow_mut();
            arena.subscribers.remove(&id);
            for dep in deps {
                if let Some(node) = arena.deps.get_mut(dep) {
                    node.remove_subscriber(id);
                }
            }
        });
    }

    /// Check whether a subscriber is registered.
    pub fn is_registered(id: WatcherId) -> bool {
        ARENA.with(|a| a.borrow().subscribers.contains_key(&id))
    }

    /// Resolve a registered subscriber.
    pub fn lookup(id: WatcherId) -> Option<Rc<dyn Subscriber>> {
        ARENA.with(|a| a.borrow().subscribers.get(&id).and_then(Weak::upgrade))
    }

    pub(crate) fn create_dep() -> DepId {
        let id = DepId::new();
        ARENA.with(|a| a.borrow_mut().deps.insert(id, DepNode::new()));
        id
    }

    pub(crate) fn release_dep(id: DepId) {
        let _ = ARENA.try_with(|a| a.borrow_mut().deps.remove(&id));
    }

    /// Check whether a node is still allocated.
    pub fn has_dep(id: DepId) -> bool {
        ARENA.with(|a| a.borrow().deps.contains_key(&id))
    }

    /// Subscribe `subscriber` to `dep`. Idempotent; released nodes are ignored.
    pub fn subscribe(dep: DepId, subscriber: WatcherId) -> bool {
        let added = ARENA.with(|a| {
            a.borrow_mut()
                .deps
                .get_mut(&dep)
                .map(|node| node.add_subscriber(subscriber))
                .unwrap_or(false)
        });
        if added {
            tracing::trace!(dep = dep.raw(), watcher = subscriber.raw(), "subscribed");
        }
        added
    }

    /// Remove `subscriber` from `dep` if present.
    pub fn unsubscribe(dep: DepId, subscriber: WatcherId) {
        let _ = ARENA.try_with(|a| {
            if let Some(node) = a.borrow_mut().deps.get_mut(&dep) {
                if node.remove_subscriber(subscriber) {
                    tracing::trace!(dep = dep.raw(), watcher = subscriber.raw(), "unsubscribed");
                }
            }
        });
    }

    /// The subscribers of `dep`, in subscription order.
    pub fn subscribers(dep: DepId) -> Vec<WatcherId> {
        ARENA.with(|a| {
            a.borrow()
                .deps
                .get(&dep)
                .map(|node| node.subscribers().iter().copied().collect())
                .unwrap_or_default()
        })
    }

    pub fn subscriber_count(dep: DepId) -> usize {
        ARENA.with(|a| a.borrow().deps.get(&dep).map(DepNode::len).unwrap_or(0))
    }

    /// Notify every subscriber of `dep`.
    ///
    /// The subscriber list is copied before the first `update` runs, so
    /// subscriptions changed by the updates themselves do not affect this pass.
    pub fn notify(dep: DepId) {
        let targets: Vec<Rc<dyn Subscriber>> = ARENA.with(|a| {
            let arena = a.borrow();
            match arena.deps.get(&dep) {
                Some(node) => node
                    .subscribers()
                    .iter()
                    .filter_map(|id| arena.subscribers.get(id).and_then(Weak::upgrade))
                    .collect(),
                None => Vec::new(),
            }
        });

        if targets.is_empty() {
            return;
        }
        tracing::trace!(dep = dep.raw(), count = targets.len(), "notify");

        for target in targets {
            target.update();
        }
    }

    /// Number of live dependency nodes on this thread.
    pub fn dep_count() -> usize {
        ARENA.with(|a| a.borrow().deps.len())
    }

    pub(crate) fn with_arena<R>(f: impl FnOnce(&Arena) -> R) -> R {
        ARENA.with(|a| f(&a.borrow()))
    }
}
