//! Reactive Primitives
//!
//! This module implements the core reactive system: instrumented data,
//! dependency nodes, watchers and the owners they belong to.
//!
//! # Concepts
//!
//! ## Instrumented Data
//!
//! Plain [`Value`]s become reactive when [`observe`]d. Every property of an
//! instrumented object gets a dependency node; every instrumented container
//! gets one more node for structural changes (keys added or removed, array
//! mutators). Reading a property inside an evaluating watcher records the
//! read; writing it notifies the watchers that read it.
//!
//! ## Watchers
//!
//! A [`Watcher`] is a computation that tracks what it reads. Render watchers
//! produce an owner's output, computed watchers are lazy derived values, and
//! user watchers call back when a watched expression changes.
//!
//! ## Owners
//!
//! An [`Owner`] groups root data, computed values and watchers, runs
//! lifecycle hooks and is the context errors are reported against.
//!
//! # Implementation Notes
//!
//! The reactive system uses a thread-local tracking context to detect
//! dependencies automatically. When a property is read, we check whether a
//! watcher is evaluating and, if so, hand it the property's node. The
//! watcher decides whether that becomes a new subscription.

mod array;
mod context;
mod dep;
mod object;
mod observer;
mod owner;
mod runtime;
mod subscriber;
mod traverse;
mod value;
mod watcher;

pub use crate::graph::DepId;
pub use array::ReactiveArray;
pub use context::ReactiveContext;
pub use dep::{depend, notify, Dep};
pub use object::ReactiveObject;
pub use observer::{
    define_reactive, delete_property, is_observing, observe, set_observing, set_property, wrap, Key, Observer,
};
pub use owner::{ErrorCapturedHandler, LifecycleHook, Owner, OwnerId, WatchOptions};
pub use runtime::Runtime;
pub use subscriber::{Subscriber, WatcherId};
pub use traverse::traverse;
pub use value::{Opaque, Value};
pub use watcher::{callback, Callback, Getter, WatchSource, Watcher, WatcherKind, WatcherOptions, WatcherState};
