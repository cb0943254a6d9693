//! Weft Core
//!
//! This crate provides the core runtime for the Weft reactive data engine.
//! It implements:
//!
//! - Instrumentation of plain data so that reads and writes are tracked
//! - Watchers that record their own dependencies and re-run on change
//! - A scheduler that batches, deduplicates and orders re-runs per tick
//! - Owners with computed values, watches, render/patch and lifecycle hooks
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: values, instrumentation, dependency nodes and watchers
//! - `graph`: the scheduler, the deferred-callback tick and graph snapshots
//! - `config`: per-thread engine configuration
//! - `error`: the error type and the error/diagnostic reporting channels
//!
//! All engine state is thread-local. Values are `!Send`; each thread gets an
//! independent graph.
//!
//! # Example
//!
//! ```rust
//! use weft_core::graph::run_microtasks;
//! use weft_core::reactive::{Owner, ReactiveObject, Value, WatchOptions};
//!
//! let owner = Owner::new("app");
//! let data = ReactiveObject::new().with("count", 0);
//! owner.init_data(data.clone());
//!
//! owner
//!     .watch(
//!         "count",
//!         |_, new, old| {
//!             println!("count: {old:?} -> {new:?}");
//!             Ok(())
//!         },
//!         WatchOptions::default(),
//!     )
//!     .unwrap();
//!
//! // Three writes in one turn, one callback with the last value.
//! data.set("count", 1);
//! data.set("count", 2);
//! data.set("count", 3);
//! run_microtasks();
//! assert_eq!(owner.get("count").unwrap(), Value::from(3));
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod reactive;

pub use config::Config;
pub use error::ReactiveError;
