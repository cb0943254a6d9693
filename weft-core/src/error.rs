//! Error Handling
//!
//! Two channels leave the engine:
//!
//! - [`handle_error`] receives errors raised by user-defined computations
//!   (watch getters, watch callbacks, lifecycle hooks). It offers the error to
//!   every `error_captured` handler from the failing owner up to the root, then
//!   to the configured global handler, and finally logs it.
//!
//! - [`warn`] receives development diagnostics (misuse of the mutation API,
//!   malformed watch paths, runaway update loops). Diagnostics are dropped
//!   entirely when `dev_diagnostics` is off.

use thiserror::Error;

use crate::config;
use crate::reactive::Owner;

/// Errors produced by the reactive engine and by user computations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReactiveError {
    /// A user getter, callback or hook failed.
    #[error("{0}")]
    Thrown(String),

    /// A mutation targeted a value that is not an object or array.
    #[error("cannot {action} reactive property on a non-container value: {target}")]
    NotAContainer { action: &'static str, target: String },

    /// A key was added to or removed from root data at runtime.
    #[error("avoid {action} property `{key}` on root data at runtime; declare it upfront")]
    RootDataMutation { action: &'static str, key: String },

    /// The key kind does not fit the container (e.g. a name on an array).
    #[error("invalid key `{key}` for {container}")]
    InvalidKey { key: String, container: &'static str },

    /// A watch path is not a simple dot-delimited path.
    #[error("failed watching path `{0}`: only simple dot-delimited paths are accepted")]
    InvalidWatchPath(String),

    /// A unit re-triggered itself more than the configured limit in one flush.
    #[error("possible infinite update loop in {0}")]
    InfiniteUpdateLoop(String),

    /// A computed value clashes with an existing data key or computed value.
    #[error("computed property `{0}` is already defined")]
    ComputedConflict(String),

    /// A computed value was assigned to.
    #[error("computed property `{0}` has no setter")]
    ReadOnlyComputed(String),

    /// Configuration could not be decoded.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A snapshot could not be encoded.
    #[error("snapshot encoding failed: {0}")]
    Encode(String),
}

impl ReactiveError {
    /// Shorthand for [`ReactiveError::Thrown`].
    pub fn thrown(message: impl Into<String>) -> Self {
        Self::Thrown(message.into())
    }
}

impl From<serde_json::Error> for ReactiveError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(err.to_string())
    }
}

/// Route an error raised by user code.
///
/// `info` labels where the error came from, e.g.
/// `getter for watcher "a.b"` or `updated hook`.
pub fn handle_error(err: &ReactiveError, owner: Option<&Owner>, info: &str) {
    if let Some(owner) = owner {
        let mut current = Some(owner.clone());
        while let Some(cur) = current {
            for handler in cur.error_captured_handlers() {
                if !handler(err, owner, info) {
                    return;
                }
            }
            current = cur.parent();
        }
    }
    global_handle_error(err, owner, info);
}

fn global_handle_error(err: &ReactiveError, owner: Option<&Owner>, info: &str) {
    if let Some(handler) = config::error_handler() {
        handler(err, owner, info);
        return;
    }
    tracing::error!(
        owner = owner.map(|o| o.id().raw()),
        info,
        error = %err,
        "unhandled error in reactive computation"
    );
}

/// Emit a development diagnostic.
pub fn warn(message: &str, owner: Option<&Owner>) {
    let cfg = config::current();
    if !cfg.dev_diagnostics || cfg.silent {
        return;
    }
    if let Some(handler) = config::warn_handler() {
        handler(message, owner);
        return;
    }
    tracing::warn!(owner = owner.map(|o| o.id().raw()), "{message}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn warn_respects_dev_diagnostics() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        config::set_warn_handler(move |msg, _| sink.borrow_mut().push(msg.to_string()));

        config::configure(|c| c.dev_diagnostics = true);
        warn("first", None);

        config::configure(|c| c.dev_diagnostics = false);
        warn("second", None);

        config::configure(|c| {
            c.dev_diagnostics = true;
            c.silent = true;
        });
        warn("third", None);

        assert_eq!(*seen.borrow(), vec!["first".to_string()]);
    }

    #[test]
    fn handle_error_falls_back_to_global_handler() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        config::set_error_handler(move |err, owner, info| {
            sink.borrow_mut()
                .push((err.to_string(), owner.is_some(), info.to_string()));
        });

        handle_error(&ReactiveError::thrown("boom"), None, "nextTick");

        assert_eq!(
            *seen.borrow(),
            vec![("boom".to_string(), false, "nextTick".to_string())]
        );
    }

    #[test]
    fn error_captured_can_stop_propagation() {
        let global = Rc::new(RefCell::new(0));
        let global_sink = global.clone();
        config::set_error_handler(move |_, _, _| *global_sink.borrow_mut() += 1);

        let parent = Owner::new("parent");
        let child = Owner::with_parent(&parent, "child");

        let captured = Rc::new(RefCell::new(Vec::new()));
        let captured_sink = captured.clone();
        parent.on_error_captured(move |err, from, info| {
            captured_sink
                .borrow_mut()
                .push((err.to_string(), from.name().to_string(), info.to_string()));
            false
        });

        handle_error(&ReactiveError::thrown("bad"), Some(&child), "updated hook");

        assert_eq!(
            *captured.borrow(),
            vec![("bad".to_string(), "child".to_string(), "updated hook".to_string())]
        );
        assert_eq!(*global.borrow(), 0);
    }

    #[test]
    fn error_messages() {
        let err = ReactiveError::RootDataMutation {
            action: "adding",
            key: "extra".into(),
        };
        assert_eq!(
            err.to_string(),
            "avoid adding property `extra` on root data at runtime; declare it upfront"
        );
        assert_eq!(ReactiveError::thrown("x").to_string(), "x");
    }
}
