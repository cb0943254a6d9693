//! Engine Configuration
//!
//! Configuration is per thread, like the rest of the engine state. It can be
//! adjusted in place with [`configure`] or decoded from JSON.
//!
//! Handlers (error, warning, flush) are closures and therefore live beside the
//! serializable [`Config`] rather than inside it.

use std::cell::RefCell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::error::ReactiveError;
use crate::graph::FlushReport;
use crate::reactive::Owner;

/// How deferred callbacks (including scheduler flushes) are driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TickMode {
    /// The host drains pending callbacks with [`crate::graph::run_microtasks`].
    #[default]
    Manual,

    /// Pending callbacks are drained by a task spawned on the current
    /// `tokio::task::LocalSet`.
    LocalSet,
}

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Emit development diagnostics and track runaway update loops.
    pub dev_diagnostics: bool,

    /// Suppress diagnostics even when `dev_diagnostics` is on.
    pub silent: bool,

    /// Re-triggers of one unit within one flush before the flush is aborted.
    pub max_update_count: usize,

    /// Defer flushes to the next tick. When off, a flush runs inside the
    /// enqueue that would have scheduled it.
    pub async_flush: bool,

    /// Driver for deferred callbacks.
    pub tick_mode: TickMode,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dev_diagnostics: cfg!(debug_assertions),
            silent: false,
            max_update_count: crate::graph::MAX_UPDATE_COUNT,
            async_flush: true,
            tick_mode: TickMode::Manual,
        }
    }
}

impl Config {
    /// Decode a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ReactiveError> {
        Ok(serde_json::from_str(json)?)
    }
}

pub type ErrorHandler = Rc<dyn Fn(&ReactiveError, Option<&Owner>, &str)>;
pub type WarnHandler = Rc<dyn Fn(&str, Option<&Owner>)>;
pub type FlushHook = Rc<dyn Fn(&FlushReport)>;

#[derive(Default)]
struct Handlers {
    error: Option<ErrorHandler>,
    warn: Option<WarnHandler>,
    flush: Option<FlushHook>,
}

thread_local! {
    static CONFIG: RefCell<Config> = RefCell::new(Config::default());
    static HANDLERS: RefCell<Handlers> = RefCell::new(Handlers::default());
}

/// A copy of the current configuration.
pub fn current() -> Config {
    CONFIG.with(|c| c.borrow().clone())
}

/// Replace the current configuration.
pub fn set(config: Config) {
    CONFIG.with(|c| *c.borrow_mut() = config);
}

/// Adjust the current configuration in place.
pub fn configure(f: impl FnOnce(&mut Config)) {
    CONFIG.with(|c| f(&mut c.borrow_mut()));
}

/// Restore defaults and drop every registered handler.
pub fn reset() {
    set(Config::default());
    HANDLERS.with(|h| *h.borrow_mut() = Handlers::default());
}

pub fn set_error_handler(handler: impl Fn(&ReactiveError, Option<&Owner>, &str) + 'static) {
    HANDLERS.with(|h| h.borrow_mut().error = Some(Rc::new(handler)));
}

pub fn set_warn_handler(handler: impl Fn(&str, Option<&Owner>) + 'static) {
    HANDLERS.with(|h| h.borrow_mut().warn = Some(Rc::new(handler)));
}

/// Register a hook receiving a report after every scheduler flush.
pub fn set_flush_hook(hook: impl Fn(&FlushReport) + 'static) {
    HANDLERS.with(|h| h.borrow_mut().flush = Some(Rc::new(hook)));
}

pub(crate) fn error_handler() -> Option<ErrorHandler> {
    HANDLERS.with(|h| h.borrow().error.clone())
}

pub(crate) fn warn_handler() -> Option<WarnHandler> {
    HANDLERS.with(|h| h.borrow().warn.clone())
}

pub(crate) fn flush_hook() -> Option<FlushHook> {
    HANDLERS.with(|h| h.borrow().flush.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.max_update_count, 100);
        assert!(cfg.async_flush);
        assert_eq!(cfg.tick_mode, TickMode::Manual);
        assert_eq!(cfg.dev_diagnostics, cfg!(debug_assertions));
    }

    #[test]
    fn from_json_fills_missing_fields() {
        let cfg = Config::from_json(r#"{ "max_update_count": 5, "tick_mode": "local_set" }"#)
            .unwrap();
        assert_eq!(cfg.max_update_count, 5);
        assert_eq!(cfg.tick_mode, TickMode::LocalSet);
        assert!(cfg.async_flush);
    }

    #[test]
    fn from_json_rejects_garbage() {
        let err = Config::from_json("{ not json").unwrap_err();
        assert!(matches!(err, ReactiveError::Config(_)));
    }

    #[test]
    fn configure_and_reset() {
        configure(|c| c.silent = true);
        assert!(current().silent);
        set_warn_handler(|_, _| {});
        assert!(warn_handler().is_some());

        reset();
        assert!(!current().silent);
        assert!(warn_handler().is_none());
    }
}
