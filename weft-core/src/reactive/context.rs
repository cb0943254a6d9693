//! Reactive Context
//!
//! The reactive context tracks which computation is currently evaluating.
//! This enables automatic dependency tracking: when a reactive property is
//! read, the read is attributed to the innermost active computation.
//!
//! # Implementation
//!
//! We use a thread-local stack. Entering a context pushes a target; the
//! returned guard pops it when dropped, so the outer target is restored even
//! if the evaluation returns early.
//!
//! A target may be `None`. Entering an empty target suspends tracking for the
//! duration of the guard (used while running lifecycle hooks).

use std::cell::RefCell;
use std::rc::Rc;

use super::subscriber::{Subscriber, WatcherId};

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<Option<Rc<dyn Subscriber>>>> = RefCell::new(Vec::new());
}

/// Guard that pops the context when dropped.
pub struct ReactiveContext {
    target: Option<WatcherId>,
}

impl ReactiveContext {
    /// Make `target` the current evaluation target until the guard drops.
    pub fn enter(target: Option<Rc<dyn Subscriber>>) -> Self {
        let id = target.as_ref().map(|t| t.id());
        CONTEXT_STACK.with(|stack| stack.borrow_mut().push(target));
        Self { target: id }
    }

    /// Suspend tracking until the guard drops.
    pub fn untracked() -> Self {
        Self::enter(None)
    }

    /// Run `f` with tracking suspended.
    pub fn without_tracking<R>(f: impl FnOnce() -> R) -> R {
        let _ctx = Self::untracked();
        f()
    }

    /// Check if reads are currently being attributed to a computation.
    pub fn is_active() -> bool {
        CONTEXT_STACK.with(|stack| matches!(stack.borrow().last(), Some(Some(_))))
    }

    /// The computation currently evaluating, if any.
    pub fn current() -> Option<Rc<dyn Subscriber>> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().cloned().flatten())
    }

    /// Get the current subscriber ID, if any.
    pub fn current_subscriber() -> Option<WatcherId> {
        Self::current().map(|s| s.id())
    }

    /// Number of entered contexts, including suspended ones.
    pub fn depth() -> usize {
        CONTEXT_STACK.with(|stack| stack.borrow().len())
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        // The stack may already be gone during thread teardown.
        let _ = CONTEXT_STACK.try_with(|stack| {
            let popped = stack.borrow_mut().pop();
            if let Some(entry) = popped {
                debug_assert_eq!(
                    entry.map(|e| e.id()),
                    self.target,
                    "ReactiveContext mismatch"
                );
            }
        });
    }
}
