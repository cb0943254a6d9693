//! Deferred Callbacks
//!
//! The scheduler defers its flush to the next tick. A tick drains every
//! callback queued before it started; callbacks queued while draining form
//! the next batch.
//!
//! Who drains a batch depends on [`TickMode`]:
//!
//! - `Manual`: the host calls [`run_microtasks`] at the end of its turn.
//! - `LocalSet`: the first callback of a batch spawns a drain task with
//!   `tokio::task::spawn_local`. This requires a running `LocalSet`.

use std::cell::RefCell;

use crate::config::{self, TickMode};
use crate::error::{self, ReactiveError};

type Task = Box<dyn FnOnce() -> Result<(), ReactiveError>>;

#[derive(Default)]
struct TickState {
    callbacks: Vec<Task>,
    /// A drain has been arranged for the current batch.
    pending: bool,
}

thread_local! {
    static TICK: RefCell<TickState> = RefCell::new(TickState::default());
}

/// Queue `callback` for the next tick. Errors it returns are reported with
/// the `nextTick` label.
pub fn next_tick(callback: impl FnOnce() -> Result<(), ReactiveError> + 'static) {
    let schedule = TICK.with(|t| {
        let mut t = t.borrow_mut();
        t.callbacks.push(Box::new(callback));
        !std::mem::replace(&mut t.pending, true)
    });
    if schedule && config::current().tick_mode == TickMode::LocalSet {
        tokio::task::spawn_local(async {
            drain();
        });
    }
}

fn drain() -> usize {
    let batch = TICK.with(|t| {
        let mut t = t.borrow_mut();
        t.pending = false;
        std::mem::take(&mut t.callbacks)
    });
    let count = batch.len();
    for callback in batch {
        if let Err(err) = callback() {
            error::handle_error(&err, None, "nextTick");
        }
    }
    count
}

/// Drain pending callbacks until none are left, including ones queued while
/// draining. Returns how many ran.
pub fn run_microtasks() -> usize {
    let mut total = 0;
    while has_pending() {
        total += drain();
    }
    total
}

/// Check whether any callback is waiting for a tick.
pub fn has_pending() -> bool {
    TICK.with(|t| !t.borrow().callbacks.is_empty())
}

pub fn pending_callbacks() -> usize {
    TICK.with(|t| t.borrow().callbacks.len())
}

/// Resolve after every callback queued before this call has run.
///
/// In `Manual` mode the pending batch is drained right away.
pub async fn tick() {
    let (tx, rx) = tokio::sync::oneshot::channel();
    next_tick(move || {
        let _ = tx.send(());
        Ok(())
    });
    if config::current().tick_mode == TickMode::Manual {
        run_microtasks();
    }
    let _ = rx.await;
}
