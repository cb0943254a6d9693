//! Update Scheduler
//!
//! The scheduler batches invalidated watchers and re-runs them in one flush
//! per tick.
//!
//! # Algorithm
//!
//! 1. [`queue_watcher`] adds a watcher unless it is already pending. The first
//!    enqueue after a flush schedules exactly one flush on the next tick.
//!
//! 2. [`flush`] sorts the queue by watcher id. Ids follow creation order, so
//!    parents run before children and computed values and user watchers run
//!    before the render watcher that consumes them.
//!
//! 3. The queue is walked by index, not over a fixed snapshot: a watcher that
//!    runs may enqueue others. While flushing, new watchers are inserted into
//!    the unprocessed tail at their id position.
//!
//! 4. A watcher's pending marker is cleared right before it runs, so it may
//!    legally re-enqueue itself. In development builds each re-trigger is
//!    counted and the flush is aborted once one watcher exceeds
//!    `max_update_count`.
//!
//! 5. After the main pass the state is reset, then `Activated` hooks run for
//!    owners queued with [`queue_activated_component`], then `Updated` hooks
//!    run in reverse queue order for render watchers of mounted owners.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::config;
use crate::error::{self, ReactiveError};
use crate::reactive::{LifecycleHook, Owner, Watcher, WatcherId, WatcherKind};

use super::tick;

/// Default number of re-triggers of one watcher within one flush.
pub const MAX_UPDATE_COUNT: usize = 100;

#[derive(Default)]
struct SchedulerState {
    queue: Vec<Watcher>,
    activated: Vec<Owner>,
    has: HashSet<WatcherId>,
    circular: HashMap<WatcherId, usize>,
    waiting: bool,
    flushing: bool,
    index: usize,
}

thread_local! {
    static STATE: RefCell<SchedulerState> = RefCell::new(SchedulerState::default());
}

/// The watcher a flush was aborted on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbortedFlush {
    pub watcher: u64,
    pub expression: String,
}

/// Summary of one flush.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlushReport {
    /// Watcher ids in the order they ran. A watcher that re-triggered itself
    /// appears once per run.
    pub ran: Vec<u64>,
    /// Set when the flush stopped on a runaway update loop.
    pub aborted: Option<AbortedFlush>,
    /// Owners whose `Activated` hooks ran.
    pub activated: usize,
    /// Owners whose `Updated` hooks ran.
    pub updated: usize,
}

/// Queue `watcher` for the next flush. Already pending watchers are skipped.
pub fn queue_watcher(watcher: Watcher) {
    let id = watcher.id();
    let schedule = STATE.with(|s| {
        let mut s = s.borrow_mut();
        if !s.has.insert(id) {
            return false;
        }
        if !s.flushing {
            s.queue.push(watcher);
        } else {
            let mut i = s.queue.len();
            while i > s.index + 1 && s.queue[i - 1].id() > id {
                i -= 1;
            }
            s.queue.insert(i, watcher);
        }
        if s.waiting {
            false
        } else {
            s.waiting = true;
            true
        }
    });
    if !schedule {
        return;
    }

    if config::current().async_flush {
        tick::next_tick(|| flush().map(|_| ()));
    } else if let Err(err) = flush() {
        error::handle_error(&err, None, "scheduler flush");
    }
}

/// Queue an owner that became active during a patch. Its `Activated` hooks
/// run after the current flush has finished updating the whole tree.
pub fn queue_activated_component(owner: Owner) {
    owner.set_inactive(false);
    STATE.with(|s| s.borrow_mut().activated.push(owner));
}

/// Alias of [`queue_activated_component`] for renderers.
pub fn enqueue_post_patch(owner: Owner) {
    queue_activated_component(owner);
}

/// Run every queued watcher.
///
/// An error from an internal watcher resets the scheduler and is returned;
/// watchers that had not run yet are dropped from this flush.
pub fn flush() -> Result<FlushReport, ReactiveError> {
    let cfg = config::current();
    let pending = STATE.with(|s| {
        let mut s = s.borrow_mut();
        s.flushing = true;
        s.queue.sort_by_key(Watcher::id);
        s.queue.len()
    });
    tracing::debug!(pending, "flush start");

    let mut report = FlushReport::default();
    loop {
        let next = STATE.with(|s| {
            let mut s = s.borrow_mut();
            let watcher = s.queue.get(s.index).cloned()?;
            s.has.remove(&watcher.id());
            Some(watcher)
        });
        let Some(watcher) = next else {
            break;
        };

        report.ran.push(watcher.id().raw());
        if let Err(err) = watcher.run() {
            reset_state();
            return Err(err);
        }

        if cfg.dev_diagnostics && is_pending(watcher.id()) {
            let count = STATE.with(|s| {
                let mut s = s.borrow_mut();
                let count = s.circular.entry(watcher.id()).or_insert(0);
                *count += 1;
                *count
            });
            if count > cfg.max_update_count {
                let target = match watcher.kind() {
                    WatcherKind::User => format!("watcher with expression \"{}\"", watcher.expression()),
                    _ => "a component render function".to_string(),
                };
                let err = ReactiveError::InfiniteUpdateLoop(target);
                error::warn(&err.to_string(), watcher.owner().as_ref());
                report.aborted = Some(AbortedFlush {
                    watcher: watcher.id().raw(),
                    expression: watcher.expression().to_string(),
                });
                break;
            }
        }

        STATE.with(|s| s.borrow_mut().index += 1);
    }

    let (activated, queue) = STATE.with(|s| {
        let mut s = s.borrow_mut();
        (std::mem::take(&mut s.activated), std::mem::take(&mut s.queue))
    });
    reset_state();

    report.activated = call_activated_hooks(&activated);
    report.updated = call_updated_hooks(&queue);

    tracing::debug!(
        ran = report.ran.len(),
        aborted = report.aborted.is_some(),
        activated = report.activated,
        updated = report.updated,
        "flush finished"
    );
    if let Some(hook) = config::flush_hook() {
        hook(&report);
    }
    Ok(report)
}

fn reset_state() {
    STATE.with(|s| {
        let mut s = s.borrow_mut();
        s.index = 0;
        s.queue.clear();
        s.activated.clear();
        s.has.clear();
        s.circular.clear();
        s.waiting = false;
        s.flushing = false;
    });
}

fn call_activated_hooks(owners: &[Owner]) -> usize {
    for owner in owners {
        owner.set_inactive(true);
        owner.activate(true);
    }
    owners.len()
}

fn call_updated_hooks(queue: &[Watcher]) -> usize {
    let mut updated = 0;
    for watcher in queue.iter().rev() {
        let Some(owner) = watcher.owner() else {
            continue;
        };
        if owner.render_watcher_id() == Some(watcher.id()) && owner.is_mounted() && !owner.is_destroyed() {
            owner.call_hook(LifecycleHook::Updated);
            updated += 1;
        }
    }
    updated
}

/// Check whether a flush is running.
pub fn is_flushing() -> bool {
    STATE.with(|s| s.borrow().flushing)
}

/// Number of watchers waiting to run.
pub fn pending_count() -> usize {
    STATE.with(|s| s.borrow().has.len())
}

/// Check whether `id` is waiting to run.
pub fn is_pending(id: WatcherId) -> bool {
    STATE.with(|s| s.borrow().has.contains(&id))
}

/// Ids of the watchers waiting to run, in queue order.
pub fn pending_ids() -> Vec<WatcherId> {
    STATE.with(|s| {
        let s = s.borrow();
        s.queue
            .iter()
            .map(Watcher::id)
            .filter(|id| s.has.contains(id))
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::run_microtasks;
    use crate::reactive::{ReactiveObject, Value, WatchOptions};
    use std::cell::Cell;
    use std::rc::Rc;

    fn owner_with(key: &str, value: i32) -> (Owner, ReactiveObject) {
        let owner = Owner::new("root");
        let data = ReactiveObject::new().with(key, value);
        owner.init_data(data.clone());
        (owner, data)
    }

    #[test]
    fn enqueue_deduplicates_and_schedules_once() {
        let (owner, data) = owner_with("a", 1);
        let runs = Rc::new(Cell::new(0));
        let counter = runs.clone();
        owner
            .watch(
                "a",
                move |_, _, _| {
                    counter.set(counter.get() + 1);
                    Ok(())
                },
                WatchOptions::default(),
            )
            .unwrap();

        data.set("a", 2);
        data.set("a", 3);
        assert_eq!(pending_count(), 1);
        assert_eq!(tick::pending_callbacks(), 1);

        run_microtasks();
        assert_eq!(runs.get(), 1);
        assert_eq!(pending_count(), 0);
        assert!(!is_flushing());
    }

    #[test]
    fn flush_runs_in_id_order() {
        let (owner, data) = owner_with("a", 1);
        let order = Rc::new(std::cell::RefCell::new(Vec::new()));

        let mut ids = Vec::new();
        for label in ["first", "second", "third"] {
            let sink = order.clone();
            let w = owner
                .watch(
                    "a",
                    move |_, _, _| {
                        sink.borrow_mut().push(label);
                        Ok(())
                    },
                    WatchOptions::default(),
                )
                .unwrap();
            ids.push(w.id().raw());
        }

        data.set("a", 2);
        let report = flush().unwrap();
        assert_eq!(*order.borrow(), vec!["first", "second", "third"]);
        assert_eq!(report.ran, ids);
    }

    #[test]
    fn watchers_queued_mid_flush_are_inserted_by_id() {
        let owner = Owner::new("root");
        let data = ReactiveObject::new().with("a", 1).with("b", 0);
        owner.init_data(data.clone());
        let order = Rc::new(std::cell::RefCell::new(Vec::new()));

        // Lower id, watches `b`, which is only written by the later watcher.
        let sink = order.clone();
        let low = owner
            .watch(
                "b",
                move |_, _, _| {
                    sink.borrow_mut().push("low");
                    Ok(())
                },
                WatchOptions::default(),
            )
            .unwrap();

        let sink = order.clone();
        let writer = data.clone();
        let high = owner
            .watch(
                "a",
                move |_, new, _| {
                    sink.borrow_mut().push("high");
                    writer.set("b", new.clone());
                    Ok(())
                },
                WatchOptions::default(),
            )
            .unwrap();
        assert!(low.id() < high.id());

        data.set("a", 5);
        run_microtasks();
        // `low` is behind the current index, so it lands right after it.
        assert_eq!(*order.borrow(), vec!["high", "low"]);
    }

    #[test]
    fn synchronous_flush_mode() {
        config::configure(|c| c.async_flush = false);
        let (owner, data) = owner_with("a", 1);
        let runs = Rc::new(Cell::new(0));
        let counter = runs.clone();
        owner
            .watch(
                "a",
                move |_, _, _| {
                    counter.set(counter.get() + 1);
                    Ok(())
                },
                WatchOptions::default(),
            )
            .unwrap();

        data.set("a", 2);
        assert_eq!(runs.get(), 1);
        assert!(!tick::has_pending());
    }

    #[test]
    fn render_errors_abort_and_reset() {
        let (owner, data) = owner_with("a", 1);
        let reader = data.clone();
        owner
            .mount(
                move |_| {
                    if reader.get("a") == Value::from(2) {
                        Err(ReactiveError::thrown("render failed"))
                    } else {
                        Ok(reader.get("a"))
                    }
                },
                |_, _, _| Ok(()),
            )
            .unwrap();

        data.set("a", 2);
        assert_eq!(flush().unwrap_err(), ReactiveError::thrown("render failed"));
        assert_eq!(pending_count(), 0);
        assert!(!is_flushing());
    }

    #[test]
    fn activated_owners_are_processed_after_the_pass() {
        let owner = Owner::new("kept-alive");
        let activated = Rc::new(Cell::new(0));
        let counter = activated.clone();
        owner.on(LifecycleHook::Activated, move |_| {
            counter.set(counter.get() + 1);
            Ok(())
        });

        owner.deactivate(true);
        enqueue_post_patch(owner.clone());
        let report = flush().unwrap();

        assert_eq!(report.activated, 1);
        assert_eq!(activated.get(), 1);
        assert!(!owner.is_inactive());
    }

    #[test]
    fn flush_hook_receives_reports() {
        let reports = Rc::new(std::cell::RefCell::new(Vec::new()));
        let sink = reports.clone();
        config::set_flush_hook(move |r| sink.borrow_mut().push(r.clone()));

        let (owner, data) = owner_with("a", 1);
        owner
            .watch("a", |_, _, _| Ok(()), WatchOptions::default())
            .unwrap();
        data.set("a", 2);
        run_microtasks();

        assert_eq!(reports.borrow().len(), 1);
        assert_eq!(reports.borrow()[0].ran.len(), 1);
    }
}
