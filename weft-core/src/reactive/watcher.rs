//! Watcher Implementation
//!
//! A watcher is a re-evaluatable computation that records which dependency
//! nodes it read and subscribes to them.
//!
//! # How Watchers Work
//!
//! 1. Evaluation pushes the watcher onto the reactive context, runs the getter
//!    and pops it again. Every node touched in between is recorded in a fresh
//!    dependency generation.
//!
//! 2. After evaluation the two generations are reconciled: nodes that were not
//!    touched this time are unsubscribed, newly touched ones were subscribed as
//!    they were recorded. The new generation becomes the current one and the
//!    old containers are reused for the next round.
//!
//! 3. When a subscribed node notifies, the watcher's kind decides what
//!    happens: computed watchers only mark themselves dirty, synchronous
//!    watchers re-run inline, everything else is queued on the scheduler.
//!
//! # Kinds
//!
//! - [`WatcherKind::Render`]: produces an owner's output. Errors propagate.
//! - [`WatcherKind::Computed`]: lazy derived value, evaluated on demand.
//! - [`WatcherKind::User`]: explicit watch. Getter and callback errors are
//!   routed to [`handle_error`](crate::error::handle_error) instead of
//!   aborting the flush.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::fmt;
use std::rc::{Rc, Weak};

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::error::{self, ReactiveError};
use crate::graph::{scheduler, DepId, WatcherSnapshot};

use super::context::ReactiveContext;
use super::dep;
use super::owner::{Owner, WeakOwner};
use super::runtime::Runtime;
use super::subscriber::{Subscriber, WatcherId};
use super::traverse::traverse;
use super::value::Value;

/// A getter evaluated against its owner.
pub type Getter = Rc<dyn Fn(&Owner) -> Result<Value, ReactiveError>>;

/// A callback receiving `(new, old)`.
pub type Callback = Rc<dyn Fn(&Owner, &Value, &Value) -> Result<(), ReactiveError>>;

/// Wrap a closure as a [`Callback`].
pub fn callback(f: impl Fn(&Owner, &Value, &Value) -> Result<(), ReactiveError> + 'static) -> Callback {
    Rc::new(f)
}

/// What a watcher evaluates.
#[derive(Clone)]
pub enum WatchSource {
    /// A dot-delimited path read through the owner, e.g. `"user.name"`.
    Path(String),
    /// An arbitrary getter. The label is used in diagnostics.
    Getter { label: String, getter: Getter },
}

impl WatchSource {
    pub fn path(path: impl Into<String>) -> Self {
        Self::Path(path.into())
    }

    pub fn getter(f: impl Fn(&Owner) -> Result<Value, ReactiveError> + 'static) -> Self {
        Self::named("function", f)
    }

    pub fn named(label: impl Into<String>, f: impl Fn(&Owner) -> Result<Value, ReactiveError> + 'static) -> Self {
        Self::Getter {
            label: label.into(),
            getter: Rc::new(f),
        }
    }
}

impl From<&str> for WatchSource {
    fn from(path: &str) -> Self {
        Self::path(path)
    }
}

impl From<String> for WatchSource {
    fn from(path: String) -> Self {
        Self::Path(path)
    }
}

impl fmt::Debug for WatchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(p) => f.debug_tuple("Path").field(p).finish(),
            Self::Getter { label, .. } => f.debug_tuple("Getter").field(label).finish(),
        }
    }
}

/// Construction options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatcherOptions {
    /// Touch everything reachable from the value after each evaluation.
    pub deep: bool,
    /// The getter and callback are user code.
    pub user: bool,
    /// Defer evaluation until demanded.
    pub lazy: bool,
    /// Re-run inline on invalidation instead of queueing.
    pub sync: bool,
}

/// The role a watcher plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatcherKind {
    Render,
    Computed,
    User,
}

impl WatcherKind {
    fn from_options(options: &WatcherOptions) -> Self {
        if options.lazy {
            Self::Computed
        } else if options.user {
            Self::User
        } else {
            Self::Render
        }
    }
}

/// Observable state of a watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    /// Up to date and not waiting for anything.
    Clean,
    /// Invalidated and waiting in the scheduler queue.
    Queued,
    /// A lazy watcher whose value is stale.
    Dirty,
    /// Currently running its getter.
    Evaluating,
    /// Torn down.
    Inactive,
}

#[derive(Default)]
struct Tracking {
    deps: SmallVec<[DepId; 8]>,
    dep_ids: HashSet<DepId>,
    new_deps: SmallVec<[DepId; 8]>,
    new_dep_ids: HashSet<DepId>,
}

struct WatcherInner {
    id: WatcherId,
    this: Weak<WatcherInner>,
    owner: WeakOwner,
    kind: WatcherKind,
    expression: String,
    getter: Getter,
    callback: Option<Callback>,
    deep: bool,
    sync: bool,
    value: RefCell<Value>,
    dirty: Cell<bool>,
    active: Cell<bool>,
    evaluating: Cell<bool>,
    tracking: RefCell<Tracking>,
}

/// Handle to a computation unit. Clones share the same watcher.
#[derive(Clone)]
pub struct Watcher(Rc<WatcherInner>);

impl Watcher {
    /// Create a watcher owned by `owner`.
    ///
    /// Unless `lazy`, the getter runs immediately to establish the initial
    /// value and subscriptions. A failure there tears the watcher down again
    /// and is returned. An invalid path degrades to a getter that always
    /// yields `undefined`.
    pub fn new(
        owner: &Owner,
        source: impl Into<WatchSource>,
        callback: Option<Callback>,
        options: WatcherOptions,
        is_render: bool,
    ) -> Result<Self, ReactiveError> {
        let kind = if is_render {
            WatcherKind::Render
        } else {
            WatcherKind::from_options(&options)
        };

        let (expression, getter) = match source.into() {
            WatchSource::Getter { label, getter } => (label, getter),
            WatchSource::Path(path) => {
                let getter = parse_path(&path).unwrap_or_else(|| {
                    let err = ReactiveError::InvalidWatchPath(path.clone());
                    error::warn(&err.to_string(), Some(owner));
                    Rc::new(|_: &Owner| -> Result<Value, ReactiveError> { Ok(Value::Undefined) })
                });
                (path, getter)
            }
        };

        let inner = Rc::new_cyclic(|this| WatcherInner {
            id: WatcherId::new(),
            this: this.clone(),
            owner: owner.downgrade(),
            kind,
            expression,
            getter,
            callback,
            deep: options.deep,
            sync: options.sync,
            value: RefCell::new(Value::Undefined),
            dirty: Cell::new(options.lazy),
            active: Cell::new(true),
            evaluating: Cell::new(false),
            tracking: RefCell::new(Tracking::default()),
        });
        Runtime::register(inner.id, Rc::downgrade(&inner) as Weak<dyn Subscriber>);

        let watcher = Watcher(inner);
        owner.register_watcher(watcher.clone(), is_render);

        if !options.lazy {
            match watcher.0.get() {
                Ok(value) => *watcher.0.value.borrow_mut() = value,
                Err(err) => {
                    watcher.teardown();
                    return Err(err);
                }
            }
        }
        Ok(watcher)
    }

    pub fn id(&self) -> WatcherId {
        self.0.id
    }

    pub fn kind(&self) -> WatcherKind {
        self.0.kind
    }

    pub fn expression(&self) -> &str {
        &self.0.expression
    }

    /// The last computed value.
    pub fn value(&self) -> Value {
        self.0.value.borrow().clone()
    }

    pub fn is_dirty(&self) -> bool {
        self.0.dirty.get()
    }

    pub fn is_active(&self) -> bool {
        self.0.active.get()
    }

    pub fn is_deep(&self) -> bool {
        self.0.deep
    }

    pub fn is_sync(&self) -> bool {
        self.0.sync
    }

    pub fn owner(&self) -> Option<Owner> {
        self.0.owner.upgrade()
    }

    /// Nodes subscribed after the last evaluation, in first-read order.
    pub fn deps(&self) -> Vec<DepId> {
        self.0.tracking.borrow().deps.to_vec()
    }

    pub fn state(&self) -> WatcherState {
        if !self.0.active.get() {
            WatcherState::Inactive
        } else if self.0.evaluating.get() {
            WatcherState::Evaluating
        } else if scheduler::is_pending(self.0.id) {
            WatcherState::Queued
        } else if self.0.dirty.get() {
            WatcherState::Dirty
        } else {
            WatcherState::Clean
        }
    }

    /// Invalidation entry point, as called by a notifying node.
    pub fn update(&self) {
        self.0.update();
    }

    /// Re-evaluate and fire the callback if the value changed, is an object,
    /// or the watcher is deep. Does nothing once torn down.
    pub fn run(&self) -> Result<(), ReactiveError> {
        self.0.run()
    }

    /// Evaluate now and clear the dirty flag.
    pub fn evaluate(&self) -> Result<(), ReactiveError> {
        let value = self.0.get()?;
        *self.0.value.borrow_mut() = value;
        self.0.dirty.set(false);
        Ok(())
    }

    /// Read a lazy watcher's value, evaluating it first if dirty. Inside
    /// another evaluation, the reader also picks up this watcher's
    /// dependencies.
    pub fn demand(&self) -> Result<Value, ReactiveError> {
        if self.0.dirty.get() {
            self.evaluate()?;
        }
        if ReactiveContext::is_active() {
            self.depend();
        }
        Ok(self.value())
    }

    /// Touch every subscribed node on behalf of the current target.
    pub fn depend(&self) {
        let deps = self.0.tracking.borrow().deps.clone();
        for id in deps {
            dep::depend(id);
        }
    }

    /// Unsubscribe from everything and deactivate. Idempotent.
    pub fn teardown(&self) {
        if !self.0.active.get() {
            return;
        }
        if let Some(owner) = self.0.owner.upgrade() {
            if !owner.is_being_destroyed() {
                owner.remove_watcher(self.0.id);
            }
        }
        let deps = {
            let mut tracking = self.0.tracking.borrow_mut();
            tracking.dep_ids.clear();
            std::mem::take(&mut tracking.deps)
        };
        for id in deps {
            Runtime::unsubscribe(id, self.0.id);
        }
        self.0.active.set(false);
        tracing::trace!(watcher = self.0.id.raw(), "teardown");
    }

    pub fn ptr_eq(&self, other: &Watcher) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watcher")
            .field("id", &self.0.id)
            .field("kind", &self.0.kind)
            .field("expression", &self.0.expression)
            .field("state", &self.state())
            .finish()
    }
}

impl WatcherInner {
    fn get(&self) -> Result<Value, ReactiveError> {
        let Some(owner) = self.owner.upgrade() else {
            return Ok(self.value.borrow().clone());
        };

        let target = self.this.upgrade().map(|this| this as Rc<dyn Subscriber>);
        self.evaluating.set(true);
        let result = {
            let _ctx = ReactiveContext::enter(target);
            let result = (self.getter)(&owner);
            if self.deep {
                if let Ok(value) = &result {
                    traverse(value);
                }
            }
            result
        };
        self.evaluating.set(false);
        self.cleanup_deps();

        match result {
            Err(err) if self.kind == WatcherKind::User => {
                let info = format!("getter for watcher \"{}\"", self.expression);
                error::handle_error(&err, Some(&owner), &info);
                Ok(Value::Undefined)
            }
            other => other,
        }
    }

    fn cleanup_deps(&self) {
        let stale: Vec<DepId> = {
            let mut tracking = self.tracking.borrow_mut();
            let Tracking {
                deps,
                dep_ids,
                new_deps,
                new_dep_ids,
            } = &mut *tracking;

            let stale = deps
                .iter()
                .filter(|id| !new_dep_ids.contains(*id))
                .copied()
                .collect();

            std::mem::swap(dep_ids, new_dep_ids);
            new_dep_ids.clear();
            std::mem::swap(deps, new_deps);
            new_deps.clear();
            stale
        };
        for id in stale {
            Runtime::unsubscribe(id, self.id);
        }
    }

    fn run(&self) -> Result<(), ReactiveError> {
        if !self.active.get() {
            return Ok(());
        }
        let value = self.get()?;
        let old = self.value.borrow().clone();
        if !value.strict_eq(&old) || value.is_object() || self.deep {
            *self.value.borrow_mut() = value.clone();
            self.fire(&value, &old)?;
        }
        Ok(())
    }

    fn fire(&self, value: &Value, old: &Value) -> Result<(), ReactiveError> {
        let (Some(callback), Some(owner)) = (&self.callback, self.owner.upgrade()) else {
            return Ok(());
        };
        match callback(&owner, value, old) {
            Err(err) if self.kind == WatcherKind::User => {
                let info = format!("callback for watcher \"{}\"", self.expression);
                error::handle_error(&err, Some(&owner), &info);
                Ok(())
            }
            other => other,
        }
    }

    fn describe(&self) -> WatcherSnapshot {
        WatcherSnapshot {
            id: self.id,
            kind: self.kind,
            expression: self.expression.clone(),
            deps: self.tracking.borrow().deps.to_vec(),
            dirty: self.dirty.get(),
            active: self.active.get(),
        }
    }
}

impl Subscriber for WatcherInner {
    fn id(&self) -> WatcherId {
        self.id
    }

    fn add_dep(&self, dep: DepId) {
        let subscribe = {
            let mut tracking = self.tracking.borrow_mut();
            if !tracking.new_dep_ids.insert(dep) {
                return;
            }
            tracking.new_deps.push(dep);
            !tracking.dep_ids.contains(&dep)
        };
        if subscribe {
            Runtime::subscribe(dep, self.id);
        }
    }

    fn update(&self) {
        if self.kind == WatcherKind::Computed {
            self.dirty.set(true);
        } else if self.sync {
            if let Err(err) = self.run() {
                let owner = self.owner.upgrade();
                error::handle_error(&err, owner.as_ref(), "sync watcher");
            }
        } else if let Some(this) = self.this.upgrade() {
            scheduler::queue_watcher(Watcher(this));
        }
    }

    fn snapshot(&self) -> Option<WatcherSnapshot> {
        Some(self.describe())
    }
}

impl Drop for WatcherInner {
    fn drop(&mut self) {
        let tracking = self.tracking.get_mut();
        Runtime::unregister(self.id, &tracking.deps);
    }
}

/// Build a getter for a dot-delimited path. Returns `None` when the path
/// contains anything other than identifier characters, `$` and dots.
pub(crate) fn parse_path(path: &str) -> Option<Getter> {
    let valid = path
        .chars()
        .all(|c| c.is_alphanumeric() || c == '_' || c == '$' || c == '.');
    if !valid {
        return None;
    }
    let segments: Vec<String> = path.split('.').map(str::to_string).collect();

    Some(Rc::new(move |owner: &Owner| -> Result<Value, ReactiveError> {
        let mut segments = segments.iter();
        let Some(first) = segments.next() else {
            return Ok(Value::Undefined);
        };
        let mut value = owner.get(first)?;
        for segment in segments {
            value = match &value {
                Value::Object(obj) => obj.get(segment),
                Value::Array(arr) if segment == "length" => Value::from(arr.len()),
                Value::Array(arr) => match segment.parse::<usize>() {
                    Ok(index) => arr.get(index),
                    Err(_) => Value::Undefined,
                },
                _ => return Ok(Value::Undefined),
            };
        }
        Ok(value)
    }))
}
