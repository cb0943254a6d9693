//! Owners
//!
//! An owner is the component instance the engine cooperates with. It holds
//! root data, computed values, explicit watches and at most one render
//! watcher, and it is the context errors are reported against.
//!
//! Owners form a tree. Parents hold their children; children point back at
//! their parent weakly. Watchers likewise point at their owner weakly, so
//! dropping the root owner releases the whole tree.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;

use crate::error::{self, ReactiveError};
use crate::graph::scheduler;

use super::context::ReactiveContext;
use super::object::ReactiveObject;
use super::observer::observe;
use super::subscriber::WatcherId;
use super::value::Value;
use super::watcher::{callback, WatchSource, Watcher, WatcherOptions};

/// Unique identifier for an owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OwnerId(u64);

impl OwnerId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Lifecycle points hooks can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleHook {
    Mounted,
    Updated,
    Activated,
    Deactivated,
    Destroyed,
}

impl fmt::Display for LifecycleHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Mounted => "mounted",
            Self::Updated => "updated",
            Self::Activated => "activated",
            Self::Deactivated => "deactivated",
            Self::Destroyed => "destroyed",
        };
        f.write_str(name)
    }
}

/// Options for [`Owner::watch`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchOptions {
    pub deep: bool,
    pub sync: bool,
    /// Invoke the callback once right away with `(value, undefined)`.
    pub immediate: bool,
}

type Hook = Rc<dyn Fn(&Owner) -> Result<(), ReactiveError>>;

/// Receives `(error, failing owner, info)`. Returning `false` stops the
/// error from propagating further.
pub type ErrorCapturedHandler = Rc<dyn Fn(&ReactiveError, &Owner, &str) -> bool>;

struct OwnerInner {
    id: OwnerId,
    name: String,
    parent: RefCell<Option<WeakOwner>>,
    children: RefCell<Vec<Owner>>,
    data: RefCell<Option<ReactiveObject>>,
    computed: RefCell<IndexMap<String, Watcher>>,
    watchers: RefCell<Vec<Watcher>>,
    render_watcher: RefCell<Option<Watcher>>,
    hooks: RefCell<HashMap<LifecycleHook, Vec<Hook>>>,
    error_captured: RefCell<Vec<ErrorCapturedHandler>>,
    mounted: Cell<bool>,
    being_destroyed: Cell<bool>,
    destroyed: Cell<bool>,
    /// `None` until the owner is first activated or deactivated.
    inactive: Cell<Option<bool>>,
    direct_inactive: Cell<bool>,
}

/// Handle to an owner. Clones share the same owner.
#[derive(Clone)]
pub struct Owner(Rc<OwnerInner>);

#[derive(Clone)]
pub(crate) struct WeakOwner(Weak<OwnerInner>);

impl WeakOwner {
    pub(crate) fn upgrade(&self) -> Option<Owner> {
        self.0.upgrade().map(Owner)
    }
}

impl Owner {
    pub fn new(name: impl Into<String>) -> Self {
        Self(Rc::new(OwnerInner {
            id: OwnerId::new(),
            name: name.into(),
            parent: RefCell::new(None),
            children: RefCell::new(Vec::new()),
            data: RefCell::new(None),
            computed: RefCell::new(IndexMap::new()),
            watchers: RefCell::new(Vec::new()),
            render_watcher: RefCell::new(None),
            hooks: RefCell::new(HashMap::new()),
            error_captured: RefCell::new(Vec::new()),
            mounted: Cell::new(false),
            being_destroyed: Cell::new(false),
            destroyed: Cell::new(false),
            inactive: Cell::new(None),
            direct_inactive: Cell::new(false),
        }))
    }

    /// Create an owner as the last child of `parent`.
    pub fn with_parent(parent: &Owner, name: impl Into<String>) -> Self {
        let child = Self::new(name);
        *child.0.parent.borrow_mut() = Some(parent.downgrade());
        parent.0.children.borrow_mut().push(child.clone());
        child
    }

    pub fn id(&self) -> OwnerId {
        self.0.id
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn parent(&self) -> Option<Owner> {
        self.0.parent.borrow().as_ref().and_then(WeakOwner::upgrade)
    }

    pub fn children(&self) -> Vec<Owner> {
        self.0.children.borrow().clone()
    }

    pub(crate) fn downgrade(&self) -> WeakOwner {
        WeakOwner(Rc::downgrade(&self.0))
    }

    pub fn ptr_eq(&self, other: &Owner) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Install `data` as this owner's root data, instrumenting it as root.
    pub fn init_data(&self, data: ReactiveObject) {
        observe(&Value::Object(data.clone()), true);
        *self.0.data.borrow_mut() = Some(data);
    }

    pub fn data(&self) -> Option<ReactiveObject> {
        self.0.data.borrow().clone()
    }

    /// Read `key`: computed values first, then root data.
    pub fn get(&self, key: &str) -> Result<Value, ReactiveError> {
        if let Some(watcher) = self.computed_watcher(key) {
            return watcher.demand();
        }
        Ok(self.data().map(|d| d.get(key)).unwrap_or_default())
    }

    /// Write `key` on root data. Computed values have no setter.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<(), ReactiveError> {
        if self.0.computed.borrow().contains_key(key) {
            let err = ReactiveError::ReadOnlyComputed(key.to_string());
            error::warn(&err.to_string(), Some(self));
            return Err(err);
        }
        match self.data() {
            Some(data) => data.set(key, value),
            // The key has to exist before the object becomes root data.
            None => self.init_data(ReactiveObject::new().with(key, value)),
        }
        Ok(())
    }

    /// Define a computed value: a lazy watcher re-evaluated on demand after
    /// any of its inputs changed.
    pub fn define_computed(
        &self,
        name: &str,
        getter: impl Fn(&Owner) -> Result<Value, ReactiveError> + 'static,
    ) -> Result<Watcher, ReactiveError> {
        let in_data = self.data().map(|d| d.has(name)).unwrap_or(false);
        if in_data || self.0.computed.borrow().contains_key(name) {
            let err = ReactiveError::ComputedConflict(name.to_string());
            error::warn(&err.to_string(), Some(self));
            return Err(err);
        }
        let options = WatcherOptions {
            lazy: true,
            ..Default::default()
        };
        let watcher = Watcher::new(self, WatchSource::named(name, getter), None, options, false)?;
        self.0
            .computed
            .borrow_mut()
            .insert(name.to_string(), watcher.clone());
        Ok(watcher)
    }

    /// Read a computed value.
    pub fn computed(&self, name: &str) -> Result<Value, ReactiveError> {
        match self.computed_watcher(name) {
            Some(watcher) => watcher.demand(),
            None => Ok(Value::Undefined),
        }
    }

    fn computed_watcher(&self, name: &str) -> Option<Watcher> {
        self.0.computed.borrow().get(name).cloned()
    }

    /// Watch `source` and call `cb(new, old)` after it changes.
    pub fn watch(
        &self,
        source: impl Into<WatchSource>,
        cb: impl Fn(&Owner, &Value, &Value) -> Result<(), ReactiveError> + 'static,
        options: WatchOptions,
    ) -> Result<Watcher, ReactiveError> {
        let cb = callback(cb);
        let watcher = Watcher::new(
            self,
            source,
            Some(cb.clone()),
            WatcherOptions {
                deep: options.deep,
                sync: options.sync,
                user: true,
                lazy: false,
            },
            false,
        )?;
        if options.immediate {
            if let Err(err) = cb(self, &watcher.value(), &Value::Undefined) {
                let info = format!("callback for immediate watcher \"{}\"", watcher.expression());
                error::handle_error(&err, Some(self), &info);
            }
        }
        Ok(watcher)
    }

    /// Mount with a render procedure and a patch procedure.
    ///
    /// The render watcher's getter is `render`; every re-run hands the old
    /// and new output to `patch(old, new)`. The initial output is patched
    /// against `undefined`, then `Mounted` hooks fire.
    pub fn mount(
        &self,
        render: impl Fn(&Owner) -> Result<Value, ReactiveError> + 'static,
        patch: impl Fn(&Owner, &Value, &Value) -> Result<(), ReactiveError> + 'static,
    ) -> Result<Watcher, ReactiveError> {
        let patch = callback(move |owner, new, old| patch(owner, old, new));
        let watcher = Watcher::new(
            self,
            WatchSource::named("render", render),
            Some(patch.clone()),
            WatcherOptions::default(),
            true,
        )?;
        patch(self, &watcher.value(), &Value::Undefined)?;
        self.0.mounted.set(true);
        self.call_hook(LifecycleHook::Mounted);
        Ok(watcher)
    }

    /// Queue a re-render.
    pub fn force_update(&self) {
        if let Some(watcher) = self.render_watcher() {
            watcher.update();
        }
    }

    pub(crate) fn register_watcher(&self, watcher: Watcher, is_render: bool) {
        if is_render {
            *self.0.render_watcher.borrow_mut() = Some(watcher.clone());
        }
        self.0.watchers.borrow_mut().push(watcher);
    }

    pub(crate) fn remove_watcher(&self, id: WatcherId) {
        self.0.watchers.borrow_mut().retain(|w| w.id() != id);
        let mut render = self.0.render_watcher.borrow_mut();
        if render.as_ref().map(|w| w.id() == id).unwrap_or(false) {
            *render = None;
        }
    }

    pub fn render_watcher(&self) -> Option<Watcher> {
        self.0.render_watcher.borrow().clone()
    }

    pub fn render_watcher_id(&self) -> Option<WatcherId> {
        self.0.render_watcher.borrow().as_ref().map(Watcher::id)
    }

    /// Every live watcher owned here, in creation order.
    pub fn watchers(&self) -> Vec<Watcher> {
        self.0.watchers.borrow().clone()
    }

    pub fn on(&self, hook: LifecycleHook, f: impl Fn(&Owner) -> Result<(), ReactiveError> + 'static) {
        self.0
            .hooks
            .borrow_mut()
            .entry(hook)
            .or_default()
            .push(Rc::new(f));
    }

    /// Run every handler for `hook` with tracking suspended.
    pub fn call_hook(&self, hook: LifecycleHook) {
        let handlers = self.0.hooks.borrow().get(&hook).cloned().unwrap_or_default();
        if handlers.is_empty() {
            return;
        }
        let _ctx = ReactiveContext::untracked();
        for handler in handlers {
            if let Err(err) = handler(self) {
                error::handle_error(&err, Some(self), &format!("{hook} hook"));
            }
        }
    }

    pub fn on_error_captured(&self, f: impl Fn(&ReactiveError, &Owner, &str) -> bool + 'static) {
        self.0.error_captured.borrow_mut().push(Rc::new(f));
    }

    pub fn error_captured_handlers(&self) -> Vec<ErrorCapturedHandler> {
        self.0.error_captured.borrow().clone()
    }

    /// Mark this subtree active again and fire `Activated` hooks. A direct
    /// activation inside a still inactive ancestor has no effect.
    pub fn activate(&self, direct: bool) {
        if direct {
            self.0.direct_inactive.set(false);
            if self.in_inactive_tree() {
                return;
            }
        } else if self.0.direct_inactive.get() {
            return;
        }
        if self.0.inactive.get() != Some(false) {
            self.0.inactive.set(Some(false));
            for child in self.children() {
                child.activate(false);
            }
            self.call_hook(LifecycleHook::Activated);
        }
    }

    /// Mark this subtree inactive and fire `Deactivated` hooks.
    pub fn deactivate(&self, direct: bool) {
        if direct {
            self.0.direct_inactive.set(true);
            if self.in_inactive_tree() {
                return;
            }
        }
        if self.0.inactive.get() != Some(true) {
            self.0.inactive.set(Some(true));
            for child in self.children() {
                child.deactivate(false);
            }
            self.call_hook(LifecycleHook::Deactivated);
        }
    }

    fn in_inactive_tree(&self) -> bool {
        let mut current = self.parent();
        while let Some(owner) = current {
            if owner.0.inactive.get() == Some(true) {
                return true;
            }
            current = owner.parent();
        }
        false
    }

    pub fn is_inactive(&self) -> bool {
        self.0.inactive.get() == Some(true)
    }

    pub(crate) fn set_inactive(&self, inactive: bool) {
        self.0.inactive.set(Some(inactive));
    }

    /// Queue this owner to be activated after the current flush.
    pub fn queue_activation(&self) {
        scheduler::queue_activated_component(self.clone());
    }

    pub fn is_mounted(&self) -> bool {
        self.0.mounted.get()
    }

    pub fn is_being_destroyed(&self) -> bool {
        self.0.being_destroyed.get()
    }

    pub fn is_destroyed(&self) -> bool {
        self.0.destroyed.get()
    }

    /// Tear down every watcher, release root data, destroy children and fire
    /// `Destroyed` hooks. Idempotent.
    pub fn destroy(&self) {
        if self.0.being_destroyed.get() {
            return;
        }
        self.0.being_destroyed.set(true);

        if let Some(parent) = self.parent() {
            if !parent.is_being_destroyed() {
                parent.0.children.borrow_mut().retain(|c| !c.ptr_eq(self));
            }
        }

        let watchers = std::mem::take(&mut *self.0.watchers.borrow_mut());
        for watcher in &watchers {
            watcher.teardown();
        }
        self.0.render_watcher.borrow_mut().take();
        self.0.computed.borrow_mut().clear();

        if let Some(ob) = self.data().and_then(|d| d.observer()) {
            ob.remove_root();
        }

        let children = std::mem::take(&mut *self.0.children.borrow_mut());
        for child in children {
            child.destroy();
        }

        self.0.destroyed.set(true);
        tracing::debug!(owner = self.0.id.raw(), name = %self.0.name, "destroyed");
        self.call_hook(LifecycleHook::Destroyed);
    }
}

impl fmt::Debug for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Owner")
            .field("id", &self.0.id)
            .field("name", &self.0.name)
            .field("mounted", &self.0.mounted.get())
            .field("destroyed", &self.0.destroyed.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::run_microtasks;

    fn counter() -> (Rc<Cell<usize>>, Rc<Cell<usize>>) {
        let c = Rc::new(Cell::new(0));
        (c.clone(), c)
    }

    #[test]
    fn get_prefers_computed_then_data() {
        let owner = Owner::new("root");
        owner.init_data(ReactiveObject::new().with("a", 2));
        owner
            .define_computed("double", |o| {
                Ok(Value::from(o.get("a")?.as_f64().unwrap_or(0.0) * 2.0))
            })
            .unwrap();

        assert_eq!(owner.get("a").unwrap(), Value::from(2));
        assert_eq!(owner.get("double").unwrap(), Value::from(4));
        assert_eq!(owner.computed("double").unwrap(), Value::from(4));
        assert_eq!(owner.get("missing").unwrap(), Value::Undefined);

        owner.set("a", 5).unwrap();
        assert_eq!(owner.get("double").unwrap(), Value::from(10));
    }

    #[test]
    fn computed_names_must_be_unique() {
        let owner = Owner::new("root");
        owner.init_data(ReactiveObject::new().with("a", 1));

        assert!(matches!(
            owner.define_computed("a", |_| Ok(Value::Null)),
            Err(ReactiveError::ComputedConflict(_))
        ));
        owner.define_computed("b", |_| Ok(Value::Null)).unwrap();
        assert!(matches!(
            owner.define_computed("b", |_| Ok(Value::Null)),
            Err(ReactiveError::ComputedConflict(_))
        ));
        assert!(matches!(
            owner.set("b", 1),
            Err(ReactiveError::ReadOnlyComputed(_))
        ));
    }

    #[test]
    fn computed_propagates_dependencies_to_readers() {
        let owner = Owner::new("root");
        owner.init_data(ReactiveObject::new().with("a", 1));
        owner
            .define_computed("plus_one", |o| {
                Ok(Value::from(o.get("a")?.as_f64().unwrap_or(0.0) + 1.0))
            })
            .unwrap();

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        owner
            .watch(
                "plus_one",
                move |_, new, _| {
                    sink.borrow_mut().push(new.clone());
                    Ok(())
                },
                WatchOptions::default(),
            )
            .unwrap();

        owner.set("a", 10).unwrap();
        run_microtasks();
        assert_eq!(*seen.borrow(), vec![Value::from(11)]);
    }

    #[test]
    fn set_without_data_declares_a_reactive_key() {
        let warnings = Rc::new(Cell::new(0));
        let sink = warnings.clone();
        crate::config::set_warn_handler(move |_, _| sink.set(sink.get() + 1));
        crate::config::configure(|c| c.dev_diagnostics = true);

        let owner = Owner::new("root");
        owner.set("x", 1).unwrap();
        let data = owner.data().unwrap();
        assert!(data.is_reactive("x"));
        assert_eq!(data.observer().unwrap().vm_count(), 1);

        let (fired, count) = counter();
        owner
            .watch(
                "x",
                move |_, _, _| {
                    count.set(count.get() + 1);
                    Ok(())
                },
                WatchOptions::default(),
            )
            .unwrap();

        owner.set("x", 2).unwrap();
        run_microtasks();
        assert_eq!(fired.get(), 1);
        assert_eq!(owner.get("x").unwrap(), Value::from(2));
        assert_eq!(warnings.get(), 0);
    }

    #[test]
    fn immediate_watch_fires_once_up_front() {
        let owner = Owner::new("root");
        owner.init_data(ReactiveObject::new().with("a", 1));

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        owner
            .watch(
                "a",
                move |_, new, old| {
                    sink.borrow_mut().push((new.clone(), old.clone()));
                    Ok(())
                },
                WatchOptions {
                    immediate: true,
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(*seen.borrow(), vec![(Value::from(1), Value::Undefined)]);
    }

    #[test]
    fn immediate_errors_are_labelled() {
        let infos = Rc::new(RefCell::new(Vec::new()));
        let sink = infos.clone();
        crate::config::set_error_handler(move |_, _, info| sink.borrow_mut().push(info.to_string()));

        let owner = Owner::new("root");
        owner.init_data(ReactiveObject::new().with("a", 1));
        owner
            .watch(
                "a",
                |_, _, _| Err(ReactiveError::thrown("bad")),
                WatchOptions {
                    immediate: true,
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(
            *infos.borrow(),
            vec!["callback for immediate watcher \"a\"".to_string()]
        );
    }

    #[test]
    fn mount_patches_and_fires_hooks() {
        let owner = Owner::new("root");
        let data = ReactiveObject::new().with("msg", "hi");
        owner.init_data(data.clone());

        let (mounted, mounted_count) = counter();
        owner.on(LifecycleHook::Mounted, move |_| {
            mounted.set(mounted.get() + 1);
            Ok(())
        });
        let (updated, updated_count) = counter();
        owner.on(LifecycleHook::Updated, move |_| {
            updated.set(updated.get() + 1);
            Ok(())
        });

        let patches = Rc::new(RefCell::new(Vec::new()));
        let sink = patches.clone();
        owner
            .mount(
                |o| o.get("msg"),
                move |_, old, new| {
                    sink.borrow_mut().push((old.clone(), new.clone()));
                    Ok(())
                },
            )
            .unwrap();

        assert!(owner.is_mounted());
        assert_eq!(mounted_count.get(), 1);
        assert_eq!(*patches.borrow(), vec![(Value::Undefined, Value::from("hi"))]);

        data.set("msg", "bye");
        run_microtasks();
        assert_eq!(
            patches.borrow().last().cloned(),
            Some((Value::from("hi"), Value::from("bye")))
        );
        assert_eq!(updated_count.get(), 1);
    }

    #[test]
    fn force_update_queues_the_render_watcher() {
        let owner = Owner::new("root");
        let (renders, render_count) = counter();
        owner
            .mount(
                move |_| {
                    renders.set(renders.get() + 1);
                    Ok(Value::from(super::super::Opaque::new("tree")))
                },
                |_, _, _| Ok(()),
            )
            .unwrap();

        owner.force_update();
        owner.force_update();
        run_microtasks();
        assert_eq!(render_count.get(), 2);
    }

    #[test]
    fn hook_errors_are_reported_with_hook_name() {
        let infos = Rc::new(RefCell::new(Vec::new()));
        let sink = infos.clone();
        crate::config::set_error_handler(move |_, _, info| sink.borrow_mut().push(info.to_string()));

        let owner = Owner::new("root");
        owner.on(LifecycleHook::Destroyed, |_| Err(ReactiveError::thrown("x")));
        owner.destroy();

        assert_eq!(*infos.borrow(), vec!["destroyed hook".to_string()]);
    }

    #[test]
    fn activation_respects_direct_inactive_ancestors() {
        let parent = Owner::new("parent");
        let child = Owner::with_parent(&parent, "child");

        let (activated, activated_count) = counter();
        child.on(LifecycleHook::Activated, move |_| {
            activated.set(activated.get() + 1);
            Ok(())
        });
        let (deactivated, deactivated_count) = counter();
        child.on(LifecycleHook::Deactivated, move |_| {
            deactivated.set(deactivated.get() + 1);
            Ok(())
        });

        parent.deactivate(true);
        assert!(child.is_inactive());
        assert_eq!(deactivated_count.get(), 1);

        // Still inside an inactive parent.
        child.activate(true);
        assert_eq!(activated_count.get(), 0);

        parent.activate(true);
        assert!(!child.is_inactive());
        assert_eq!(activated_count.get(), 1);
    }

    #[test]
    fn destroy_tears_everything_down() {
        let parent = Owner::new("parent");
        let data = ReactiveObject::new().with("a", 1);
        parent.init_data(data.clone());
        let child = Owner::with_parent(&parent, "child");

        let (fired, fired_count) = counter();
        let w = parent
            .watch(
                "a",
                move |_, _, _| {
                    fired.set(fired.get() + 1);
                    Ok(())
                },
                WatchOptions::default(),
            )
            .unwrap();

        let ob = data.observer().unwrap();
        assert_eq!(ob.vm_count(), 1);

        parent.destroy();
        parent.destroy();

        assert!(parent.is_destroyed());
        assert!(child.is_destroyed());
        assert!(!w.is_active());
        assert!(parent.watchers().is_empty());
        assert_eq!(ob.vm_count(), 0);

        data.set("a", 2);
        run_microtasks();
        assert_eq!(fired_count.get(), 0);
    }

    #[test]
    fn destroying_a_child_detaches_it() {
        let parent = Owner::new("parent");
        let child = Owner::with_parent(&parent, "child");
        assert_eq!(parent.children().len(), 1);
        assert!(child.parent().unwrap().ptr_eq(&parent));

        child.destroy();
        assert!(parent.children().is_empty());
    }
}
