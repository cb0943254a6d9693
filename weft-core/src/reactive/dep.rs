//! Dependency Handles
//!
//! A [`Dep`] owns one node in the runtime arena. One is created for every
//! instrumented property and one for every instrumented container.

use std::fmt;

use crate::graph::DepId;

use super::context::ReactiveContext;
use super::runtime::Runtime;
use super::subscriber::WatcherId;

/// Owning handle to a dependency node. Dropping it releases the node.
pub struct Dep {
    id: DepId,
}

impl Dep {
    pub fn new() -> Self {
        Self {
            id: Runtime::create_dep(),
        }
    }

    pub fn id(&self) -> DepId {
        self.id
    }

    /// Register this node with the computation currently evaluating, if any.
    pub fn depend(&self) {
        depend(self.id);
    }

    /// Invoke every subscriber's invalidation entry point.
    pub fn notify(&self) {
        Runtime::notify(self.id);
    }

    pub fn subscribe(&self, subscriber: WatcherId) {
        Runtime::subscribe(self.id, subscriber);
    }

    pub fn unsubscribe(&self, subscriber: WatcherId) {
        Runtime::unsubscribe(self.id, subscriber);
    }

    pub fn subscribers(&self) -> Vec<WatcherId> {
        Runtime::subscribers(self.id)
    }

    pub fn subscriber_count(&self) -> usize {
        Runtime::subscriber_count(self.id)
    }
}

impl Default for Dep {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Dep {
    fn drop(&mut self) {
        Runtime::release_dep(self.id);
    }
}

impl fmt::Debug for Dep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dep")
            .field("id", &self.id)
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

/// Touch `dep` on behalf of the current evaluation target.
///
/// The target decides whether this becomes a subscription; nothing is added
/// to the node here.
pub fn depend(dep: DepId) {
    if let Some(target) = ReactiveContext::current() {
        target.add_dep(dep);
    }
}

/// Notify every subscriber of `dep`.
pub fn notify(dep: DepId) {
    Runtime::notify(dep);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Subscriber;
    use std::cell::{Cell, RefCell};
    use std::rc::{Rc, Weak};

    struct Recorder {
        id: WatcherId,
        touched: RefCell<Vec<DepId>>,
        updates: Cell<usize>,
        on_update: RefCell<Option<Box<dyn Fn()>>>,
    }

    impl Recorder {
        fn new() -> Rc<Self> {
            let rec = Rc::new(Self {
                id: WatcherId::new(),
                touched: RefCell::new(Vec::new()),
                updates: Cell::new(0),
                on_update: RefCell::new(None),
            });
            Runtime::register(rec.id, Rc::downgrade(&rec) as Weak<dyn Subscriber>);
            rec
        }
    }

    impl Subscriber for Recorder {
        fn id(&self) -> WatcherId {
            self.id
        }
        fn add_dep(&self, dep: DepId) {
            self.touched.borrow_mut().push(dep);
        }
        fn update(&self) {
            self.updates.set(self.updates.get() + 1);
            if let Some(f) = self.on_update.borrow().as_ref() {
                f();
            }
        }
    }

    #[test]
    fn depend_reports_to_current_target_only() {
        let dep = Dep::new();
        let rec = Recorder::new();

        dep.depend();
        assert!(rec.touched.borrow().is_empty());

        {
            let _ctx = ReactiveContext::enter(Some(rec.clone() as Rc<dyn Subscriber>));
            dep.depend();
        }

        assert_eq!(*rec.touched.borrow(), vec![dep.id()]);
        // Touching does not subscribe by itself.
        assert_eq!(dep.subscriber_count(), 0);
    }

    #[test]
    fn subscribe_is_idempotent() {
        let dep = Dep::new();
        let rec = Recorder::new();

        dep.subscribe(rec.id);
        dep.subscribe(rec.id);
        assert_eq!(dep.subscriber_count(), 1);

        dep.unsubscribe(rec.id);
        dep.unsubscribe(rec.id);
        assert_eq!(dep.subscriber_count(), 0);
    }

    #[test]
    fn notify_iterates_a_snapshot() {
        let dep = Rc::new(Dep::new());
        let first = Recorder::new();
        let second = Recorder::new();
        let late = Recorder::new();

        dep.subscribe(first.id);
        dep.subscribe(second.id);

        // The first subscriber rewires the list while being notified.
        let dep_handle = dep.clone();
        let (second_id, late_id) = (second.id, late.id);
        *first.on_update.borrow_mut() = Some(Box::new(move || {
            dep_handle.unsubscribe(second_id);
            dep_handle.subscribe(late_id);
        }));

        dep.notify();

        assert_eq!(first.updates.get(), 1);
        assert_eq!(second.updates.get(), 1);
        assert_eq!(late.updates.get(), 0);
        assert_eq!(dep.subscribers(), vec![first.id, late.id]);
    }

    #[test]
    fn notify_by_id_reaches_subscribers() {
        let dep = Dep::new();
        let rec = Recorder::new();
        dep.subscribe(rec.id);

        notify(dep.id());
        assert_eq!(rec.updates.get(), 1);

        drop(dep);
        notify(DepId::new());
        assert_eq!(rec.updates.get(), 1);
    }

    #[test]
    fn dropping_releases_the_node() {
        let dep = Dep::new();
        let id = dep.id();
        assert!(Runtime::has_dep(id));
        drop(dep);
        assert!(!Runtime::has_dep(id));
    }
}
