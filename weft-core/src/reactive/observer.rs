//! Reactive Instrumentation
//!
//! An [`Observer`] is the metadata attached to every instrumented container:
//! the container's collection node (structural changes) and the number of
//! owners using it as root data.
//!
//! [`observe`] instruments a container in place. Objects get an accessor per
//! configurable key; arrays get their elements instrumented and their
//! mutators start notifying. Instrumentation is idempotent: observing an
//! instrumented container returns the observer it already has.
//!
//! Keys added after instrumentation cannot be intercepted by an accessor that
//! does not exist yet, so they go through [`set_property`] and
//! [`delete_property`].

use std::cell::Cell;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use crate::error::{self, ReactiveError};
use crate::graph::DepId;

use super::array::ReactiveArray;
use super::dep::Dep;
use super::object::ReactiveObject;
use super::value::Value;

thread_local! {
    static OBSERVING: Cell<bool> = const { Cell::new(true) };
}

/// Enable or disable instrumentation of containers that are not yet
/// instrumented. Already instrumented containers are unaffected.
pub fn set_observing(enabled: bool) {
    OBSERVING.with(|o| o.set(enabled));
}

pub fn is_observing() -> bool {
    OBSERVING.with(Cell::get)
}

/// Instrumentation attached to a container.
pub struct Observer {
    dep: Dep,
    vm_count: Cell<usize>,
}

impl Observer {
    fn new() -> Rc<Self> {
        Rc::new(Self {
            dep: Dep::new(),
            vm_count: Cell::new(0),
        })
    }

    /// The collection node of the container.
    pub fn dep(&self) -> &Dep {
        &self.dep
    }

    pub fn dep_id(&self) -> DepId {
        self.dep.id()
    }

    /// Number of owners using the container as root data.
    pub fn vm_count(&self) -> usize {
        self.vm_count.get()
    }

    pub(crate) fn add_root(&self) {
        self.vm_count.set(self.vm_count.get() + 1);
    }

    pub(crate) fn remove_root(&self) {
        self.vm_count.set(self.vm_count.get().saturating_sub(1));
    }

    pub fn depend(&self) {
        self.dep.depend();
    }

    pub fn notify(&self) {
        self.dep.notify();
    }
}

impl fmt::Debug for Observer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("dep", &self.dep.id())
            .field("vm_count", &self.vm_count())
            .finish()
    }
}

/// Instrument `value` if it is a container, returning its observer.
///
/// Primitives, opaque values and non-extensible containers are left alone.
/// With `as_root`, the container's root-owner count is incremented.
pub fn observe(value: &Value, as_root: bool) -> Option<Rc<Observer>> {
    let ob = match value {
        Value::Object(obj) => match obj.observer() {
            Some(ob) => Some(ob),
            None if is_observing() && obj.is_extensible() => Some(observe_object(obj)),
            None => None,
        },
        Value::Array(arr) => match arr.observer() {
            Some(ob) => Some(ob),
            None if is_observing() && arr.is_extensible() => Some(observe_array(arr)),
            None => None,
        },
        _ => return None,
    };

    if as_root {
        if let Some(ob) = &ob {
            ob.add_root();
        }
    }
    ob
}

/// Instrument a value that is not owned as root data.
pub fn wrap(value: &Value) -> Option<Rc<Observer>> {
    observe(value, false)
}

fn observe_object(obj: &ReactiveObject) -> Rc<Observer> {
    let ob = Observer::new();
    // Attach first so self-referencing data terminates.
    obj.attach_observer(ob.clone());
    for key in obj.keys() {
        obj.define_reactive(&key, false);
    }
    ob
}

fn observe_array(arr: &ReactiveArray) -> Rc<Observer> {
    let ob = Observer::new();
    arr.attach_observer(ob.clone());
    observe_items(&arr.to_vec());
    ob
}

pub(crate) fn observe_items(items: &[Value]) {
    for item in items {
        observe(item, false);
    }
}

/// Install a reactive accessor for `key` on `obj`.
pub fn define_reactive(obj: &ReactiveObject, key: &str, shallow: bool) {
    obj.define_reactive(key, shallow);
}

/// Touch the collection node of every instrumented element, recursing into
/// nested arrays. Array elements have no accessors of their own, so this is
/// how reads of an array's contents are tracked.
pub(crate) fn depend_array(arr: &ReactiveArray) {
    let mut seen = HashSet::new();
    depend_array_inner(arr, &mut seen);
}

fn depend_array_inner(arr: &ReactiveArray, seen: &mut HashSet<usize>) {
    if !seen.insert(arr.addr()) {
        return;
    }
    for item in arr.to_vec() {
        if let Some(ob) = item.observer() {
            ob.depend();
        }
        if let Value::Array(nested) = &item {
            depend_array_inner(nested, seen);
        }
    }
}

/// A property key: an index for arrays, a name for objects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Key {
    Index(usize),
    Name(String),
}

impl Key {
    fn name(&self) -> String {
        match self {
            Key::Index(i) => i.to_string(),
            Key::Name(n) => n.clone(),
        }
    }
}

impl From<usize> for Key {
    fn from(i: usize) -> Self {
        Key::Index(i)
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Name(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Name(s)
    }
}

fn misuse(err: ReactiveError) -> Result<(), ReactiveError> {
    error::warn(&err.to_string(), None);
    Err(err)
}

/// Set `key` on a container, adding a reactive key when it is new.
///
/// On arrays, an index write goes through `splice` (padding the array when
/// the index is past the end). On objects, existing keys are written through
/// their accessor; new keys get an accessor and the collection node is
/// notified. Root data refuses new keys.
///
/// Misuse is a no-op that returns the error and emits a development
/// diagnostic.
pub fn set_property(target: &Value, key: impl Into<Key>, value: impl Into<Value>) -> Result<(), ReactiveError> {
    let key = key.into();
    let value = value.into();
    match target {
        Value::Array(arr) => match key {
            Key::Index(index) => {
                arr.pad_to(index);
                arr.splice(index, 1, vec![value]);
                Ok(())
            }
            Key::Name(name) => misuse(ReactiveError::InvalidKey {
                key: name,
                container: "an array",
            }),
        },
        Value::Object(obj) => {
            let name = key.name();
            if obj.has(&name) {
                obj.set(&name, value);
                return Ok(());
            }
            let ob = obj.observer();
            if ob.as_ref().map(|ob| ob.vm_count() > 0).unwrap_or(false) {
                return misuse(ReactiveError::RootDataMutation {
                    action: "adding",
                    key: name,
                });
            }
            match ob {
                None => obj.insert_plain(name, value),
                Some(ob) => {
                    obj.define_reactive_with(&name, value, false);
                    ob.notify();
                }
            }
            Ok(())
        }
        other => misuse(ReactiveError::NotAContainer {
            action: "set",
            target: format!("{other:?}"),
        }),
    }
}

/// Remove `key` from a container and notify its collection node.
///
/// Absent keys are a silent no-op. Root data refuses deletion.
pub fn delete_property(target: &Value, key: impl Into<Key>) -> Result<(), ReactiveError> {
    let key = key.into();
    match target {
        Value::Array(arr) => match key {
            Key::Index(index) => {
                arr.splice(index, 1, Vec::new());
                Ok(())
            }
            Key::Name(name) => misuse(ReactiveError::InvalidKey {
                key: name,
                container: "an array",
            }),
        },
        Value::Object(obj) => {
            let name = key.name();
            let ob = obj.observer();
            if ob.as_ref().map(|ob| ob.vm_count() > 0).unwrap_or(false) {
                return misuse(ReactiveError::RootDataMutation {
                    action: "deleting",
                    key: name,
                });
            }
            if !obj.remove(&name) {
                return Ok(());
            }
            if let Some(ob) = ob {
                ob.notify();
            }
            Ok(())
        }
        other => misuse(ReactiveError::NotAContainer {
            action: "delete",
            target: format!("{other:?}"),
        }),
    }
}
