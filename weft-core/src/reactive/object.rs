//! Reactive Objects
//!
//! A keyed container. Before instrumentation every property is plain. Once the
//! object is observed, each configurable property carries an accessor: a
//! dependency node plus the instrumentation of the value it holds.
//!
//! Reads through [`ReactiveObject::get`] touch the property's node (and the
//! held container's collection node) when a computation is evaluating. Writes
//! through [`ReactiveObject::set`] notify the node unless the value is the
//! same.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::error::{self, ReactiveError};
use crate::graph::DepId;

use super::context::ReactiveContext;
use super::dep::{self, Dep};
use super::observer::{depend_array, observe, Observer};
use super::value::Value;

pub(crate) struct Property {
    value: Value,
    configurable: bool,
    accessor: Option<Accessor>,
}

struct Accessor {
    dep: Dep,
    /// Instrumentation of the held value, refreshed on every write.
    child: Option<Rc<Observer>>,
    shallow: bool,
}

impl Property {
    fn plain(value: Value) -> Self {
        Self {
            value,
            configurable: true,
            accessor: None,
        }
    }
}

struct ObjectInner {
    props: RefCell<IndexMap<String, Property>>,
    observer: RefCell<Option<Rc<Observer>>>,
    extensible: Cell<bool>,
}

/// A shared, keyed container.
#[derive(Clone)]
pub struct ReactiveObject(Rc<ObjectInner>);

impl ReactiveObject {
    pub fn new() -> Self {
        Self(Rc::new(ObjectInner {
            props: RefCell::new(IndexMap::new()),
            observer: RefCell::new(None),
            extensible: Cell::new(true),
        }))
    }

    /// Builder-style plain insert.
    pub fn with(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert_plain(key.into(), value.into());
        self
    }

    /// Define a plain property, optionally non-configurable. Non-configurable
    /// properties are never given accessors.
    pub fn define_property(&self, key: impl Into<String>, value: impl Into<Value>, configurable: bool) {
        self.0.props.borrow_mut().insert(
            key.into(),
            Property {
                value: value.into(),
                configurable,
                accessor: None,
            },
        );
    }

    /// Read a property, recording the read for the evaluating computation.
    pub fn get(&self, key: &str) -> Value {
        let (value, dep, child) = {
            let props = self.0.props.borrow();
            let Some(prop) = props.get(key) else {
                return Value::Undefined;
            };
            match &prop.accessor {
                Some(acc) => (prop.value.clone(), acc.dep.id(), acc.child.clone()),
                None => return prop.value.clone(),
            }
        };

        if ReactiveContext::is_active() {
            dep::depend(dep);
            if let Some(child) = child {
                child.depend();
                if let Value::Array(items) = &value {
                    depend_array(items);
                }
            }
        }
        value
    }

    /// Read a property without recording anything.
    pub fn get_untracked(&self, key: &str) -> Value {
        self.0
            .props
            .borrow()
            .get(key)
            .map(|p| p.value.clone())
            .unwrap_or_default()
    }

    /// Write a property.
    ///
    /// Instrumented properties compare the new value with the old one and
    /// notify on change. A key the object does not have yet is stored as a
    /// plain, non-reactive property: use
    /// [`set_property`](super::observer::set_property) to add reactive keys.
    pub fn set(&self, key: &str, value: impl Into<Value>) {
        let value = value.into();
        if !self.has(key) {
            self.add_unknown_key(key, value);
            return;
        }
        let (dep, shallow) = {
            let mut props = self.0.props.borrow_mut();
            let Some(prop) = props.get_mut(key) else {
                return;
            };
            let Some((dep, shallow)) = prop.accessor.as_ref().map(|a| (a.dep.id(), a.shallow)) else {
                prop.value = value;
                return;
            };
            if prop.value.same_value_for_write(&value) {
                return;
            }
            prop.value = value.clone();
            (dep, shallow)
        };

        let child = if shallow { None } else { observe(&value, false) };
        if let Some(acc) = self
            .0
            .props
            .borrow_mut()
            .get_mut(key)
            .and_then(|p| p.accessor.as_mut())
        {
            acc.child = child;
        }
        dep::notify(dep);
    }

    fn add_unknown_key(&self, key: &str, value: Value) {
        if self.observer().map(|ob| ob.vm_count() > 0).unwrap_or(false) {
            let err = ReactiveError::RootDataMutation {
                action: "adding",
                key: key.to_string(),
            };
            error::warn(&err.to_string(), None);
        }
        self.insert_plain(key.to_string(), value);
    }

    pub(crate) fn insert_plain(&self, key: String, value: Value) {
        if !self.is_extensible() {
            return;
        }
        self.0.props.borrow_mut().insert(key, Property::plain(value));
    }

    /// Install an accessor for `key`, instrumenting the held value unless
    /// `shallow`. Missing keys are created as `undefined`; non-configurable
    /// keys are left alone.
    pub fn define_reactive(&self, key: &str, shallow: bool) {
        let value = {
            let props = self.0.props.borrow();
            match props.get(key) {
                Some(prop) if !prop.configurable => return,
                Some(prop) => prop.value.clone(),
                None => Value::Undefined,
            }
        };

        let child = if shallow { None } else { observe(&value, false) };

        let mut props = self.0.props.borrow_mut();
        let prop = props
            .entry(key.to_string())
            .or_insert_with(|| Property::plain(Value::Undefined));
        prop.accessor = Some(Accessor {
            dep: Dep::new(),
            child,
            shallow,
        });
    }

    pub(crate) fn define_reactive_with(&self, key: &str, value: Value, shallow: bool) {
        self.0
            .props
            .borrow_mut()
            .insert(key.to_string(), Property::plain(value));
        self.define_reactive(key, shallow);
    }

    pub(crate) fn remove(&self, key: &str) -> bool {
        self.0.props.borrow_mut().shift_remove(key).is_some()
    }

    pub fn has(&self, key: &str) -> bool {
        self.0.props.borrow().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.0.props.borrow().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.0.props.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.props.borrow().is_empty()
    }

    pub(crate) fn entries_untracked(&self) -> Vec<(String, Value)> {
        self.0
            .props
            .borrow()
            .iter()
            .map(|(k, p)| (k.clone(), p.value.clone()))
            .collect()
    }

    /// Whether `key` has an accessor.
    pub fn is_reactive(&self, key: &str) -> bool {
        self.dep_of(key).is_some()
    }

    /// The dependency node behind `key`'s accessor.
    pub fn dep_of(&self, key: &str) -> Option<DepId> {
        self.0
            .props
            .borrow()
            .get(key)
            .and_then(|p| p.accessor.as_ref())
            .map(|a| a.dep.id())
    }

    /// Forbid new keys. A non-extensible object is never instrumented.
    pub fn prevent_extensions(&self) {
        self.0.extensible.set(false);
    }

    pub fn is_extensible(&self) -> bool {
        self.0.extensible.get()
    }

    pub fn observer(&self) -> Option<Rc<Observer>> {
        self.0.observer.borrow().clone()
    }

    pub(crate) fn attach_observer(&self, ob: Rc<Observer>) {
        *self.0.observer.borrow_mut() = Some(ob);
    }

    pub fn ptr_eq(&self, other: &ReactiveObject) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }
}

impl Default for ReactiveObject {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for ReactiveObject {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        let obj = ReactiveObject::new();
        for (k, v) in iter {
            obj.insert_plain(k.into(), v);
        }
        obj
    }
}

impl fmt::Debug for ReactiveObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&Value::Object(self.clone()), f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Runtime;

    #[test]
    fn plain_objects_read_and_write() {
        let obj = ReactiveObject::new().with("a", 1);
        assert_eq!(obj.get("a"), Value::from(1));
        assert_eq!(obj.get("missing"), Value::Undefined);

        obj.set("a", 2);
        obj.set("b", "x");
        assert_eq!(obj.get_untracked("a"), Value::from(2));
        assert_eq!(obj.keys(), vec!["a".to_string(), "b".to_string()]);
        assert!(!obj.is_reactive("a"));
    }

    #[test]
    fn define_reactive_installs_a_node() {
        let obj = ReactiveObject::new().with("a", 1);
        obj.define_reactive("a", false);

        let dep = obj.dep_of("a").unwrap();
        assert!(Runtime::has_dep(dep));

        obj.remove("a");
        assert!(!Runtime::has_dep(dep));
    }

    #[test]
    fn non_configurable_properties_are_skipped() {
        let obj = ReactiveObject::new();
        obj.define_property("fixed", 1, false);
        obj.define_reactive("fixed", false);
        assert!(!obj.is_reactive("fixed"));
    }

    #[test]
    fn non_extensible_objects_drop_new_keys() {
        let obj = ReactiveObject::new().with("a", 1);
        obj.prevent_extensions();
        obj.set("b", 2);
        obj.set("a", 3);
        assert!(!obj.has("b"));
        assert_eq!(obj.get_untracked("a"), Value::from(3));
    }
}
