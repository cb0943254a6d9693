//! Reactive Arrays
//!
//! Elements of an array cannot carry their own accessors, so an array is
//! tracked as a whole through its collection node. The structural mutators
//! below instrument inserted elements and notify that node. Writing an index
//! directly with [`ReactiveArray::set_index`] is not intercepted; use
//! [`set_property`](super::observer::set_property) or [`ReactiveArray::splice`]
//! when the change must be observed.

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use super::observer::{observe_items, Observer};
use super::value::Value;

struct ArrayInner {
    items: RefCell<Vec<Value>>,
    observer: RefCell<Option<Rc<Observer>>>,
    extensible: Cell<bool>,
}

/// A shared sequence.
#[derive(Clone)]
pub struct ReactiveArray(Rc<ArrayInner>);

impl ReactiveArray {
    pub fn new() -> Self {
        Self::from_vec(Vec::new())
    }

    pub fn from_vec(items: Vec<Value>) -> Self {
        Self(Rc::new(ArrayInner {
            items: RefCell::new(items),
            observer: RefCell::new(None),
            extensible: Cell::new(true),
        }))
    }

    /// Element at `index`, or `undefined`.
    pub fn get(&self, index: usize) -> Value {
        self.0.items.borrow().get(index).cloned().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.0.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.items.borrow().is_empty()
    }

    pub fn to_vec(&self) -> Vec<Value> {
        self.0.items.borrow().clone()
    }

    /// Append an element. Returns the new length.
    pub fn push(&self, value: impl Into<Value>) -> usize {
        let value = value.into();
        let len = {
            let mut items = self.0.items.borrow_mut();
            items.push(value.clone());
            items.len()
        };
        self.mutated(&[value]);
        len
    }

    /// Remove the last element.
    pub fn pop(&self) -> Value {
        let removed = self.0.items.borrow_mut().pop().unwrap_or_default();
        self.mutated(&[]);
        removed
    }

    /// Remove the first element.
    pub fn shift(&self) -> Value {
        let removed = {
            let mut items = self.0.items.borrow_mut();
            if items.is_empty() {
                Value::Undefined
            } else {
                items.remove(0)
            }
        };
        self.mutated(&[]);
        removed
    }

    /// Prepend an element. Returns the new length.
    pub fn unshift(&self, value: impl Into<Value>) -> usize {
        let value = value.into();
        let len = {
            let mut items = self.0.items.borrow_mut();
            items.insert(0, value.clone());
            items.len()
        };
        self.mutated(&[value]);
        len
    }

    /// Remove `delete_count` elements from `start` and insert `insert` in
    /// their place. Out-of-range arguments are clamped. Returns the removed
    /// elements.
    pub fn splice(&self, start: usize, delete_count: usize, insert: Vec<Value>) -> Vec<Value> {
        let removed = {
            let mut items = self.0.items.borrow_mut();
            let start = start.min(items.len());
            let end = start.saturating_add(delete_count).min(items.len());
            items.splice(start..end, insert.iter().cloned()).collect()
        };
        self.mutated(&insert);
        removed
    }

    /// Sort in place with `compare`.
    pub fn sort_by(&self, compare: impl FnMut(&Value, &Value) -> Ordering) {
        self.0.items.borrow_mut().sort_by(compare);
        self.mutated(&[]);
    }

    pub fn reverse(&self) {
        self.0.items.borrow_mut().reverse();
        self.mutated(&[]);
    }

    /// Plain index write. Not observed: nothing is notified and the value is
    /// not instrumented. Writing past the end pads with `undefined`.
    pub fn set_index(&self, index: usize, value: impl Into<Value>) {
        let mut items = self.0.items.borrow_mut();
        if index >= items.len() {
            items.resize(index + 1, Value::Undefined);
        }
        items[index] = value.into();
    }

    pub(crate) fn pad_to(&self, len: usize) {
        let mut items = self.0.items.borrow_mut();
        if items.len() < len {
            items.resize(len, Value::Undefined);
        }
    }

    fn mutated(&self, inserted: &[Value]) {
        if let Some(ob) = self.observer() {
            observe_items(inserted);
            ob.notify();
        }
    }

    /// Forbid instrumentation of this array.
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

    pub fn ptr_eq(&self, other: &ReactiveArray) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }
}

impl Default for ReactiveArray {
    fn default() -> Self {
        Self::new()
    }
}

impl FromIterator<Value> for ReactiveArray {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self::from_vec(iter.into_iter().collect())
    }
}

impl fmt::Debug for ReactiveArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&Value::Array(self.clone()), f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbers(arr: &ReactiveArray) -> Vec<f64> {
        arr.to_vec().iter().filter_map(Value::as_f64).collect()
    }

    #[test]
    fn mutators_follow_sequence_semantics() {
        let arr: ReactiveArray = [1, 2, 3].into_iter().map(Value::from).collect();

        assert_eq!(arr.push(4), 4);
        assert_eq!(arr.pop(), Value::from(4));
        assert_eq!(arr.shift(), Value::from(1));
        assert_eq!(arr.unshift(0), 3);
        assert_eq!(numbers(&arr), vec![0.0, 2.0, 3.0]);

        let removed = arr.splice(1, 1, vec![Value::from(7), Value::from(8)]);
        assert_eq!(removed, vec![Value::from(2)]);
        assert_eq!(numbers(&arr), vec![0.0, 7.0, 8.0, 3.0]);

        arr.sort_by(|a, b| {
            a.as_f64()
                .partial_cmp(&b.as_f64())
                .unwrap_or(Ordering::Equal)
        });
        assert_eq!(numbers(&arr), vec![0.0, 3.0, 7.0, 8.0]);

        arr.reverse();
        assert_eq!(numbers(&arr), vec![8.0, 7.0, 3.0, 0.0]);
    }

    #[test]
    fn splice_clamps_out_of_range() {
        let arr = ReactiveArray::from_vec(vec![Value::from(1)]);
        let removed = arr.splice(5, 10, vec![Value::from(2)]);
        assert!(removed.is_empty());
        assert_eq!(numbers(&arr), vec![1.0, 2.0]);
    }

    #[test]
    fn empty_edges() {
        let arr = ReactiveArray::new();
        assert_eq!(arr.pop(), Value::Undefined);
        assert_eq!(arr.shift(), Value::Undefined);
        assert_eq!(arr.get(3), Value::Undefined);

        arr.set_index(2, "x");
        assert_eq!(arr.len(), 3);
        assert_eq!(arr.get(0), Value::Undefined);
    }
}
