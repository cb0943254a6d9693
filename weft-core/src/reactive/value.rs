//! Dynamic Values
//!
//! The plain data the engine instruments. Objects and arrays are shared
//! handles with identity: cloning a [`Value`] clones the handle, and equality
//! between containers is identity, never structure.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use super::array::ReactiveArray;
use super::object::ReactiveObject;
use super::observer::Observer;

/// A dynamically typed value.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Object(ReactiveObject),
    Array(ReactiveArray),
    /// Anything the engine must carry but never instrument, such as a
    /// rendered tree.
    Opaque(Opaque),
}

impl Value {
    /// Strict equality: primitives by value, everything else by identity.
    ///
    /// `NaN` is not equal to itself.
    pub fn strict_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Array(a), Value::Array(b)) => a.ptr_eq(b),
            (Value::Opaque(a), Value::Opaque(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// Equality used by property writes: strict equality, except that two
    /// `NaN`s are the same value.
    pub fn same_value_for_write(&self, other: &Value) -> bool {
        self.strict_eq(other) || (self.is_nan() && other.is_nan())
    }

    /// True for values that may change without changing identity.
    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_) | Value::Array(_) | Value::Opaque(_))
    }

    pub fn is_container(&self) -> bool {
        matches!(self, Value::Object(_) | Value::Array(_))
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn is_nan(&self) -> bool {
        matches!(self, Value::Number(n) if n.is_nan())
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ReactiveObject> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ReactiveArray> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_opaque(&self) -> Option<&Opaque> {
        match self {
            Value::Opaque(o) => Some(o),
            _ => None,
        }
    }

    /// JavaScript-style truthiness.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    /// The instrumentation metadata attached to a container, if any.
    pub fn observer(&self) -> Option<Rc<Observer>> {
        match self {
            Value::Object(o) => o.observer(),
            Value::Array(a) => a.observer(),
            _ => None,
        }
    }

    /// Build plain (uninstrumented) data from JSON.
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::from(s),
            serde_json::Value::Array(items) => Value::Array(
                items.into_iter().map(Value::from_json).collect(),
            ),
            serde_json::Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// An untracked JSON copy. `Undefined`, `NaN` and opaque values become
    /// `null`, as does a container reached again through itself.
    pub fn to_json(&self) -> serde_json::Value {
        self.to_json_on_path(&mut HashSet::new())
    }

    fn to_json_on_path(&self, path: &mut HashSet<usize>) -> serde_json::Value {
        let Some(addr) = self.container_addr() else {
            return self.scalar_to_json();
        };
        if !path.insert(addr) {
            return serde_json::Value::Null;
        }
        let json = match self {
            Value::Array(a) => serde_json::Value::Array(
                a.to_vec().iter().map(|item| item.to_json_on_path(path)).collect(),
            ),
            Value::Object(o) => serde_json::Value::Object(
                o.entries_untracked()
                    .into_iter()
                    .map(|(k, v)| (k, v.to_json_on_path(path)))
                    .collect(),
            ),
            _ => serde_json::Value::Null,
        };
        path.remove(&addr);
        json
    }

    fn scalar_to_json(&self) -> serde_json::Value {
        match self {
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => {
                if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
                    serde_json::Value::from(*n as i64)
                } else {
                    serde_json::Number::from_f64(*n)
                        .map(serde_json::Value::Number)
                        .unwrap_or(serde_json::Value::Null)
                }
            }
            Value::String(s) => serde_json::Value::String(s.to_string()),
            _ => serde_json::Value::Null,
        }
    }

    fn container_addr(&self) -> Option<usize> {
        match self {
            Value::Object(o) => Some(o.addr()),
            Value::Array(a) => Some(a.addr()),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.strict_eq(other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = RefCell::new(HashSet::new());
        fmt::Debug::fmt(&DebugValue { value: self, path: &path }, f)
    }
}

/// Debug view that prints a container reached again through itself as
/// `[Circular]`.
struct DebugValue<'a> {
    value: &'a Value,
    path: &'a RefCell<HashSet<usize>>,
}

impl fmt::Debug for DebugValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(addr) = self.value.container_addr() else {
            return match self.value {
                Value::Undefined => f.write_str("undefined"),
                Value::Null => f.write_str("null"),
                Value::Bool(b) => write!(f, "{b}"),
                Value::Number(n) => write!(f, "{n}"),
                Value::String(s) => write!(f, "{s:?}"),
                Value::Opaque(o) => fmt::Debug::fmt(o, f),
                Value::Object(_) | Value::Array(_) => Ok(()),
            };
        };
        if !self.path.borrow_mut().insert(addr) {
            return f.write_str("[Circular]");
        }
        let path = self.path;
        let result = match self.value {
            Value::Object(o) => {
                let entries = o.entries_untracked();
                f.debug_map()
                    .entries(entries.iter().map(|(k, value)| (k, DebugValue { value, path })))
                    .finish()
            }
            Value::Array(a) => {
                let items = a.to_vec();
                f.debug_list()
                    .entries(items.iter().map(|value| DebugValue { value, path }))
                    .finish()
            }
            _ => Ok(()),
        };
        path.borrow_mut().remove(&addr);
        result
    }
}

macro_rules! number_from {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(n: $t) -> Self {
                Value::Number(n as f64)
            }
        })*
    };
}

number_from!(i32, i64, u32, u64, usize, f32, f64);

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Rc::from(s))
    }
}

impl From<ReactiveObject> for Value {
    fn from(o: ReactiveObject) -> Self {
        Value::Object(o)
    }
}

impl From<ReactiveArray> for Value {
    fn from(a: ReactiveArray) -> Self {
        Value::Array(a)
    }
}

impl From<Opaque> for Value {
    fn from(o: Opaque) -> Self {
        Value::Opaque(o)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(ReactiveArray::from_vec(items))
    }
}

/// A value the engine never instruments.
#[derive(Clone)]
pub struct Opaque(Rc<dyn Any>);

impl Opaque {
    pub fn new<T: Any>(value: T) -> Self {
        Self(Rc::new(value))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    pub fn ptr_eq(&self, other: &Opaque) -> bool {
        Rc::as_ptr(&self.0) as *const () == Rc::as_ptr(&other.0) as *const ()
    }
}

impl fmt::Debug for Opaque {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Opaque({:p})", Rc::as_ptr(&self.0) as *const ())
    }
}
