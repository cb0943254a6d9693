//! Deep Traversal
//!
//! Deep watchers need to hear about mutations anywhere below the value they
//! produce, not only through the top-level accessor. [`traverse`] touches
//! every reactive node reachable from a value so the evaluating computation
//! subscribes to all of them.

use std::collections::HashSet;

use super::value::Value;

/// Touch every node reachable from `value` on behalf of the current target.
///
/// Each container is visited once, so cyclic data terminates. Non-extensible
/// containers are skipped, as are opaque values.
pub fn traverse(value: &Value) {
    let mut seen = HashSet::new();
    visit(value, &mut seen);
}

fn visit(value: &Value, seen: &mut HashSet<usize>) {
    match value {
        Value::Object(obj) => {
            if !obj.is_extensible() || !seen.insert(obj.addr()) {
                return;
            }
            if let Some(ob) = obj.observer() {
                ob.depend();
            }
            for key in obj.keys() {
                visit(&obj.get(&key), seen);
            }
        }
        Value::Array(arr) => {
            if !arr.is_extensible() || !seen.insert(arr.addr()) {
                return;
            }
            if let Some(ob) = arr.observer() {
                ob.depend();
            }
            for item in arr.to_vec() {
                visit(&item, seen);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::DepId;
    use crate::reactive::{observe, ReactiveArray, ReactiveContext, ReactiveObject, Subscriber, WatcherId};
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Collector {
        id: WatcherId,
        deps: RefCell<Vec<DepId>>,
    }

    impl Subscriber for Collector {
        fn id(&self) -> WatcherId {
            self.id
        }
        fn add_dep(&self, dep: DepId) {
            self.deps.borrow_mut().push(dep);
        }
        fn update(&self) {}
    }

    fn collect(value: &Value) -> Vec<DepId> {
        let collector = Rc::new(Collector {
            id: WatcherId::new(),
            deps: RefCell::new(Vec::new()),
        });
        {
            let _ctx = ReactiveContext::enter(Some(collector.clone() as Rc<dyn Subscriber>));
            traverse(value);
        }
        let deps = collector.deps.borrow().clone();
        deps
    }

    #[test]
    fn touches_nested_properties_and_collections() {
        let inner = ReactiveObject::new().with("b", 1);
        let list = ReactiveArray::from_vec(vec![Value::from(1)]);
        let root = ReactiveObject::new().with("inner", inner.clone()).with("list", list.clone());
        let value = Value::from(root.clone());
        observe(&value, false);

        let deps = collect(&value);

        assert!(deps.contains(&root.dep_of("inner").unwrap()));
        assert!(deps.contains(&inner.dep_of("b").unwrap()));
        assert!(deps.contains(&list.observer().unwrap().dep_id()));
        assert!(deps.contains(&root.observer().unwrap().dep_id()));
    }

    #[test]
    fn cycles_terminate() {
        let obj = ReactiveObject::new();
        obj.set("me", obj.clone());
        let value = Value::from(obj);
        observe(&value, false);

        assert!(!collect(&value).is_empty());
    }

    #[test]
    fn non_extensible_containers_are_skipped() {
        let frozen = ReactiveObject::new().with("a", 1);
        frozen.prevent_extensions();
        assert!(collect(&Value::from(frozen)).is_empty());
    }
}
