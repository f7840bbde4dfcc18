use std::{cell::RefCell, collections::HashMap, rc::Rc};

use crate::runtime::value::Value;

pub type Env = Rc<RefCell<Scope>>;

/// A lexical scope: bindings plus an optional parent scope.
#[derive(Debug, Default)]
pub struct Scope {
    bindings: HashMap<String, Value>,
    parent: Option<Env>,
}

impl Scope {
    pub fn root() -> Env {
        Rc::new(RefCell::new(Scope::default()))
    }

    pub fn child(parent: &Env) -> Env {
        Rc::new(RefCell::new(Scope {
            bindings: HashMap::new(),
            parent: Some(Rc::clone(parent)),
        }))
    }

    pub fn define(env: &Env, name: impl Into<String>, value: Value) {
        env.borrow_mut().bindings.insert(name.into(), value);
    }

    pub fn lookup(env: &Env, name: &str) -> Option<Value> {
        let scope = env.borrow();
        if let Some(value) = scope.bindings.get(name) {
            return Some(value.clone());
        }
        scope.parent.as_ref().and_then(|p| Scope::lookup(p, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_walks_parent_chain() {
        let root = Scope::root();
        Scope::define(&root, "a", Value::Int(1));
        let child = Scope::child(&root);
        Scope::define(&child, "b", Value::Int(2));

        assert_eq!(Scope::lookup(&child, "a"), Some(Value::Int(1)));
        assert_eq!(Scope::lookup(&child, "b"), Some(Value::Int(2)));
        assert_eq!(Scope::lookup(&root, "b"), None);
    }

    #[test]
    fn test_shadowing() {
        let root = Scope::root();
        Scope::define(&root, "x", Value::Int(1));
        let child = Scope::child(&root);
        Scope::define(&child, "x", Value::Int(2));
        assert_eq!(Scope::lookup(&child, "x"), Some(Value::Int(2)));
        assert_eq!(Scope::lookup(&root, "x"), Some(Value::Int(1)));
    }
}
