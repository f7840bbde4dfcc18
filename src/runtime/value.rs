use std::{cell::RefCell, collections::HashMap, fmt, rc::Rc};

use chrono::{DateTime, SecondsFormat, Utc};
use num_bigint::BigInt;
use uuid::Uuid;

use crate::runtime::env::Env;
use crate::runtime::error::EvalError;
use crate::syntax::expression::Expression;

/// The fixed set of value kinds with their stable C-boundary discriminants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum TypeTag {
    Nil = 1,
    Bool = 2,
    Number = 3,
    String = 4,
    List = 5,
    Kvc = 6,
    Range = 7,
    Function = 8,
    Native = 9,
    Error = 10,
    Int = 11,
    BigInt = 12,
    Bytes = 13,
    Guid = 14,
    DateTime = 15,
}

impl TypeTag {
    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

/// A lazy integer sequence: `count` elements starting at `start`.
///
/// Never materialized; length and indexing are O(1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeValue {
    pub start: i64,
    pub count: u64,
}

impl RangeValue {
    pub fn get(&self, index: u64) -> Option<i64> {
        if index < self.count {
            Some(self.start + index as i64)
        } else {
            None
        }
    }
}

/// An insertion-ordered key-value collection with unique text keys.
///
/// Re-inserting an existing key replaces the value but keeps the key at its
/// original position.
#[derive(Debug, Clone, Default)]
pub struct Kvc {
    entries: HashMap<String, Value>,
    order: Vec<String>,
}

impl Kvc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        if self.entries.insert(key.clone(), value).is_none() {
            self.order.push(key);
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.order
            .iter()
            .filter_map(|k| self.entries.get(k).map(|v| (k.as_str(), v)))
    }
}

/// A script-defined callable: parameter list, body, and captured scope.
#[derive(Debug)]
pub struct FunctionValue {
    pub parameters: Vec<String>,
    pub body: Expression,
    pub env: Env,
    pub name: Option<String>,
}

pub type NativeFn =
    fn(&mut crate::runtime::eval::Interpreter<'_>, &[Value]) -> Result<Value, EvalError>;

/// A host-defined callable registered under a global name.
#[derive(Clone, Copy)]
pub struct NativeFunction {
    pub name: &'static str,
    pub func: NativeFn,
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeFunction({})", self.name)
    }
}

impl PartialEq for NativeFunction {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

/// Runtime value.
///
/// Heap payloads are `Rc`-shared so cloning a value is O(1); the value graph
/// is expected to stay acyclic (the language has no mutable cells).
#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Number(f64),
    BigInt(Rc<BigInt>),
    String(Rc<str>),
    Bytes(Rc<[u8]>),
    Guid(Uuid),
    DateTime(DateTime<Utc>),
    List(Rc<Vec<Value>>),
    Kvc(Rc<RefCell<Kvc>>),
    Range(RangeValue),
    Function(Rc<FunctionValue>),
    Native(NativeFunction),
    Error(Rc<EvalError>),
}

impl Value {
    pub fn string(text: impl AsRef<str>) -> Self {
        Value::String(Rc::from(text.as_ref()))
    }

    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(items))
    }

    pub fn kvc(kvc: Kvc) -> Self {
        Value::Kvc(Rc::new(RefCell::new(kvc)))
    }

    pub fn bigint(value: BigInt) -> Self {
        Value::BigInt(Rc::new(value))
    }

    pub fn error(err: EvalError) -> Self {
        Value::Error(Rc::new(err))
    }

    pub fn type_tag(&self) -> TypeTag {
        match self {
            Value::Nil => TypeTag::Nil,
            Value::Bool(_) => TypeTag::Bool,
            Value::Int(_) => TypeTag::Int,
            Value::Number(_) => TypeTag::Number,
            Value::BigInt(_) => TypeTag::BigInt,
            Value::String(_) => TypeTag::String,
            Value::Bytes(_) => TypeTag::Bytes,
            Value::Guid(_) => TypeTag::Guid,
            Value::DateTime(_) => TypeTag::DateTime,
            Value::List(_) => TypeTag::List,
            Value::Kvc(_) => TypeTag::Kvc,
            Value::Range(_) => TypeTag::Range,
            Value::Function(_) => TypeTag::Function,
            Value::Native(_) => TypeTag::Native,
            Value::Error(_) => TypeTag::Error,
        }
    }

    /// Canonical runtime type label used in diagnostics and `TypeOf`.
    pub fn type_name(&self) -> &'static str {
        match self.type_tag() {
            TypeTag::Nil => "Nil",
            TypeTag::Bool => "Bool",
            TypeTag::Number => "Number",
            TypeTag::String => "String",
            TypeTag::List => "List",
            TypeTag::Kvc => "Kvc",
            TypeTag::Range => "Range",
            TypeTag::Function => "Function",
            TypeTag::Native => "Native",
            TypeTag::Error => "Error",
            TypeTag::Int => "Int",
            TypeTag::BigInt => "BigInt",
            TypeTag::Bytes => "Bytes",
            TypeTag::Guid => "Guid",
            TypeTag::DateTime => "DateTime",
        }
    }

    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false) | Value::Error(_))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Int(a), Value::Number(b)) | (Value::Number(b), Value::Int(a)) => {
                *a as f64 == *b
            }
            (Value::BigInt(a), Value::BigInt(b)) => a == b,
            (Value::BigInt(a), Value::Int(b)) | (Value::Int(b), Value::BigInt(a)) => {
                **a == BigInt::from(*b)
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Guid(a), Value::Guid(b)) => a == b,
            (Value::DateTime(a), Value::DateTime(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Range(a), Value::Range(b)) => a == b,
            (Value::Kvc(a), Value::Kvc(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len()
                    && a.iter()
                        .all(|(key, value)| b.get(key).is_some_and(|other| value == other))
            }
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Native(a), Value::Native(b)) => a == b,
            (Value::Error(a), Value::Error(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Number(n) => write!(f, "{}", n),
            Value::BigInt(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{}", s),
            Value::Bytes(b) => write!(f, "<bytes len={}>", b.len()),
            Value::Guid(g) => write!(f, "{}", g),
            Value::DateTime(dt) => {
                write!(f, "{}", dt.to_rfc3339_opts(SecondsFormat::Secs, true))
            }
            Value::List(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
            Value::Kvc(kvc) => {
                let kvc = kvc.borrow();
                let parts: Vec<String> = kvc
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k, v))
                    .collect();
                write!(f, "{{{}}}", parts.join(", "))
            }
            Value::Range(r) => write!(f, "<range start={} count={}>", r.start, r.count),
            Value::Function(func) => match &func.name {
                Some(name) => write!(f, "<fn {}>", name),
                None => write!(f, "<fn>"),
            },
            Value::Native(native) => write!(f, "<native {}>", native.name),
            Value::Error(e) => write!(f, "Error({}): {}", e.code, e.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::error::{self, EvalError};

    #[test]
    fn test_type_tags_match_abi_constants() {
        assert_eq!(Value::Nil.type_tag().as_u32(), 1);
        assert_eq!(Value::string("x").type_tag().as_u32(), 4);
        assert_eq!(Value::Int(1).type_tag().as_u32(), 11);
        assert_eq!(
            Value::Range(RangeValue { start: 0, count: 0 }).type_tag().as_u32(),
            7
        );
    }

    #[test]
    fn test_kvc_replacement_preserves_position() {
        let mut kvc = Kvc::new();
        kvc.insert("a", Value::Int(1));
        kvc.insert("b", Value::Int(2));
        kvc.insert("a", Value::Int(3));
        let keys: Vec<&str> = kvc.keys().collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(kvc.get("a"), Some(&Value::Int(3)));
    }

    #[test]
    fn test_range_get() {
        let range = RangeValue { start: 3, count: 4 };
        assert_eq!(range.get(0), Some(3));
        assert_eq!(range.get(3), Some(6));
        assert_eq!(range.get(4), None);
    }

    #[test]
    fn test_cross_numeric_equality() {
        assert_eq!(Value::Int(3), Value::Number(3.0));
        assert_eq!(Value::Int(3), Value::bigint(BigInt::from(3)));
        assert_ne!(Value::Int(3), Value::Number(3.5));
    }

    #[test]
    fn test_truthiness() {
        assert!(Value::Int(0).is_truthy());
        assert!(!Value::Nil.is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(!Value::error(EvalError::new(error::TYPE_MISMATCH, "x")).is_truthy());
    }
}
