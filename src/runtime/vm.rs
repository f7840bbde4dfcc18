use serde_json::Value as Json;

use crate::diagnostics::Diagnostic;
use crate::runtime::builtins;
use crate::runtime::env::{Env, Scope};
use crate::runtime::error::{self, EvalError};
use crate::runtime::eval::Interpreter;
use crate::runtime::host::HostBridge;
use crate::runtime::json::value_to_json_string;
use crate::runtime::store::{Handle, ValueStore};
use crate::runtime::value::{TypeTag, Value};
use crate::syntax::{lexer::Lexer, parser::Parser};

/// An embeddable FuncScript VM.
///
/// Owns the value store for all handles it issues and the installed host
/// bridge. Not safe for concurrent use; confine an instance to one thread
/// or serialize access externally.
pub struct Vm {
    store: ValueStore,
    host: HostBridge,
    globals: Env,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    pub fn new() -> Self {
        Self {
            store: ValueStore::new(),
            host: HostBridge::default(),
            globals: builtins::global_env(),
        }
    }

    /// Replace the installed host bridge; the last install wins.
    pub fn set_host_bridge(&mut self, host: HostBridge) {
        self.host = host;
    }

    pub fn host_bridge(&self) -> &HostBridge {
        &self.host
    }

    /// Parse and evaluate source text.
    ///
    /// A captured `error` value is returned as `Ok`; boundary layers decide
    /// whether to surface it as data or as a failure.
    pub fn eval(&mut self, source: &str) -> Result<Value, EvalError> {
        let expression = parse_source(source)?;
        let host = self.host.clone();
        let scope = Scope::child(&self.globals);
        Interpreter::new(&host).eval(&expression, &scope)
    }

    /// Evaluate and return a fresh handle; captured error values fail.
    pub fn eval_to_handle(&mut self, source: &str) -> Result<Handle, EvalError> {
        let value = self.eval(source)?;
        if let Value::Error(e) = value {
            return Err((*e).clone());
        }
        self.store.insert(value)
    }

    /// Evaluate and render the result as JSON text.
    pub fn eval_to_json(&mut self, source: &str) -> Result<String, EvalError> {
        let value = self.eval(source)?;
        if let Value::Error(e) = value {
            return Err((*e).clone());
        }
        value_to_json_string(&value)
    }

    /// One-shot convenience: own VM, `{"ok":..,"value":..,"error":..}` envelope.
    pub fn eval_json_envelope(source: &str) -> String {
        let mut vm = Vm::new();
        let rendered = vm
            .eval_to_json(source)
            .and_then(|json| serde_json::from_str::<Json>(&json).map_err(|e| {
                EvalError::new(error::NOT_SERIALIZABLE, e.to_string())
            }));
        let envelope = match rendered {
            Ok(value) => serde_json::json!({ "ok": true, "value": value, "error": null }),
            Err(err) => serde_json::json!({
                "ok": false,
                "value": null,
                "error": { "code": err.code, "message": err.message },
            }),
        };
        envelope.to_string()
    }

    // Handle operations. Every returned handle is a new external reference
    // the caller must free; inputs are never consumed.

    pub fn insert_value(&mut self, value: Value) -> Result<Handle, EvalError> {
        self.store.insert(value)
    }

    pub fn get_value(&self, handle: Handle) -> Result<&Value, EvalError> {
        self.store.get(handle)
    }

    pub fn free_value(&mut self, handle: Handle) -> Result<(), EvalError> {
        self.store.free(handle)
    }

    pub fn value_type(&self, handle: Handle) -> Result<TypeTag, EvalError> {
        Ok(self.store.get(handle)?.type_tag())
    }

    pub fn value_to_json(&self, handle: Handle) -> Result<String, EvalError> {
        value_to_json_string(self.store.get(handle)?)
    }

    pub fn value_len(&self, handle: Handle) -> Result<u64, EvalError> {
        value_len(self.store.get(handle)?)
    }

    /// Strict indexing: negative indices count from the end, anything past
    /// the end is `IndexOutOfRange`.
    pub fn value_index(&mut self, handle: Handle, index: i64) -> Result<Handle, EvalError> {
        let receiver = self.store.get(handle)?;
        let len = value_len_for_index(receiver)?;
        let effective = if index < 0 {
            index.checked_add_unsigned(len).filter(|i| *i >= 0)
        } else if (index as u64) < len {
            Some(index)
        } else {
            None
        };
        let Some(effective) = effective else {
            return Err(EvalError::new(
                error::INDEX_OUT_OF_RANGE,
                format!("index {} is out of range for length {}", index, len),
            ));
        };
        let i = effective as u64;

        let element = match receiver {
            Value::List(items) => items[i as usize].clone(),
            Value::Range(range) => range
                .get(i)
                .map(Value::Int)
                .unwrap_or(Value::Nil),
            Value::String(s) => s
                .chars()
                .nth(i as usize)
                .map(|c| Value::string(c.to_string()))
                .unwrap_or(Value::Nil),
            Value::Bytes(bytes) => Value::Int(bytes[i as usize] as i64),
            other => {
                return Err(EvalError::new(
                    error::TYPE_MISMATCH,
                    format!("index is not defined for {}", other.type_name()),
                ));
            }
        };
        self.store.insert(element)
    }

    pub fn value_get_key(&mut self, handle: Handle, key: &str) -> Result<Handle, EvalError> {
        let receiver = self.store.get(handle)?;
        let Value::Kvc(kvc) = receiver else {
            return Err(EvalError::new(
                error::TYPE_MISMATCH,
                format!("get_key: expected a Kvc, got {}", receiver.type_name()),
            ));
        };
        let value = kvc.borrow().get(key).cloned();
        match value {
            Some(value) => self.store.insert(value),
            None => Err(EvalError::new(
                error::KEY_NOT_FOUND,
                format!("key '{}' not found", key),
            )),
        }
    }

    /// Keys of a kvc, rendered as a JSON array in insertion order.
    pub fn value_keys_json(&self, handle: Handle) -> Result<String, EvalError> {
        let receiver = self.store.get(handle)?;
        let Value::Kvc(kvc) = receiver else {
            return Err(EvalError::new(
                error::TYPE_MISMATCH,
                format!("keys: expected a Kvc, got {}", receiver.type_name()),
            ));
        };
        let keys: Vec<Json> = kvc
            .borrow()
            .keys()
            .map(|k| Json::String(k.to_string()))
            .collect();
        serde_json::to_string(&Json::Array(keys))
            .map_err(|e| EvalError::new(error::NOT_SERIALIZABLE, e.to_string()))
    }

    pub fn value_range_info(&self, handle: Handle) -> Result<(i64, u64), EvalError> {
        match self.store.get(handle)? {
            Value::Range(range) => Ok((range.start, range.count)),
            other => Err(EvalError::new(
                error::TYPE_MISMATCH,
                format!("range_info: expected a Range, got {}", other.type_name()),
            )),
        }
    }

    /// Call a function or native value with argument handles.
    pub fn value_call(&mut self, callee: Handle, args: &[Handle]) -> Result<Handle, EvalError> {
        let callee = self.store.get(callee)?.clone();
        let mut arg_values = Vec::with_capacity(args.len());
        for arg in args {
            arg_values.push(self.store.get(*arg)?.clone());
        }

        let host = self.host.clone();
        let result = Interpreter::new(&host).call_value(&callee, &arg_values, None)?;
        if let Value::Error(e) = result {
            return Err((*e).clone());
        }
        self.store.insert(result)
    }

    /// Live handle count, exposed for tests and leak diagnostics.
    pub fn live_handles(&self) -> usize {
        self.store.len()
    }
}

fn parse_source(source: &str) -> Result<crate::syntax::expression::Expression, EvalError> {
    let mut parser = Parser::new(Lexer::new(source));
    let expression = parser.parse_source();
    if let Some(diag) = parser.errors.first() {
        return Err(parse_error(diag));
    }
    expression.ok_or_else(|| EvalError::new(error::PARSE_ERROR, "empty source"))
}

fn parse_error(diag: &Diagnostic) -> EvalError {
    let mut err = EvalError::new(error::PARSE_ERROR, diag.title.clone());
    if let Some(position) = diag.position {
        err = err.at(position);
    }
    err
}

/// Length as defined for the handle API: chars for strings, bytes for byte
/// buffers, elements for lists, entries for kvcs, count for ranges.
pub fn value_len(value: &Value) -> Result<u64, EvalError> {
    match value {
        Value::String(s) => Ok(s.chars().count() as u64),
        Value::Bytes(bytes) => Ok(bytes.len() as u64),
        Value::List(items) => Ok(items.len() as u64),
        Value::Kvc(kvc) => Ok(kvc.borrow().len() as u64),
        Value::Range(range) => Ok(range.count),
        other => Err(EvalError::new(
            error::TYPE_MISMATCH,
            format!("len is not defined for {}", other.type_name()),
        )),
    }
}

/// Like [`value_len`] but excludes kvc, which is keyed rather than indexed.
fn value_len_for_index(value: &Value) -> Result<u64, EvalError> {
    match value {
        Value::Kvc(_) => Err(EvalError::new(
            error::TYPE_MISMATCH,
            "index is not defined for Kvc",
        )),
        other => value_len(other).map_err(|_| {
            EvalError::new(
                error::TYPE_MISMATCH,
                format!("index is not defined for {}", value.type_name()),
            )
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eval_reuse() {
        let mut vm = Vm::new();
        assert_eq!(vm.eval("1 + 2").unwrap(), Value::Int(3));
        assert_eq!(vm.eval("3 + 4").unwrap(), Value::Int(7));
    }

    #[test]
    fn test_failed_eval_leaves_vm_usable() {
        let mut vm = Vm::new();
        assert!(vm.eval("1 +").is_err());
        assert_eq!(vm.eval("2 * 3").unwrap(), Value::Int(6));
    }

    #[test]
    fn test_value_index_negative() {
        let mut vm = Vm::new();
        let h = vm.eval_to_handle("Range(3, 4)").unwrap();
        let last = vm.value_index(h, -1).unwrap();
        assert_eq!(vm.get_value(last).unwrap(), &Value::Int(6));

        let err = vm.value_index(h, 4).unwrap_err();
        assert_eq!(err.code, error::INDEX_OUT_OF_RANGE.code);
        let err = vm.value_index(h, -5).unwrap_err();
        assert_eq!(err.code, error::INDEX_OUT_OF_RANGE.code);
    }

    #[test]
    fn test_envelope_shapes() {
        let ok = Vm::eval_json_envelope("1 + 2");
        assert_eq!(ok, r#"{"ok":true,"value":3,"error":null}"#);

        let err = Vm::eval_json_envelope("1 +");
        assert!(err.starts_with(r#"{"ok":false,"value":null,"error":"#));
    }
}
