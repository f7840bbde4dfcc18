use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::SecondsFormat;
use serde_json::{Map, Number, Value as Json, json};

use crate::runtime::error::{self, EvalError};
use crate::runtime::value::Value;

/// Render a value graph as JSON text.
///
/// Encoding decisions (stable, part of the embedding contract):
/// - `bigint` → decimal string (JSON numbers would lose precision)
/// - `bytes` → standard base64 string
/// - `guid` → hyphenated lowercase string
/// - `datetime` → RFC 3339 UTC string
/// - `range` → `{"type":"range","start":S,"count":N}`, never materialized
/// - `error` → `{"type":"error","code":C,"message":M}`
/// - non-finite numbers → `null`
///
/// `function`/`native` values fail with `NotSerializable`; cyclic graphs
/// fail with `CyclicValue`.
pub fn value_to_json_string(value: &Value) -> Result<String, EvalError> {
    let json = value_to_json(value)?;
    serde_json::to_string(&json)
        .map_err(|e| EvalError::new(error::NOT_SERIALIZABLE, e.to_string()))
}

pub fn value_to_json(value: &Value) -> Result<Json, EvalError> {
    let mut path: Vec<*const ()> = Vec::new();
    render(value, &mut path)
}

fn render(value: &Value, path: &mut Vec<*const ()>) -> Result<Json, EvalError> {
    match value {
        Value::Nil => Ok(Json::Null),
        Value::Bool(b) => Ok(Json::Bool(*b)),
        Value::Int(n) => Ok(Json::Number(Number::from(*n))),
        Value::Number(n) => Ok(Number::from_f64(*n).map(Json::Number).unwrap_or(Json::Null)),
        Value::BigInt(n) => Ok(Json::String(n.to_string())),
        Value::String(s) => Ok(Json::String(s.to_string())),
        Value::Bytes(bytes) => Ok(Json::String(BASE64.encode(bytes))),
        Value::Guid(guid) => Ok(Json::String(guid.to_string())),
        Value::DateTime(dt) => Ok(Json::String(
            dt.to_rfc3339_opts(SecondsFormat::Secs, true),
        )),
        Value::Range(range) => Ok(json!({
            "type": "range",
            "start": range.start,
            "count": range.count,
        })),
        Value::Error(e) => Ok(json!({
            "type": "error",
            "code": e.code,
            "message": e.message,
        })),
        Value::List(items) => {
            let marker = std::rc::Rc::as_ptr(items) as *const ();
            enter(path, marker)?;
            let mut out = Vec::with_capacity(items.len());
            for item in items.iter() {
                out.push(render(item, path)?);
            }
            path.pop();
            Ok(Json::Array(out))
        }
        Value::Kvc(kvc) => {
            let marker = std::rc::Rc::as_ptr(kvc) as *const ();
            enter(path, marker)?;
            let borrowed = kvc.borrow();
            let mut out = Map::with_capacity(borrowed.len());
            for (key, entry) in borrowed.iter() {
                out.insert(key.to_string(), render(entry, path)?);
            }
            path.pop();
            Ok(Json::Object(out))
        }
        Value::Function(_) | Value::Native(_) => Err(EvalError::new(
            error::NOT_SERIALIZABLE,
            format!("{} values cannot be serialized", value.type_name()),
        )),
    }
}

fn enter(path: &mut Vec<*const ()>, marker: *const ()) -> Result<(), EvalError> {
    if path.contains(&marker) {
        return Err(EvalError::new(
            error::CYCLIC_VALUE,
            "cyclic value cannot be serialized",
        ));
    }
    path.push(marker);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::value::{Kvc, RangeValue};
    use num_bigint::BigInt;

    #[test]
    fn test_scalars() {
        assert_eq!(value_to_json_string(&Value::Nil).unwrap(), "null");
        assert_eq!(value_to_json_string(&Value::Bool(true)).unwrap(), "true");
        assert_eq!(value_to_json_string(&Value::Int(42)).unwrap(), "42");
        assert_eq!(
            value_to_json_string(&Value::Number(f64::NAN)).unwrap(),
            "null"
        );
    }

    #[test]
    fn test_bigint_serializes_as_string() {
        let big = Value::bigint(BigInt::from(i64::MAX) * 10);
        let json = value_to_json_string(&big).unwrap();
        assert!(json.starts_with('"') && json.ends_with('"'));
    }

    #[test]
    fn test_bytes_serialize_as_base64() {
        let bytes = Value::Bytes(vec![1u8, 2, 3].into());
        assert_eq!(value_to_json_string(&bytes).unwrap(), "\"AQID\"");
    }

    #[test]
    fn test_kvc_key_order_is_preserved() {
        let mut kvc = Kvc::new();
        kvc.insert("b", Value::Int(1));
        kvc.insert("a", Value::Int(2));
        assert_eq!(
            value_to_json_string(&Value::kvc(kvc)).unwrap(),
            r#"{"b":1,"a":2}"#
        );
    }

    #[test]
    fn test_range_is_not_materialized() {
        let range = Value::Range(RangeValue {
            start: 0,
            count: 1_000_000_000,
        });
        assert_eq!(
            value_to_json_string(&range).unwrap(),
            r#"{"type":"range","start":0,"count":1000000000}"#
        );
    }

    #[test]
    fn test_functions_are_not_serializable() {
        let native = crate::runtime::builtins::global_env();
        let len = crate::runtime::env::Scope::lookup(&native, "Len").unwrap();
        let err = value_to_json_string(&len).unwrap_err();
        assert_eq!(err.code, error::NOT_SERIALIZABLE.code);
    }

    #[test]
    fn test_cycle_detection() {
        use std::cell::RefCell;
        use std::rc::Rc;

        let inner = Rc::new(RefCell::new(Kvc::new()));
        let value = Value::Kvc(Rc::clone(&inner));
        inner.borrow_mut().insert("self", value.clone());

        let err = value_to_json_string(&value).unwrap_err();
        assert_eq!(err.code, error::CYCLIC_VALUE.code);
    }

    #[test]
    fn test_shared_subgraphs_are_not_cycles() {
        let shared = Value::list(vec![Value::Int(1)]);
        let outer = Value::list(vec![shared.clone(), shared]);
        assert_eq!(value_to_json_string(&outer).unwrap(), "[[1],[1]]");
    }
}
