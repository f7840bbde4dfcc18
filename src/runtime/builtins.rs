use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use num_bigint::BigInt;
use num_traits::ToPrimitive;
use uuid::Uuid;

use crate::runtime::env::{Env, Scope};
use crate::runtime::error::{self, EvalError};
use crate::runtime::eval::{Interpreter, normalize_bigint};
use crate::runtime::value::{NativeFunction, RangeValue, Value};

/// The native functions installed into every VM's global scope.
///
/// Value-level natives are capitalized; the host-backed I/O operations use
/// the lower-case script names (`file`, `fileexists`, `isfile`, `dirlist`,
/// `log`).
const NATIVES: &[NativeFunction] = &[
    NativeFunction { name: "Range", func: native_range },
    NativeFunction { name: "Len", func: native_len },
    NativeFunction { name: "First", func: native_first },
    NativeFunction { name: "Abs", func: native_abs },
    NativeFunction { name: "Max", func: native_max },
    NativeFunction { name: "Min", func: native_min },
    NativeFunction { name: "Sqrt", func: native_sqrt },
    NativeFunction { name: "Sum", func: native_sum },
    NativeFunction { name: "If", func: native_if },
    NativeFunction { name: "TypeOf", func: native_type_of },
    NativeFunction { name: "Guid", func: native_guid },
    NativeFunction { name: "NewGuid", func: native_new_guid },
    NativeFunction { name: "DateTime", func: native_datetime },
    NativeFunction { name: "Bytes", func: native_bytes },
    NativeFunction { name: "file", func: native_file },
    NativeFunction { name: "fileexists", func: native_file_exists },
    NativeFunction { name: "isfile", func: native_is_file },
    NativeFunction { name: "dirlist", func: native_dir_list },
    NativeFunction { name: "log", func: native_log },
];

/// Fresh global scope with all natives bound.
pub fn global_env() -> Env {
    let env = Scope::root();
    for native in NATIVES {
        Scope::define(&env, native.name, Value::Native(*native));
    }
    env
}

fn check_arity(name: &str, args: &[Value], expected: usize) -> Result<(), EvalError> {
    if args.len() != expected {
        return Err(EvalError::new(
            error::INVALID_ARGUMENT,
            format!(
                "{}: expected {} argument(s), got {}",
                name,
                expected,
                args.len()
            ),
        ));
    }
    Ok(())
}

fn arg_str<'a>(name: &str, args: &'a [Value], index: usize) -> Result<&'a str, EvalError> {
    match &args[index] {
        Value::String(s) => Ok(s),
        other => Err(EvalError::new(
            error::TYPE_MISMATCH,
            format!(
                "{}: expected a String argument, got {}",
                name,
                other.type_name()
            ),
        )),
    }
}

fn arg_integer(name: &str, args: &[Value], index: usize) -> Result<i64, EvalError> {
    match &args[index] {
        Value::Int(n) => Ok(*n),
        Value::Number(n) if n.is_finite() && n.fract() == 0.0 => Ok(*n as i64),
        other => Err(EvalError::new(
            error::TYPE_MISMATCH,
            format!(
                "{}: expected an integer argument, got {}",
                name,
                other.type_name()
            ),
        )),
    }
}

/// Captured error values short-circuit through natives as data.
fn first_error(args: &[Value]) -> Option<Value> {
    args.iter()
        .find(|v| matches!(v, Value::Error(_)))
        .cloned()
}

fn native_range(_: &mut Interpreter<'_>, args: &[Value]) -> Result<Value, EvalError> {
    if let Some(err) = first_error(args) {
        return Ok(err);
    }
    check_arity("Range", args, 2)?;
    let start = arg_integer("Range", args, 0)?;
    let count = arg_integer("Range", args, 1)?;
    if count < 0 {
        return Ok(Value::error(EvalError::new(
            error::INVALID_ARGUMENT,
            "Range: count must be >= 0",
        )));
    }
    let count = count as u64;
    if count > 0 && start.checked_add((count - 1) as i64).is_none() {
        return Ok(Value::error(EvalError::new(
            error::INVALID_ARGUMENT,
            "Range: overflow",
        )));
    }
    Ok(Value::Range(RangeValue { start, count }))
}

fn native_len(_: &mut Interpreter<'_>, args: &[Value]) -> Result<Value, EvalError> {
    if let Some(err) = first_error(args) {
        return Ok(err);
    }
    check_arity("Len", args, 1)?;
    let len = crate::runtime::vm::value_len(&args[0])?;
    Ok(Value::Int(len as i64))
}

fn native_first(_: &mut Interpreter<'_>, args: &[Value]) -> Result<Value, EvalError> {
    if let Some(err) = first_error(args) {
        return Ok(err);
    }
    check_arity("First", args, 1)?;
    let first = match &args[0] {
        Value::List(items) => items.first().cloned(),
        Value::Range(range) => range.get(0).map(Value::Int),
        Value::String(s) => s.chars().next().map(|c| Value::string(c.to_string())),
        other => {
            return Err(EvalError::new(
                error::TYPE_MISMATCH,
                format!("First: not supported for {}", other.type_name()),
            ));
        }
    };
    Ok(first.unwrap_or(Value::Nil))
}

fn native_abs(_: &mut Interpreter<'_>, args: &[Value]) -> Result<Value, EvalError> {
    if let Some(err) = first_error(args) {
        return Ok(err);
    }
    check_arity("Abs", args, 1)?;
    match &args[0] {
        Value::Int(n) => Ok(match n.checked_abs() {
            Some(abs) => Value::Int(abs),
            None => normalize_bigint(-BigInt::from(*n)),
        }),
        Value::Number(n) => Ok(Value::Number(n.abs())),
        Value::BigInt(n) => Ok(normalize_bigint(if n.sign() == num_bigint::Sign::Minus {
            -(**n).clone()
        } else {
            (**n).clone()
        })),
        other => Err(EvalError::new(
            error::TYPE_MISMATCH,
            format!("Abs: expected a number, got {}", other.type_name()),
        )),
    }
}

fn pick_extreme(
    name: &str,
    args: &[Value],
    pick_left: fn(f64, f64) -> bool,
) -> Result<Value, EvalError> {
    check_arity(name, args, 2)?;
    let (a, b) = (&args[0], &args[1]);
    let (fa, fb) = (numeric_as_f64(name, a)?, numeric_as_f64(name, b)?);
    Ok(if pick_left(fa, fb) { a.clone() } else { b.clone() })
}

fn numeric_as_f64(name: &str, value: &Value) -> Result<f64, EvalError> {
    match value {
        Value::Int(n) => Ok(*n as f64),
        Value::Number(n) => Ok(*n),
        Value::BigInt(n) => Ok(n.to_f64().unwrap_or(f64::INFINITY)),
        other => Err(EvalError::new(
            error::TYPE_MISMATCH,
            format!("{}: expected a number, got {}", name, other.type_name()),
        )),
    }
}

fn native_max(_: &mut Interpreter<'_>, args: &[Value]) -> Result<Value, EvalError> {
    if let Some(err) = first_error(args) {
        return Ok(err);
    }
    pick_extreme("Max", args, |a, b| a >= b)
}

fn native_min(_: &mut Interpreter<'_>, args: &[Value]) -> Result<Value, EvalError> {
    if let Some(err) = first_error(args) {
        return Ok(err);
    }
    pick_extreme("Min", args, |a, b| a <= b)
}

fn native_sqrt(_: &mut Interpreter<'_>, args: &[Value]) -> Result<Value, EvalError> {
    if let Some(err) = first_error(args) {
        return Ok(err);
    }
    check_arity("Sqrt", args, 1)?;
    let n = numeric_as_f64("Sqrt", &args[0])?;
    Ok(Value::Number(n.sqrt()))
}

fn native_sum(_: &mut Interpreter<'_>, args: &[Value]) -> Result<Value, EvalError> {
    if let Some(err) = first_error(args) {
        return Ok(err);
    }
    check_arity("Sum", args, 1)?;
    match &args[0] {
        Value::List(items) => {
            let mut int_total = BigInt::from(0);
            let mut float_total = 0.0f64;
            let mut saw_float = false;
            for item in items.iter() {
                match item {
                    Value::Int(n) => int_total += BigInt::from(*n),
                    Value::BigInt(n) => int_total += &**n,
                    Value::Number(n) => {
                        saw_float = true;
                        float_total += n;
                    }
                    Value::Nil => {}
                    other => {
                        return Err(EvalError::new(
                            error::TYPE_MISMATCH,
                            format!("Sum: expected numbers, got {}", other.type_name()),
                        ));
                    }
                }
            }
            if saw_float {
                Ok(Value::Number(
                    float_total + int_total.to_f64().unwrap_or(0.0),
                ))
            } else {
                Ok(normalize_bigint(int_total))
            }
        }
        // Closed form; a range is never materialized.
        Value::Range(range) => {
            let n = BigInt::from(range.count);
            let start = BigInt::from(range.start);
            let one = BigInt::from(1);
            let two = BigInt::from(2);
            let total = &n * &start + (&n * (&n - &one)) / &two;
            Ok(normalize_bigint(total))
        }
        other => Err(EvalError::new(
            error::TYPE_MISMATCH,
            format!("Sum: not supported for {}", other.type_name()),
        )),
    }
}

fn native_if(_: &mut Interpreter<'_>, args: &[Value]) -> Result<Value, EvalError> {
    if let Some(err) = first_error(args) {
        return Ok(err);
    }
    check_arity("If", args, 3)?;
    match &args[0] {
        Value::Bool(true) => Ok(args[1].clone()),
        Value::Bool(false) | Value::Nil => Ok(args[2].clone()),
        other => Err(EvalError::new(
            error::TYPE_MISMATCH,
            format!("If: condition must be a Bool, got {}", other.type_name()),
        )),
    }
}

fn native_type_of(_: &mut Interpreter<'_>, args: &[Value]) -> Result<Value, EvalError> {
    check_arity("TypeOf", args, 1)?;
    Ok(Value::string(args[0].type_name()))
}

fn native_guid(_: &mut Interpreter<'_>, args: &[Value]) -> Result<Value, EvalError> {
    if let Some(err) = first_error(args) {
        return Ok(err);
    }
    check_arity("Guid", args, 1)?;
    let text = arg_str("Guid", args, 0)?;
    match Uuid::parse_str(text) {
        Ok(guid) => Ok(Value::Guid(guid)),
        Err(_) => Ok(Value::error(EvalError::new(
            error::INVALID_ARGUMENT,
            format!("Guid: '{}' is not a valid guid", text),
        ))),
    }
}

fn native_new_guid(_: &mut Interpreter<'_>, args: &[Value]) -> Result<Value, EvalError> {
    check_arity("NewGuid", args, 0)?;
    Ok(Value::Guid(Uuid::new_v4()))
}

fn native_datetime(_: &mut Interpreter<'_>, args: &[Value]) -> Result<Value, EvalError> {
    if let Some(err) = first_error(args) {
        return Ok(err);
    }
    check_arity("DateTime", args, 1)?;
    let text = arg_str("DateTime", args, 0)?;
    match DateTime::parse_from_rfc3339(text) {
        Ok(dt) => Ok(Value::DateTime(dt.with_timezone(&Utc))),
        Err(_) => Ok(Value::error(EvalError::new(
            error::INVALID_ARGUMENT,
            format!("DateTime: '{}' is not a valid RFC 3339 timestamp", text),
        ))),
    }
}

fn native_bytes(_: &mut Interpreter<'_>, args: &[Value]) -> Result<Value, EvalError> {
    if let Some(err) = first_error(args) {
        return Ok(err);
    }
    check_arity("Bytes", args, 1)?;
    let text = arg_str("Bytes", args, 0)?;
    match BASE64.decode(text) {
        Ok(bytes) => Ok(Value::Bytes(bytes.into())),
        Err(_) => Ok(Value::error(EvalError::new(
            error::INVALID_ARGUMENT,
            format!("Bytes: '{}' is not valid base64", text),
        ))),
    }
}

fn native_file(interp: &mut Interpreter<'_>, args: &[Value]) -> Result<Value, EvalError> {
    if let Some(err) = first_error(args) {
        return Ok(err);
    }
    check_arity("file", args, 1)?;
    let path = arg_str("file", args, 0)?;
    let text = interp.host().file_read_text(path)?;
    Ok(Value::string(text))
}

fn native_file_exists(interp: &mut Interpreter<'_>, args: &[Value]) -> Result<Value, EvalError> {
    if let Some(err) = first_error(args) {
        return Ok(err);
    }
    check_arity("fileexists", args, 1)?;
    let path = arg_str("fileexists", args, 0)?;
    Ok(Value::Bool(interp.host().file_exists(path)?))
}

fn native_is_file(interp: &mut Interpreter<'_>, args: &[Value]) -> Result<Value, EvalError> {
    if let Some(err) = first_error(args) {
        return Ok(err);
    }
    check_arity("isfile", args, 1)?;
    let path = arg_str("isfile", args, 0)?;
    Ok(Value::Bool(interp.host().is_file(path)?))
}

fn native_dir_list(interp: &mut Interpreter<'_>, args: &[Value]) -> Result<Value, EvalError> {
    if let Some(err) = first_error(args) {
        return Ok(err);
    }
    check_arity("dirlist", args, 1)?;
    let path = arg_str("dirlist", args, 0)?;
    let entries = interp.host().dir_list(path)?;
    Ok(Value::list(entries.into_iter().map(Value::string).collect()))
}

fn native_log(interp: &mut Interpreter<'_>, args: &[Value]) -> Result<Value, EvalError> {
    check_arity("log", args, 1)?;
    interp.host().log_line(&args[0].to_string());
    Ok(Value::Nil)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::host::HostBridge;

    fn call(native: crate::runtime::value::NativeFn, args: &[Value]) -> Result<Value, EvalError> {
        let host = HostBridge::default();
        let mut interp = Interpreter::new(&host);
        native(&mut interp, args)
    }

    #[test]
    fn test_range_negative_count_is_a_captured_error() {
        let result = call(native_range, &[Value::Int(1), Value::Int(-1)]).unwrap();
        assert!(matches!(result, Value::Error(_)));
    }

    #[test]
    fn test_len_of_range_is_count() {
        let range = call(native_range, &[Value::Int(0), Value::Int(1_000_000_000)]).unwrap();
        assert_eq!(call(native_len, &[range]).unwrap(), Value::Int(1_000_000_000));
    }

    #[test]
    fn test_sum_of_huge_range_uses_closed_form() {
        let range = call(native_range, &[Value::Int(1), Value::Int(1_000_000_000)]).unwrap();
        assert_eq!(
            call(native_sum, &[range]).unwrap(),
            Value::Int(500_000_000_500_000_000)
        );
    }

    #[test]
    fn test_host_natives_without_bridge_fail_with_capability_unavailable() {
        let err = call(native_file, &[Value::string("x.txt")]).unwrap_err();
        assert_eq!(err.code, error::CAPABILITY_UNAVAILABLE.code);
    }

    #[test]
    fn test_error_values_pass_through() {
        let boom = Value::error(EvalError::new(error::INVALID_ARGUMENT, "boom"));
        let result = call(native_len, &[boom.clone()]).unwrap();
        assert_eq!(result, boom);
    }
}
