use std::cmp::Ordering;
use std::rc::Rc;

use num_bigint::BigInt;
use num_traits::ToPrimitive;

use crate::diagnostics::position::Position;
use crate::runtime::env::{Env, Scope};
use crate::runtime::error::{self, EvalError};
use crate::runtime::host::HostBridge;
use crate::runtime::value::{FunctionValue, Kvc, Value};
use crate::syntax::expression::{Expression, InfixOp, KvcEntry, PrefixOp};

/// Call nesting bound; crossing it fails instead of exhausting the stack.
pub const MAX_CALL_DEPTH: usize = 200;

/// Tree-walking evaluator. One instance lives for the duration of a single
/// top-level evaluation or callback-driven call and carries the call depth.
pub struct Interpreter<'a> {
    host: &'a HostBridge,
    depth: usize,
}

impl<'a> Interpreter<'a> {
    pub fn new(host: &'a HostBridge) -> Self {
        Self { host, depth: 0 }
    }

    pub fn host(&self) -> &HostBridge {
        self.host
    }

    pub fn eval(&mut self, expr: &Expression, env: &Env) -> Result<Value, EvalError> {
        match expr {
            Expression::IntLiteral { value, .. } => Ok(Value::Int(*value)),
            Expression::BigIntLiteral { value, .. } => Ok(Value::bigint(value.clone())),
            Expression::FloatLiteral { value, .. } => Ok(Value::Number(*value)),
            Expression::StringLiteral { value, .. } => Ok(Value::string(value)),
            Expression::BoolLiteral { value, .. } => Ok(Value::Bool(*value)),
            Expression::NilLiteral { .. } => Ok(Value::Nil),
            Expression::Identifier { name, .. } => {
                // Unknown names evaluate to nil, matching script semantics
                // where absent kvc keys are nil as well.
                Ok(Scope::lookup(env, name).unwrap_or(Value::Nil))
            }
            Expression::ListLiteral { elements, .. } => {
                let mut items = Vec::with_capacity(elements.len());
                for element in elements {
                    items.push(self.eval(element, env)?);
                }
                Ok(Value::list(items))
            }
            Expression::KvcLiteral { entries, .. } => self.eval_kvc(entries, env),
            Expression::Prefix {
                operator,
                right,
                position,
            } => {
                let value = self.eval(right, env)?;
                self.eval_prefix(*operator, value, *position)
            }
            Expression::Infix {
                operator,
                left,
                right,
                position,
            } => {
                let lhs = self.eval(left, env)?;
                let rhs = self.eval(right, env)?;
                self.eval_infix(*operator, lhs, rhs, *position)
            }
            Expression::If {
                condition,
                consequence,
                alternative,
                ..
            } => {
                let cond = self.eval(condition, env)?;
                if cond.is_truthy() {
                    self.eval(consequence, env)
                } else {
                    self.eval(alternative, env)
                }
            }
            Expression::Lambda {
                parameters, body, ..
            } => Ok(Value::Function(Rc::new(FunctionValue {
                parameters: parameters.clone(),
                body: (**body).clone(),
                env: Rc::clone(env),
                name: None,
            }))),
            Expression::Call {
                callee,
                arguments,
                position,
            } => {
                let callee = self.eval(callee, env)?;
                let mut args = Vec::with_capacity(arguments.len());
                for argument in arguments {
                    args.push(self.eval(argument, env)?);
                }
                self.call_value(&callee, &args, Some(*position))
            }
            Expression::Index {
                receiver, index, ..
            } => {
                let receiver = self.eval(receiver, env)?;
                let index = self.eval(index, env)?;
                Ok(index_lenient(&receiver, &index))
            }
            Expression::Member { receiver, key, .. } => {
                let receiver = self.eval(receiver, env)?;
                Ok(member_lenient(&receiver, key))
            }
        }
    }

    /// Invoke a function or native value with already-evaluated arguments.
    ///
    /// Script functions may be called with fewer arguments than declared;
    /// missing parameters are bound to nil. Extra arguments are rejected.
    pub fn call_value(
        &mut self,
        callee: &Value,
        args: &[Value],
        position: Option<Position>,
    ) -> Result<Value, EvalError> {
        match callee {
            Value::Function(func) => {
                if args.len() > func.parameters.len() {
                    return Err(at(
                        EvalError::new(
                            error::INVALID_ARGUMENT,
                            format!(
                                "call arity mismatch: expected {} argument(s), got {}",
                                func.parameters.len(),
                                args.len()
                            ),
                        ),
                        position,
                    ));
                }
                if self.depth >= MAX_CALL_DEPTH {
                    return Err(at(
                        EvalError::new(
                            error::RECURSION_LIMIT_EXCEEDED,
                            "recursion limit exceeded",
                        ),
                        position,
                    ));
                }

                let local = Scope::child(&func.env);
                for (i, name) in func.parameters.iter().enumerate() {
                    let value = args.get(i).cloned().unwrap_or(Value::Nil);
                    Scope::define(&local, name.clone(), value);
                }

                self.depth += 1;
                let result = self.eval(&func.body, &local);
                self.depth -= 1;
                result
            }
            Value::Native(native) => (native.func)(self, args),
            Value::Error(e) => Ok(Value::Error(Rc::clone(e))),
            other => Err(at(
                EvalError::new(
                    error::TYPE_MISMATCH,
                    format!("value of type {} is not callable", other.type_name()),
                ),
                position,
            )),
        }
    }

    fn eval_kvc(&mut self, entries: &[KvcEntry], env: &Env) -> Result<Value, EvalError> {
        let scope = Scope::child(env);
        let mut kvc = Kvc::new();
        let mut result_expr: Option<&Expression> = None;

        for entry in entries {
            match entry {
                KvcEntry::Pair { key, value, .. } => {
                    let value = self.eval(value, &scope)?;
                    kvc.insert(key.clone(), value.clone());
                    Scope::define(&scope, key.clone(), value);
                }
                KvcEntry::Return { value, .. } => {
                    result_expr = Some(value);
                }
            }
        }

        match result_expr {
            Some(expr) => self.eval(expr, &scope),
            None => Ok(Value::kvc(kvc)),
        }
    }

    fn eval_prefix(
        &mut self,
        operator: PrefixOp,
        value: Value,
        position: Position,
    ) -> Result<Value, EvalError> {
        if let Value::Error(_) = value {
            return Ok(value);
        }
        match operator {
            PrefixOp::Neg => match value {
                Value::Int(n) => Ok(match n.checked_neg() {
                    Some(neg) => Value::Int(neg),
                    None => Value::bigint(-BigInt::from(n)),
                }),
                Value::Number(n) => Ok(Value::Number(-n)),
                Value::BigInt(n) => Ok(Value::bigint(-(*n).clone())),
                other => Err(EvalError::new(
                    error::TYPE_MISMATCH,
                    format!("cannot negate a value of type {}", other.type_name()),
                )
                .at(position)),
            },
            PrefixOp::Not => match value {
                Value::Bool(b) => Ok(Value::Bool(!b)),
                other => Err(EvalError::new(
                    error::TYPE_MISMATCH,
                    format!("`not` expects a Bool, got {}", other.type_name()),
                )
                .at(position)),
            },
        }
    }

    fn eval_infix(
        &mut self,
        operator: InfixOp,
        lhs: Value,
        rhs: Value,
        position: Position,
    ) -> Result<Value, EvalError> {
        // Captured error values flow through operators as data.
        if let Value::Error(_) = lhs {
            return Ok(lhs);
        }
        if let Value::Error(_) = rhs {
            return Ok(rhs);
        }

        match operator {
            InfixOp::Add => add_values(&lhs, &rhs)
                .ok_or_else(|| type_mismatch_binary("+", &lhs, &rhs, position)),
            InfixOp::Sub => {
                numeric_binary(&lhs, &rhs, i64::checked_sub, |a, b| a - b, |a, b| a - b)
                    .ok_or_else(|| type_mismatch_binary("-", &lhs, &rhs, position))
            }
            InfixOp::Mul => {
                numeric_binary(&lhs, &rhs, i64::checked_mul, |a, b| a * b, |a, b| a * b)
                    .ok_or_else(|| type_mismatch_binary("*", &lhs, &rhs, position))
            }
            InfixOp::Div => {
                if is_zero_int(&rhs) {
                    return Err(EvalError::new(error::INVALID_ARGUMENT, "division by zero")
                        .at(position));
                }
                numeric_binary(&lhs, &rhs, i64::checked_div, |a, b| a / b, |a, b| a / b)
                    .ok_or_else(|| type_mismatch_binary("/", &lhs, &rhs, position))
            }
            InfixOp::Mod => {
                if is_zero_int(&rhs) {
                    return Err(EvalError::new(error::INVALID_ARGUMENT, "division by zero")
                        .at(position));
                }
                numeric_binary(&lhs, &rhs, i64::checked_rem, |a, b| a % b, |a, b| a % b)
                    .ok_or_else(|| type_mismatch_binary("%", &lhs, &rhs, position))
            }
            InfixOp::Lt => compare_values(&lhs, &rhs, position, |o| o == Ordering::Less),
            InfixOp::Lte => compare_values(&lhs, &rhs, position, |o| o != Ordering::Greater),
            InfixOp::Gt => compare_values(&lhs, &rhs, position, |o| o == Ordering::Greater),
            InfixOp::Gte => compare_values(&lhs, &rhs, position, |o| o != Ordering::Less),
            InfixOp::Eq => Ok(Value::Bool(lhs == rhs)),
            InfixOp::NotEq => Ok(Value::Bool(lhs != rhs)),
            InfixOp::And => logical_and(&[lhs, rhs], position),
            InfixOp::Or => logical_or(&[lhs, rhs], position),
        }
    }
}

fn at(err: EvalError, position: Option<Position>) -> EvalError {
    match position {
        Some(p) => err.at(p),
        None => err,
    }
}

fn type_mismatch_binary(op: &str, lhs: &Value, rhs: &Value, position: Position) -> EvalError {
    EvalError::new(
        error::TYPE_MISMATCH,
        format!(
            "`{}` is not defined for {} and {}",
            op,
            lhs.type_name(),
            rhs.type_name()
        ),
    )
    .at(position)
}

fn is_zero_int(value: &Value) -> bool {
    match value {
        Value::Int(0) => true,
        Value::BigInt(n) => n.to_i64() == Some(0),
        _ => false,
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Int(n) => Some(*n as f64),
        Value::Number(n) => Some(*n),
        Value::BigInt(n) => n.to_f64(),
        _ => None,
    }
}

/// Numeric tower for `- * / %`: Int stays Int (promoting to BigInt on
/// overflow), any float operand makes the result a float.
fn numeric_binary(
    lhs: &Value,
    rhs: &Value,
    int_op: fn(i64, i64) -> Option<i64>,
    big_op: fn(&BigInt, &BigInt) -> BigInt,
    float_op: fn(f64, f64) -> f64,
) -> Option<Value> {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => Some(match int_op(*a, *b) {
            Some(n) => Value::Int(n),
            None => normalize_bigint(big_op(&BigInt::from(*a), &BigInt::from(*b))),
        }),
        (Value::BigInt(a), Value::BigInt(b)) => Some(normalize_bigint(big_op(a, b))),
        (Value::BigInt(a), Value::Int(b)) => Some(normalize_bigint(big_op(a, &BigInt::from(*b)))),
        (Value::Int(a), Value::BigInt(b)) => Some(normalize_bigint(big_op(&BigInt::from(*a), b))),
        (Value::Number(_), _) | (_, Value::Number(_)) => {
            Some(Value::Number(float_op(as_f64(lhs)?, as_f64(rhs)?)))
        }
        _ => None,
    }
}

/// Shrink a big integer back to a machine integer when it fits.
pub fn normalize_bigint(n: BigInt) -> Value {
    match n.to_i64() {
        Some(small) => Value::Int(small),
        None => Value::bigint(n),
    }
}

fn add_values(lhs: &Value, rhs: &Value) -> Option<Value> {
    match (lhs, rhs) {
        (Value::Nil, Value::Nil) => Some(Value::Nil),
        (Value::Nil, other) | (other, Value::Nil) => Some(other.clone()),
        (Value::String(a), Value::String(b)) => Some(Value::string(format!("{}{}", a, b))),
        (Value::String(a), other) => Some(Value::string(format!("{}{}", a, other))),
        (other, Value::String(b)) => Some(Value::string(format!("{}{}", other, b))),
        (Value::List(a), Value::List(b)) => {
            let mut out = Vec::with_capacity(a.len() + b.len());
            out.extend(a.iter().cloned());
            out.extend(b.iter().cloned());
            Some(Value::list(out))
        }
        (Value::List(a), other) => {
            let mut out = Vec::with_capacity(a.len() + 1);
            out.extend(a.iter().cloned());
            out.push(other.clone());
            Some(Value::list(out))
        }
        (other, Value::List(b)) => {
            let mut out = Vec::with_capacity(b.len() + 1);
            out.push(other.clone());
            out.extend(b.iter().cloned());
            Some(Value::list(out))
        }
        (Value::Kvc(a), Value::Kvc(b)) => Some(merge_kvc(a, b)),
        _ => numeric_binary(lhs, rhs, i64::checked_add, |a, b| a + b, |a, b| a + b),
    }
}

/// Right-biased kvc merge; keys keep their first-seen position and nested
/// kvcs merge recursively.
fn merge_kvc(
    left: &Rc<std::cell::RefCell<Kvc>>,
    right: &Rc<std::cell::RefCell<Kvc>>,
) -> Value {
    let mut out = Kvc::new();
    for (key, value) in left.borrow().iter() {
        out.insert(key, value.clone());
    }
    for (key, value) in right.borrow().iter() {
        let existing = out.get(key).cloned();
        let merged = match (&existing, value) {
            (Some(Value::Kvc(lk)), Value::Kvc(rk)) => merge_kvc(lk, rk),
            _ => value.clone(),
        };
        out.insert(key, merged);
    }
    Value::kvc(out)
}

fn compare_values(
    lhs: &Value,
    rhs: &Value,
    position: Position,
    pick: fn(Ordering) -> bool,
) -> Result<Value, EvalError> {
    let ordering = match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
        (Value::BigInt(a), Value::BigInt(b)) => a.partial_cmp(b),
        (Value::BigInt(a), Value::Int(b)) => (**a).partial_cmp(&BigInt::from(*b)),
        (Value::Int(a), Value::BigInt(b)) => BigInt::from(*a).partial_cmp(b),
        (Value::String(a), Value::String(b)) => a.partial_cmp(b),
        (Value::DateTime(a), Value::DateTime(b)) => a.partial_cmp(b),
        _ => match (as_f64(lhs), as_f64(rhs)) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => {
                return Err(EvalError::new(
                    error::TYPE_MISMATCH,
                    format!(
                        "cannot compare {} with {}",
                        lhs.type_name(),
                        rhs.type_name()
                    ),
                )
                .at(position));
            }
        },
    };
    Ok(ordering.map(pick).map(Value::Bool).unwrap_or(Value::Bool(false)))
}

/// Nil-tolerant conjunction: nils are skipped, false short-circuits, and a
/// nil result means no boolean operand was present.
pub fn logical_and(values: &[Value], position: Position) -> Result<Value, EvalError> {
    let mut has_bool = false;
    for value in values {
        match value {
            Value::Nil => continue,
            Value::Error(_) => return Ok(value.clone()),
            Value::Bool(b) => {
                has_bool = true;
                if !*b {
                    return Ok(Value::Bool(false));
                }
            }
            other => {
                return Err(EvalError::new(
                    error::TYPE_MISMATCH,
                    format!("`and` is not defined for {}", other.type_name()),
                )
                .at(position));
            }
        }
    }
    Ok(if has_bool { Value::Bool(true) } else { Value::Nil })
}

/// Nil-tolerant disjunction; see [`logical_and`].
pub fn logical_or(values: &[Value], position: Position) -> Result<Value, EvalError> {
    let mut has_bool = false;
    let mut first_error: Option<Value> = None;
    for value in values {
        match value {
            Value::Nil => continue,
            Value::Error(_) => {
                if first_error.is_none() {
                    first_error = Some(value.clone());
                }
            }
            Value::Bool(b) => {
                has_bool = true;
                if *b {
                    return Ok(Value::Bool(true));
                }
            }
            other => {
                return Err(EvalError::new(
                    error::TYPE_MISMATCH,
                    format!("`or` is not defined for {}", other.type_name()),
                )
                .at(position));
            }
        }
    }
    if let Some(err) = first_error {
        return Ok(err);
    }
    Ok(if has_bool { Value::Bool(false) } else { Value::Nil })
}

fn integral_index(index: &Value) -> Option<i64> {
    match index {
        Value::Int(n) => Some(*n),
        Value::Number(n) if n.is_finite() && n.fract() == 0.0 => Some(*n as i64),
        _ => None,
    }
}

/// Script-level `receiver[index]`: out-of-range and unsupported shapes are
/// nil rather than failures (the strict variant lives on the handle API).
fn index_lenient(receiver: &Value, index: &Value) -> Value {
    if let Value::Error(_) = receiver {
        return receiver.clone();
    }
    if let Value::Error(_) = index {
        return index.clone();
    }
    if let Value::String(key) = index {
        return member_lenient(receiver, key);
    }
    let Some(i) = integral_index(index) else {
        return Value::Nil;
    };
    if i < 0 {
        return Value::Nil;
    }
    let i = i as u64;
    match receiver {
        Value::List(items) => items.get(i as usize).cloned().unwrap_or(Value::Nil),
        Value::Range(range) => range.get(i).map(Value::Int).unwrap_or(Value::Nil),
        Value::String(s) => s
            .chars()
            .nth(i as usize)
            .map(|c| Value::string(c.to_string()))
            .unwrap_or(Value::Nil),
        Value::Bytes(bytes) => bytes
            .get(i as usize)
            .map(|b| Value::Int(*b as i64))
            .unwrap_or(Value::Nil),
        _ => Value::Nil,
    }
}

/// Script-level `receiver.key`: absent keys and non-kvc receivers are nil.
fn member_lenient(receiver: &Value, key: &str) -> Value {
    match receiver {
        Value::Error(_) => receiver.clone(),
        Value::Kvc(kvc) => kvc.borrow().get(key).cloned().unwrap_or(Value::Nil),
        _ => Value::Nil,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_bigint_shrinks() {
        assert_eq!(normalize_bigint(BigInt::from(7)), Value::Int(7));
        let big = BigInt::from(i64::MAX) + 1;
        assert!(matches!(normalize_bigint(big), Value::BigInt(_)));
    }

    #[test]
    fn test_index_lenient_out_of_range_is_nil() {
        let list = Value::list(vec![Value::Int(1)]);
        assert_eq!(index_lenient(&list, &Value::Int(5)), Value::Nil);
        assert_eq!(index_lenient(&list, &Value::Int(-1)), Value::Nil);
        assert_eq!(index_lenient(&list, &Value::Int(0)), Value::Int(1));
    }

    #[test]
    fn test_logical_and_nil_tolerance() {
        let pos = Position::new(1, 1);
        assert_eq!(
            logical_and(&[Value::Nil, Value::Nil], pos).unwrap(),
            Value::Nil
        );
        assert_eq!(
            logical_and(&[Value::Nil, Value::Bool(true)], pos).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            logical_and(&[Value::Bool(true), Value::Bool(false)], pos).unwrap(),
            Value::Bool(false)
        );
    }
}
