//! Pure operator semantics over constant values.
//!
//! These functions are what the runtime does for operands that are
//! literals, so the tree optimizer can evaluate them ahead of time. Any
//! operator that mutates its operands or touches the outside world (vector
//! appends, `>>>`, imports, calls) is not covered: see [`is_foldable`].
//!
//! Numeric operands follow the usual tower: two bytes give a byte, bytes
//! and integers give an integer, anything involving a real gives a real.
//! Integer arithmetic wraps on overflow.

use std::num::Wrapping;

use thiserror::Error;

use super::value::{Type, Value};
use crate::ast::Operator;

/// Two reals closer than this compare equal.
pub const REAL_EPSILON: f64 = 9.9e-15;

/// An error raised while evaluating an operator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OpError {
    /// The operand types are not supported by a binary operator
    #[error("invalid types '{left}' and '{right}' for '{op}'")]
    Types {
        /// Type of the left operand
        left: Type,
        /// Type of the right operand
        right: Type,
        /// The operator symbol
        op: &'static str,
    },
    /// The operand type is not supported by a unary operator
    #[error("invalid type '{ty}' for '{op}'")]
    Type {
        /// Type of the operand
        ty: Type,
        /// The operator symbol
        op: &'static str,
    },
    /// An arithmetic error such as a division by zero
    #[error("{0}")]
    Math(&'static str),
    /// The operator cannot be evaluated without a runtime
    #[error("'{0}' cannot be evaluated on constants")]
    NotFoldable(&'static str),
}

/// Returns true if `op` can be evaluated on literal operands.
pub fn is_foldable(op: Operator) -> bool {
    use Operator::*;
    matches!(
        op,
        Add | Sub
            | Mul
            | Div
            | Pow
            | Mod
            | BitAnd
            | BitOr
            | BitXor
            | Shl
            | Shr
            | Concat
            | And
            | Or
            | Xor
            | Gt
            | Lt
            | Eq
            | Ne
            | Ge
            | Le
            | Len
            | Not
            | BitNot
            | Neg
            | Typeof
    )
}

/// The operands of an arithmetic operator after promotion.
enum Promoted {
    Bytes(u8, u8),
    Ints(i64, i64),
    Reals(f64, f64),
}

fn as_int(value: &Value) -> Option<i64> {
    match value {
        Value::Int(i) => Some(*i),
        Value::Byte(b) => Some(i64::from(*b)),
        _ => None,
    }
}

fn as_real(value: &Value) -> Option<f64> {
    match value {
        Value::Real(r) => Some(*r),
        other => as_int(other).map(|i| i as f64),
    }
}

fn promote(a: &Value, b: &Value) -> Option<Promoted> {
    if let (Value::Byte(x), Value::Byte(y)) = (a, b) {
        return Some(Promoted::Bytes(*x, *y));
    }
    if let (Some(x), Some(y)) = (as_int(a), as_int(b)) {
        return Some(Promoted::Ints(x, y));
    }
    match (as_real(a), as_real(b)) {
        (Some(x), Some(y)) => Some(Promoted::Reals(x, y)),
        _ => None,
    }
}

fn types_error(op: Operator, a: &Value, b: &Value) -> OpError {
    OpError::Types {
        left: a.type_of(),
        right: b.type_of(),
        op: op.symbol(),
    }
}

/// Evaluates a binary stack operator.
pub fn stack_op(op: Operator, a: &Value, b: &Value) -> Result<Value, OpError> {
    match op {
        Operator::Add | Operator::Sub | Operator::Mul => arithmetic(op, a, b),
        Operator::Div => divide(op, a, b, "division by zero"),
        Operator::Mod => divide(op, a, b, "modulo by zero"),
        Operator::Pow => power(a, b),
        Operator::BitAnd | Operator::BitOr | Operator::BitXor | Operator::Shl | Operator::Shr => {
            bitwise(op, a, b)
        }
        Operator::Concat => Ok(Value::Str(format!("{a}{b}").into())),
        Operator::And => Ok(if a.is_truthy() { b.clone() } else { a.clone() }),
        Operator::Or => Ok(if a.is_truthy() { a.clone() } else { b.clone() }),
        Operator::Xor => Ok(Value::Bool(a.is_truthy() != b.is_truthy())),
        Operator::Eq => Ok(Value::Bool(equals(a, b))),
        Operator::Ne => Ok(Value::Bool(!equals(a, b))),
        Operator::Gt => greater(op, a, b).map(Value::Bool),
        Operator::Lt => greater(op, b, a).map(Value::Bool),
        Operator::Ge => {
            if equals(a, b) {
                return Ok(Value::Bool(true));
            }
            greater(op, a, b).map(Value::Bool)
        }
        Operator::Le => {
            if equals(a, b) {
                return Ok(Value::Bool(true));
            }
            greater(op, b, a).map(Value::Bool)
        }
        other => Err(OpError::NotFoldable(other.symbol())),
    }
}

/// Evaluates a unary local operator.
pub fn local_op(op: Operator, value: &Value) -> Result<Value, OpError> {
    let type_error = || OpError::Type {
        ty: value.type_of(),
        op: op.symbol(),
    };

    match op {
        Operator::Len => match value {
            Value::Str(s) => Ok(Value::Int(s.chars().count() as i64)),
            Value::Func(func) => Ok(Value::Int(func.arity() as i64)),
            _ => Err(type_error()),
        },
        Operator::Not => Ok(Value::Bool(!value.is_truthy())),
        Operator::BitNot => match value {
            Value::Byte(b) => Ok(Value::Byte(!b)),
            Value::Int(i) => Ok(Value::Int(!i)),
            _ => Err(type_error()),
        },
        Operator::Neg => match value {
            Value::Byte(b) => Ok(Value::Byte(b.wrapping_neg())),
            Value::Int(i) => Ok(Value::Int(i.wrapping_neg())),
            Value::Real(r) => Ok(Value::Real(-r)),
            _ => Err(type_error()),
        },
        Operator::Typeof => Ok(Value::Type(value.type_of())),
        other => Err(OpError::NotFoldable(other.symbol())),
    }
}

/// Equality as seen by `==`: numbers compare across the numeric tower.
pub fn equals(a: &Value, b: &Value) -> bool {
    if let (Some(x), Some(y)) = (as_int(a), as_int(b)) {
        return x == y;
    }
    if let (Some(x), Some(y)) = (as_real(a), as_real(b)) {
        if x.is_nan() || y.is_nan() {
            return false;
        }
        return (x - y).abs() < REAL_EPSILON;
    }
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::Type(x), Value::Type(y)) => x == y,
        (Value::Func(x), Value::Func(y)) => std::sync::Arc::ptr_eq(x, y),
        _ => false,
    }
}

/// `a > b`, reporting type errors against `op`.
fn greater(op: Operator, a: &Value, b: &Value) -> Result<bool, OpError> {
    if let (Value::Str(x), Value::Str(y)) = (a, b) {
        return Ok(x > y);
    }
    match promote(a, b) {
        Some(Promoted::Bytes(x, y)) => Ok(x > y),
        Some(Promoted::Ints(x, y)) => Ok(x > y),
        Some(Promoted::Reals(x, y)) => {
            if x.is_nan() || y.is_nan() {
                return Ok(false);
            }
            Ok(x > y && (x - y).abs() >= REAL_EPSILON)
        }
        // Lt and Le swap their operands before calling in
        None => match op {
            Operator::Lt | Operator::Le => Err(types_error(op, b, a)),
            _ => Err(types_error(op, a, b)),
        },
    }
}

fn arithmetic(op: Operator, a: &Value, b: &Value) -> Result<Value, OpError> {
    let result = match promote(a, b).ok_or_else(|| types_error(op, a, b))? {
        Promoted::Bytes(x, y) => Value::Byte(match op {
            Operator::Add => x.wrapping_add(y),
            Operator::Sub => x.wrapping_sub(y),
            _ => x.wrapping_mul(y),
        }),
        Promoted::Ints(x, y) => Value::Int(match op {
            Operator::Add => x.wrapping_add(y),
            Operator::Sub => x.wrapping_sub(y),
            _ => x.wrapping_mul(y),
        }),
        Promoted::Reals(x, y) => Value::Real(match op {
            Operator::Add => x + y,
            Operator::Sub => x - y,
            _ => x * y,
        }),
    };
    Ok(result)
}

fn divide(op: Operator, a: &Value, b: &Value, zero: &'static str) -> Result<Value, OpError> {
    let modulo = op == Operator::Mod;
    match promote(a, b).ok_or_else(|| types_error(op, a, b))? {
        Promoted::Bytes(_, 0) | Promoted::Ints(_, 0) => Err(OpError::Math(zero)),
        Promoted::Reals(_, y) if y == 0.0 => Err(OpError::Math(zero)),
        Promoted::Bytes(x, y) => Ok(Value::Byte(if modulo { x % y } else { x / y })),
        Promoted::Ints(x, y) => Ok(Value::Int(if modulo {
            x.wrapping_rem(y)
        } else {
            x.wrapping_div(y)
        })),
        Promoted::Reals(x, y) => Ok(Value::Real(if modulo { x % y } else { x / y })),
    }
}

fn power(a: &Value, b: &Value) -> Result<Value, OpError> {
    match promote(a, b).ok_or_else(|| types_error(Operator::Pow, a, b))? {
        Promoted::Bytes(x, y) => Ok(Value::Byte(num_traits::pow(Wrapping(x), y as usize).0)),
        Promoted::Ints(_, y) if y < 0 => Ok(Value::Int(0)),
        Promoted::Ints(x, y) => Ok(Value::Int(num_traits::pow(Wrapping(x), y as usize).0)),
        Promoted::Reals(x, y) => {
            if x < 0.0 && y.floor() != y {
                return Err(OpError::Math("fractional power of a negative number"));
            }
            Ok(Value::Real(x.powf(y)))
        }
    }
}

fn bitwise(op: Operator, a: &Value, b: &Value) -> Result<Value, OpError> {
    match promote(a, b) {
        Some(Promoted::Bytes(x, y)) => Ok(Value::Byte(match op {
            Operator::BitAnd => x & y,
            Operator::BitOr => x | y,
            Operator::BitXor => x ^ y,
            Operator::Shl => u32::from(x).checked_shl(u32::from(y)).unwrap_or(0) as u8,
            _ => u32::from(x).checked_shr(u32::from(y)).unwrap_or(0) as u8,
        })),
        Some(Promoted::Ints(x, y)) => Ok(Value::Int(match op {
            Operator::BitAnd => x & y,
            Operator::BitOr => x | y,
            Operator::BitXor => x ^ y,
            Operator::Shl => x.wrapping_shl(y as u32),
            _ => x.wrapping_shr(y as u32),
        })),
        _ => Err(types_error(op, a, b)),
    }
}
