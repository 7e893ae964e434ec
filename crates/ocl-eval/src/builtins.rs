//! Implementations of the built-in operations.
//!
//! Every failure condition (overflow, division by zero, out-of-range index,
//! malformed number text) yields `Undefined`. Operand strictness is applied
//! here according to [`Builtin::strictness`]; the logical connectives are
//! short-circuited by the evaluator before reaching [`apply`].

use crate::value::{CollectionValue, Value};
use ocl_types::{Builtin, CollectionKind, Strictness, Type};
use std::cmp::Ordering;

// === Three-valued logic ===
//
// `None` is Undefined. `implies` and `xor` are derived from `and`, `or` and
// `not`.

pub fn not3(a: Option<bool>) -> Option<bool> {
    a.map(|b| !b)
}

pub fn and3(a: Option<bool>, b: Option<bool>) -> Option<bool> {
    match (a, b) {
        (Some(false), _) | (_, Some(false)) => Some(false),
        (Some(true), Some(true)) => Some(true),
        _ => None,
    }
}

pub fn or3(a: Option<bool>, b: Option<bool>) -> Option<bool> {
    match (a, b) {
        (Some(true), _) | (_, Some(true)) => Some(true),
        (Some(false), Some(false)) => Some(false),
        _ => None,
    }
}

pub fn implies3(a: Option<bool>, b: Option<bool>) -> Option<bool> {
    or3(not3(a), b)
}

pub fn xor3(a: Option<bool>, b: Option<bool>) -> Option<bool> {
    and3(or3(a, b), not3(and3(a, b)))
}

/// Result of a connective when only the left operand is known, if that
/// operand already decides it.
pub fn short_circuit(op: Builtin, left: Option<bool>) -> Option<bool> {
    match (op, left) {
        (Builtin::And, Some(false)) => Some(false),
        (Builtin::Or, Some(true)) => Some(true),
        (Builtin::Implies, Some(false)) => Some(true),
        _ => None,
    }
}

fn truth(v: Option<bool>) -> Value {
    v.map(Value::Boolean).unwrap_or(Value::Undefined)
}

/// Apply a built-in operation to evaluated operands. `result_ty` is the
/// static type of the call node.
pub fn apply(op: Builtin, recv: &Value, args: &[Value], result_ty: &Type) -> Value {
    let undefined_arg = args.iter().any(Value::is_undefined);
    match op.strictness() {
        Strictness::Strict if recv.is_undefined() || undefined_arg => return Value::Undefined,
        Strictness::Receiver if recv.is_undefined() => return Value::Undefined,
        _ => {}
    }

    let arg = |i: usize| args.get(i).unwrap_or(&Value::Undefined);
    let promoted = |v: Value| promote(v, result_ty);

    match op {
        Builtin::And => truth(and3(recv.as_bool(), arg(0).as_bool())),
        Builtin::Or => truth(or3(recv.as_bool(), arg(0).as_bool())),
        Builtin::Xor => truth(xor3(recv.as_bool(), arg(0).as_bool())),
        Builtin::Implies => truth(implies3(recv.as_bool(), arg(0).as_bool())),
        Builtin::Not => truth(not3(recv.as_bool())),

        Builtin::Eq => Value::Boolean(recv == arg(0)),
        Builtin::Ne => Value::Boolean(recv != arg(0)),
        Builtin::IsUndefined => Value::Boolean(recv.is_undefined()),
        Builtin::IsDefined => Value::Boolean(!recv.is_undefined()),

        Builtin::Add => promoted(arith(recv, arg(0), i64::checked_add, |a, b| a + b)),
        Builtin::Sub => promoted(arith(recv, arg(0), i64::checked_sub, |a, b| a - b)),
        Builtin::Mul => promoted(arith(recv, arg(0), i64::checked_mul, |a, b| a * b)),
        Builtin::Div => match (recv.as_real(), arg(0).as_real()) {
            (Some(_), Some(d)) if d == 0.0 => Value::Undefined,
            (Some(n), Some(d)) => Value::real(n / d),
            _ => Value::Undefined,
        },
        Builtin::Neg => match recv {
            Value::Integer(n) => n.checked_neg().map_or(Value::Undefined, Value::Integer),
            Value::Real(r) => Value::real(-r.0),
            _ => Value::Undefined,
        },
        Builtin::Abs => match recv {
            Value::Integer(n) => n.checked_abs().map_or(Value::Undefined, Value::Integer),
            Value::Real(r) => Value::real(r.0.abs()),
            Value::Unlimited => Value::Unlimited,
            _ => Value::Undefined,
        },
        Builtin::Floor => round_with(recv, f64::floor),
        Builtin::Round => round_with(recv, |r| (r + 0.5).floor()),
        Builtin::Max => promoted(std::cmp::max(recv, arg(0)).clone()),
        Builtin::Min => promoted(std::cmp::min(recv, arg(0)).clone()),
        Builtin::IntDiv => match (recv.as_integer(), arg(0).as_integer()) {
            (Some(_), Some(0)) => Value::Undefined,
            (Some(a), Some(b)) => a.checked_div(b).map_or(Value::Undefined, Value::Integer),
            _ => Value::Undefined,
        },
        Builtin::Mod => match (recv.as_integer(), arg(0).as_integer()) {
            (Some(_), Some(0)) => Value::Undefined,
            (Some(a), Some(b)) => a.checked_rem(b).map_or(Value::Undefined, Value::Integer),
            _ => Value::Undefined,
        },

        Builtin::Lt => compare(recv, arg(0), |o| o == Ordering::Less),
        Builtin::Gt => compare(recv, arg(0), |o| o == Ordering::Greater),
        Builtin::Le => compare(recv, arg(0), |o| o != Ordering::Greater),
        Builtin::Ge => compare(recv, arg(0), |o| o != Ordering::Less),

        Builtin::Concat => match (recv.as_str(), arg(0).as_str()) {
            (Some(a), Some(b)) => Value::string(format!("{}{}", a, b)),
            _ => Value::Undefined,
        },
        Builtin::Length => string_op(recv, |s| Value::Integer(s.chars().count() as i64)),
        Builtin::ToUpper => string_op(recv, |s| Value::string(s.to_uppercase())),
        Builtin::ToLower => string_op(recv, |s| Value::string(s.to_lowercase())),
        Builtin::Substring => string_op(recv, |s| {
            let chars: Vec<char> = s.chars().collect();
            match one_based_range(arg(0), arg(1), chars.len()) {
                Some((lo, hi)) => Value::string(chars[lo..hi].iter().collect::<String>()),
                None => Value::Undefined,
            }
        }),
        Builtin::ToInteger => string_op(recv, |s| {
            s.trim().parse::<i64>().map_or(Value::Undefined, Value::Integer)
        }),
        Builtin::ToReal => string_op(recv, |s| {
            s.trim().parse::<f64>().map_or(Value::Undefined, Value::real)
        }),

        _ => match recv.as_collection() {
            Some(c) => apply_collection(op, c, args, result_ty),
            None => Value::Undefined,
        },
    }
}

fn apply_collection(op: Builtin, c: &CollectionValue, args: &[Value], result_ty: &Type) -> Value {
    let arg = |i: usize| args.get(i).unwrap_or(&Value::Undefined);
    let other = || arg(0).as_collection();
    let elem_ty = || {
        result_ty
            .element_type()
            .cloned()
            .unwrap_or_else(|| c.elem_type().clone())
    };
    let result_kind = || result_ty.collection_kind().unwrap_or(c.kind());

    match op {
        Builtin::Size => Value::Integer(c.len() as i64),
        Builtin::IsEmpty => Value::Boolean(c.is_empty()),
        Builtin::NotEmpty => Value::Boolean(!c.is_empty()),
        Builtin::Includes => Value::Boolean(c.contains(arg(0))),
        Builtin::Excludes => Value::Boolean(!c.contains(arg(0))),
        Builtin::Count => Value::Integer(c.count(arg(0)) as i64),
        Builtin::IncludesAll => match other() {
            Some(o) => Value::Boolean(o.iter().all(|v| c.contains(v))),
            None => Value::Undefined,
        },
        Builtin::ExcludesAll => match other() {
            Some(o) => Value::Boolean(o.iter().all(|v| !c.contains(v))),
            None => Value::Undefined,
        },
        Builtin::Sum => sum(c, result_ty),
        Builtin::MaxElement => extremum(c, Ordering::Greater),
        Builtin::MinElement => extremum(c, Ordering::Less),
        Builtin::Including => c.including(arg(0).clone(), elem_ty()),
        Builtin::Excluding => c.excluding(arg(0)),
        Builtin::Union => match other() {
            Some(o) => c.union(o, result_kind(), elem_ty()),
            None => Value::Undefined,
        },
        Builtin::Intersection => match other() {
            Some(o) => c.intersection(o, result_kind()),
            None => Value::Undefined,
        },
        Builtin::Difference => match other() {
            Some(o) => c.difference(o),
            None => Value::Undefined,
        },
        Builtin::SymmetricDifference => match other() {
            Some(o) => c.symmetric_difference(o),
            None => Value::Undefined,
        },
        Builtin::Flatten => c.flatten(),
        Builtin::AsSet => c.convert(CollectionKind::Set),
        Builtin::AsBag => c.convert(CollectionKind::Bag),
        Builtin::AsSequence => c.convert(CollectionKind::Sequence),
        Builtin::AsOrderedSet => c.convert(CollectionKind::OrderedSet),
        Builtin::First => c.elements().first().cloned().unwrap_or(Value::Undefined),
        Builtin::Last => c.elements().last().cloned().unwrap_or(Value::Undefined),
        Builtin::At => match arg(0).as_integer() {
            Some(i) if i >= 1 => c
                .elements()
                .get((i - 1) as usize)
                .cloned()
                .unwrap_or(Value::Undefined),
            _ => Value::Undefined,
        },
        Builtin::Append => c.append(arg(0).clone(), elem_ty()),
        Builtin::Prepend => c.prepend(arg(0).clone(), elem_ty()),
        Builtin::IndexOf => c
            .iter()
            .position(|v| v == arg(0))
            .map_or(Value::Undefined, |i| Value::Integer(i as i64 + 1)),
        Builtin::SubSequence => match one_based_range(arg(0), arg(1), c.len()) {
            Some((lo, hi)) => Value::collection(c.kind(), c.elem_type().clone(), c.elements()[lo..hi].to_vec()),
            None => Value::Undefined,
        },
        _ => Value::Undefined,
    }
}

/// Integer arithmetic when both sides are integers, real arithmetic
/// otherwise. The unlimited value does not take part in arithmetic.
fn arith(
    a: &Value,
    b: &Value,
    int_op: fn(i64, i64) -> Option<i64>,
    real_op: fn(f64, f64) -> f64,
) -> Value {
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => int_op(*x, *y).map_or(Value::Undefined, Value::Integer),
        _ => match (a.as_real(), b.as_real()) {
            (Some(x), Some(y)) => Value::real(real_op(x, y)),
            _ => Value::Undefined,
        },
    }
}

/// Integers widen to reals when the static result type is `Real`.
fn promote(v: Value, result_ty: &Type) -> Value {
    match (v, result_ty) {
        (Value::Integer(n), Type::Real) => Value::real(n as f64),
        (v, _) => v,
    }
}

fn round_with(v: &Value, f: fn(f64) -> f64) -> Value {
    match v {
        Value::Integer(n) => Value::Integer(*n),
        Value::Real(r) => {
            let rounded = f(r.0);
            if rounded >= i64::MIN as f64 && rounded < i64::MAX as f64 {
                Value::Integer(rounded as i64)
            } else {
                Value::Undefined
            }
        }
        _ => Value::Undefined,
    }
}

fn compare(a: &Value, b: &Value, pred: fn(Ordering) -> bool) -> Value {
    Value::Boolean(pred(a.cmp(b)))
}

fn string_op(v: &Value, f: impl FnOnce(&str) -> Value) -> Value {
    match v.as_str() {
        Some(s) => f(s),
        None => Value::Undefined,
    }
}

/// Convert inclusive 1-based bounds into a half-open 0-based range.
fn one_based_range(lo: &Value, hi: &Value, len: usize) -> Option<(usize, usize)> {
    let lo = lo.as_integer()?;
    let hi = hi.as_integer()?;
    if lo < 1 || hi < lo || hi as u64 > len as u64 {
        return None;
    }
    Some(((lo - 1) as usize, hi as usize))
}

fn sum(c: &CollectionValue, result_ty: &Type) -> Value {
    let zero = promote(Value::Integer(0), result_ty);
    let total = c.iter().try_fold(zero, |acc, v| {
        if v.is_undefined() {
            return None;
        }
        match arith(&acc, v, i64::checked_add, |a, b| a + b) {
            Value::Undefined => None,
            next => Some(next),
        }
    });
    total.map_or(Value::Undefined, |v| promote(v, result_ty))
}

fn extremum(c: &CollectionValue, wanted: Ordering) -> Value {
    if c.iter().any(Value::is_undefined) {
        return Value::Undefined;
    }
    c.iter()
        .fold(None::<&Value>, |best, v| match best {
            Some(b) if v.cmp(b) != wanted => Some(b),
            _ => Some(v),
        })
        .cloned()
        .unwrap_or(Value::Undefined)
}
