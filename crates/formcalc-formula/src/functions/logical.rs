//! Logical and comparison functions

use super::{bool_arg, coerce, parse_datetime, parse_number, ArgKind};
use crate::ast::Expr;
use crate::error::{FormulaError, FormulaResult};
use crate::evaluator::{evaluate, EvaluationContext};
use formcalc_core::Value;
use std::cmp::Ordering;

/// Read an evaluated argument of `function` as a condition
pub fn as_condition(function: &str, position: usize, value: Value) -> FormulaResult<bool> {
    match coerce(function, position, ArgKind::Boolean, value)? {
        Value::Boolean(b) => Ok(b),
        other => Err(FormulaError::type_mismatch(function, position + 1, "boolean", other.type_name())),
    }
}

/// Evaluate `expr` and read it as a condition
fn condition(function: &str, position: usize, expr: &Expr, ctx: &EvaluationContext) -> FormulaResult<bool> {
    as_condition(function, position, evaluate(expr, ctx)?)
}

/// IF(condition, value_if_true, [value_if_false])
///
/// Only the selected branch is evaluated.
pub fn fn_if(args: &[Expr], ctx: &EvaluationContext) -> FormulaResult<Value> {
    let (Some(cond), Some(if_true)) = (args.first(), args.get(1)) else {
        return Err(FormulaError::ArityMismatch {
            function: "IF".into(),
            expected: "2 to 3".into(),
            actual: args.len(),
        });
    };

    if condition("IF", 0, cond, ctx)? {
        evaluate(if_true, ctx)
    } else {
        match args.get(2) {
            Some(if_false) => evaluate(if_false, ctx),
            None => Ok(Value::Null),
        }
    }
}

/// AND(condition, ...), stops at the first false
pub fn fn_and(args: &[Expr], ctx: &EvaluationContext) -> FormulaResult<Value> {
    for (i, arg) in args.iter().enumerate() {
        if !condition("AND", i, arg, ctx)? {
            return Ok(Value::Boolean(false));
        }
    }
    Ok(Value::Boolean(true))
}

/// OR(condition, ...), stops at the first true
pub fn fn_or(args: &[Expr], ctx: &EvaluationContext) -> FormulaResult<Value> {
    for (i, arg) in args.iter().enumerate() {
        if condition("OR", i, arg, ctx)? {
            return Ok(Value::Boolean(true));
        }
    }
    Ok(Value::Boolean(false))
}

/// NOT(condition)
pub fn fn_not(args: &[Value], _ctx: &EvaluationContext) -> FormulaResult<Value> {
    Ok(Value::Boolean(!bool_arg("NOT", args, 0)?))
}

/// EQUALS(a, b)
pub fn fn_equals(args: &[Value], _ctx: &EvaluationContext) -> FormulaResult<Value> {
    match args {
        [a, b] => Ok(Value::Boolean(values_equal(a, b))),
        _ => Err(FormulaError::invalid_argument("EQUALS", "expected two values")),
    }
}

/// GREATER_THAN(a, b)
pub fn fn_greater_than(args: &[Value], _ctx: &EvaluationContext) -> FormulaResult<Value> {
    match args {
        [a, b] => Ok(Value::Boolean(compare_values("GREATER_THAN", a, b)? == Ordering::Greater)),
        _ => Err(FormulaError::invalid_argument("GREATER_THAN", "expected two values")),
    }
}

/// LESS_THAN(a, b)
pub fn fn_less_than(args: &[Value], _ctx: &EvaluationContext) -> FormulaResult<Value> {
    match args {
        [a, b] => Ok(Value::Boolean(compare_values("LESS_THAN", a, b)? == Ordering::Less)),
        _ => Err(FormulaError::invalid_argument("LESS_THAN", "expected two values")),
    }
}

/// Equality across kinds: numbers and dates also match their textual form,
/// text comparison is case-sensitive, null only equals null.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::String(s)) | (Value::String(s), Value::Number(x)) => {
            parse_number(s).map_or(false, |y| *x == y)
        }
        (Value::DateTime(x), Value::String(s)) | (Value::String(s), Value::DateTime(x)) => {
            parse_datetime(s).map_or(false, |y| *x == y)
        }
        (Value::Boolean(x), Value::String(s)) | (Value::String(s), Value::Boolean(x)) => {
            s.trim().eq_ignore_ascii_case(if *x { "true" } else { "false" })
        }
        _ => a == b,
    }
}

/// Ordering of two comparable values
pub fn compare_values(function: &str, a: &Value, b: &Value) -> FormulaResult<Ordering> {
    let ordering = match (a, b) {
        (Value::Number(x), Value::Number(y)) => Some(x.cmp(y)),
        (Value::Number(x), Value::String(s)) => parse_number(s).map(|y| x.cmp(&y)),
        (Value::String(s), Value::Number(y)) => parse_number(s).map(|x| x.cmp(y)),
        (Value::DateTime(x), Value::DateTime(y)) => Some(x.cmp(y)),
        (Value::DateTime(x), Value::String(s)) => parse_datetime(s).map(|y| x.cmp(&y)),
        (Value::String(s), Value::DateTime(y)) => parse_datetime(s).map(|x| x.cmp(y)),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Boolean(x), Value::Boolean(y)) => Some(x.cmp(y)),
        _ => None,
    };
    ordering.ok_or_else(|| {
        FormulaError::type_mismatch(
            function,
            2,
            a.type_name(),
            b.type_name(),
        )
    })
}
