//! Text functions

use super::{int_arg, str_arg};
use crate::error::{FormulaError, FormulaResult};
use crate::evaluator::EvaluationContext;
use formcalc_core::{Decimal, Value};

/// CONCAT(text, ...)
pub fn fn_concat(args: &[Value], _ctx: &EvaluationContext) -> FormulaResult<Value> {
    let mut result = String::new();
    for i in 0..args.len() {
        result.push_str(str_arg("CONCAT", args, i)?);
    }
    Ok(Value::String(result))
}

/// UPPER(text)
pub fn fn_upper(args: &[Value], _ctx: &EvaluationContext) -> FormulaResult<Value> {
    Ok(Value::String(str_arg("UPPER", args, 0)?.to_uppercase()))
}

/// LOWER(text)
pub fn fn_lower(args: &[Value], _ctx: &EvaluationContext) -> FormulaResult<Value> {
    Ok(Value::String(str_arg("LOWER", args, 0)?.to_lowercase()))
}

/// TRIM(text)
pub fn fn_trim(args: &[Value], _ctx: &EvaluationContext) -> FormulaResult<Value> {
    Ok(Value::String(str_arg("TRIM", args, 0)?.trim().to_string()))
}

/// CONTAINS(text, search)
pub fn fn_contains(args: &[Value], _ctx: &EvaluationContext) -> FormulaResult<Value> {
    let text = str_arg("CONTAINS", args, 0)?;
    let search = str_arg("CONTAINS", args, 1)?;
    Ok(Value::Boolean(text.contains(search)))
}

/// LENGTH(text)
pub fn fn_length(args: &[Value], _ctx: &EvaluationContext) -> FormulaResult<Value> {
    let count = str_arg("LENGTH", args, 0)?.chars().count();
    Ok(Value::Number(Decimal::from(count as u64)))
}

/// SUBSTRING(text, start, [length])
///
/// `start` is 0-based; a range past the end is clamped.
pub fn fn_substring(args: &[Value], _ctx: &EvaluationContext) -> FormulaResult<Value> {
    let text = str_arg("SUBSTRING", args, 0)?;
    let start = int_arg("SUBSTRING", args, 1)?;
    if start < 0 {
        return Err(FormulaError::invalid_argument("SUBSTRING", "start must not be negative"));
    }
    let length = if args.len() > 2 {
        let length = int_arg("SUBSTRING", args, 2)?;
        if length < 0 {
            return Err(FormulaError::invalid_argument("SUBSTRING", "length must not be negative"));
        }
        Some(length as usize)
    } else {
        None
    };

    let chars = text.chars().skip(start as usize);
    let result: String = match length {
        Some(n) => chars.take(n).collect(),
        None => chars.collect(),
    };
    Ok(Value::String(result))
}
