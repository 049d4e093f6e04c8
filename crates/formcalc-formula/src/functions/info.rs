//! Null-handling functions

use crate::ast::Expr;
use crate::error::{FormulaError, FormulaResult};
use crate::evaluator::{evaluate, EvaluationContext};
use formcalc_core::Value;

/// IS_NULL(value)
///
/// An absent variable counts as null instead of raising `UnknownVariable`.
pub fn fn_is_null(args: &[Expr], ctx: &EvaluationContext) -> FormulaResult<Value> {
    let [arg] = args else {
        return Err(FormulaError::ArityMismatch {
            function: "IS_NULL".into(),
            expected: "1".into(),
            actual: args.len(),
        });
    };
    if let Expr::Variable(name) = arg {
        return Ok(Value::Boolean(ctx.get(name).map_or(true, Value::is_null)));
    }
    Ok(Value::Boolean(evaluate(arg, ctx)?.is_null()))
}

/// IS_EMPTY(value)
pub fn fn_is_empty(args: &[Value], _ctx: &EvaluationContext) -> FormulaResult<Value> {
    Ok(Value::Boolean(args.first().map_or(true, Value::is_empty)))
}

/// COALESCE(value, ...)
pub fn fn_coalesce(args: &[Value], _ctx: &EvaluationContext) -> FormulaResult<Value> {
    Ok(args
        .iter()
        .find(|v| !v.is_null())
        .cloned()
        .unwrap_or(Value::Null))
}
