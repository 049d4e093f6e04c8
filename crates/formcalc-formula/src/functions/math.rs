//! Arithmetic functions
//!
//! All arithmetic is fixed-point decimal; overflow is an error rather than a
//! silent wrap or loss of precision.

use super::{int_arg, number_arg};
use crate::error::{FormulaError, FormulaResult};
use crate::evaluator::EvaluationContext;
use formcalc_core::{Decimal, Value};
use rust_decimal::RoundingStrategy;

/// Largest scale a decimal can carry
const MAX_SCALE: i64 = 28;

fn numbers<'a>(name: &'a str, args: &'a [Value]) -> impl Iterator<Item = FormulaResult<Decimal>> + 'a {
    (0..args.len()).map(move |i| number_arg(name, args, i))
}

/// ADD(number, number, ...)
pub fn fn_add(args: &[Value], _ctx: &EvaluationContext) -> FormulaResult<Value> {
    let mut sum = Decimal::ZERO;
    for n in numbers("ADD", args) {
        sum = sum
            .checked_add(n?)
            .ok_or(FormulaError::NumericOverflow("ADD"))?;
    }
    Ok(Value::Number(sum))
}

/// SUBTRACT(number, number)
pub fn fn_subtract(args: &[Value], _ctx: &EvaluationContext) -> FormulaResult<Value> {
    let a = number_arg("SUBTRACT", args, 0)?;
    let b = number_arg("SUBTRACT", args, 1)?;
    a.checked_sub(b)
        .map(Value::Number)
        .ok_or(FormulaError::NumericOverflow("SUBTRACT"))
}

/// MULTIPLY(number, number, ...)
pub fn fn_multiply(args: &[Value], _ctx: &EvaluationContext) -> FormulaResult<Value> {
    let mut product = Decimal::ONE;
    for n in numbers("MULTIPLY", args) {
        product = product
            .checked_mul(n?)
            .ok_or(FormulaError::NumericOverflow("MULTIPLY"))?;
    }
    Ok(Value::Number(product))
}

/// DIVIDE(number, number)
pub fn fn_divide(args: &[Value], _ctx: &EvaluationContext) -> FormulaResult<Value> {
    let a = number_arg("DIVIDE", args, 0)?;
    let b = number_arg("DIVIDE", args, 1)?;
    if b.is_zero() {
        return Err(FormulaError::DivisionByZero);
    }
    a.checked_div(b)
        .map(Value::Number)
        .ok_or(FormulaError::NumericOverflow("DIVIDE"))
}

/// ROUND(number, [digits])
pub fn fn_round(args: &[Value], _ctx: &EvaluationContext) -> FormulaResult<Value> {
    let number = number_arg("ROUND", args, 0)?;
    let digits = if args.len() > 1 {
        int_arg("ROUND", args, 1)?
    } else {
        0
    };
    if !(0..=MAX_SCALE).contains(&digits) {
        return Err(FormulaError::invalid_argument(
            "ROUND",
            format!("digits must be between 0 and {}, got {}", MAX_SCALE, digits),
        ));
    }
    Ok(Value::Number(number.round_dp_with_strategy(
        digits as u32,
        RoundingStrategy::MidpointNearestEven,
    )))
}

/// ABS(number)
pub fn fn_abs(args: &[Value], _ctx: &EvaluationContext) -> FormulaResult<Value> {
    Ok(Value::Number(number_arg("ABS", args, 0)?.abs()))
}

/// MIN(number, ...)
pub fn fn_min(args: &[Value], _ctx: &EvaluationContext) -> FormulaResult<Value> {
    fold_extreme("MIN", args, |candidate, best| candidate < best)
}

/// MAX(number, ...)
pub fn fn_max(args: &[Value], _ctx: &EvaluationContext) -> FormulaResult<Value> {
    fold_extreme("MAX", args, |candidate, best| candidate > best)
}

fn fold_extreme(
    name: &str,
    args: &[Value],
    better: fn(Decimal, Decimal) -> bool,
) -> FormulaResult<Value> {
    let mut best: Option<Decimal> = None;
    for n in numbers(name, args) {
        let n = n?;
        if best.map_or(true, |b| better(n, b)) {
            best = Some(n);
        }
    }
    best.map(Value::Number)
        .ok_or_else(|| FormulaError::invalid_argument(name, "no arguments"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn d(s: &str) -> Value {
        Value::Number(Decimal::from_str(s).unwrap())
    }

    fn ctx_call(f: fn(&[Value], &EvaluationContext) -> FormulaResult<Value>, args: &[Value]) -> FormulaResult<Value> {
        let data = formcalc_core::FormData::new();
        let ctx = EvaluationContext::new(&data);
        f(args, &ctx)
    }

    #[test]
    fn test_round_is_bankers() {
        assert_eq!(ctx_call(fn_round, &[d("2.5")]).unwrap(), d("2"));
        assert_eq!(ctx_call(fn_round, &[d("3.5")]).unwrap(), d("4"));
        assert_eq!(ctx_call(fn_round, &[d("1.005"), d("2")]).unwrap(), d("1.00"));
        assert_eq!(ctx_call(fn_round, &[d("4.2857142"), d("2")]).unwrap(), d("4.29"));
    }

    #[test]
    fn test_round_rejects_bad_digits() {
        assert!(matches!(
            ctx_call(fn_round, &[d("1.5"), d("-1")]),
            Err(FormulaError::InvalidArgument { .. })
        ));
        assert!(matches!(
            ctx_call(fn_round, &[d("1.5"), d("1.5")]),
            Err(FormulaError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_divide_by_zero() {
        assert_eq!(
            ctx_call(fn_divide, &[d("1"), d("0.00")]),
            Err(FormulaError::DivisionByZero)
        );
    }

    #[test]
    fn test_overflow_is_reported() {
        let max = Value::Number(Decimal::MAX);
        assert_eq!(
            ctx_call(fn_add, &[max.clone(), max]),
            Err(FormulaError::NumericOverflow("ADD"))
        );
    }

    #[test]
    fn test_min_max_variadic() {
        let args = [d("3"), d("-1.5"), d("10")];
        assert_eq!(ctx_call(fn_min, &args).unwrap(), d("-1.5"));
        assert_eq!(ctx_call(fn_max, &args).unwrap(), d("10"));
    }
}
