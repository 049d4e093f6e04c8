//! Date and time functions

use super::{datetime_arg, int_arg, str_arg};
use crate::error::{FormulaError, FormulaResult};
use crate::evaluator::EvaluationContext;
use chrono::format::{Item, StrftimeItems};
use chrono::{Datelike, Duration, Months, NaiveDateTime, NaiveTime};
use formcalc_core::{Decimal, Value};
use std::fmt::Write;

/// Units accepted by DATE_ADD and DATE_DIFF
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DateUnit {
    Days,
    Months,
    Years,
    Hours,
    Minutes,
    Seconds,
}

impl DateUnit {
    fn parse(function: &str, unit: &str) -> FormulaResult<Self> {
        match unit.trim().to_ascii_lowercase().as_str() {
            "days" | "day" | "d" => Ok(DateUnit::Days),
            "months" | "month" | "m" => Ok(DateUnit::Months),
            "years" | "year" | "y" => Ok(DateUnit::Years),
            "hours" | "hour" | "h" => Ok(DateUnit::Hours),
            "minutes" | "minute" | "min" => Ok(DateUnit::Minutes),
            "seconds" | "second" | "s" => Ok(DateUnit::Seconds),
            other => Err(FormulaError::invalid_argument(
                function,
                format!("unknown date unit '{}'", other),
            )),
        }
    }
}

/// NOW()
pub fn fn_now(_args: &[Value], ctx: &EvaluationContext) -> FormulaResult<Value> {
    Ok(Value::DateTime(ctx.now()))
}

/// TODAY()
pub fn fn_today(_args: &[Value], ctx: &EvaluationContext) -> FormulaResult<Value> {
    Ok(Value::DateTime(ctx.now().date().and_time(NaiveTime::MIN)))
}

/// DATE_ADD(date, amount, unit)
pub fn fn_date_add(args: &[Value], _ctx: &EvaluationContext) -> FormulaResult<Value> {
    let date = datetime_arg("DATE_ADD", args, 0)?;
    let amount = int_arg("DATE_ADD", args, 1)?;
    let unit = DateUnit::parse("DATE_ADD", str_arg("DATE_ADD", args, 2)?)?;

    let result = match unit {
        DateUnit::Days => Duration::try_days(amount).and_then(|d| date.checked_add_signed(d)),
        DateUnit::Hours => Duration::try_hours(amount).and_then(|d| date.checked_add_signed(d)),
        DateUnit::Minutes => Duration::try_minutes(amount).and_then(|d| date.checked_add_signed(d)),
        DateUnit::Seconds => Duration::try_seconds(amount).and_then(|d| date.checked_add_signed(d)),
        DateUnit::Months => add_months(date, amount),
        DateUnit::Years => amount.checked_mul(12).and_then(|m| add_months(date, m)),
    };
    result
        .map(Value::DateTime)
        .ok_or(FormulaError::NumericOverflow("DATE_ADD"))
}

fn add_months(date: NaiveDateTime, months: i64) -> Option<NaiveDateTime> {
    let magnitude = Months::new(u32::try_from(months.unsigned_abs()).ok()?);
    if months >= 0 {
        date.checked_add_months(magnitude)
    } else {
        date.checked_sub_months(magnitude)
    }
}

/// DATE_DIFF(start, end, unit)
///
/// Whole units from `start` to `end`; months and years count calendar
/// boundaries crossed.
pub fn fn_date_diff(args: &[Value], _ctx: &EvaluationContext) -> FormulaResult<Value> {
    let start = datetime_arg("DATE_DIFF", args, 0)?;
    let end = datetime_arg("DATE_DIFF", args, 1)?;
    let unit = DateUnit::parse("DATE_DIFF", str_arg("DATE_DIFF", args, 2)?)?;

    let diff = end - start;
    let months = i64::from(end.year() - start.year()) * 12 + i64::from(end.month())
        - i64::from(start.month());
    let result = match unit {
        DateUnit::Days => diff.num_days(),
        DateUnit::Hours => diff.num_hours(),
        DateUnit::Minutes => diff.num_minutes(),
        DateUnit::Seconds => diff.num_seconds(),
        DateUnit::Months => months,
        DateUnit::Years => i64::from(end.year() - start.year()),
    };
    Ok(Value::Number(Decimal::from(result)))
}

/// FORMAT_DATE(date, pattern)
///
/// `pattern` uses strftime specifiers (`%Y-%m-%d`).
pub fn fn_format_date(args: &[Value], _ctx: &EvaluationContext) -> FormulaResult<Value> {
    let date = datetime_arg("FORMAT_DATE", args, 0)?;
    let pattern = str_arg("FORMAT_DATE", args, 1)?;

    let items: Vec<Item> = StrftimeItems::new(pattern).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return Err(FormulaError::invalid_argument(
            "FORMAT_DATE",
            format!("invalid date pattern '{}'", pattern),
        ));
    }

    // Time zone specifiers (%z, %Z) fail on a naive date time
    let mut formatted = String::new();
    write!(formatted, "{}", date.format_with_items(items.into_iter())).map_err(|_| {
        FormulaError::invalid_argument(
            "FORMAT_DATE",
            format!("date pattern '{}' needs a time zone", pattern),
        )
    })?;
    Ok(Value::String(formatted))
}
