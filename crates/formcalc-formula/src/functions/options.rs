//! Option list constructors and conversions
//!
//! `STATIC` is evaluated here; `API` and `DATABASE` are registered with an
//! external handler and served by the options resolver, which uses the
//! conversions below on provider results.

use crate::error::{FormulaError, FormulaResult};
use crate::evaluator::EvaluationContext;
use formcalc_core::{OptionItem, Value};
use serde_json::{Map, Value as Json};

/// STATIC(json_array)
pub fn fn_static(args: &[Value], _ctx: &EvaluationContext) -> FormulaResult<Value> {
    match args.first() {
        Some(Value::OptionList(items)) => Ok(Value::OptionList(items.clone())),
        Some(other) => Err(FormulaError::type_mismatch(
            "STATIC",
            1,
            "option list",
            other.type_name(),
        )),
        None => Err(FormulaError::invalid_argument("STATIC", "missing option list")),
    }
}

/// Parse an option list from JSON text
pub fn option_list_from_text(text: &str) -> FormulaResult<Vec<OptionItem>> {
    let json: Json =
        serde_json::from_str(text).map_err(|e| FormulaError::InvalidOptions(e.to_string()))?;
    option_list_from_json(&json)
}

/// Convert a raw API result.
///
/// Accepts an array of options, or an object wrapping one under
/// `options`, `items` or `data`.
pub fn option_list_from_json(json: &Json) -> FormulaResult<Vec<OptionItem>> {
    match json {
        Json::Array(items) => items
            .iter()
            .map(|item| OptionItem::from_json(item).map_err(|e| FormulaError::InvalidOptions(e.to_string())))
            .collect(),
        Json::Object(map) => ["options", "items", "data"]
            .iter()
            .find_map(|key| map.get(*key))
            .ok_or_else(|| FormulaError::InvalidOptions("object without an option array".into()))
            .and_then(option_list_from_json),
        Json::Null => Ok(Vec::new()),
        _ => Err(FormulaError::InvalidOptions(format!(
            "expected an array, got {}",
            json
        ))),
    }
}

/// Convert database rows: `value`/`label` columns when present, otherwise
/// the first and second column.
pub fn option_list_from_rows(rows: &[Map<String, Json>]) -> FormulaResult<Vec<OptionItem>> {
    rows.iter()
        .map(|row| {
            let mut columns = row.values();
            let value = row
                .get("value")
                .or_else(|| columns.next())
                .ok_or_else(|| FormulaError::InvalidOptions("empty row".into()))?;
            let label = row.get("label").or_else(|| {
                if row.contains_key("value") {
                    None
                } else {
                    columns.next()
                }
            });
            let value = scalar_text(value);
            let label = label.map(scalar_text).unwrap_or_else(|| value.clone());
            Ok(OptionItem { value, label })
        })
        .collect()
}

/// Read any evaluation result as an option list: null is empty, a scalar is
/// a single option.
pub fn to_option_list(value: Value) -> FormulaResult<Vec<OptionItem>> {
    match value {
        Value::OptionList(items) => Ok(items),
        Value::Null => Ok(Vec::new()),
        Value::String(s) if s.trim_start().starts_with('[') => option_list_from_text(&s),
        scalar => {
            let text = scalar.to_string();
            Ok(vec![OptionItem::new(text.clone(), text)])
        }
    }
}

fn scalar_text(json: &Json) -> String {
    match json {
        Json::String(s) => s.clone(),
        Json::Null => String::new(),
        other => other.to_string(),
    }
}
