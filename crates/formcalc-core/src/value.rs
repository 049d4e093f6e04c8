//! Form values

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::fmt;

/// Form data: field name to current value, ordered by name
pub type FormData = BTreeMap<String, Value>;

/// Format used when a date-time is rendered as text
pub const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// A single selectable option of a choice field
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OptionItem {
    /// Submitted value
    pub value: String,
    /// Display label (not required to be unique)
    pub label: String,
}

impl OptionItem {
    /// Create a new option
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
        }
    }
}

/// A typed value produced or consumed by an expression
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Value {
    /// Fixed-point decimal number
    Number(Decimal),

    /// Boolean value
    Boolean(bool),

    /// Text value
    String(String),

    /// Date and time without zone
    DateTime(NaiveDateTime),

    /// Ordered option list
    OptionList(Vec<OptionItem>),

    /// No value
    #[default]
    Null,
}

/// The tag of a [`Value`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ValueKind {
    Number,
    Boolean,
    String,
    DateTime,
    OptionList,
    Null,
}

impl ValueKind {
    /// Lowercase name used in error messages
    pub fn name(self) -> &'static str {
        match self {
            ValueKind::Number => "number",
            ValueKind::Boolean => "boolean",
            ValueKind::String => "string",
            ValueKind::DateTime => "datetime",
            ValueKind::OptionList => "option list",
            ValueKind::Null => "null",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Value {
    /// Create a new string value
    pub fn string<S: Into<String>>(s: S) -> Self {
        Value::String(s.into())
    }

    /// Get the tag of this value
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Number(_) => ValueKind::Number,
            Value::Boolean(_) => ValueKind::Boolean,
            Value::String(_) => ValueKind::String,
            Value::DateTime(_) => ValueKind::DateTime,
            Value::OptionList(_) => ValueKind::OptionList,
            Value::Null => ValueKind::Null,
        }
    }

    /// Get the type name for error messages
    pub fn type_name(&self) -> &'static str {
        self.kind().name()
    }

    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Null, empty text, or an empty option list
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Null => true,
            Value::String(s) => s.trim().is_empty(),
            Value::OptionList(items) => items.is_empty(),
            _ => false,
        }
    }

    /// Try to get the value as a number
    pub fn as_number(&self) -> Option<Decimal> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Try to get the value as a boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get the value as a string slice
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get the value as a date-time
    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Value::DateTime(dt) => Some(*dt),
            _ => None,
        }
    }

    /// Try to get the value as an option list
    pub fn as_options(&self) -> Option<&[OptionItem]> {
        match self {
            Value::OptionList(items) => Some(items),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{}", n),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::String(s) => f.write_str(s),
            Value::DateTime(dt) => write!(f, "{}", dt.format(DATETIME_FORMAT)),
            Value::OptionList(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    f.write_str(&item.value)?;
                }
                Ok(())
            }
            Value::Null => Ok(()),
        }
    }
}

impl From<Decimal> for Value {
    fn from(n: Decimal) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(Decimal::from(n))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(dt: NaiveDateTime) -> Self {
        Value::DateTime(dt)
    }
}

impl From<Vec<OptionItem>> for Value {
    fn from(items: Vec<OptionItem>) -> Self {
        Value::OptionList(items)
    }
}

#[cfg(feature = "serde")]
mod json {
    use super::{OptionItem, Value, DATETIME_FORMAT};
    use crate::error::{Error, Result};
    use rust_decimal::Decimal;
    use serde_json::Value as Json;
    use std::str::FromStr;

    impl Value {
        /// Convert a JSON value. Numbers go through their textual form so
        /// they never pass through binary floating point.
        pub fn from_json(json: &Json) -> Result<Self> {
            match json {
                Json::Null => Ok(Value::Null),
                Json::Bool(b) => Ok(Value::Boolean(*b)),
                Json::Number(n) => parse_decimal(&n.to_string()).map(Value::Number),
                Json::String(s) => Ok(Value::String(s.clone())),
                Json::Array(items) => items
                    .iter()
                    .map(OptionItem::from_json)
                    .collect::<Result<Vec<_>>>()
                    .map(Value::OptionList),
                Json::Object(_) => Err(Error::UnsupportedJson(
                    "objects are only valid as option items".into(),
                )),
            }
        }

        /// Convert to a JSON value
        pub fn to_json(&self) -> Json {
            match self {
                Value::Number(n) => serde_json::Number::from_str(&n.normalize().to_string())
                    .map(Json::Number)
                    .unwrap_or_else(|_| Json::String(n.to_string())),
                Value::Boolean(b) => Json::Bool(*b),
                Value::String(s) => Json::String(s.clone()),
                Value::DateTime(dt) => Json::String(dt.format(DATETIME_FORMAT).to_string()),
                Value::OptionList(items) => Json::Array(
                    items
                        .iter()
                        .map(|item| serde_json::json!({ "value": item.value, "label": item.label }))
                        .collect(),
                ),
                Value::Null => Json::Null,
            }
        }
    }

    impl OptionItem {
        /// Convert a JSON option: an object with `value` and `label`, or a
        /// scalar used as both.
        pub fn from_json(json: &Json) -> Result<Self> {
            match json {
                Json::Object(map) => {
                    let value = map
                        .get("value")
                        .map(scalar_text)
                        .ok_or_else(|| Error::UnsupportedJson("option without 'value'".into()))?;
                    let label = map.get("label").map(scalar_text).unwrap_or_else(|| value.clone());
                    Ok(OptionItem { value, label })
                }
                Json::Array(_) => Err(Error::UnsupportedJson("nested array in option list".into())),
                scalar => {
                    let text = scalar_text(scalar);
                    Ok(OptionItem::new(text.clone(), text))
                }
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

    fn parse_decimal(text: &str) -> Result<Decimal> {
        Decimal::from_str(text)
            .or_else(|_| Decimal::from_scientific(text))
            .map_err(|_| Error::InvalidNumber(text.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_value_kind() {
        assert_eq!(Value::from(3).kind(), ValueKind::Number);
        assert_eq!(Value::from("x").kind(), ValueKind::String);
        assert_eq!(Value::Null.type_name(), "null");
        assert_eq!(Value::OptionList(vec![]).type_name(), "option list");
    }

    #[test]
    fn test_value_is_empty() {
        assert!(Value::Null.is_empty());
        assert!(Value::string("   ").is_empty());
        assert!(Value::OptionList(vec![]).is_empty());
        assert!(!Value::from(0).is_empty());
        assert!(!Value::from(false).is_empty());
    }

    #[test]
    fn test_decimal_equality_ignores_scale() {
        let a = Value::Number(Decimal::from_str("255.00").unwrap());
        let b = Value::from(255);
        assert_eq!(a, b);
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Number(Decimal::new(2550, 2)).to_string(), "25.50");
        assert_eq!(Value::from(true).to_string(), "true");
        assert_eq!(Value::Null.to_string(), "");
        let options = Value::OptionList(vec![OptionItem::new("us", "US"), OptionItem::new("ca", "CA")]);
        assert_eq!(options.to_string(), "us, ca");
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_from_json() {
        let json = serde_json::json!([{ "value": "us", "label": "United States" }, "ca", 7]);
        let value = Value::from_json(&json).unwrap();
        assert_eq!(
            value,
            Value::OptionList(vec![
                OptionItem::new("us", "United States"),
                OptionItem::new("ca", "ca"),
                OptionItem::new("7", "7"),
            ])
        );

        let number = Value::from_json(&serde_json::json!(25.5)).unwrap();
        assert_eq!(number, Value::Number(Decimal::new(255, 1)));
        assert!(Value::from_json(&serde_json::json!({ "a": 1 })).is_err());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_json_numbers_keep_precision() {
        let json: serde_json::Value = serde_json::from_str("12345678901234567.89").unwrap();
        let value = Value::from_json(&json).unwrap();
        assert_eq!(value, Value::Number(Decimal::from_str("12345678901234567.89").unwrap()));
        assert_eq!(value.to_json().to_string(), "12345678901234567.89");

        let json: serde_json::Value = serde_json::from_str("[0.1, 98765432109876543.21]").unwrap();
        assert_eq!(
            Value::from_json(&json).unwrap(),
            Value::OptionList(vec![
                OptionItem::new("0.1", "0.1"),
                OptionItem::new("98765432109876543.21", "98765432109876543.21"),
            ])
        );
    }
}
