//! Field definitions as supplied by the form schema

use crate::value::{Value, ValueKind};
use rust_decimal::Decimal;

/// Hint describing what an expression is expected to produce.
///
/// Only used for validation and authoring tools, never for evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ExpressionKind {
    #[default]
    Arithmetic,
    Boolean,
    String,
    DateTime,
    Conditional,
}

impl ExpressionKind {
    /// The value tag an expression of this kind is expected to yield, if fixed
    pub fn expected_kind(self) -> Option<ValueKind> {
        match self {
            ExpressionKind::Arithmetic => Some(ValueKind::Number),
            ExpressionKind::Boolean => Some(ValueKind::Boolean),
            ExpressionKind::String => Some(ValueKind::String),
            ExpressionKind::DateTime => Some(ValueKind::DateTime),
            ExpressionKind::Conditional => None,
        }
    }
}

/// Expression text plus its declared kind
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Expression {
    pub text: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub kind: ExpressionKind,
}

impl Expression {
    pub fn new(text: impl Into<String>, kind: ExpressionKind) -> Self {
        Self {
            text: text.into(),
            kind,
        }
    }
}

/// Declared type of a form field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum FieldType {
    #[default]
    Text,
    Number,
    Boolean,
    Date,
    Select,
    MultiSelect,
}

impl FieldType {
    /// Value a field of this type holds before anything was entered or computed
    pub fn default_value(self) -> Value {
        match self {
            FieldType::Text => Value::String(String::new()),
            FieldType::Number => Value::Number(Decimal::ZERO),
            FieldType::Boolean => Value::Boolean(false),
            FieldType::Date | FieldType::Select => Value::Null,
            FieldType::MultiSelect => Value::OptionList(Vec::new()),
        }
    }

    /// Expression kind a formula on a field of this type usually has
    pub fn formula_kind(self) -> ExpressionKind {
        match self {
            FieldType::Number => ExpressionKind::Arithmetic,
            FieldType::Boolean => ExpressionKind::Boolean,
            FieldType::Date => ExpressionKind::DateTime,
            FieldType::Text => ExpressionKind::String,
            FieldType::Select | FieldType::MultiSelect => ExpressionKind::Conditional,
        }
    }
}

/// A validation rule attached to a field; interpreted by the validation layer
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ValidationRule {
    /// Rule type, e.g. `required` or `max_length`
    pub rule: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub argument: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub message: Option<String>,
}

impl ValidationRule {
    pub fn new(rule: impl Into<String>) -> Self {
        Self {
            rule: rule.into(),
            argument: None,
            message: None,
        }
    }
}

/// Rules that only apply while `condition` evaluates to true
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConditionalValidation {
    pub condition: String,
    pub rules: Vec<ValidationRule>,
}

/// A boolean expression across several fields and the message shown when it fails
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CrossFieldValidation {
    pub expression: String,
    pub message: String,
}

/// A named, typed slot in a form schema
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FieldDefinition {
    pub name: String,
    #[cfg_attr(feature = "serde", serde(rename = "type", default))]
    pub field_type: FieldType,
    #[cfg_attr(feature = "serde", serde(default))]
    pub formula: Option<Expression>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub dynamic_options: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub conditional_validation: Option<ConditionalValidation>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub cross_field_validation: Option<CrossFieldValidation>,
}

impl FieldDefinition {
    /// Create a plain input field
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            formula: None,
            dynamic_options: None,
            conditional_validation: None,
            cross_field_validation: None,
        }
    }

    /// Attach a formula; its kind follows the field type
    pub fn with_formula(mut self, text: impl Into<String>) -> Self {
        self.formula = Some(Expression::new(text, self.field_type.formula_kind()));
        self
    }

    pub fn with_dynamic_options(mut self, text: impl Into<String>) -> Self {
        self.dynamic_options = Some(text.into());
        self
    }

    pub fn with_condition(mut self, condition: impl Into<String>, rules: Vec<ValidationRule>) -> Self {
        self.conditional_validation = Some(ConditionalValidation {
            condition: condition.into(),
            rules,
        });
        self
    }

    pub fn with_cross_field(mut self, expression: impl Into<String>, message: impl Into<String>) -> Self {
        self.cross_field_validation = Some(CrossFieldValidation {
            expression: expression.into(),
            message: message.into(),
        });
        self
    }

    /// Check if the field is computed by a formula
    pub fn is_calculated(&self) -> bool {
        self.formula.is_some()
    }

    /// Formula text, if any
    pub fn formula_text(&self) -> Option<&str> {
        self.formula.as_ref().map(|f| f.text.as_str())
    }
}
