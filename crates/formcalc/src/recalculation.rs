//! Incremental recalculation
//!
//! Recomputes calculated fields after a change, in dependency order, against
//! one working copy of the form data. Each field is evaluated at most once per
//! pass, and a failing formula only affects its own field.
//!
//! # Example
//!
//! ```rust
//! use formcalc::prelude::*;
//!
//! let fields = vec![
//!     FieldDefinition::new("quantity", FieldType::Number),
//!     FieldDefinition::new("unitPrice", FieldType::Number),
//!     FieldDefinition::new("subtotal", FieldType::Number).with_formula("quantity * unitPrice"),
//! ];
//! let mut data = FormData::new();
//! data.insert("quantity".into(), Value::from(2));
//! data.insert("unitPrice".into(), Value::from(5));
//!
//! let engine = FormulaEngine::new();
//! let outcome = engine.recalculate(&data, &fields, None).unwrap();
//! assert_eq!(outcome.data["subtotal"], Value::from(10));
//! println!("Calculated {} fields", outcome.stats.calculated);
//! ```

use chrono::NaiveDateTime;
use formcalc_core::{FieldDefinition, FormData, Value};
use formcalc_formula::{
    evaluate, parse_expression_with, DependencyGraph, EvaluationContext, Expr, FormulaError,
    FunctionRegistry, ParseOptions,
};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Options for a recalculation pass
#[derive(Debug, Clone)]
pub struct RecalcOptions {
    /// Give a failing field its type's default value when it has no previous value
    pub default_on_failure: bool,
}

impl Default for RecalcOptions {
    fn default() -> Self {
        Self {
            default_on_failure: true,
        }
    }
}

/// A field whose formula could not be computed during a pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldFailure {
    pub field: String,
    pub error: FormulaError,
}

/// Statistics from a recalculation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecalcStats {
    /// Number of calculated fields selected for the pass
    pub candidates: usize,
    /// Number of fields successfully calculated
    pub calculated: usize,
    /// Number of fields whose formula failed
    pub errors: usize,
    /// Failed fields that fell back to their type default
    pub defaulted: usize,
}

/// Result of a recalculation pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecalcOutcome {
    /// Form data with recomputed values written back
    pub data: FormData,
    /// Fields whose value was recomputed, in evaluation order
    pub recomputed: Vec<String>,
    /// Fields that could not be computed
    pub failures: Vec<FieldFailure>,
    pub stats: RecalcStats,
}

impl RecalcOutcome {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// One recalculation pass over a field set
pub(crate) struct Recalculator<'a> {
    pub options: &'a RecalcOptions,
    pub parse: &'a ParseOptions,
    pub registry: &'a FunctionRegistry,
    pub now: Option<NaiveDateTime>,
}

impl Recalculator<'_> {
    /// Recalculate `data`: every calculated field when `changed` is None,
    /// otherwise the fields transitively depending on `changed`
    pub fn run(
        &self,
        data: &FormData,
        fields: &[FieldDefinition],
        graph: &DependencyGraph,
        changed: Option<&str>,
    ) -> RecalcOutcome {
        let mut outcome = RecalcOutcome {
            data: data.clone(),
            ..Default::default()
        };

        // Phase 1: Select candidates in dependency order
        let order = graph.calculation_order(changed);
        outcome.stats.candidates = order.len();
        debug!(changed, candidates = order.len(), ?order, "recalculating");

        if order.is_empty() {
            return outcome;
        }

        // Phase 2: Index the field definitions by name
        let definitions: HashMap<&str, &FieldDefinition> =
            fields.iter().map(|f| (f.name.as_str(), f)).collect();

        // Phase 3: Parse and evaluate in order, writing each result back immediately
        for name in order {
            let Some(field) = definitions.get(name) else {
                continue;
            };
            let Some(text) = field.formula_text() else {
                continue;
            };

            match parse_expression_with(text, self.parse).and_then(|expr| self.evaluate(&expr, &outcome.data)) {
                Ok(value) => {
                    outcome.data.insert(field.name.clone(), value);
                    outcome.recomputed.push(field.name.clone());
                    outcome.stats.calculated += 1;
                }
                Err(error) => {
                    warn!(field = %field.name, %error, "formula failed, keeping previous value");
                    if !outcome.data.contains_key(&field.name) && self.options.default_on_failure {
                        outcome
                            .data
                            .insert(field.name.clone(), field.field_type.default_value());
                        outcome.stats.defaulted += 1;
                    }
                    outcome.failures.push(FieldFailure {
                        field: field.name.clone(),
                        error,
                    });
                    outcome.stats.errors += 1;
                }
            }
        }

        debug!(
            calculated = outcome.stats.calculated,
            errors = outcome.stats.errors,
            "recalculation finished"
        );
        outcome
    }

    fn evaluate(&self, expr: &Expr, data: &FormData) -> Result<Value, FormulaError> {
        let mut ctx = EvaluationContext::new(data).with_registry(self.registry);
        if let Some(now) = self.now {
            ctx = ctx.at(now);
        }
        evaluate(expr, &ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use formcalc_core::{Decimal, FieldType};
    use formcalc_formula::builtin_registry;
    use pretty_assertions::assert_eq;
    use std::str::FromStr;

    fn d(s: &str) -> Value {
        Value::Number(Decimal::from_str(s).unwrap())
    }

    fn run(data: &FormData, fields: &[FieldDefinition], changed: Option<&str>) -> RecalcOutcome {
        let graph = DependencyGraph::build(fields).unwrap();
        let options = RecalcOptions::default();
        let parse = ParseOptions::default();
        Recalculator {
            options: &options,
            parse: &parse,
            registry: builtin_registry(),
            now: None,
        }
        .run(data, fields, &graph, changed)
    }

    fn chain() -> Vec<FieldDefinition> {
        vec![
            FieldDefinition::new("a", FieldType::Number),
            FieldDefinition::new("b", FieldType::Number).with_formula("a * 2"),
            FieldDefinition::new("c", FieldType::Number).with_formula("b + 1"),
            FieldDefinition::new("other", FieldType::Number).with_formula("7"),
        ]
    }

    #[test]
    fn test_full_pass() {
        let mut data = FormData::new();
        data.insert("a".into(), d("3"));

        let outcome = run(&data, &chain(), None);
        assert_eq!(outcome.recomputed, vec!["b", "c", "other"]);
        assert_eq!(outcome.data["c"], d("7"));
        assert_eq!(outcome.stats.candidates, 3);
        assert!(outcome.is_clean());
    }

    #[test]
    fn test_incremental_pass_skips_unrelated_fields() {
        let mut data = FormData::new();
        data.insert("a".into(), d("4"));
        data.insert("other".into(), d("0"));

        let outcome = run(&data, &chain(), Some("a"));
        assert_eq!(outcome.recomputed, vec!["b", "c"]);
        assert_eq!(outcome.data["c"], d("9"));
        // Not downstream of `a`, so left as it was
        assert_eq!(outcome.data["other"], d("0"));
    }

    #[test]
    fn test_diamond_is_evaluated_once() {
        let fields = vec![
            FieldDefinition::new("x", FieldType::Number),
            FieldDefinition::new("left", FieldType::Number).with_formula("x + 1"),
            FieldDefinition::new("right", FieldType::Number).with_formula("x + 2"),
            FieldDefinition::new("sum", FieldType::Number).with_formula("left + right"),
        ];
        let mut data = FormData::new();
        data.insert("x".into(), d("1"));

        let outcome = run(&data, &fields, Some("x"));
        assert_eq!(outcome.recomputed, vec!["left", "right", "sum"]);
        assert_eq!(outcome.data["sum"], d("5"));
    }

    #[test]
    fn test_failure_without_previous_value_gets_default() {
        let fields = vec![
            FieldDefinition::new("n", FieldType::Number).with_formula("DIVIDE(1, 0)"),
            FieldDefinition::new("label", FieldType::Text).with_formula("missing_input"),
        ];
        let outcome = run(&FormData::new(), &fields, None);

        assert_eq!(outcome.data["n"], d("0"));
        assert_eq!(outcome.data["label"], Value::string(""));
        assert_eq!(outcome.stats.defaulted, 2);
        assert_eq!(
            outcome.failures,
            vec![
                FieldFailure {
                    field: "n".into(),
                    error: FormulaError::DivisionByZero
                },
                FieldFailure {
                    field: "label".into(),
                    error: FormulaError::UnknownVariable("missing_input".into())
                },
            ]
        );
        assert!(outcome.recomputed.is_empty());
    }

    #[test]
    fn test_failure_keeps_previous_value() {
        let fields = vec![FieldDefinition::new("n", FieldType::Number).with_formula("DIVIDE(1, 0)")];
        let mut data = FormData::new();
        data.insert("n".into(), d("42"));

        let outcome = run(&data, &fields, None);
        assert_eq!(outcome.data["n"], d("42"));
        assert_eq!(outcome.stats.defaulted, 0);
        assert_eq!(outcome.stats.errors, 1);
    }
}
