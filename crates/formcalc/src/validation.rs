//! Expression validation and rule conditions

use formcalc_formula::{
    as_condition, evaluate, find_unsafe_token, parse_expression_with, safety::check_parentheses,
    EvaluationContext, FormulaError, FunctionRegistry, ParseOptions,
};
use std::collections::BTreeSet;
use tracing::warn;

/// Outcome of validating expression text without evaluating it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<FormulaError>,
    /// Deny-listed tokens found in the text
    pub security_issues: Vec<String>,
}

impl ValidationReport {
    /// Error messages, for display
    pub fn messages(&self) -> Vec<String> {
        self.errors.iter().map(ToString::to_string).collect()
    }
}

/// Run every static check on `text`, collecting all problems found.
///
/// When `known` is given, variable references outside it are reported as
/// unknown variables.
pub(crate) fn validate(
    text: &str,
    parse: &ParseOptions,
    registry: &FunctionRegistry,
    known: Option<&BTreeSet<String>>,
) -> ValidationReport {
    let mut report = ValidationReport::default();

    if text.trim().is_empty() {
        report.errors.push(FormulaError::EmptyExpression);
        return report;
    }

    if let Some(token) = find_unsafe_token(text) {
        report.security_issues.push(token.clone());
        report.errors.push(FormulaError::UnsafeExpression { token });
    }

    // Parentheses, then quotes
    if let Err(e) = check_parentheses(text) {
        report.errors.push(e);
    }

    if report.errors.is_empty() {
        match parse_expression_with(text, parse) {
            Ok(expr) => {
                report.errors.extend(registry.check_calls(&expr));
                if let Some(known) = known {
                    report.errors.extend(
                        expr.variables()
                            .into_iter()
                            .filter(|name| !known.contains(*name))
                            .map(|name| FormulaError::UnknownVariable(name.to_string())),
                    );
                }
            }
            Err(e) => report.errors.push(e),
        }
    }

    report.is_valid = report.errors.is_empty();
    report
}

/// A cross-field rule that did not hold
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrossFieldViolation {
    pub field: String,
    pub expression: String,
    pub message: String,
}

/// Evaluate a rule condition; anything but `true` (errors included) is false
pub(crate) fn condition_holds(text: &str, parse: &ParseOptions, ctx: &EvaluationContext) -> bool {
    let result = parse_expression_with(text, parse)
        .and_then(|expr| evaluate(&expr, ctx))
        .and_then(|value| as_condition("CONDITION", 0, value));
    match result {
        Ok(holds) => holds,
        Err(error) => {
            warn!(condition = text, %error, "condition could not be evaluated, treating as false");
            false
        }
    }
}
