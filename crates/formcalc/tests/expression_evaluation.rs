//! Tests for expression evaluation through the engine

use formcalc::prelude::*;
use formcalc::Decimal;
use std::str::FromStr;

fn d(s: &str) -> Value {
    Value::Number(Decimal::from_str(s).unwrap())
}

fn form(pairs: &[(&str, Value)]) -> FormData {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

/// Test fixed-point arithmetic
#[test]
fn test_evaluate_fixed_point() {
    let engine = FormulaEngine::new();
    let result = engine
        .evaluate_expression("ROUND(DIVIDE(MULTIPLY(10,3),7),2)", &FormData::new())
        .unwrap();
    assert_eq!(result, d("4.29"));
    assert_eq!(result.to_string(), "4.29");

    // 0.1 + 0.2 is exact
    let result = engine.evaluate_expression("0.1 + 0.2", &FormData::new()).unwrap();
    assert_eq!(result, d("0.3"));
}

/// Test IF short-circuit
#[test]
fn test_evaluate_if_short_circuit() {
    let engine = FormulaEngine::new();
    let empty = FormData::new();

    assert_eq!(engine.evaluate_expression("IF(true, 1, UNDEFINED_VAR)", &empty), Ok(d("1")));
    assert_eq!(
        engine.evaluate_expression("UNDEFINED_VAR", &empty),
        Err(FormulaError::UnknownVariable("UNDEFINED_VAR".into()))
    );
    assert_eq!(
        engine.evaluate_expression("OR(true, UNDEFINED_VAR > 1)", &empty),
        Ok(Value::Boolean(true))
    );
}

/// Test evaluation with form data
#[test]
fn test_evaluate_with_variables() {
    let engine = FormulaEngine::new();
    let data = form(&[
        ("quantity", d("10")),
        ("unitPrice", d("25.50")),
        ("name", Value::string("  ada ")),
    ]);

    assert_eq!(engine.evaluate_expression("quantity * unitPrice", &data), Ok(d("255.00")));
    assert_eq!(engine.evaluate_expression("$quantity >= 10", &data), Ok(Value::Boolean(true)));
    assert_eq!(
        engine.evaluate_expression("UPPER(TRIM(name))", &data),
        Ok(Value::string("ADA"))
    );
    assert_eq!(
        engine.evaluate_expression("CONCAT('Total: ', quantity * unitPrice)", &data),
        Ok(Value::string("Total: 255.00"))
    );
}

/// Evaluating twice gives the same value and leaves the data untouched
#[test]
fn test_evaluate_is_deterministic() {
    let engine = FormulaEngine::new();
    let data = form(&[("a", d("3")), ("b", d("4"))]);
    let before = data.clone();

    let first = engine.evaluate_expression("ROUND(a / b, 1)", &data);
    let second = engine.evaluate_expression("ROUND(a / b, 1)", &data);
    assert_eq!(first, second);
    assert_eq!(data, before);
}

/// Test error taxonomy
#[test]
fn test_evaluate_errors() {
    let engine = FormulaEngine::new();
    let empty = FormData::new();

    assert_eq!(engine.evaluate_expression("DIVIDE(1, 0)", &empty), Err(FormulaError::DivisionByZero));
    assert_eq!(
        engine.evaluate_expression("NOPE(1)", &empty),
        Err(FormulaError::UnknownFunction("NOPE".into()))
    );
    assert!(matches!(
        engine.evaluate_expression("ROUND(1, 2, 3)", &empty),
        Err(FormulaError::ArityMismatch { .. })
    ));
    assert!(matches!(
        engine.evaluate_expression("ADD(1, 'abc')", &empty),
        Err(FormulaError::TypeMismatch { .. })
    ));
    assert!(matches!(
        engine.evaluate_expression("system(1)", &empty),
        Err(FormulaError::UnsafeExpression { .. })
    ));
    assert!(matches!(
        engine.evaluate_expression("STATIC('[]')", &empty),
        Err(FormulaError::OptionsOnly(_))
    ));
}

/// Test expression validation reports
#[test]
fn test_validate_expression() {
    let engine = FormulaEngine::new();

    assert!(engine.validate_expression("ADD(1, 2)").is_valid);
    assert!(!engine.validate_expression("ADD(1, 2").is_valid);
    assert!(!engine.validate_expression("ADD(1, 2))").is_valid);

    let report = engine.validate_expression("Eval(x)");
    assert!(!report.is_valid);
    assert_eq!(report.security_issues, vec!["eval"]);

    assert!(!engine.is_safe_expression("process.kill()"));
    assert!(engine.is_safe_expression("quantity * price"));
}

/// Test registry and operator listings
#[test]
fn test_available_functions_and_operators() {
    let engine = FormulaEngine::new();
    let names: Vec<&str> = engine.available_functions().iter().map(|f| f.name).collect();

    for expected in ["ADD", "IF", "CONCAT", "DATE_ADD", "IS_NULL", "STATIC", "API", "DATABASE"] {
        assert!(names.contains(&expected), "missing {}", expected);
    }

    let symbols: Vec<&str> = engine.supported_operators().iter().map(|o| o.symbol).collect();
    for expected in ["+", "-", "*", "/", "==", "!=", ">", "<", ">=", "<=", "&&", "||"] {
        assert!(symbols.contains(&expected), "missing {}", expected);
    }
}

/// Test date functions against a pinned clock
#[test]
fn test_evaluate_dates() {
    let now = chrono::NaiveDate::from_ymd_opt(2024, 1, 31)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap();
    let engine = FormulaEngine::new().with_clock(now);
    let empty = FormData::new();

    assert_eq!(
        engine.evaluate_expression("FORMAT_DATE(DATE_ADD(NOW(), 1, 'months'), '%Y-%m-%d')", &empty),
        Ok(Value::string("2024-02-29"))
    );
    assert_eq!(
        engine.evaluate_expression("DATE_DIFF('2024-01-01', TODAY(), 'days')", &empty),
        Ok(d("30"))
    );
}
