//! # formcalc-formula
//!
//! Expression parser and evaluator for formcalc.
//!
//! This crate provides:
//! - Safety checks on expression text (deny-list, length, nesting)
//! - Expression parsing (text → AST)
//! - Expression evaluation (AST → value)
//! - The registry of built-in functions
//! - Dependency graphs between form fields
//!
//! ## Example
//!
//! ```rust
//! use formcalc_core::{FormData, Value};
//! use formcalc_formula::{evaluate_expression, EvaluationContext};
//!
//! let mut data = FormData::new();
//! data.insert("quantity".into(), Value::from(3));
//! data.insert("unitPrice".into(), Value::from(4));
//!
//! let ctx = EvaluationContext::new(&data);
//! let result = evaluate_expression("quantity * unitPrice", &ctx).unwrap();
//! assert_eq!(result, Value::from(12));
//! ```

pub mod ast;
pub mod dependency;
pub mod error;
pub mod evaluator;
pub mod functions;
pub mod parser;
pub mod safety;

pub use ast::Expr;
pub use dependency::{DependencyEdge, DependencyGraph, EdgeKind, GraphStats, SkippedExpression};
pub use error::{FormulaError, FormulaResult};
pub use evaluator::{
    apply_function, builtin_registry, evaluate, evaluate_expression, is_volatile,
    resolve_function, EvaluationContext, EvaluationScope,
};
pub use functions::logical::as_condition;
pub use functions::options::{option_list_from_json, option_list_from_rows, to_option_list};
pub use functions::{ArgKind, Category, FunctionDef, FunctionRegistry, FunctionScope, FunctionSignature, Handler};
pub use parser::{parse_expression, parse_expression_with, supported_operators, OperatorInfo};
pub use safety::{find_unsafe_token, is_safe_expression, ParseOptions};
