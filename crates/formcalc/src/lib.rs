//! # formcalc
//!
//! A form formula engine: operators attach small expressions to form fields
//! to compute values, choose selectable options, or decide whether a
//! validation rule applies.
//!
//! ## Features
//!
//! - Safe expression parsing (deny-list, length and nesting limits)
//! - Deterministic fixed-point evaluation with short-circuit `IF`/`AND`/`OR`
//! - Dependency graphs with cycle detection and full cycle paths
//! - Incremental recalculation with per-field failure isolation
//! - Dynamic options from static lists, APIs and databases, with a cache
//! - Formula version selection and conditional / cross-field rules
//!
//! ## Example
//!
//! ```rust
//! use formcalc::prelude::*;
//!
//! let fields = vec![
//!     FieldDefinition::new("quantity", FieldType::Number),
//!     FieldDefinition::new("unitPrice", FieldType::Number),
//!     FieldDefinition::new("total", FieldType::Number).with_formula("quantity * unitPrice"),
//! ];
//!
//! let mut data = FormData::new();
//! data.insert("quantity".into(), Value::from(3));
//! data.insert("unitPrice".into(), Value::from(7));
//!
//! let engine = FormulaEngine::new();
//! let outcome = engine.recalculate(&data, &fields, Some("quantity")).unwrap();
//! assert_eq!(outcome.data["total"], Value::from(21));
//! assert_eq!(outcome.recomputed, vec!["total"]);
//! ```

pub mod audit;
pub mod engine;
pub mod error;
pub mod options;
pub mod prelude;
pub mod recalculation;
pub mod validation;
pub mod versions;

pub use audit::{AuditError, AuditRecord, AuditSink, TracingAuditSink};
pub use engine::{EngineOptions, FormulaEngine};
pub use error::{EngineError, EngineResult, ProviderError};
pub use options::{
    ApiOptionsProvider, CacheKey, CacheStats, DatabaseOptionsProvider, OptionsCache,
    OptionsCacheConfig, OptionsConfig, Row, StaticApiProvider, StaticDatabaseProvider,
};
pub use recalculation::{FieldFailure, RecalcOptions, RecalcOutcome, RecalcStats};
pub use validation::{CrossFieldViolation, ValidationReport};
pub use versions::{select_version, FormulaSource, InMemoryFormulaSource};

// Re-export core types
pub use formcalc_core::{
    ConditionalValidation, CrossFieldValidation, Decimal, Expression, ExpressionKind,
    FieldDefinition, FieldType, FormData, FormulaHistory, FormulaVersion, OptionItem,
    ValidationRule, Value, ValueKind,
};

// Re-export formula types
pub use formcalc_formula::{
    parse_expression, DependencyEdge, DependencyGraph, EdgeKind, Expr, FormulaError,
    FormulaResult, FunctionSignature, GraphStats, OperatorInfo, ParseOptions,
};
