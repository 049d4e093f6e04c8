//! # formcalc-core
//!
//! Core data structures for the formcalc form formula engine.
//!
//! This crate provides the types shared by every other formcalc crate:
//! - [`Value`] - Typed expression values (decimal numbers, text, dates, option lists)
//! - [`FieldDefinition`] - A form field with its optional formula, options and rules
//! - [`FormulaVersion`] and [`FormulaHistory`] - Versioned, published formulas
//!
//! ## Example
//!
//! ```rust
//! use formcalc_core::{FieldDefinition, FieldType, FormData, Value};
//!
//! let subtotal = FieldDefinition::new("subtotal", FieldType::Number)
//!     .with_formula("quantity * unitPrice");
//! assert!(subtotal.is_calculated());
//!
//! let mut data = FormData::new();
//! data.insert("quantity".into(), Value::from(10));
//! ```

pub mod error;
pub mod field;
pub mod value;
pub mod version;

// Re-exports for convenience
pub use error::{Error, Result};
pub use field::{
    ConditionalValidation, CrossFieldValidation, Expression, ExpressionKind, FieldDefinition,
    FieldType, ValidationRule,
};
pub use value::{FormData, OptionItem, Value, ValueKind, DATETIME_FORMAT};
pub use version::{FormulaHistory, FormulaVersion};

// Decimal type used by `Value::Number`
pub use rust_decimal::Decimal;
