//! Prelude module - common imports for formcalc users
//!
//! ```rust
//! use formcalc::prelude::*;
//! ```

pub use crate::{
    // Engine
    EngineError,
    EngineOptions,
    FormulaEngine,
    // Recalculation
    FieldFailure,
    RecalcOptions,
    RecalcOutcome,
    // Options
    ApiOptionsProvider,
    DatabaseOptionsProvider,
    OptionsConfig,
    // Data model
    FieldDefinition,
    FieldType,
    FormData,
    OptionItem,
    ValidationRule,
    Value,
    // Formula types
    DependencyGraph,
    FormulaError,
    ParseOptions,
};
