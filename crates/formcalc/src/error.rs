//! Engine error types

use formcalc_formula::FormulaError;
use thiserror::Error;

/// Result type for engine operations
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Error reported by an options provider
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ProviderError(pub String);

impl ProviderError {
    pub fn new<S: Into<String>>(msg: S) -> Self {
        ProviderError(msg.into())
    }
}

/// Errors surfaced by [`crate::FormulaEngine`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Parse, evaluation or graph error
    #[error(transparent)]
    Formula(#[from] FormulaError),

    /// API(...) or DATABASE(...) used without a configured provider
    #[error("No {0} provider configured")]
    ProviderUnavailable(&'static str),

    /// An options provider failed
    #[error("{provider} provider failed for '{target}': {source}")]
    Provider {
        provider: &'static str,
        target: String,
        source: ProviderError,
    },

    /// The formula source failed
    #[error("Formula source error: {0}")]
    Source(String),

    /// No such formula or version
    #[error("Formula not found: {0}")]
    FormulaNotFound(String),

    /// The version exists but was never published
    #[error("Formula {formula} version {version} is not published")]
    NotPublished { formula: String, version: u32 },

    /// The version is published but outside its effective window
    #[error("Formula {formula} version {version} is not effective")]
    NotEffective { formula: String, version: u32 },
}

impl EngineError {
    /// The underlying formula error, if any
    pub fn formula_error(&self) -> Option<&FormulaError> {
        match self {
            EngineError::Formula(e) => Some(e),
            _ => None,
        }
    }
}
