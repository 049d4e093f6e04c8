//! Formula error types

use thiserror::Error;

/// Result type for formula operations
pub type FormulaResult<T> = std::result::Result<T, FormulaError>;

/// Errors that can occur during expression parsing, evaluation or graph building
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormulaError {
    /// Expression text is empty or whitespace
    #[error("Expression is empty")]
    EmptyExpression,

    /// Parentheses do not pair up
    #[error("Unbalanced parentheses at position {position}")]
    UnbalancedParentheses { position: usize },

    /// A string literal is never closed
    #[error("Unterminated string literal starting at position {position}")]
    UnterminatedString { position: usize },

    /// Unparsable token or structure
    #[error("Syntax error: {0}")]
    Syntax(String),

    /// Expression text exceeds the configured length
    #[error("Expression is {length} characters long (limit {limit})")]
    ExpressionTooLong { length: usize, limit: usize },

    /// Calls nested deeper than the configured limit
    #[error("Expression nesting exceeds depth {limit}")]
    NestingTooDeep { limit: usize },

    /// Deny-listed token found in the expression text
    #[error("Unsafe expression: forbidden token '{token}'")]
    UnsafeExpression { token: String },

    /// Unknown function
    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    /// Wrong number of arguments
    #[error("Wrong number of arguments for {function}: expected {expected}, got {actual}")]
    ArityMismatch {
        function: String,
        expected: String,
        actual: usize,
    },

    /// Argument of the wrong type
    #[error("{function} argument {position}: expected {expected}, got {actual}")]
    TypeMismatch {
        function: String,
        position: usize,
        expected: String,
        actual: String,
    },

    /// Variable not present in the evaluation context
    #[error("Unknown variable: {0}")]
    UnknownVariable(String),

    /// Division by zero
    #[error("Division by zero")]
    DivisionByZero,

    /// Decimal arithmetic overflowed
    #[error("Numeric overflow in {0}")]
    NumericOverflow(&'static str),

    /// Invalid argument value (e.g. an unknown date unit)
    #[error("Invalid argument for {function}: {message}")]
    InvalidArgument { function: String, message: String },

    /// Option constructor used outside an options expression
    #[error("{0} is only available in options expressions")]
    OptionsOnly(String),

    /// External call reached the synchronous evaluator
    #[error("{0} requires the options resolver")]
    ExternalCall(String),

    /// Malformed option list payload
    #[error("Invalid option list: {0}")]
    InvalidOptions(String),

    /// Option list larger than the configured limit
    #[error("Option list has {count} entries (limit {limit})")]
    OptionLimitExceeded { count: usize, limit: usize },

    /// Two fields share a name
    #[error("Duplicate field name: {0}")]
    DuplicateField(String),

    /// Fields depend on each other in a loop
    #[error("Circular dependency: {}", path.join(" -> "))]
    CycleDetected { path: Vec<String> },
}

impl FormulaError {
    /// Errors raised by the text checks and the parser
    pub fn is_syntax_error(&self) -> bool {
        matches!(
            self,
            FormulaError::EmptyExpression
                | FormulaError::UnbalancedParentheses { .. }
                | FormulaError::UnterminatedString { .. }
                | FormulaError::Syntax(_)
                | FormulaError::ExpressionTooLong { .. }
                | FormulaError::NestingTooDeep { .. }
        )
    }

    pub(crate) fn type_mismatch(function: &str, position: usize, expected: &str, actual: &str) -> Self {
        FormulaError::TypeMismatch {
            function: function.to_string(),
            position,
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    pub(crate) fn invalid_argument(function: &str, message: impl Into<String>) -> Self {
        FormulaError::InvalidArgument {
            function: function.to_string(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_message_includes_path() {
        let err = FormulaError::CycleDetected {
            path: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "Circular dependency: a -> b -> a");
    }

    #[test]
    fn test_syntax_family() {
        assert!(FormulaError::EmptyExpression.is_syntax_error());
        assert!(FormulaError::UnbalancedParentheses { position: 3 }.is_syntax_error());
        assert!(!FormulaError::DivisionByZero.is_syntax_error());
        assert!(!FormulaError::UnsafeExpression { token: "eval".into() }.is_syntax_error());
    }
}
