//! Built-in functions and the function registry

pub mod date;
pub mod info;
pub mod logical;
pub mod math;
pub mod options;
pub mod text;

use crate::ast::Expr;
use crate::error::{FormulaError, FormulaResult};
use crate::evaluator::EvaluationContext;
use chrono::{NaiveDate, NaiveDateTime};
use formcalc_core::{Decimal, Value};
use serde::Serialize;
use std::collections::HashMap;
use std::str::FromStr;

/// Implementation of a function that receives evaluated, coerced arguments
pub type FunctionImpl = fn(&[Value], &EvaluationContext) -> FormulaResult<Value>;

/// Implementation of a function that decides itself which arguments to evaluate
pub type LazyImpl = fn(&[Expr], &EvaluationContext) -> FormulaResult<Value>;

/// How a function is invoked
#[derive(Clone, Copy)]
pub enum Handler {
    /// Arguments evaluated left to right, then coerced to the signature
    Eager(FunctionImpl),
    /// Arguments passed unevaluated (short-circuiting forms)
    Lazy(LazyImpl),
    /// Served by an external provider through the options resolver
    External,
}

/// Expected tag of an argument or return value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgKind {
    Any,
    Number,
    Boolean,
    String,
    DateTime,
    OptionList,
}

impl ArgKind {
    pub fn name(self) -> &'static str {
        match self {
            ArgKind::Any => "any",
            ArgKind::Number => "number",
            ArgKind::Boolean => "boolean",
            ArgKind::String => "string",
            ArgKind::DateTime => "datetime",
            ArgKind::OptionList => "option list",
        }
    }
}

/// Function grouping shown to authoring tools
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Arithmetic,
    Logical,
    Comparison,
    Text,
    Date,
    Null,
    Options,
}

/// Where a function may be called
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionScope {
    Anywhere,
    OptionsOnly,
}

/// Function definition
#[derive(Clone, Copy)]
pub struct FunctionDef {
    /// Function name (uppercase)
    pub name: &'static str,
    /// Minimum arguments
    pub min_args: usize,
    /// Maximum arguments (None = unlimited)
    pub max_args: Option<usize>,
    /// Expected kind per position; the last entry repeats for variadic tails
    pub arg_kinds: &'static [ArgKind],
    /// Kind of the result
    pub returns: ArgKind,
    pub category: Category,
    pub description: &'static str,
    /// Implementation
    pub handler: Handler,
    /// Is volatile (differs between evaluations with the same inputs)
    pub volatile: bool,
    pub scope: FunctionScope,
}

impl FunctionDef {
    /// Expected kind of the argument at `position` (0-based)
    pub fn arg_kind(&self, position: usize) -> ArgKind {
        self.arg_kinds
            .get(position)
            .or_else(|| self.arg_kinds.last())
            .copied()
            .unwrap_or(ArgKind::Any)
    }

    /// Human readable arity, e.g. `2`, `at least 1`, `1 to 2`
    pub fn expected_arity(&self) -> String {
        match self.max_args {
            Some(max) if max == self.min_args => max.to_string(),
            Some(max) => format!("{} to {}", self.min_args, max),
            None => format!("at least {}", self.min_args),
        }
    }

    /// Check an argument count against the signature
    pub fn check_arity(&self, actual: usize) -> FormulaResult<()> {
        let too_few = actual < self.min_args;
        let too_many = self.max_args.map_or(false, |max| actual > max);
        if too_few || too_many {
            return Err(FormulaError::ArityMismatch {
                function: self.name.to_string(),
                expected: self.expected_arity(),
                actual,
            });
        }
        Ok(())
    }

    /// Public description of this function
    pub fn signature(&self) -> FunctionSignature {
        let shown = self.max_args.unwrap_or(self.arg_kinds.len()).max(self.min_args);
        FunctionSignature {
            name: self.name,
            min_args: self.min_args,
            max_args: self.max_args,
            arg_kinds: (0..shown).map(|i| self.arg_kind(i)).collect(),
            returns: self.returns,
            category: self.category,
            description: self.description,
            volatile: self.volatile,
            options_only: self.scope == FunctionScope::OptionsOnly,
        }
    }
}

/// Function signature as exposed to authoring tools
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionSignature {
    pub name: &'static str,
    pub min_args: usize,
    pub max_args: Option<usize>,
    pub arg_kinds: Vec<ArgKind>,
    pub returns: ArgKind,
    pub category: Category,
    pub description: &'static str,
    pub volatile: bool,
    pub options_only: bool,
}

/// Function registry
#[derive(Clone)]
pub struct FunctionRegistry {
    functions: HashMap<String, FunctionDef>,
}

impl FunctionRegistry {
    /// Create a new registry with all built-in functions
    pub fn new() -> Self {
        let mut registry = Self::empty();

        registry.register_math_functions();
        registry.register_logical_functions();
        registry.register_text_functions();
        registry.register_date_functions();
        registry.register_info_functions();
        registry.register_option_functions();

        registry
    }

    /// Create a registry without any functions
    pub fn empty() -> Self {
        Self {
            functions: HashMap::new(),
        }
    }

    /// Look up a function by name
    pub fn get(&self, name: &str) -> Option<&FunctionDef> {
        self.functions.get(&name.to_uppercase())
    }

    /// Look up a function by name, failing with `UnknownFunction`
    pub fn lookup(&self, name: &str) -> FormulaResult<&FunctionDef> {
        self.get(name)
            .ok_or_else(|| FormulaError::UnknownFunction(name.to_string()))
    }

    /// Register a function, replacing any previous definition of the same name
    pub fn register(&mut self, def: FunctionDef) {
        self.functions.insert(def.name.to_uppercase(), def);
    }

    /// Signatures of every registered function, sorted by category then name
    pub fn signatures(&self) -> Vec<FunctionSignature> {
        let mut signatures: Vec<_> = self.functions.values().map(FunctionDef::signature).collect();
        signatures.sort_by(|a, b| (a.category, a.name).cmp(&(b.category, b.name)));
        signatures
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Report unknown functions and arity mismatches without evaluating
    pub fn check_calls(&self, expr: &Expr) -> Vec<FormulaError> {
        let mut errors = Vec::new();
        expr.visit(&mut |node| {
            if let Expr::Function { name, args } = node {
                match self.lookup(name) {
                    Ok(def) => {
                        if let Err(e) = def.check_arity(args.len()) {
                            errors.push(e);
                        }
                    }
                    Err(e) => errors.push(e),
                }
            }
        });
        errors
    }

    fn register_math_functions(&mut self) {
        use ArgKind::Number;

        // ADD
        self.register(FunctionDef {
            name: "ADD",
            min_args: 2,
            max_args: None,
            arg_kinds: &[Number],
            returns: Number,
            category: Category::Arithmetic,
            description: "Sum of all arguments",
            handler: Handler::Eager(math::fn_add),
            volatile: false,
            scope: FunctionScope::Anywhere,
        });

        // SUBTRACT
        self.register(FunctionDef {
            name: "SUBTRACT",
            min_args: 2,
            max_args: Some(2),
            arg_kinds: &[Number, Number],
            returns: Number,
            category: Category::Arithmetic,
            description: "First argument minus the second",
            handler: Handler::Eager(math::fn_subtract),
            volatile: false,
            scope: FunctionScope::Anywhere,
        });

        // MULTIPLY
        self.register(FunctionDef {
            name: "MULTIPLY",
            min_args: 2,
            max_args: None,
            arg_kinds: &[Number],
            returns: Number,
            category: Category::Arithmetic,
            description: "Product of all arguments",
            handler: Handler::Eager(math::fn_multiply),
            volatile: false,
            scope: FunctionScope::Anywhere,
        });

        // DIVIDE
        self.register(FunctionDef {
            name: "DIVIDE",
            min_args: 2,
            max_args: Some(2),
            arg_kinds: &[Number, Number],
            returns: Number,
            category: Category::Arithmetic,
            description: "First argument divided by the second",
            handler: Handler::Eager(math::fn_divide),
            volatile: false,
            scope: FunctionScope::Anywhere,
        });

        // ROUND
        self.register(FunctionDef {
            name: "ROUND",
            min_args: 1,
            max_args: Some(2),
            arg_kinds: &[Number, Number],
            returns: Number,
            category: Category::Arithmetic,
            description: "Round to the given number of decimal places (midpoint to even)",
            handler: Handler::Eager(math::fn_round),
            volatile: false,
            scope: FunctionScope::Anywhere,
        });

        // ABS
        self.register(FunctionDef {
            name: "ABS",
            min_args: 1,
            max_args: Some(1),
            arg_kinds: &[Number],
            returns: Number,
            category: Category::Arithmetic,
            description: "Absolute value",
            handler: Handler::Eager(math::fn_abs),
            volatile: false,
            scope: FunctionScope::Anywhere,
        });

        // MIN
        self.register(FunctionDef {
            name: "MIN",
            min_args: 1,
            max_args: None,
            arg_kinds: &[Number],
            returns: Number,
            category: Category::Arithmetic,
            description: "Smallest argument",
            handler: Handler::Eager(math::fn_min),
            volatile: false,
            scope: FunctionScope::Anywhere,
        });

        // MAX
        self.register(FunctionDef {
            name: "MAX",
            min_args: 1,
            max_args: None,
            arg_kinds: &[Number],
            returns: Number,
            category: Category::Arithmetic,
            description: "Largest argument",
            handler: Handler::Eager(math::fn_max),
            volatile: false,
            scope: FunctionScope::Anywhere,
        });
    }

    fn register_logical_functions(&mut self) {
        use ArgKind::{Any, Boolean};

        // IF
        self.register(FunctionDef {
            name: "IF",
            min_args: 2,
            max_args: Some(3),
            arg_kinds: &[Boolean, Any, Any],
            returns: Any,
            category: Category::Logical,
            description: "Second argument when the condition holds, otherwise the third (or null)",
            handler: Handler::Lazy(logical::fn_if),
            volatile: false,
            scope: FunctionScope::Anywhere,
        });

        // AND
        self.register(FunctionDef {
            name: "AND",
            min_args: 1,
            max_args: None,
            arg_kinds: &[Boolean],
            returns: Boolean,
            category: Category::Logical,
            description: "True when every argument is true; stops at the first false",
            handler: Handler::Lazy(logical::fn_and),
            volatile: false,
            scope: FunctionScope::Anywhere,
        });

        // OR
        self.register(FunctionDef {
            name: "OR",
            min_args: 1,
            max_args: None,
            arg_kinds: &[Boolean],
            returns: Boolean,
            category: Category::Logical,
            description: "True when any argument is true; stops at the first true",
            handler: Handler::Lazy(logical::fn_or),
            volatile: false,
            scope: FunctionScope::Anywhere,
        });

        // NOT
        self.register(FunctionDef {
            name: "NOT",
            min_args: 1,
            max_args: Some(1),
            arg_kinds: &[Boolean],
            returns: Boolean,
            category: Category::Logical,
            description: "Logical negation",
            handler: Handler::Eager(logical::fn_not),
            volatile: false,
            scope: FunctionScope::Anywhere,
        });

        // EQUALS
        self.register(FunctionDef {
            name: "EQUALS",
            min_args: 2,
            max_args: Some(2),
            arg_kinds: &[Any, Any],
            returns: Boolean,
            category: Category::Comparison,
            description: "True when both arguments are equal",
            handler: Handler::Eager(logical::fn_equals),
            volatile: false,
            scope: FunctionScope::Anywhere,
        });

        // GREATER_THAN
        self.register(FunctionDef {
            name: "GREATER_THAN",
            min_args: 2,
            max_args: Some(2),
            arg_kinds: &[Any, Any],
            returns: Boolean,
            category: Category::Comparison,
            description: "True when the first argument is greater than the second",
            handler: Handler::Eager(logical::fn_greater_than),
            volatile: false,
            scope: FunctionScope::Anywhere,
        });

        // LESS_THAN
        self.register(FunctionDef {
            name: "LESS_THAN",
            min_args: 2,
            max_args: Some(2),
            arg_kinds: &[Any, Any],
            returns: Boolean,
            category: Category::Comparison,
            description: "True when the first argument is less than the second",
            handler: Handler::Eager(logical::fn_less_than),
            volatile: false,
            scope: FunctionScope::Anywhere,
        });
    }

    fn register_text_functions(&mut self) {
        use ArgKind::{Boolean, Number, String};

        // CONCAT
        self.register(FunctionDef {
            name: "CONCAT",
            min_args: 1,
            max_args: None,
            arg_kinds: &[String],
            returns: String,
            category: Category::Text,
            description: "Join all arguments as text",
            handler: Handler::Eager(text::fn_concat),
            volatile: false,
            scope: FunctionScope::Anywhere,
        });

        // UPPER
        self.register(FunctionDef {
            name: "UPPER",
            min_args: 1,
            max_args: Some(1),
            arg_kinds: &[String],
            returns: String,
            category: Category::Text,
            description: "Convert to uppercase",
            handler: Handler::Eager(text::fn_upper),
            volatile: false,
            scope: FunctionScope::Anywhere,
        });

        // LOWER
        self.register(FunctionDef {
            name: "LOWER",
            min_args: 1,
            max_args: Some(1),
            arg_kinds: &[String],
            returns: String,
            category: Category::Text,
            description: "Convert to lowercase",
            handler: Handler::Eager(text::fn_lower),
            volatile: false,
            scope: FunctionScope::Anywhere,
        });

        // TRIM
        self.register(FunctionDef {
            name: "TRIM",
            min_args: 1,
            max_args: Some(1),
            arg_kinds: &[String],
            returns: String,
            category: Category::Text,
            description: "Remove leading and trailing whitespace",
            handler: Handler::Eager(text::fn_trim),
            volatile: false,
            scope: FunctionScope::Anywhere,
        });

        // CONTAINS
        self.register(FunctionDef {
            name: "CONTAINS",
            min_args: 2,
            max_args: Some(2),
            arg_kinds: &[String, String],
            returns: Boolean,
            category: Category::Text,
            description: "True when the first text contains the second (case-sensitive)",
            handler: Handler::Eager(text::fn_contains),
            volatile: false,
            scope: FunctionScope::Anywhere,
        });

        // LENGTH
        self.register(FunctionDef {
            name: "LENGTH",
            min_args: 1,
            max_args: Some(1),
            arg_kinds: &[String],
            returns: Number,
            category: Category::Text,
            description: "Number of characters",
            handler: Handler::Eager(text::fn_length),
            volatile: false,
            scope: FunctionScope::Anywhere,
        });

        // SUBSTRING
        self.register(FunctionDef {
            name: "SUBSTRING",
            min_args: 2,
            max_args: Some(3),
            arg_kinds: &[String, Number, Number],
            returns: String,
            category: Category::Text,
            description: "Characters from a 0-based start, optionally limited to a length",
            handler: Handler::Eager(text::fn_substring),
            volatile: false,
            scope: FunctionScope::Anywhere,
        });
    }

    fn register_date_functions(&mut self) {
        use ArgKind::{DateTime, Number, String};

        // NOW (volatile)
        self.register(FunctionDef {
            name: "NOW",
            min_args: 0,
            max_args: Some(0),
            arg_kinds: &[],
            returns: DateTime,
            category: Category::Date,
            description: "Current date and time",
            handler: Handler::Eager(date::fn_now),
            volatile: true,
            scope: FunctionScope::Anywhere,
        });

        // TODAY (volatile)
        self.register(FunctionDef {
            name: "TODAY",
            min_args: 0,
            max_args: Some(0),
            arg_kinds: &[],
            returns: DateTime,
            category: Category::Date,
            description: "Current date at midnight",
            handler: Handler::Eager(date::fn_today),
            volatile: true,
            scope: FunctionScope::Anywhere,
        });

        // DATE_ADD
        self.register(FunctionDef {
            name: "DATE_ADD",
            min_args: 3,
            max_args: Some(3),
            arg_kinds: &[DateTime, Number, String],
            returns: DateTime,
            category: Category::Date,
            description: "Add an amount of days, months, years, hours, minutes or seconds",
            handler: Handler::Eager(date::fn_date_add),
            volatile: false,
            scope: FunctionScope::Anywhere,
        });

        // DATE_DIFF
        self.register(FunctionDef {
            name: "DATE_DIFF",
            min_args: 3,
            max_args: Some(3),
            arg_kinds: &[DateTime, DateTime, String],
            returns: Number,
            category: Category::Date,
            description: "Whole units from the first date to the second",
            handler: Handler::Eager(date::fn_date_diff),
            volatile: false,
            scope: FunctionScope::Anywhere,
        });

        // FORMAT_DATE
        self.register(FunctionDef {
            name: "FORMAT_DATE",
            min_args: 2,
            max_args: Some(2),
            arg_kinds: &[DateTime, String],
            returns: String,
            category: Category::Date,
            description: "Format with a strftime pattern",
            handler: Handler::Eager(date::fn_format_date),
            volatile: false,
            scope: FunctionScope::Anywhere,
        });
    }

    fn register_info_functions(&mut self) {
        use ArgKind::{Any, Boolean};

        // IS_NULL (tolerates missing variables)
        self.register(FunctionDef {
            name: "IS_NULL",
            min_args: 1,
            max_args: Some(1),
            arg_kinds: &[Any],
            returns: Boolean,
            category: Category::Null,
            description: "True when the argument is null or an absent variable",
            handler: Handler::Lazy(info::fn_is_null),
            volatile: false,
            scope: FunctionScope::Anywhere,
        });

        // IS_EMPTY
        self.register(FunctionDef {
            name: "IS_EMPTY",
            min_args: 1,
            max_args: Some(1),
            arg_kinds: &[Any],
            returns: Boolean,
            category: Category::Null,
            description: "True for null, blank text or an empty option list",
            handler: Handler::Eager(info::fn_is_empty),
            volatile: false,
            scope: FunctionScope::Anywhere,
        });

        // COALESCE
        self.register(FunctionDef {
            name: "COALESCE",
            min_args: 1,
            max_args: None,
            arg_kinds: &[Any],
            returns: Any,
            category: Category::Null,
            description: "First argument that is not null",
            handler: Handler::Eager(info::fn_coalesce),
            volatile: false,
            scope: FunctionScope::Anywhere,
        });
    }

    fn register_option_functions(&mut self) {
        use ArgKind::{Any, OptionList, String};

        // STATIC
        self.register(FunctionDef {
            name: "STATIC",
            min_args: 1,
            max_args: Some(1),
            arg_kinds: &[OptionList],
            returns: OptionList,
            category: Category::Options,
            description: "Literal option list from a JSON array",
            handler: Handler::Eager(options::fn_static),
            volatile: false,
            scope: FunctionScope::OptionsOnly,
        });

        // API
        self.register(FunctionDef {
            name: "API",
            min_args: 1,
            max_args: None,
            arg_kinds: &[String, Any],
            returns: OptionList,
            category: Category::Options,
            description: "Options from an API endpoint; remaining arguments are parameters",
            handler: Handler::External,
            volatile: false,
            scope: FunctionScope::OptionsOnly,
        });

        // DATABASE
        self.register(FunctionDef {
            name: "DATABASE",
            min_args: 1,
            max_args: None,
            arg_kinds: &[String, Any],
            returns: OptionList,
            category: Category::Options,
            description: "Options from a database query; remaining arguments are parameters",
            handler: Handler::External,
            volatile: false,
            scope: FunctionScope::OptionsOnly,
        });
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// === Argument coercion ===

/// Coerce `value` to the kind expected at `position` of `function`
pub fn coerce(function: &str, position: usize, kind: ArgKind, value: Value) -> FormulaResult<Value> {
    let mismatch = |value: &Value| {
        FormulaError::type_mismatch(function, position + 1, kind.name(), value.type_name())
    };
    match (kind, value) {
        (ArgKind::Any, v) => Ok(v),
        (ArgKind::Number, v @ Value::Number(_)) => Ok(v),
        (ArgKind::Number, Value::String(s)) => parse_number(&s)
            .map(Value::Number)
            .ok_or_else(|| mismatch(&Value::String(s))),
        (ArgKind::Boolean, v @ Value::Boolean(_)) => Ok(v),
        (ArgKind::Boolean, Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(Value::Boolean(true)),
            "false" => Ok(Value::Boolean(false)),
            _ => Err(mismatch(&Value::String(s))),
        },
        (ArgKind::String, v @ Value::String(_)) => Ok(v),
        (ArgKind::String, v @ Value::OptionList(_)) => Err(mismatch(&v)),
        (ArgKind::String, v) => Ok(Value::String(v.to_string())),
        (ArgKind::DateTime, v @ Value::DateTime(_)) => Ok(v),
        (ArgKind::DateTime, Value::String(s)) => parse_datetime(&s)
            .map(Value::DateTime)
            .ok_or_else(|| mismatch(&Value::String(s))),
        (ArgKind::OptionList, v @ Value::OptionList(_)) => Ok(v),
        (ArgKind::OptionList, Value::String(s)) => options::option_list_from_text(&s).map(Value::OptionList),
        (_, v) => Err(mismatch(&v)),
    }
}

/// Parse decimal text, accepting surrounding whitespace and exponents
pub fn parse_number(text: &str) -> Option<Decimal> {
    let text = text.trim();
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .ok()
}

/// Parse the date-time formats accepted from form data
pub fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    const FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"];
    FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(text, f).ok())
        .or_else(|| {
            chrono::DateTime::parse_from_rfc3339(text)
                .ok()
                .map(|dt| dt.naive_utc())
        })
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

// === Accessors for coerced arguments ===

pub(crate) fn number_arg(function: &str, args: &[Value], i: usize) -> FormulaResult<Decimal> {
    match args.get(i) {
        Some(Value::Number(n)) => Ok(*n),
        other => Err(arg_mismatch(function, i, ArgKind::Number, other)),
    }
}

pub(crate) fn bool_arg(function: &str, args: &[Value], i: usize) -> FormulaResult<bool> {
    match args.get(i) {
        Some(Value::Boolean(b)) => Ok(*b),
        other => Err(arg_mismatch(function, i, ArgKind::Boolean, other)),
    }
}

pub(crate) fn str_arg<'v>(function: &str, args: &'v [Value], i: usize) -> FormulaResult<&'v str> {
    match args.get(i) {
        Some(Value::String(s)) => Ok(s),
        other => Err(arg_mismatch(function, i, ArgKind::String, other)),
    }
}

pub(crate) fn datetime_arg(function: &str, args: &[Value], i: usize) -> FormulaResult<NaiveDateTime> {
    match args.get(i) {
        Some(Value::DateTime(dt)) => Ok(*dt),
        other => Err(arg_mismatch(function, i, ArgKind::DateTime, other)),
    }
}

/// Whole number argument
pub(crate) fn int_arg(function: &str, args: &[Value], i: usize) -> FormulaResult<i64> {
    let n = number_arg(function, args, i)?;
    if !n.fract().is_zero() {
        return Err(FormulaError::invalid_argument(
            function,
            format!("argument {} must be a whole number, got {}", i + 1, n),
        ));
    }
    i64::try_from(n).map_err(|_| FormulaError::NumericOverflow("integer conversion"))
}

fn arg_mismatch(function: &str, i: usize, kind: ArgKind, value: Option<&Value>) -> FormulaError {
    FormulaError::type_mismatch(
        function,
        i + 1,
        kind.name(),
        value.map_or("nothing", Value::type_name),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_lookup_is_case_insensitive() {
        let registry = FunctionRegistry::new();
        assert!(registry.get("round").is_some());
        assert!(registry.get("Date_Add").is_some());
        assert_eq!(
            registry.lookup("FOO").err(),
            Some(FormulaError::UnknownFunction("FOO".into()))
        );
    }

    #[test]
    fn test_builtin_names() {
        let registry = FunctionRegistry::new();
        for name in [
            "ADD", "SUBTRACT", "MULTIPLY", "DIVIDE", "ROUND", "AND", "OR", "NOT", "IF", "EQUALS",
            "GREATER_THAN", "LESS_THAN", "CONCAT", "UPPER", "TRIM", "CONTAINS", "NOW", "DATE_ADD",
            "IS_NULL", "STATIC", "API", "DATABASE",
        ] {
            assert!(registry.get(name).is_some(), "missing {}", name);
        }
    }

    #[test]
    fn test_arity() {
        let registry = FunctionRegistry::new();
        let round = registry.get("ROUND").unwrap();
        assert!(round.check_arity(1).is_ok());
        assert!(round.check_arity(2).is_ok());
        assert_eq!(
            round.check_arity(3),
            Err(FormulaError::ArityMismatch {
                function: "ROUND".into(),
                expected: "1 to 2".into(),
                actual: 3,
            })
        );
        assert_eq!(registry.get("ADD").unwrap().expected_arity(), "at least 2");
        assert_eq!(registry.get("NOT").unwrap().expected_arity(), "1");
    }

    #[test]
    fn test_signature() {
        let registry = FunctionRegistry::new();
        let sig = registry.get("API").unwrap().signature();
        assert!(sig.options_only);
        assert_eq!(sig.arg_kinds, vec![ArgKind::String, ArgKind::Any]);

        let sig = registry.get("DATE_ADD").unwrap().signature();
        assert_eq!(sig.arg_kinds, vec![ArgKind::DateTime, ArgKind::Number, ArgKind::String]);
        assert!(!sig.volatile);
        assert!(registry.get("NOW").unwrap().signature().volatile);
    }

    #[test]
    fn test_check_calls() {
        let registry = FunctionRegistry::new();
        let expr = crate::parser::parse_expression("ADD(FOO(1), NOT(1, 2))").unwrap();
        let errors = registry.check_calls(&expr);
        assert_eq!(errors.len(), 2);
        assert!(matches!(errors[0], FormulaError::UnknownFunction(_)));
        assert!(matches!(errors[1], FormulaError::ArityMismatch { .. }));
    }

    #[test]
    fn test_coerce() {
        assert_eq!(
            coerce("ADD", 0, ArgKind::Number, Value::string(" 12.5 ")).unwrap(),
            Value::Number(Decimal::new(125, 1))
        );
        assert!(matches!(
            coerce("ADD", 1, ArgKind::Number, Value::Null),
            Err(FormulaError::TypeMismatch { position: 2, .. })
        ));
        assert_eq!(
            coerce("CONCAT", 0, ArgKind::String, Value::from(7)).unwrap(),
            Value::string("7")
        );
        assert_eq!(
            coerce("IF", 0, ArgKind::Boolean, Value::string("TRUE")).unwrap(),
            Value::from(true)
        );
        assert!(coerce("DATE_ADD", 0, ArgKind::DateTime, Value::string("2024-02-29")).is_ok());
        assert!(coerce("DATE_ADD", 0, ArgKind::DateTime, Value::string("yesterday")).is_err());
    }
}
