//! Expression evaluator
//!
//! Evaluation is pure: the context is only read, and the same tree with the
//! same context always produces the same value. Arguments are evaluated
//! depth-first, left to right, except for functions registered with a lazy
//! handler (IF, AND, OR, IS_NULL) which decide themselves what to evaluate.

use crate::ast::Expr;
use crate::error::{FormulaError, FormulaResult};
use crate::functions::{coerce, FunctionDef, FunctionRegistry, FunctionScope, Handler};
use crate::parser::parse_expression;
use chrono::{Local, NaiveDateTime};
use formcalc_core::{FormData, Value};
use std::sync::OnceLock;

/// Global function registry (initialized once)
static FUNCTION_REGISTRY: OnceLock<FunctionRegistry> = OnceLock::new();

/// Registry holding every built-in function
pub fn builtin_registry() -> &'static FunctionRegistry {
    FUNCTION_REGISTRY.get_or_init(FunctionRegistry::new)
}

/// Which kind of expression is being evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvaluationScope {
    /// Field formulas, conditions and cross-field rules
    #[default]
    Formula,
    /// Dynamic options expressions; option constructors are allowed
    Options,
}

/// Variables and settings visible to one evaluation
pub struct EvaluationContext<'a> {
    variables: &'a FormData,
    /// Extra bindings that shadow `variables`
    locals: FormData,
    registry: &'a FunctionRegistry,
    scope: EvaluationScope,
    now: Option<NaiveDateTime>,
}

impl<'a> EvaluationContext<'a> {
    /// Context over form data with the built-in registry
    pub fn new(variables: &'a FormData) -> Self {
        Self {
            variables,
            locals: FormData::new(),
            registry: builtin_registry(),
            scope: EvaluationScope::Formula,
            now: None,
        }
    }

    /// Use a custom registry
    pub fn with_registry(mut self, registry: &'a FunctionRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_scope(mut self, scope: EvaluationScope) -> Self {
        self.scope = scope;
        self
    }

    /// Pin the clock used by NOW and TODAY
    pub fn at(mut self, now: NaiveDateTime) -> Self {
        self.now = Some(now);
        self
    }

    /// Bind an extra variable, shadowing form data of the same name
    pub fn bind(mut self, name: impl Into<String>, value: Value) -> Self {
        self.locals.insert(name.into(), value);
        self
    }

    /// Look up a variable
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.locals.get(name).or_else(|| self.variables.get(name))
    }

    pub fn registry(&self) -> &FunctionRegistry {
        self.registry
    }

    pub fn scope(&self) -> EvaluationScope {
        self.scope
    }

    /// Current time: the pinned clock, or local wall-clock time
    pub fn now(&self) -> NaiveDateTime {
        self.now.unwrap_or_else(|| Local::now().naive_local())
    }
}

/// Parse and evaluate expression text
pub fn evaluate_expression(text: &str, ctx: &EvaluationContext) -> FormulaResult<Value> {
    let expr = parse_expression(text)?;
    evaluate(&expr, ctx)
}

/// Evaluate an expression tree
pub fn evaluate(expr: &Expr, ctx: &EvaluationContext) -> FormulaResult<Value> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),

        Expr::Variable(name) => ctx
            .get(name)
            .cloned()
            .ok_or_else(|| FormulaError::UnknownVariable(name.clone())),

        Expr::Function { name, args } => evaluate_function(name, args, ctx),
    }
}

fn evaluate_function(name: &str, args: &[Expr], ctx: &EvaluationContext) -> FormulaResult<Value> {
    let func = resolve_function(name, args.len(), ctx)?;

    match func.handler {
        Handler::Lazy(implementation) => implementation(args, ctx),
        Handler::External => Err(FormulaError::ExternalCall(func.name.to_string())),
        Handler::Eager(_) => {
            let evaluated = args
                .iter()
                .map(|arg| evaluate(arg, ctx))
                .collect::<FormulaResult<Vec<_>>>()?;
            apply_function(func, evaluated, ctx)
        }
    }
}

/// Look up a function and check arity and scope for a call with `arg_count` arguments
pub fn resolve_function<'r>(
    name: &str,
    arg_count: usize,
    ctx: &'r EvaluationContext,
) -> FormulaResult<&'r FunctionDef> {
    let func = ctx.registry().lookup(name)?;
    func.check_arity(arg_count)?;
    if func.scope == FunctionScope::OptionsOnly && ctx.scope() != EvaluationScope::Options {
        return Err(FormulaError::OptionsOnly(func.name.to_string()));
    }
    Ok(func)
}

/// Invoke a function on already evaluated arguments
pub fn apply_function(func: &FunctionDef, args: Vec<Value>, ctx: &EvaluationContext) -> FormulaResult<Value> {
    match func.handler {
        Handler::Eager(implementation) => {
            let coerced = args
                .into_iter()
                .enumerate()
                .map(|(i, value)| coerce(func.name, i, func.arg_kind(i), value))
                .collect::<FormulaResult<Vec<_>>>()?;
            implementation(&coerced, ctx)
        }
        Handler::Lazy(implementation) => {
            let literals: Vec<Expr> = args.into_iter().map(Expr::Literal).collect();
            implementation(&literals, ctx)
        }
        Handler::External => Err(FormulaError::ExternalCall(func.name.to_string())),
    }
}

/// Check if the tree calls a volatile function such as NOW
pub fn is_volatile(expr: &Expr, registry: &FunctionRegistry) -> bool {
    expr.any_function(&|name| registry.get(name).map_or(false, |f| f.volatile))
}
