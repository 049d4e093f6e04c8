//! Dynamic options resolution
//!
//! An options expression is evaluated like any other expression, with the
//! option constructors (`STATIC`, `API`, `DATABASE`) allowed. Subtrees that
//! call an external source are walked asynchronously; everything else goes
//! through the synchronous evaluator. `IF`, `AND` and `OR` keep their
//! short-circuit semantics, so an untaken branch never reaches a provider.

pub mod cache;
pub mod provider;

pub use cache::{CacheKey, CacheStats, OptionsCache, OptionsCacheConfig};
pub use provider::{
    ApiOptionsProvider, DatabaseOptionsProvider, Row, StaticApiProvider, StaticDatabaseProvider,
};

use crate::error::{EngineError, EngineResult};
use formcalc_core::{FormData, OptionItem, Value};
use formcalc_formula::{
    apply_function, as_condition, evaluate, is_volatile, option_list_from_json,
    option_list_from_rows, parse_expression_with, resolve_function, to_option_list,
    EvaluationContext, EvaluationScope, Expr, FormulaError, FunctionRegistry, Handler, ParseOptions,
};
use futures::future::BoxFuture;
use tracing::{debug, warn};

/// Options resolution settings
#[derive(Debug, Clone)]
pub struct OptionsConfig {
    /// Largest option list an expression may produce
    pub max_options: usize,
    pub cache: OptionsCacheConfig,
}

impl Default for OptionsConfig {
    fn default() -> Self {
        Self {
            max_options: 1000,
            cache: OptionsCacheConfig::default(),
        }
    }
}

/// Resolver over borrowed engine state, built per call
pub(crate) struct OptionsResolver<'a> {
    pub config: &'a OptionsConfig,
    pub parse: &'a ParseOptions,
    pub registry: &'a FunctionRegistry,
    pub cache: &'a OptionsCache,
    pub api: Option<&'a dyn ApiOptionsProvider>,
    pub database: Option<&'a dyn DatabaseOptionsProvider>,
    pub now: Option<chrono::NaiveDateTime>,
}

impl<'a> OptionsResolver<'a> {
    fn context<'d>(&self, data: &'d FormData) -> EvaluationContext<'d>
    where
        'a: 'd,
    {
        let ctx = EvaluationContext::new(data)
            .with_registry(self.registry)
            .with_scope(EvaluationScope::Options);
        match self.now {
            Some(now) => ctx.at(now),
            None => ctx,
        }
    }

    /// Resolve an options expression to its option list, using the cache
    pub async fn resolve(&self, text: &str, data: &FormData) -> EngineResult<Vec<OptionItem>> {
        let expr = parse_expression_with(text, self.parse)?;

        // NOW/TODAY results change between calls with the same inputs
        let cacheable = !is_volatile(&expr, self.registry);
        let key = CacheKey::new(text, &expr, data);

        if cacheable {
            if let Some(options) = self.cache.get(&key) {
                debug!(expression = text, count = options.len(), "options cache hit");
                return Ok(options);
            }
            debug!(expression = text, "options cache miss");
        }

        let ctx = self.context(data);
        let value = self.walk(&expr, &ctx).await?;
        let options = to_option_list(value)?;

        if options.len() > self.config.max_options {
            return Err(FormulaError::OptionLimitExceeded {
                count: options.len(),
                limit: self.config.max_options,
            }
            .into());
        }

        if cacheable {
            self.cache.insert(key, options.clone());
        }
        Ok(options)
    }

    /// Evaluate a subtree, awaiting providers where it calls them
    fn walk<'f, 'c: 'f>(
        &'f self,
        expr: &'f Expr,
        ctx: &'f EvaluationContext<'c>,
    ) -> BoxFuture<'f, EngineResult<Value>> {
        Box::pin(async move {
            let Expr::Function { name, args } = expr else {
                return Ok(evaluate(expr, ctx)?);
            };
            if !self.calls_external(expr) {
                return Ok(evaluate(expr, ctx)?);
            }

            let func = resolve_function(name, args.len(), ctx)?;
            match (func.name, func.handler) {
                ("IF", _) => {
                    let cond = self.walk(&args[0], ctx).await?;
                    if as_condition("IF", 0, cond)? {
                        self.walk(&args[1], ctx).await
                    } else {
                        match args.get(2) {
                            Some(if_false) => self.walk(if_false, ctx).await,
                            None => Ok(Value::Null),
                        }
                    }
                }
                ("AND", _) | ("OR", _) => {
                    // AND stops at the first false, OR at the first true
                    let stop_at = func.name == "OR";
                    for (i, arg) in args.iter().enumerate() {
                        let value = self.walk(arg, ctx).await?;
                        if as_condition(func.name, i, value)? == stop_at {
                            return Ok(Value::Boolean(stop_at));
                        }
                    }
                    Ok(Value::Boolean(!stop_at))
                }
                (_, Handler::External) => {
                    let values = self.walk_args(args, ctx).await?;
                    let options = self.call_external(func.name, values).await?;
                    Ok(Value::OptionList(options))
                }
                _ => {
                    let values = self.walk_args(args, ctx).await?;
                    Ok(apply_function(func, values, ctx)?)
                }
            }
        })
    }

    async fn walk_args<'c>(
        &self,
        args: &[Expr],
        ctx: &EvaluationContext<'c>,
    ) -> EngineResult<Vec<Value>> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.walk(arg, ctx).await?);
        }
        Ok(values)
    }

    fn calls_external(&self, expr: &Expr) -> bool {
        expr.any_function(&|name| {
            self.registry
                .get(name)
                .map_or(false, |f| matches!(f.handler, Handler::External))
        })
    }

    /// Dispatch API(...) or DATABASE(...) with the first argument as target
    /// and the rest as positional parameters
    async fn call_external(&self, function: &str, mut values: Vec<Value>) -> EngineResult<Vec<OptionItem>> {
        if values.is_empty() {
            return Err(FormulaError::InvalidArgument {
                function: function.to_string(),
                message: "missing target".into(),
            }
            .into());
        }
        let target = match values.remove(0) {
            Value::String(s) => s,
            other => {
                return Err(FormulaError::TypeMismatch {
                    function: function.to_string(),
                    position: 1,
                    expected: "string".into(),
                    actual: other.type_name().into(),
                }
                .into())
            }
        };

        match function {
            "API" => {
                let provider = self.api.ok_or(EngineError::ProviderUnavailable("API"))?;
                debug!(endpoint = %target, params = values.len(), "calling API options provider");
                let raw = provider.call(&target, &values).await.map_err(|source| {
                    warn!(endpoint = %target, error = %source, "API options provider failed");
                    EngineError::Provider {
                        provider: "API",
                        target: target.clone(),
                        source,
                    }
                })?;
                Ok(option_list_from_json(&raw)?)
            }
            "DATABASE" => {
                let provider = self
                    .database
                    .ok_or(EngineError::ProviderUnavailable("DATABASE"))?;
                debug!(query = %target, params = values.len(), "querying database options provider");
                let rows = provider.query(&target, &values).await.map_err(|source| {
                    warn!(query = %target, error = %source, "database options provider failed");
                    EngineError::Provider {
                        provider: "DATABASE",
                        target: target.clone(),
                        source,
                    }
                })?;
                Ok(option_list_from_rows(&rows)?)
            }
            other => Err(FormulaError::ExternalCall(other.to_string()).into()),
        }
    }

    /// Keep the options for which `filter` evaluates to true.
    ///
    /// The filter sees the form data plus `option.value`, `option.label` and
    /// `option` (the value). An option whose filter fails to evaluate is
    /// dropped.
    pub fn filter(
        &self,
        options: Option<&[OptionItem]>,
        filter: &str,
        data: &FormData,
    ) -> EngineResult<Vec<OptionItem>> {
        let Some(options) = options else {
            return Ok(Vec::new());
        };
        if filter.trim().is_empty() {
            return Ok(options.to_vec());
        }

        let expr = parse_expression_with(filter, self.parse)?;
        let kept: Vec<OptionItem> = options
            .iter()
            .filter(|option| {
                let ctx = self
                    .context(data)
                    .bind("option", Value::string(option.value.clone()))
                    .bind("option.value", Value::string(option.value.clone()))
                    .bind("option.label", Value::string(option.label.clone()));
                match evaluate(&expr, &ctx).and_then(|v| as_condition("FILTER", 0, v)) {
                    Ok(keep) => keep,
                    Err(error) => {
                        debug!(option = %option.value, %error, "option filter failed");
                        false
                    }
                }
            })
            .cloned()
            .collect();

        debug!(before = options.len(), after = kept.len(), "filtered options");
        Ok(kept)
    }
}
