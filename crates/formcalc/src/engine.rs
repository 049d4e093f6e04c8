//! The formula engine facade
//!
//! [`FormulaEngine`] bundles the function registry, parser limits, the
//! options cache and the external collaborators, and exposes the operations
//! form services call: evaluation, validation, dependency graphs,
//! recalculation and dynamic options.

use crate::audit::{AuditRecord, AuditSink};
use crate::error::{EngineError, EngineResult};
use crate::options::{
    ApiOptionsProvider, CacheStats, DatabaseOptionsProvider, OptionsCache, OptionsConfig,
    OptionsResolver,
};
use crate::recalculation::{RecalcOptions, RecalcOutcome, Recalculator};
use crate::validation::{self, CrossFieldViolation, ValidationReport};
use crate::versions::{select_version, FormulaSource};
use chrono::{Local, NaiveDateTime};
use formcalc_core::{FieldDefinition, FormData, OptionItem, ValidationRule, Value};
use formcalc_formula::{
    evaluate, is_safe_expression, parse_expression_with, supported_operators, DependencyGraph,
    EvaluationContext, Expr, FormulaResult, FunctionDef, FunctionRegistry,
    FunctionSignature, OperatorInfo, ParseOptions,
};
use futures::future::join_all;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Engine configuration
#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    pub parse: ParseOptions,
    pub recalc: RecalcOptions,
    pub options: OptionsConfig,
}

/// Form formula engine
///
/// # Example
///
/// ```rust
/// use formcalc::prelude::*;
///
/// let engine = FormulaEngine::new();
/// let value = engine
///     .evaluate_expression("ROUND(DIVIDE(MULTIPLY(10, 3), 7), 2)", &FormData::new())
///     .unwrap();
/// assert_eq!(value.to_string(), "4.29");
/// ```
pub struct FormulaEngine {
    options: EngineOptions,
    registry: FunctionRegistry,
    cache: OptionsCache,
    api: Option<Arc<dyn ApiOptionsProvider>>,
    database: Option<Arc<dyn DatabaseOptionsProvider>>,
    audit: Option<Arc<dyn AuditSink>>,
    now: Option<NaiveDateTime>,
}

impl FormulaEngine {
    /// Create an engine with the built-in functions and default options
    pub fn new() -> Self {
        Self::with_options(EngineOptions::default())
    }

    pub fn with_options(options: EngineOptions) -> Self {
        Self {
            cache: OptionsCache::new(&options.options.cache),
            options,
            registry: FunctionRegistry::new(),
            api: None,
            database: None,
            audit: None,
            now: None,
        }
    }

    /// Provider serving `API(...)` calls in options expressions
    pub fn with_api_provider(mut self, provider: impl ApiOptionsProvider + 'static) -> Self {
        self.api = Some(Arc::new(provider));
        self
    }

    /// Provider serving `DATABASE(...)` calls in options expressions
    pub fn with_database_provider(mut self, provider: impl DatabaseOptionsProvider + 'static) -> Self {
        self.database = Some(Arc::new(provider));
        self
    }

    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    /// Pin the clock seen by NOW, TODAY and version selection
    pub fn with_clock(mut self, now: NaiveDateTime) -> Self {
        self.now = Some(now);
        self
    }

    /// Register an extra function, replacing a built-in of the same name
    pub fn register_function(&mut self, def: FunctionDef) {
        self.registry.register(def);
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    fn now(&self) -> NaiveDateTime {
        self.now.unwrap_or_else(|| Local::now().naive_local())
    }

    fn context<'d>(&'d self, data: &'d FormData) -> EvaluationContext<'d> {
        let ctx = EvaluationContext::new(data).with_registry(&self.registry);
        match self.now {
            Some(now) => ctx.at(now),
            None => ctx,
        }
    }

    fn resolver(&self) -> OptionsResolver<'_> {
        OptionsResolver {
            config: &self.options.options,
            parse: &self.options.parse,
            registry: &self.registry,
            cache: &self.cache,
            api: self.api.as_deref(),
            database: self.database.as_deref(),
            now: self.now,
        }
    }

    // === Evaluation ===

    /// Parse and evaluate `text` against form data
    pub fn evaluate_expression(&self, text: &str, data: &FormData) -> FormulaResult<Value> {
        let started = Instant::now();
        let parsed = parse_expression_with(text, &self.options.parse);
        let result = parsed
            .as_ref()
            .map_err(Clone::clone)
            .and_then(|expr| evaluate(expr, &self.context(data)));

        if let Some(sink) = &self.audit {
            let record = AuditRecord {
                expression: text.to_string(),
                inputs: referenced_inputs(parsed.as_ref().ok(), data),
                result: result.clone(),
                duration: started.elapsed(),
            };
            if let Err(error) = sink.record(&record) {
                warn!(expression = text, %error, "audit sink failed");
            }
        }
        result
    }

    /// Evaluate a stored formula: the pinned version, or the latest version
    /// that is published and effective now
    pub fn evaluate_formula(
        &self,
        source: &dyn FormulaSource,
        name: &str,
        pinned_version: Option<u32>,
        inputs: &FormData,
    ) -> EngineResult<Value> {
        let history = source
            .history(name)?
            .ok_or_else(|| EngineError::FormulaNotFound(name.to_string()))?;
        let version = select_version(&history, pinned_version, self.now())?;
        debug!(formula = name, version = version.version, "evaluating formula version");
        Ok(self.evaluate_expression(&version.expression, inputs)?)
    }

    // === Validation ===

    pub fn validate_expression(&self, text: &str) -> ValidationReport {
        validation::validate(text, &self.options.parse, &self.registry, None)
    }

    /// Validate, also reporting references to names outside `known`
    pub fn validate_with_variables(&self, text: &str, known: &[&str]) -> ValidationReport {
        let known: BTreeSet<String> = known.iter().map(|s| s.to_string()).collect();
        validation::validate(text, &self.options.parse, &self.registry, Some(&known))
    }

    pub fn is_safe_expression(&self, text: &str) -> bool {
        is_safe_expression(text)
    }

    /// Gate for publishing a formula version: the text must parse and call
    /// only known functions with valid arity
    pub fn check_publishable(&self, text: &str) -> FormulaResult<()> {
        let expr = parse_expression_with(text, &self.options.parse)?;
        match self.registry.check_calls(&expr).into_iter().next() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    pub fn available_functions(&self) -> Vec<FunctionSignature> {
        self.registry.signatures()
    }

    pub fn supported_operators(&self) -> &'static [OperatorInfo] {
        supported_operators()
    }

    // === Rules ===

    /// Evaluate a rule condition; a condition that fails to evaluate is false
    pub fn evaluate_condition(&self, text: &str, data: &FormData) -> bool {
        validation::condition_holds(text, &self.options.parse, &self.context(data))
    }

    /// The field's conditional rules, if its condition currently holds
    pub fn active_rules<'f>(&self, field: &'f FieldDefinition, data: &FormData) -> &'f [ValidationRule] {
        match &field.conditional_validation {
            Some(conditional) if self.evaluate_condition(&conditional.condition, data) => &conditional.rules,
            _ => &[],
        }
    }

    /// Cross-field rules that do not evaluate to true
    pub fn check_cross_field(&self, fields: &[FieldDefinition], data: &FormData) -> Vec<CrossFieldViolation> {
        fields
            .iter()
            .filter_map(|field| {
                let rule = field.cross_field_validation.as_ref()?;
                if self.evaluate_condition(&rule.expression, data) {
                    return None;
                }
                Some(CrossFieldViolation {
                    field: field.name.clone(),
                    expression: rule.expression.clone(),
                    message: rule.message.clone(),
                })
            })
            .collect()
    }

    // === Dependencies and recalculation ===

    pub fn build_dependency_graph(&self, fields: &[FieldDefinition]) -> FormulaResult<DependencyGraph> {
        DependencyGraph::build_with(fields, &self.options.parse)
    }

    /// Recompute calculated fields: all of them when `changed` is None,
    /// otherwise those depending on `changed`
    pub fn recalculate(
        &self,
        data: &FormData,
        fields: &[FieldDefinition],
        changed: Option<&str>,
    ) -> FormulaResult<RecalcOutcome> {
        let graph = self.build_dependency_graph(fields)?;
        Ok(self.recalculate_with_graph(data, fields, &graph, changed))
    }

    /// Recalculate with a graph built earlier from the same fields
    pub fn recalculate_with_graph(
        &self,
        data: &FormData,
        fields: &[FieldDefinition],
        graph: &DependencyGraph,
        changed: Option<&str>,
    ) -> RecalcOutcome {
        Recalculator {
            options: &self.options.recalc,
            parse: &self.options.parse,
            registry: &self.registry,
            now: self.now,
        }
        .run(data, fields, graph, changed)
    }

    // === Dynamic options ===

    /// Resolve an options expression against form data
    pub async fn resolve_dynamic_options(&self, text: &str, data: &FormData) -> EngineResult<Vec<OptionItem>> {
        self.resolver().resolve(text, data).await
    }

    /// Resolve the options of every field that has an options expression,
    /// concurrently. A field that fails gets an empty list.
    pub async fn resolve_many(
        &self,
        fields: &[FieldDefinition],
        data: &FormData,
    ) -> BTreeMap<String, Vec<OptionItem>> {
        let resolver = self.resolver();
        let pending = fields.iter().filter_map(|field| {
            let text = field.dynamic_options.as_deref()?;
            let resolver = &resolver;
            Some(async move {
                let options = match resolver.resolve(text, data).await {
                    Ok(options) => options,
                    Err(error) => {
                        warn!(field = %field.name, %error, "options could not be resolved");
                        Vec::new()
                    }
                };
                (field.name.clone(), options)
            })
        });
        join_all(pending).await.into_iter().collect()
    }

    /// Keep the options for which `filter` holds; see
    /// `OptionsResolver::filter` for the bound variables
    pub fn filter_options(
        &self,
        options: Option<&[OptionItem]>,
        filter: &str,
        data: &FormData,
    ) -> EngineResult<Vec<OptionItem>> {
        self.resolver().filter(options, filter, data)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}

impl Default for FormulaEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// The subset of `data` an expression references
fn referenced_inputs(expr: Option<&Expr>, data: &FormData) -> FormData {
    let Some(expr) = expr else {
        return FormData::new();
    };
    expr.variables()
        .into_iter()
        .filter_map(|name| data.get(name).map(|v| (name.to_string(), v.clone())))
        .collect()
}
