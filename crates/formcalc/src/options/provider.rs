//! External option sources
//!
//! `API(endpoint, params...)` and `DATABASE(query, params...)` calls inside
//! an options expression are delegated to these traits. The engine awaits the
//! call; dropping the resolving future drops the call with it.

use crate::error::ProviderError;
use async_trait::async_trait;
use formcalc_core::Value;
use serde_json::{Map, Value as Json};
use std::collections::HashMap;

/// A database row as column name to JSON value
pub type Row = Map<String, Json>;

/// Source behind `API(...)`
///
/// The raw result is converted with
/// [`formcalc_formula::option_list_from_json`]: an array of options, or an
/// object wrapping one under `options`, `items` or `data`.
#[async_trait]
pub trait ApiOptionsProvider: Send + Sync {
    async fn call(&self, endpoint: &str, params: &[Value]) -> Result<Json, ProviderError>;
}

/// Source behind `DATABASE(...)`
///
/// Rows are converted with [`formcalc_formula::option_list_from_rows`].
#[async_trait]
pub trait DatabaseOptionsProvider: Send + Sync {
    async fn query(&self, query: &str, params: &[Value]) -> Result<Vec<Row>, ProviderError>;
}

/// API provider answering from fixed responses keyed by endpoint
///
/// Parameters are ignored. Useful for fixtures and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticApiProvider {
    responses: HashMap<String, Json>,
}

impl StaticApiProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(mut self, endpoint: impl Into<String>, response: Json) -> Self {
        self.responses.insert(endpoint.into(), response);
        self
    }
}

#[async_trait]
impl ApiOptionsProvider for StaticApiProvider {
    async fn call(&self, endpoint: &str, _params: &[Value]) -> Result<Json, ProviderError> {
        self.responses
            .get(endpoint)
            .cloned()
            .ok_or_else(|| ProviderError::new(format!("unknown endpoint '{}'", endpoint)))
    }
}

/// Database provider answering from fixed row sets keyed by query text
#[derive(Debug, Clone, Default)]
pub struct StaticDatabaseProvider {
    results: HashMap<String, Vec<Row>>,
}

impl StaticDatabaseProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(mut self, query: impl Into<String>, rows: Vec<Row>) -> Self {
        self.results.insert(query.into(), rows);
        self
    }
}

#[async_trait]
impl DatabaseOptionsProvider for StaticDatabaseProvider {
    async fn query(&self, query: &str, _params: &[Value]) -> Result<Vec<Row>, ProviderError> {
        self.results
            .get(query)
            .cloned()
            .ok_or_else(|| ProviderError::new(format!("unknown query '{}'", query)))
    }
}
