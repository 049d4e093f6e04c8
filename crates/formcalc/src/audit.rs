//! Evaluation audit trail
//!
//! After a top-level evaluation the engine hands an [`AuditRecord`] to the
//! configured sink. Recording is best-effort: a sink error is logged and the
//! evaluation result is returned unchanged.

use formcalc_core::{FormData, Value};
use formcalc_formula::FormulaError;
use std::time::Duration;
use tracing::info;

/// One evaluation as seen by the audit trail
#[derive(Debug, Clone, PartialEq)]
pub struct AuditRecord {
    pub expression: String,
    /// The inputs the expression references
    pub inputs: FormData,
    pub result: Result<Value, FormulaError>,
    pub duration: Duration,
}

/// Error raised by an audit sink
pub type AuditError = Box<dyn std::error::Error + Send + Sync>;

/// Receiver of evaluation records
pub trait AuditSink: Send + Sync {
    fn record(&self, record: &AuditRecord) -> Result<(), AuditError>;
}

/// Sink writing each record as an `info` event on the `formcalc::audit` target
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, record: &AuditRecord) -> Result<(), AuditError> {
        let inputs: Vec<String> = record
            .inputs
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect();
        match &record.result {
            Ok(value) => info!(
                target: "formcalc::audit",
                expression = %record.expression,
                inputs = ?inputs,
                result = %value,
                duration_us = record.duration.as_micros() as u64,
                "expression evaluated"
            ),
            Err(error) => info!(
                target: "formcalc::audit",
                expression = %record.expression,
                inputs = ?inputs,
                %error,
                duration_us = record.duration.as_micros() as u64,
                "expression failed"
            ),
        }
        Ok(())
    }
}
