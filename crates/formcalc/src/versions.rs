//! Selecting the formula version to evaluate
//!
//! Version storage and publishing belong to an external collaborator that
//! implements [`FormulaSource`]; the engine only reads from it.

use crate::error::{EngineError, EngineResult};
use chrono::NaiveDateTime;
use formcalc_core::{FormulaHistory, FormulaVersion};
use std::collections::HashMap;

/// Supplier of formula version histories
pub trait FormulaSource: Send + Sync {
    /// All versions of the named formula, or None if it does not exist
    fn history(&self, name: &str) -> EngineResult<Option<FormulaHistory>>;
}

/// Formula source holding histories in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryFormulaSource {
    histories: HashMap<String, FormulaHistory>,
}

impl InMemoryFormulaSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a version, creating the history on first use
    pub fn add(&mut self, version: FormulaVersion) -> EngineResult<()> {
        self.histories
            .entry(version.formula.clone())
            .or_insert_with(|| FormulaHistory::new(version.formula.clone()))
            .add(version)
            .map_err(|e| EngineError::Source(e.to_string()))
    }
}

impl FormulaSource for InMemoryFormulaSource {
    fn history(&self, name: &str) -> EngineResult<Option<FormulaHistory>> {
        Ok(self.histories.get(name).cloned())
    }
}

/// Pick the version to evaluate: the pinned one, which must be published
/// and effective at `now`, or else the latest such version
pub fn select_version(
    history: &FormulaHistory,
    pinned: Option<u32>,
    now: NaiveDateTime,
) -> EngineResult<&FormulaVersion> {
    let not_published = |v: &FormulaVersion| EngineError::NotPublished {
        formula: v.formula.clone(),
        version: v.version,
    };
    let not_effective = |v: &FormulaVersion| EngineError::NotEffective {
        formula: v.formula.clone(),
        version: v.version,
    };

    match pinned {
        Some(number) => {
            let version = history.version(number).ok_or_else(|| {
                EngineError::FormulaNotFound(format!("{} version {}", history.name(), number))
            })?;
            if !version.is_published() {
                return Err(not_published(version));
            }
            if !version.is_effective_at(now) {
                return Err(not_effective(version));
            }
            Ok(version)
        }
        None => {
            if let Some(version) = history.latest_published_at(now) {
                return Ok(version);
            }
            let versions = history.versions();
            match versions.iter().rev().find(|v| v.is_published()) {
                Some(published) => Err(not_effective(published)),
                None => match versions.last() {
                    Some(draft) => Err(not_published(draft)),
                    None => Err(EngineError::FormulaNotFound(history.name().to_string())),
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn at(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, day)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    fn history() -> FormulaHistory {
        let mut history = FormulaHistory::new("shipping");
        history
            .add(FormulaVersion::new("shipping", 1, "weight * 2").published(at(1)))
            .unwrap();
        history
            .add(
                FormulaVersion::new("shipping", 2, "weight * 3")
                    .published(at(5))
                    .effective(Some(at(10)), None),
            )
            .unwrap();
        history
            .add(FormulaVersion::new("shipping", 3, "weight * 4"))
            .unwrap();
        history
    }

    #[test]
    fn test_latest_effective_version() {
        let history = history();
        assert_eq!(select_version(&history, None, at(7)).unwrap().version, 1);
        assert_eq!(select_version(&history, None, at(12)).unwrap().version, 2);
    }

    #[test]
    fn test_pinned_version() {
        let history = history();
        assert_eq!(select_version(&history, Some(1), at(12)).unwrap().version, 1);
        assert_eq!(
            select_version(&history, Some(3), at(12)).unwrap_err(),
            EngineError::NotPublished {
                formula: "shipping".into(),
                version: 3
            }
        );
        assert_eq!(
            select_version(&history, Some(2), at(7)).unwrap_err(),
            EngineError::NotEffective {
                formula: "shipping".into(),
                version: 2
            }
        );
        assert!(matches!(
            select_version(&history, Some(9), at(7)),
            Err(EngineError::FormulaNotFound(_))
        ));
    }

    #[test]
    fn test_only_drafts() {
        let mut history = FormulaHistory::new("fee");
        history.add(FormulaVersion::new("fee", 1, "1")).unwrap();
        assert!(matches!(
            select_version(&history, None, at(1)),
            Err(EngineError::NotPublished { version: 1, .. })
        ));
    }
}
