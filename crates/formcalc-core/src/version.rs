//! Formula versions
//!
//! A formula is never edited in place: every change publishes a new
//! [`FormulaVersion`], and older versions stay in the [`FormulaHistory`] so
//! past evaluations can be replayed.

use crate::error::{Error, Result};
use chrono::NaiveDateTime;

/// One version of a named formula
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FormulaVersion {
    /// Name of the formula this version belongs to
    pub formula: String,
    /// Version number, increasing per formula
    pub version: u32,
    /// Expression text
    pub expression: String,
    /// When the version was published (None = draft)
    #[cfg_attr(feature = "serde", serde(default))]
    pub published_at: Option<NaiveDateTime>,
    /// Start of the effective window (inclusive)
    #[cfg_attr(feature = "serde", serde(default))]
    pub effective_from: Option<NaiveDateTime>,
    /// End of the effective window (inclusive)
    #[cfg_attr(feature = "serde", serde(default))]
    pub effective_to: Option<NaiveDateTime>,
}

impl FormulaVersion {
    /// Create a draft version
    pub fn new(formula: impl Into<String>, version: u32, expression: impl Into<String>) -> Self {
        Self {
            formula: formula.into(),
            version,
            expression: expression.into(),
            published_at: None,
            effective_from: None,
            effective_to: None,
        }
    }

    /// Mark as published at the given time
    pub fn published(mut self, at: NaiveDateTime) -> Self {
        self.published_at = Some(at);
        self
    }

    /// Restrict the effective window
    pub fn effective(mut self, from: Option<NaiveDateTime>, to: Option<NaiveDateTime>) -> Self {
        self.effective_from = from;
        self.effective_to = to;
        self
    }

    pub fn is_published(&self) -> bool {
        self.published_at.is_some()
    }

    /// Check whether `now` falls inside the effective window
    pub fn is_effective_at(&self, now: NaiveDateTime) -> bool {
        self.effective_from.map_or(true, |from| from <= now)
            && self.effective_to.map_or(true, |to| now <= to)
    }

    /// Published and inside the effective window
    pub fn is_evaluable_at(&self, now: NaiveDateTime) -> bool {
        self.is_published() && self.is_effective_at(now)
    }
}

/// All versions of one formula, ordered by version number
#[derive(Debug, Clone, Default)]
pub struct FormulaHistory {
    name: String,
    versions: Vec<FormulaVersion>,
}

impl FormulaHistory {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            versions: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a version; numbers must be unique within the formula
    pub fn add(&mut self, version: FormulaVersion) -> Result<()> {
        if version.formula != self.name {
            return Err(Error::ForeignVersion {
                expected: self.name.clone(),
                actual: version.formula,
            });
        }
        match self
            .versions
            .binary_search_by_key(&version.version, |v| v.version)
        {
            Ok(_) => Err(Error::DuplicateVersion {
                formula: self.name.clone(),
                version: version.version,
            }),
            Err(pos) => {
                self.versions.insert(pos, version);
                Ok(())
            }
        }
    }

    /// Look up a pinned version
    pub fn version(&self, number: u32) -> Option<&FormulaVersion> {
        self.versions.iter().find(|v| v.version == number)
    }

    /// Highest version that is published and effective at `now`
    pub fn latest_published_at(&self, now: NaiveDateTime) -> Option<&FormulaVersion> {
        self.versions.iter().rev().find(|v| v.is_evaluable_at(now))
    }

    pub fn versions(&self) -> &[FormulaVersion] {
        &self.versions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn at(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_effective_window() {
        let v = FormulaVersion::new("tax", 1, "amount * 0.2")
            .published(at(1))
            .effective(Some(at(5)), Some(at(10)));
        assert!(!v.is_effective_at(at(4)));
        assert!(v.is_effective_at(at(5)));
        assert!(v.is_evaluable_at(at(10)));
        assert!(!v.is_effective_at(at(11)));
    }

    #[test]
    fn test_latest_published_skips_drafts_and_expired() {
        let mut history = FormulaHistory::new("tax");
        history
            .add(FormulaVersion::new("tax", 1, "amount * 0.1").published(at(1)))
            .unwrap();
        history
            .add(
                FormulaVersion::new("tax", 2, "amount * 0.15")
                    .published(at(2))
                    .effective(None, Some(at(3))),
            )
            .unwrap();
        history
            .add(FormulaVersion::new("tax", 3, "amount * 0.2"))
            .unwrap();

        assert_eq!(history.latest_published_at(at(3)).unwrap().version, 2);
        assert_eq!(history.latest_published_at(at(20)).unwrap().version, 1);
        assert!(history.version(3).is_some());
    }

    #[test]
    fn test_duplicate_version_rejected() {
        let mut history = FormulaHistory::new("tax");
        history.add(FormulaVersion::new("tax", 1, "1")).unwrap();
        assert!(matches!(
            history.add(FormulaVersion::new("tax", 1, "2")),
            Err(Error::DuplicateVersion { version: 1, .. })
        ));
        assert!(matches!(
            history.add(FormulaVersion::new("fee", 2, "2")),
            Err(Error::ForeignVersion { .. })
        ));
    }
}
