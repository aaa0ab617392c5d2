//! Criterion Records and Criteria Sets

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::VitalKind;

/// A live abnormal finding for one patient and vital kind
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CriterionRecord {
    pub value: f64,
    pub recorded_at: DateTime<Utc>,
}

/// The set of live criteria for a patient at evaluation time.
///
/// Serializes as a map of field name to record, e.g.
/// `{"respiratory_rate": {"value": 24.0, "recorded_at": "..."}}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CriteriaSet {
    records: BTreeMap<VitalKind, CriterionRecord>,
}

impl CriteriaSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the record for `kind`
    pub fn insert(&mut self, kind: VitalKind, record: CriterionRecord) {
        self.records.insert(kind, record);
    }

    /// Record for `kind`, if live
    pub fn get(&self, kind: VitalKind) -> Option<&CriterionRecord> {
        self.records.get(&kind)
    }

    /// qSOFA score: number of distinct scoring kinds present
    pub fn score(&self) -> usize {
        self.records.keys().filter(|k| k.is_scoring()).count()
    }

    /// Whether no criteria are met
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterate records in kind order
    pub fn iter(&self) -> impl Iterator<Item = (&VitalKind, &CriterionRecord)> {
        self.records.iter()
    }

    /// Kinds currently present
    pub fn kinds(&self) -> Vec<VitalKind> {
        self.records.keys().copied().collect()
    }
}

impl FromIterator<(VitalKind, CriterionRecord)> for CriteriaSet {
    fn from_iter<I: IntoIterator<Item = (VitalKind, CriterionRecord)>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}
