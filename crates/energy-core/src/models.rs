use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

use crate::time_utils::serde_timestamp;

/// Leading columns of `cleaned_energy_data.csv`, in field order.
pub const CANONICAL_COLUMNS: [&str; 5] = [
    "timestamp",
    "entity_id",
    "value_kwh",
    "period_label",
    "source_file",
];

/// One validated meter reading, as it appears in the canonical dataset.
///
/// The five named fields lead `cleaned_energy_data.csv`; `extra` columns
/// follow them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    /// Reading time in its original wall-clock representation.
    #[serde(with = "serde_timestamp")]
    pub timestamp: NaiveDateTime,
    /// Building / meter the reading belongs to. Never empty.
    pub entity_id: String,
    /// Energy consumed, in kWh.
    pub value_kwh: f64,
    /// `"YYYY-MM"` of `timestamp`.
    pub period_label: String,
    /// File name the record was read from.
    pub source_file: String,
    /// Input columns with no canonical role, as `(header, cell)` in source
    /// header order.
    #[serde(skip)]
    pub extra: Vec<(String, String)>,
}

impl CanonicalRecord {
    /// Cell of the named extra column, if this record's source had it.
    pub fn extra_value(&self, column: &str) -> Option<&str> {
        self.extra
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.as_str())
    }
}

/// The immutable, insertion-ordered collection produced by ingestion.
///
/// Order is source discovery order, then row order within each source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CanonicalDataset {
    records: Vec<CanonicalRecord>,
}

impl CanonicalDataset {
    pub fn new(records: Vec<CanonicalRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[CanonicalRecord] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CanonicalRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Sum of `value_kwh` over every record.
    pub fn total_kwh(&self) -> f64 {
        self.records.iter().map(|r| r.value_kwh).sum()
    }

    /// Distinct entity ids, sorted.
    /// Union of every record's extra column names, in first-seen order.
    pub fn extra_columns(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        let mut columns = Vec::new();
        for record in &self.records {
            for (name, _) in &record.extra {
                if seen.insert(name.as_str()) {
                    columns.push(name.as_str());
                }
            }
        }
        columns
    }

    pub fn entity_ids(&self) -> BTreeSet<&str> {
        self.records.iter().map(|r| r.entity_id.as_str()).collect()
    }
}

impl<'a> IntoIterator for &'a CanonicalDataset {
    type Item = &'a CanonicalRecord;
    type IntoIter = std::slice::Iter<'a, CanonicalRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Total consumption of one entity within one time bucket.
///
/// Only buckets that contain at least one reading produce a row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketTotal {
    pub entity_id: String,
    #[serde(with = "serde_timestamp")]
    pub bucket_start: NaiveDateTime,
    pub total_kwh: f64,
}

/// A [`BucketTotal`] over a calendar day.
pub type DailyTotal = BucketTotal;

/// A [`BucketTotal`] over a calendar week.
pub type WeeklyTotal = BucketTotal;

/// Per-entity statistics over all of its readings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntitySummary {
    pub entity_id: String,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub total: f64,
    #[serde(skip)]
    pub record_count: usize,
}
