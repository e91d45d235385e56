//! Time-bucketed totals and per-entity statistics over the canonical dataset.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use energy_core::models::{
    BucketTotal, CanonicalDataset, CanonicalRecord, DailyTotal, EntitySummary, WeeklyTotal,
};
use energy_core::settings::PipelineConfig;
use energy_core::time_utils::{TimeBucket, WeekStart};

// ── RunningStats ──────────────────────────────────────────────────────────────

/// Mean / min / max / sum accumulated over individual readings.
#[derive(Debug, Clone, Copy)]
pub struct RunningStats {
    pub count: usize,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
}

impl Default for RunningStats {
    fn default() -> Self {
        Self {
            count: 0,
            sum: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }
}

impl RunningStats {
    pub fn add(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    /// `None` when nothing was added.
    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }

    fn into_summary(self, entity_id: String) -> Option<EntitySummary> {
        Some(EntitySummary {
            entity_id,
            mean: self.mean()?,
            min: self.min,
            max: self.max,
            total: self.sum,
            record_count: self.count,
        })
    }
}

// ── Aggregates ────────────────────────────────────────────────────────────────

/// All tabular outputs of one aggregation pass.
#[derive(Debug, Clone, Default)]
pub struct Aggregates {
    pub daily: Vec<DailyTotal>,
    pub weekly: Vec<WeeklyTotal>,
    pub summaries: Vec<EntitySummary>,
}

// ── Aggregator ────────────────────────────────────────────────────────────────

/// Pure aggregation over a [`CanonicalDataset`].
///
/// Results are sorted by entity id (and bucket start), so they do not depend
/// on record order.
#[derive(Debug, Clone, Copy, Default)]
pub struct Aggregator {
    week_start: WeekStart,
}

impl Aggregator {
    pub fn new(week_start: WeekStart) -> Self {
        Self { week_start }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.week_start)
    }

    pub fn week_start(&self) -> WeekStart {
        self.week_start
    }

    /// Per-entity totals for each calendar day with at least one reading.
    pub fn daily_totals(&self, dataset: &CanonicalDataset) -> Vec<DailyTotal> {
        Self::bucket_totals(dataset, TimeBucket::Day)
    }

    /// Per-entity totals for each calendar week with at least one reading.
    pub fn weekly_totals(&self, dataset: &CanonicalDataset) -> Vec<WeeklyTotal> {
        Self::bucket_totals(dataset, TimeBucket::Week(self.week_start))
    }

    /// Mean, min, max and total per entity. Entities without records do not
    /// appear.
    pub fn entity_summaries(&self, dataset: &CanonicalDataset) -> Vec<EntitySummary> {
        let mut map: BTreeMap<&str, RunningStats> = BTreeMap::new();
        for record in dataset {
            map.entry(record.entity_id.as_str())
                .or_default()
                .add(record.value_kwh);
        }

        map.into_iter()
            .filter_map(|(entity, stats)| stats.into_summary(entity.to_string()))
            .collect()
    }

    /// Run every aggregation.
    pub fn aggregate(&self, dataset: &CanonicalDataset) -> Aggregates {
        Aggregates {
            daily: self.daily_totals(dataset),
            weekly: self.weekly_totals(dataset),
            summaries: self.entity_summaries(dataset),
        }
    }

    /// Sum `value_kwh` per `(entity, bucket start)`.
    pub fn bucket_totals(dataset: &CanonicalDataset, bucket: TimeBucket) -> Vec<BucketTotal> {
        let mut map: BTreeMap<(&str, NaiveDateTime), f64> = BTreeMap::new();
        for record in dataset {
            *map.entry(bucket_key(record, bucket)).or_insert(0.0) += record.value_kwh;
        }

        map.into_iter()
            .map(|((entity, bucket_start), total_kwh)| BucketTotal {
                entity_id: entity.to_string(),
                bucket_start,
                total_kwh,
            })
            .collect()
    }
}

fn bucket_key(record: &CanonicalRecord, bucket: TimeBucket) -> (&str, NaiveDateTime) {
    (record.entity_id.as_str(), bucket.start_of(record.timestamp))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
