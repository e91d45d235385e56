//! Object model over the canonical dataset: buildings owning their readings.
//!
//! This path computes per-building statistics on its own, without going
//! through the [`Aggregator`](crate::aggregator::Aggregator). The two are
//! compared after the fact.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use energy_core::models::CanonicalDataset;
use serde::Serialize;

/// One reading owned by a [`Building`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeterReading {
    pub timestamp: NaiveDateTime,
    pub value_kwh: f64,
}

/// Statistics reported by [`Building::report`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct BuildingReport {
    pub total: f64,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

/// A building and the readings recorded against it, in insertion order.
#[derive(Debug, Clone)]
pub struct Building {
    name: String,
    readings: Vec<MeterReading>,
}

impl Building {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            readings: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn readings(&self) -> &[MeterReading] {
        &self.readings
    }

    pub fn add_reading(&mut self, timestamp: NaiveDateTime, value_kwh: f64) {
        self.readings.push(MeterReading {
            timestamp,
            value_kwh,
        });
    }

    pub fn total_consumption(&self) -> f64 {
        self.readings.iter().map(|r| r.value_kwh).sum()
    }

    /// Total, mean, min and max. A building with no readings reports zeros.
    pub fn report(&self) -> BuildingReport {
        if self.readings.is_empty() {
            return BuildingReport::default();
        }

        let total = self.total_consumption();
        let (min, max) = self
            .readings
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), r| {
                (lo.min(r.value_kwh), hi.max(r.value_kwh))
            });

        BuildingReport {
            total,
            mean: total / self.readings.len() as f64,
            min,
            max,
        }
    }
}

/// Owns every [`Building`], keyed by entity id.
///
/// Buildings are created on first sighting and never removed.
#[derive(Debug, Clone, Default)]
pub struct BuildingManager {
    buildings: BTreeMap<String, Building>,
}

impl BuildingManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the building called `name`, creating it if needed.
    pub fn get_or_create(&mut self, name: &str) -> &mut Building {
        self.buildings
            .entry(name.to_string())
            .or_insert_with(|| Building::new(name))
    }

    /// Add every record of `dataset` to its building.
    pub fn load_from_dataset(&mut self, dataset: &CanonicalDataset) {
        for record in dataset {
            self.get_or_create(&record.entity_id)
                .add_reading(record.timestamp, record.value_kwh);
        }
    }

    /// Convenience constructor over a whole dataset.
    pub fn from_dataset(dataset: &CanonicalDataset) -> Self {
        let mut manager = Self::new();
        manager.load_from_dataset(dataset);
        manager
    }

    pub fn building(&self, name: &str) -> Option<&Building> {
        self.buildings.get(name)
    }

    /// Buildings sorted by name.
    pub fn buildings(&self) -> impl Iterator<Item = &Building> {
        self.buildings.values()
    }

    pub fn len(&self) -> usize {
        self.buildings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buildings.is_empty()
    }

    /// Reports for every building that has at least one reading.
    ///
    /// Empty buildings (only possible through a bare `get_or_create`) are
    /// left out, matching how the aggregator treats absent entities.
    pub fn building_reports(&self) -> BTreeMap<String, BuildingReport> {
        self.buildings
            .iter()
            .filter(|(_, b)| !b.readings.is_empty())
            .map(|(name, b)| (name.clone(), b.report()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use energy_core::models::CanonicalRecord;
    use energy_core::time_utils::period_label;

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn record(when: &str, entity: &str, kwh: f64) -> CanonicalRecord {
        let timestamp = ts(when);
        CanonicalRecord {
            timestamp,
            entity_id: entity.to_string(),
            value_kwh: kwh,
            period_label: period_label(timestamp),
            source_file: "test.csv".to_string(),
            extra: Vec::new(),
        }
    }

    #[test]
    fn test_building_report() {
        let mut building = Building::new("Admin");
        building.add_reading(ts("2024-01-01 00:00:00"), 2.0);
        building.add_reading(ts("2024-01-01 01:00:00"), 6.0);
        building.add_reading(ts("2024-01-01 02:00:00"), 1.0);

        assert_eq!(building.total_consumption(), 9.0);
        let report = building.report();
        assert_eq!(report.total, 9.0);
        assert_eq!(report.mean, 3.0);
        assert_eq!(report.min, 1.0);
        assert_eq!(report.max, 6.0);
    }

    #[test]
    fn test_empty_building_reports_zeros() {
        let building = Building::new("Empty");
        assert_eq!(building.total_consumption(), 0.0);
        assert_eq!(building.report(), BuildingReport::default());
    }

    #[test]
    fn test_readings_keep_insertion_order() {
        let mut building = Building::new("Admin");
        building.add_reading(ts("2024-01-02 00:00:00"), 2.0);
        building.add_reading(ts("2024-01-01 00:00:00"), 1.0);
        let values: Vec<f64> = building.readings().iter().map(|r| r.value_kwh).collect();
        assert_eq!(values, vec![2.0, 1.0]);
    }

    #[test]
    fn test_get_or_create_creates_once() {
        let mut manager = BuildingManager::new();
        manager.get_or_create("Admin").add_reading(ts("2024-01-01 00:00:00"), 1.0);
        manager.get_or_create("Admin").add_reading(ts("2024-01-01 01:00:00"), 2.0);

        assert_eq!(manager.len(), 1);
        assert_eq!(manager.building("Admin").unwrap().readings().len(), 2);
    }

    #[test]
    fn test_load_from_dataset_groups_by_entity() {
        let dataset = CanonicalDataset::new(vec![
            record("2024-01-01 00:00:00", "Library", 2.0),
            record("2024-01-01 00:00:00", "Admin", 1.0),
            record("2024-01-01 01:00:00", "Admin", 3.0),
        ]);
        let manager = BuildingManager::from_dataset(&dataset);

        let names: Vec<&str> = manager.buildings().map(|b| b.name()).collect();
        assert_eq!(names, vec!["Admin", "Library"]);
        assert_eq!(manager.building("Admin").unwrap().total_consumption(), 4.0);
        assert!(manager.building("Hostel").is_none());
    }

    #[test]
    fn test_building_reports_skip_empty_buildings() {
        let mut manager = BuildingManager::new();
        manager.get_or_create("Ghost");
        manager.get_or_create("Admin").add_reading(ts("2024-01-01 00:00:00"), 5.0);

        let reports = manager.building_reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports["Admin"].total, 5.0);
        assert!(!reports.contains_key("Ghost"));
    }
}
