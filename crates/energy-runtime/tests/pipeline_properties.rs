use std::fmt::Write as _;
use std::path::Path;

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use energy_core::events::{Level, MemorySink};
use energy_core::settings::PipelineConfig;
use energy_core::time_utils::WeekStart;
use energy_core::EnergyError;
use energy_runtime::orchestrator::cross_check;
use energy_runtime::{PipelineOrchestrator, PipelineOutcome};
use tempfile::TempDir;

/// Buildings with disjoint hourly ranges: `base..=base + 23`.
const CAMPUS: [(&str, &str, f64); 3] = [
    ("Admin", "admin_jan.csv", 0.0),
    ("Library", "library_jan.csv", 100.0),
    ("Hostel", "hostel_jan.csv", 200.0),
];

/// Hourly readings for January 2024, `base + hour_of_day`.
fn january_csv(header: &str, base: f64) -> String {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    let mut body = format!("{header}\n");
    for hour in 0..744 {
        let ts = start + Duration::hours(hour);
        writeln!(body, "{},{}", ts.format("%Y-%m-%d %H:%M:%S"), base + (hour % 24) as f64).unwrap();
    }
    body
}

fn write(dir: &Path, name: &str, body: &str) {
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(dir.join(name), body).unwrap();
}

fn campus(root: &TempDir) -> PipelineConfig {
    let config = PipelineConfig::new(
        root.path().join("data"),
        root.path().join("output"),
        WeekStart::Monday,
    )
    .expect("valid config");
    for (_, file, base) in CAMPUS {
        write(&config.input_dir, file, &january_csv("timestamp,kwh", base));
    }
    config
}

fn run(config: &PipelineConfig) -> (PipelineOutcome, MemorySink) {
    let sink = MemorySink::new();
    let at = Utc.with_ymd_and_hms(2024, 2, 1, 8, 0, 0).unwrap();
    let outcome = PipelineOrchestrator::new(config, &sink)
        .run_at(at)
        .expect("pipeline succeeds");
    (outcome, sink)
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-6 * a.abs().max(b.abs()).max(1.0)
}

#[test]
fn test_full_month_three_buildings() {
    let root = TempDir::new().unwrap();
    let config = campus(&root);
    let (outcome, _) = run(&config);

    assert_eq!(outcome.dataset.len(), 3 * 744);
    assert_eq!(outcome.aggregates.summaries.len(), 3);
    assert_eq!(outcome.aggregates.daily.len(), 3 * 31);
    assert_eq!(outcome.aggregates.weekly.len(), 3 * 5);

    // Each day sums base*24 + (0+1+..+23).
    for (entity, _, base) in CAMPUS {
        let summary = outcome
            .aggregates
            .summaries
            .iter()
            .find(|s| s.entity_id == entity)
            .unwrap();
        assert!(close(summary.total, 31.0 * (base * 24.0 + 276.0)), "{entity}");
        assert_eq!(summary.min, base);
        assert_eq!(summary.max, base + 23.0);
        assert_eq!(summary.record_count, 744);
    }

    assert_eq!(outcome.summary.top_entity.entity_id, "Hostel");
    assert_eq!(outcome.summary.day_count, 31);
    assert_eq!(outcome.summary.week_count, 5);
    // Final week holds only Jan 29-31.
    assert!(outcome.summary.last_week_kwh < outcome.summary.first_week_kwh);
}

#[test]
fn test_conservation_across_outputs() {
    let root = TempDir::new().unwrap();
    let config = campus(&root);
    let (outcome, _) = run(&config);

    let raw = outcome.dataset.total_kwh();
    let by_summary: f64 = outcome.aggregates.summaries.iter().map(|s| s.total).sum();
    let by_day: f64 = outcome.aggregates.daily.iter().map(|d| d.total_kwh).sum();
    let by_week: f64 = outcome.aggregates.weekly.iter().map(|w| w.total_kwh).sum();

    assert!(close(raw, by_summary));
    assert!(close(raw, by_day));
    assert!(close(raw, by_week));
    assert!(close(raw, outcome.summary.total_kwh));
}

#[test]
fn test_buckets_partition_each_entity() {
    let root = TempDir::new().unwrap();
    let config = campus(&root);
    let (outcome, _) = run(&config);

    for summary in &outcome.aggregates.summaries {
        let weekly: f64 = outcome
            .aggregates
            .weekly
            .iter()
            .filter(|w| w.entity_id == summary.entity_id)
            .map(|w| w.total_kwh)
            .sum();
        assert!(close(weekly, summary.total), "{}", summary.entity_id);
    }
}

#[test]
fn test_object_model_agrees_with_aggregator() {
    let root = TempDir::new().unwrap();
    let config = campus(&root);
    let (outcome, sink) = run(&config);

    assert!(cross_check(&outcome.aggregates.summaries, &outcome.reports).is_empty());
    for s in &outcome.aggregates.summaries {
        let r = &outcome.reports[&s.entity_id];
        assert!(close(s.mean, r.mean));
        assert_eq!(s.min, r.min);
        assert_eq!(s.max, r.max);
    }
    assert!(sink.at_level(Level::WARN).is_empty());
}

#[test]
fn test_bad_source_is_isolated() {
    let root = TempDir::new().unwrap();
    let config = campus(&root);
    let (clean, _) = run(&config);

    write(&config.input_dir, "broken.csv", "reading,kwh\n1,2\n");
    write(&config.input_dir, "meter_x.csv", "timestamp,voltage\n2024-01-01,230\n");
    let (outcome, sink) = run(&config);

    assert_eq!(outcome.dataset, clean.dataset);
    assert_eq!(outcome.aggregates.summaries, clean.aggregates.summaries);
    assert_eq!(outcome.metadata.sources_discovered, 5);
    assert_eq!(outcome.metadata.sources_rejected.len(), 2);

    let rejected: Vec<_> = sink
        .at_level(Level::ERROR)
        .into_iter()
        .filter(|e| e.message == "Rejected source")
        .collect();
    assert_eq!(rejected.len(), 2);
    assert!(rejected.iter().all(|e| e.field("source").is_some()));
}

#[test]
fn test_consumption_alias_and_building_column() {
    let root = TempDir::new().unwrap();
    let config = PipelineConfig::new(
        root.path().join("data"),
        root.path().join("output"),
        WeekStart::Monday,
    )
    .unwrap();
    write(
        &config.input_dir,
        "export.csv",
        "Timestamp,Consumption_kWh,Building\n\
         2024-01-01 00:00:00,5.5,Science Block\n\
         2024-01-01 01:00:00,4.5,Science Block\n",
    );

    let (outcome, _) = run(&config);
    assert_eq!(outcome.aggregates.summaries.len(), 1);
    assert_eq!(outcome.aggregates.summaries[0].entity_id, "Science Block");
    assert_eq!(outcome.aggregates.summaries[0].total, 10.0);
}

#[test]
fn test_source_with_only_bad_timestamps_contributes_nothing() {
    let root = TempDir::new().unwrap();
    let config = campus(&root);
    let (clean, _) = run(&config);

    write(
        &config.input_dir,
        "gym_jan.csv",
        "timestamp,kwh\nyesterday,10\nnot a date,20\n",
    );
    let (outcome, _) = run(&config);

    assert_eq!(outcome.dataset.len(), clean.dataset.len());
    assert!(outcome.reports.get("Gym").is_none());
    assert_eq!(outcome.metadata.rows_rejected, 2);
}

#[test]
fn test_only_unusable_sources_is_corpus_empty() {
    let root = TempDir::new().unwrap();
    let config = PipelineConfig::new(
        root.path().join("data"),
        root.path().join("output"),
        WeekStart::Monday,
    )
    .unwrap();
    write(&config.input_dir, "gym.csv", "timestamp,kwh\nyesterday,10\n");

    let err = PipelineOrchestrator::new(&config, &MemorySink::new())
        .run()
        .unwrap_err();
    assert!(matches!(err, EnergyError::NoUsableData { sources: 1, .. }));
    assert!(err.is_corpus_empty());
}

#[test]
fn test_peak_tie_reports_first_occurrence() {
    let root = TempDir::new().unwrap();
    let config = PipelineConfig::new(
        root.path().join("data"),
        root.path().join("output"),
        WeekStart::Monday,
    )
    .unwrap();
    // Sources are read in file-name order: admin before library.
    write(&config.input_dir, "admin.csv", "timestamp,kwh\n2024-01-02 10:00:00,99\n2024-01-01 10:00:00,1\n");
    write(&config.input_dir, "library.csv", "timestamp,kwh\n2024-01-01 09:00:00,99\n");

    let (outcome, _) = run(&config);
    assert_eq!(outcome.summary.peak.entity_id, "Admin");
    assert_eq!(outcome.summary.peak.value_kwh, 99.0);
}

#[test]
fn test_reruns_produce_identical_tables() {
    let root = TempDir::new().unwrap();
    let config = campus(&root);
    let (first, _) = run(&config);
    let cleaned = std::fs::read(&first.artifacts.cleaned_data).unwrap();
    let table = std::fs::read(&first.artifacts.building_summary).unwrap();
    let narrative = std::fs::read(&first.artifacts.narrative).unwrap();

    let (second, _) = run(&config);
    assert_eq!(std::fs::read(&second.artifacts.cleaned_data).unwrap(), cleaned);
    assert_eq!(std::fs::read(&second.artifacts.building_summary).unwrap(), table);
    assert_eq!(std::fs::read(&second.artifacts.narrative).unwrap(), narrative);
}

#[test]
fn test_extra_input_column_reaches_cleaned_dataset() {
    let root = TempDir::new().unwrap();
    let config = PipelineConfig::new(
        root.path().join("data"),
        root.path().join("output"),
        WeekStart::Monday,
    )
    .unwrap();
    write(
        &config.input_dir,
        "admin.csv",
        "timestamp,kwh,meter_serial\n2024-01-01 10:00:00,5,SN-77\n",
    );
    write(&config.input_dir, "library.csv", "timestamp,kwh\n2024-01-01 10:00:00,3\n");

    let (outcome, _) = run(&config);
    let cleaned = std::fs::read_to_string(&outcome.artifacts.cleaned_data).unwrap();
    let mut lines = cleaned.lines();
    assert_eq!(
        lines.next(),
        Some("timestamp,entity_id,value_kwh,period_label,source_file,meter_serial")
    );
    assert_eq!(lines.next(), Some("2024-01-01 10:00:00,Admin,5,2024-01,admin.csv,SN-77"));
    assert_eq!(lines.next(), Some("2024-01-01 10:00:00,Library,3,2024-01,library.csv,"));
}
