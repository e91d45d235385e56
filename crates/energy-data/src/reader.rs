//! CSV source discovery and multi-file ingestion.
//!
//! The [`Ingestor`] runs the [`RecordNormalizer`] over every CSV found in the
//! configured input directory. A rejected or unreadable source is logged and
//! skipped; the run only fails when nothing usable survives.

use std::path::{Path, PathBuf};
use std::time::Instant;

use energy_core::events::{EventSink, Level};
use energy_core::models::{CanonicalDataset, CanonicalRecord};
use energy_core::settings::PipelineConfig;
use energy_core::{EnergyError, Result, SourceError};

use crate::normalizer::RecordNormalizer;

// ── Public API ────────────────────────────────────────────────────────────────

/// Find all `.csv` files directly inside `data_path`, sorted by path.
///
/// The extension match is case-insensitive. Subdirectories are not scanned.
pub fn find_csv_files(data_path: &Path) -> Vec<PathBuf> {
    if !data_path.exists() {
        return Vec::new();
    }

    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(data_path)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry.file_type().is_file()
                && entry
                    .path()
                    .extension()
                    .map(|ext| ext.eq_ignore_ascii_case("csv"))
                    .unwrap_or(false)
        })
        .map(|entry| entry.into_path())
        .collect();

    files.sort();
    files
}

/// A source that contributed nothing because of a structural problem.
#[derive(Debug)]
pub struct SourceRejection {
    pub path: PathBuf,
    pub reason: SourceError,
}

/// Counters describing one ingestion pass.
#[derive(Debug, Default)]
pub struct IngestionReport {
    /// Sources in discovery order.
    pub sources: Vec<PathBuf>,
    /// Sources that were parsed (possibly yielding zero records).
    pub sources_loaded: usize,
    pub rejections: Vec<SourceRejection>,
    /// Data rows seen across all loaded sources.
    pub rows_read: usize,
    /// Rows dropped for malformed shape, bad timestamp or bad value.
    pub rows_rejected: usize,
    pub load_time_seconds: f64,
}

impl IngestionReport {
    pub fn sources_discovered(&self) -> usize {
        self.sources.len()
    }

    pub fn sources_rejected(&self) -> usize {
        self.rejections.len()
    }
}

/// The canonical dataset together with how it was assembled.
#[derive(Debug)]
pub struct Ingestion {
    pub dataset: CanonicalDataset,
    pub report: IngestionReport,
}

/// Builds the canonical dataset from a directory of meter CSVs.
pub struct Ingestor<'a> {
    config: &'a PipelineConfig,
    sink: &'a dyn EventSink,
}

impl<'a> Ingestor<'a> {
    pub fn new(config: &'a PipelineConfig, sink: &'a dyn EventSink) -> Self {
        Self { config, sink }
    }

    /// Ingest every CSV in the configured input directory.
    ///
    /// # Errors
    ///
    /// * [`EnergyError::NoSourceFiles`] when the directory holds no CSV files.
    /// * [`EnergyError::NoUsableData`] when every source was rejected or
    ///   every row was dropped.
    pub fn ingest(&self) -> Result<Ingestion> {
        let started = Instant::now();
        let dir = &self.config.input_dir;

        let sources = find_csv_files(dir);
        if sources.is_empty() {
            self.sink.record(
                Level::ERROR,
                "No CSV files found",
                &[("dir", dir.display().to_string())],
            );
            return Err(EnergyError::NoSourceFiles(dir.clone()));
        }

        let mut records: Vec<CanonicalRecord> = Vec::new();
        let mut report = IngestionReport::default();

        for path in &sources {
            self.ingest_source(path, &mut records, &mut report);
        }
        report.sources = sources;
        report.load_time_seconds = started.elapsed().as_secs_f64();

        if records.is_empty() {
            self.sink.record(
                Level::ERROR,
                "No usable data survived ingestion",
                &[
                    ("dir", dir.display().to_string()),
                    ("sources", report.sources_discovered().to_string()),
                    ("rejected", report.sources_rejected().to_string()),
                    ("rows_rejected", report.rows_rejected.to_string()),
                ],
            );
            return Err(EnergyError::NoUsableData {
                dir: dir.clone(),
                sources: report.sources_discovered(),
                rejected: report.sources_rejected(),
            });
        }

        self.sink.record(
            Level::INFO,
            "Combined dataset assembled",
            &[
                ("records", records.len().to_string()),
                ("sources_loaded", report.sources_loaded.to_string()),
                ("sources_rejected", report.sources_rejected().to_string()),
                ("rows_rejected", report.rows_rejected.to_string()),
            ],
        );

        Ok(Ingestion {
            dataset: CanonicalDataset::new(records),
            report,
        })
    }

    // ── Private ───────────────────────────────────────────────────────────────

    /// Normalise one source and fold its outcome into `records` / `report`.
    fn ingest_source(
        &self,
        path: &Path,
        records: &mut Vec<CanonicalRecord>,
        report: &mut IngestionReport,
    ) {
        let source = path.display().to_string();
        self.sink
            .record(Level::INFO, "Processing file", &[("source", source.clone())]);

        match RecordNormalizer::normalize_path(path) {
            Ok(normalized) => {
                let stats = normalized.stats;
                self.sink.record(
                    Level::INFO,
                    "Loaded source",
                    &[
                        ("source", source),
                        ("value_column", normalized.value_column),
                        ("records", normalized.records.len().to_string()),
                        ("rows_read", stats.rows_read.to_string()),
                        ("malformed_rows", stats.malformed_rows.to_string()),
                        ("bad_timestamps", stats.bad_timestamps.to_string()),
                        ("bad_values", stats.bad_values.to_string()),
                    ],
                );
                report.sources_loaded += 1;
                report.rows_read += stats.rows_read;
                report.rows_rejected += stats.rejected_rows();
                records.extend(normalized.records);
            }
            Err(reason) => {
                self.sink.record(
                    Level::ERROR,
                    "Rejected source",
                    &[
                        ("source", source),
                        ("kind", reason.kind().to_string()),
                        ("reason", reason.to_string()),
                    ],
                );
                report.rejections.push(SourceRejection {
                    path: path.to_path_buf(),
                    reason,
                });
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use energy_core::events::MemorySink;
    use energy_core::time_utils::WeekStart;
    use tempfile::TempDir;

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn write_csv(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    fn config_for(dir: &TempDir) -> PipelineConfig {
        PipelineConfig::new(dir.path(), dir.path().join("out"), WeekStart::Monday).unwrap()
    }

    const ADMIN: &str = "timestamp,kwh,building\n\
                         2024-01-01 00:00:00,1.0,Admin\n\
                         2024-01-01 01:00:00,2.0,Admin\n";
    const LIBRARY: &str = "timestamp,consumption_kwh\n\
                           2024-01-01 00:00:00,3.0\n";

    // ── find_csv_files ────────────────────────────────────────────────────────

    #[test]
    fn test_find_csv_files_sorted_and_filtered() {
        let dir = TempDir::new().unwrap();
        write_csv(dir.path(), "c.csv", "x");
        write_csv(dir.path(), "a.CSV", "x");
        write_csv(dir.path(), "b.csv", "x");
        write_csv(dir.path(), "notes.txt", "x");

        let files = find_csv_files(dir.path());
        let names: Vec<&str> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, vec!["a.CSV", "b.csv", "c.csv"]);
    }

    #[test]
    fn test_find_csv_files_ignores_subdirectories() {
        let dir = TempDir::new().unwrap();
        let sub = dir.path().join("archive");
        std::fs::create_dir_all(&sub).unwrap();
        write_csv(dir.path(), "top.csv", "x");
        write_csv(&sub, "nested.csv", "x");

        assert_eq!(find_csv_files(dir.path()).len(), 1);
    }

    #[test]
    fn test_find_csv_files_nonexistent_path() {
        let files = find_csv_files(Path::new("/tmp/does-not-exist-energy-test-xyz"));
        assert!(files.is_empty());
    }

    // ── Ingestor ──────────────────────────────────────────────────────────────

    #[test]
    fn test_ingest_concatenates_in_discovery_order() {
        let dir = TempDir::new().unwrap();
        write_csv(dir.path(), "library_jan.csv", LIBRARY);
        write_csv(dir.path(), "admin_jan.csv", ADMIN);
        let config = config_for(&dir);
        let sink = MemorySink::new();

        let ingestion = Ingestor::new(&config, &sink).ingest().unwrap();

        let entities: Vec<&str> = ingestion
            .dataset
            .iter()
            .map(|r| r.entity_id.as_str())
            .collect();
        assert_eq!(entities, vec!["Admin", "Admin", "Library"]);
        assert_eq!(ingestion.report.sources_discovered(), 2);
        assert_eq!(ingestion.report.sources_loaded, 2);
        assert_eq!(ingestion.report.rows_read, 3);
    }

    #[test]
    fn test_ingest_isolates_rejected_source() {
        let dir = TempDir::new().unwrap();
        write_csv(dir.path(), "admin_jan.csv", ADMIN);
        write_csv(dir.path(), "broken.csv", "timestamp,reading\n2024-01-01 00:00:00,1\n");
        write_csv(dir.path(), "library_jan.csv", LIBRARY);
        let config = config_for(&dir);
        let sink = MemorySink::new();

        let ingestion = Ingestor::new(&config, &sink).ingest().unwrap();

        assert_eq!(ingestion.dataset.len(), 3);
        assert!(ingestion
            .dataset
            .iter()
            .all(|r| r.source_file != "broken.csv"));
        assert_eq!(ingestion.report.sources_rejected(), 1);
        assert!(matches!(
            ingestion.report.rejections[0].reason,
            SourceError::MissingValueColumn { .. }
        ));

        let errors = sink.at_level(Level::ERROR);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field("kind"), Some("missing_value_column"));
        assert!(errors[0].field("source").unwrap().ends_with("broken.csv"));
    }

    #[test]
    fn test_ingest_distinguishes_missing_timestamp() {
        let dir = TempDir::new().unwrap();
        write_csv(dir.path(), "admin_jan.csv", ADMIN);
        write_csv(dir.path(), "notime.csv", "when,kwh\nx,1\n");
        let config = config_for(&dir);
        let sink = MemorySink::new();

        let ingestion = Ingestor::new(&config, &sink).ingest().unwrap();
        assert!(matches!(
            ingestion.report.rejections[0].reason,
            SourceError::MissingTimestampColumn
        ));
    }

    #[test]
    fn test_ingest_source_with_only_bad_rows_contributes_nothing() {
        let dir = TempDir::new().unwrap();
        write_csv(dir.path(), "admin_jan.csv", ADMIN);
        write_csv(dir.path(), "hostel_jan.csv", "timestamp,kwh\nbad,1\nworse,2\n");
        let config = config_for(&dir);
        let sink = MemorySink::new();

        let ingestion = Ingestor::new(&config, &sink).ingest().unwrap();
        assert_eq!(ingestion.dataset.len(), 2);
        assert_eq!(ingestion.report.sources_loaded, 2);
        assert_eq!(ingestion.report.rows_rejected, 2);
    }

    #[test]
    fn test_ingest_only_source_all_bad_rows_is_corpus_empty() {
        let dir = TempDir::new().unwrap();
        write_csv(dir.path(), "hostel_jan.csv", "timestamp,kwh\nbad,1\nworse,2\n");
        let config = config_for(&dir);
        let sink = MemorySink::new();

        let err = Ingestor::new(&config, &sink).ingest().unwrap_err();
        assert!(matches!(err, EnergyError::NoUsableData { sources: 1, rejected: 0, .. }));
        assert!(err.is_corpus_empty());
    }

    #[test]
    fn test_ingest_all_sources_rejected_is_corpus_empty() {
        let dir = TempDir::new().unwrap();
        write_csv(dir.path(), "a.csv", "foo,bar\n1,2\n");
        write_csv(dir.path(), "b.csv", "timestamp\n2024-01-01\n");
        let config = config_for(&dir);
        let sink = MemorySink::new();

        let err = Ingestor::new(&config, &sink).ingest().unwrap_err();
        assert!(matches!(err, EnergyError::NoUsableData { sources: 2, rejected: 2, .. }));
    }

    #[test]
    fn test_ingest_empty_directory_is_no_source_files() {
        let dir = TempDir::new().unwrap();
        let config = config_for(&dir);
        let sink = MemorySink::new();

        let err = Ingestor::new(&config, &sink).ingest().unwrap_err();
        assert!(matches!(err, EnergyError::NoSourceFiles(_)));
    }

    #[test]
    fn test_ingest_missing_directory_is_no_source_files() {
        let dir = TempDir::new().unwrap();
        let config = PipelineConfig::new(
            dir.path().join("absent"),
            dir.path().join("out"),
            WeekStart::Monday,
        )
        .unwrap();
        let sink = MemorySink::new();

        let err = Ingestor::new(&config, &sink).ingest().unwrap_err();
        assert!(matches!(err, EnergyError::NoSourceFiles(_)));
    }
}
