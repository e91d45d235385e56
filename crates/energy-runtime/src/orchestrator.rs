//! End-to-end pipeline run.
//!
//! Ingests the input directory, aggregates, builds the per-building object
//! model, cross-checks the two statistics paths and writes every artifact.

use std::collections::BTreeMap;
use std::time::Instant;

use chrono::{DateTime, Utc};
use energy_core::events::{EventSink, Level};
use energy_core::models::{CanonicalDataset, EntitySummary};
use energy_core::settings::PipelineConfig;
use energy_core::time_utils::WeekStart;
use energy_core::{EnergyError, Result};
use energy_data::aggregator::{Aggregates, Aggregator};
use energy_data::entity::{BuildingManager, BuildingReport};
use energy_data::reader::{IngestionReport, Ingestor};
use serde::Serialize;

use crate::report::{ExecutiveSummary, ReportArtifacts, ReportWriter};

/// Relative tolerance when comparing the two statistics paths.
pub const CROSS_CHECK_TOLERANCE: f64 = 1e-6;

// ── Public types ──────────────────────────────────────────────────────────────

/// One rejected source, as recorded in `run_metadata.json`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedSource {
    pub path: String,
    pub kind: &'static str,
    pub reason: String,
}

/// Metadata written alongside the reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunMetadata {
    /// RFC 3339 timestamp of the run.
    pub generated_at: String,
    pub input_dir: String,
    pub output_dir: String,
    pub week_start: WeekStart,
    pub sources_discovered: usize,
    pub sources_loaded: usize,
    pub sources_rejected: Vec<RejectedSource>,
    pub rows_read: usize,
    pub rows_rejected: usize,
    pub records: usize,
    pub entities: usize,
    pub daily_rows: usize,
    pub weekly_rows: usize,
    pub cross_check_mismatches: usize,
    /// Wall-clock seconds spent reading and normalising sources.
    pub load_time_seconds: f64,
    /// Wall-clock seconds spent on aggregation and the object model.
    pub aggregate_time_seconds: f64,
}

impl RunMetadata {
    fn build(
        config: &PipelineConfig,
        generated_at: DateTime<Utc>,
        ingestion: &IngestionReport,
        dataset: &CanonicalDataset,
        aggregates: &Aggregates,
        mismatches: usize,
        aggregate_time_seconds: f64,
    ) -> Self {
        Self {
            generated_at: generated_at.to_rfc3339(),
            input_dir: config.input_dir.display().to_string(),
            output_dir: config.output_dir.display().to_string(),
            week_start: config.week_start,
            sources_discovered: ingestion.sources_discovered(),
            sources_loaded: ingestion.sources_loaded,
            sources_rejected: ingestion
                .rejections
                .iter()
                .map(|r| RejectedSource {
                    path: r.path.display().to_string(),
                    kind: r.reason.kind(),
                    reason: r.reason.to_string(),
                })
                .collect(),
            rows_read: ingestion.rows_read,
            rows_rejected: ingestion.rows_rejected,
            records: dataset.len(),
            entities: aggregates.summaries.len(),
            daily_rows: aggregates.daily.len(),
            weekly_rows: aggregates.weekly.len(),
            cross_check_mismatches: mismatches,
            load_time_seconds: ingestion.load_time_seconds,
            aggregate_time_seconds,
        }
    }
}

/// Disagreement between [`Aggregator`] summaries and [`BuildingManager`] reports.
#[derive(Debug, Clone, PartialEq)]
pub enum Discrepancy {
    MissingReport { entity_id: String },
    MissingSummary { entity_id: String },
    Total { entity_id: String, summary: f64, report: f64 },
}

impl Discrepancy {
    pub fn entity_id(&self) -> &str {
        match self {
            Self::MissingReport { entity_id }
            | Self::MissingSummary { entity_id }
            | Self::Total { entity_id, .. } => entity_id,
        }
    }
}

/// Everything a successful run produced.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub dataset: CanonicalDataset,
    pub aggregates: Aggregates,
    pub reports: BTreeMap<String, BuildingReport>,
    pub summary: ExecutiveSummary,
    pub artifacts: ReportArtifacts,
    pub metadata: RunMetadata,
}

// ── Orchestrator ──────────────────────────────────────────────────────────────

/// Runs the pipeline once against a [`PipelineConfig`].
pub struct PipelineOrchestrator<'a> {
    config: &'a PipelineConfig,
    sink: &'a dyn EventSink,
}

impl<'a> PipelineOrchestrator<'a> {
    pub fn new(config: &'a PipelineConfig, sink: &'a dyn EventSink) -> Self {
        Self { config, sink }
    }

    /// Run with the current time as the report timestamp.
    pub fn run(&self) -> Result<PipelineOutcome> {
        self.run_at(Utc::now())
    }

    /// Run the full pipeline.
    ///
    /// 1. Ingest every CSV source into one canonical dataset.
    /// 2. Aggregate daily and weekly totals and per-entity statistics.
    /// 3. Build the building model and cross-check it against step 2.
    /// 4. Derive the executive summary.
    /// 5. Write the cleaned dataset, summary table, narrative and metadata.
    ///
    /// Nothing is written when ingestion fails.
    pub fn run_at(&self, generated_at: DateTime<Utc>) -> Result<PipelineOutcome> {
        self.sink.record(
            Level::INFO,
            "Pipeline started",
            &[
                ("input_dir", self.config.input_dir.display().to_string()),
                ("output_dir", self.config.output_dir.display().to_string()),
                ("week_start", self.config.week_start.to_string()),
            ],
        );

        // ── Step 1: Ingest ────────────────────────────────────────────────────
        let ingestion = Ingestor::new(self.config, self.sink).ingest()?;
        let dataset = ingestion.dataset;

        // ── Step 2: Aggregate ─────────────────────────────────────────────────
        let aggregate_start = Instant::now();
        let aggregates = Aggregator::from_config(self.config).aggregate(&dataset);

        // ── Step 3: Object model and cross-check ──────────────────────────────
        let reports = BuildingManager::from_dataset(&dataset).building_reports();
        let aggregate_time = aggregate_start.elapsed().as_secs_f64();

        let mismatches = cross_check(&aggregates.summaries, &reports);
        for m in &mismatches {
            self.sink.record(
                Level::WARN,
                "Building model disagrees with aggregator",
                &[
                    ("entity", m.entity_id().to_string()),
                    ("detail", format!("{m:?}")),
                ],
            );
        }

        // ── Step 4: Executive summary ─────────────────────────────────────────
        let summary = ExecutiveSummary::derive(&dataset, &aggregates, generated_at).ok_or_else(
            || EnergyError::NoUsableData {
                dir: self.config.input_dir.clone(),
                sources: ingestion.report.sources_discovered(),
                rejected: ingestion.report.sources_rejected(),
            },
        )?;

        // ── Step 5: Persist ───────────────────────────────────────────────────
        let metadata = RunMetadata::build(
            self.config,
            generated_at,
            &ingestion.report,
            &dataset,
            &aggregates,
            mismatches.len(),
            aggregate_time,
        );
        let artifacts = ReportWriter::new(self.config, self.sink).persist(
            &dataset,
            &aggregates.summaries,
            &summary,
            &metadata,
        )?;

        self.sink.record(
            Level::INFO,
            "Pipeline finished",
            &[
                ("records", dataset.len().to_string()),
                ("entities", aggregates.summaries.len().to_string()),
                ("total_kwh", format!("{:.2}", summary.total_kwh)),
            ],
        );

        Ok(PipelineOutcome {
            dataset,
            aggregates,
            reports,
            summary,
            artifacts,
            metadata,
        })
    }
}

/// Convenience wrapper around [`PipelineOrchestrator::run`].
pub fn run_pipeline(config: &PipelineConfig, sink: &dyn EventSink) -> Result<PipelineOutcome> {
    PipelineOrchestrator::new(config, sink).run()
}

/// Compare per-entity totals from both statistics paths.
pub fn cross_check(
    summaries: &[EntitySummary],
    reports: &BTreeMap<String, BuildingReport>,
) -> Vec<Discrepancy> {
    let mut out = Vec::new();

    for s in summaries {
        match reports.get(&s.entity_id) {
            None => out.push(Discrepancy::MissingReport {
                entity_id: s.entity_id.clone(),
            }),
            Some(r) if !approx_eq(s.total, r.total) => out.push(Discrepancy::Total {
                entity_id: s.entity_id.clone(),
                summary: s.total,
                report: r.total,
            }),
            Some(_) => {}
        }
    }

    for name in reports.keys() {
        if !summaries.iter().any(|s| &s.entity_id == name) {
            out.push(Discrepancy::MissingSummary {
                entity_id: name.clone(),
            });
        }
    }

    out
}

fn approx_eq(a: f64, b: f64) -> bool {
    let scale = a.abs().max(b.abs()).max(1.0);
    (a - b).abs() <= CROSS_CHECK_TOLERANCE * scale
}

// ── Tests ─────────────────────────────────────────────────────────────────────
