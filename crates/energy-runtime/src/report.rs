//! Executive summary derivation and report persistence.
//!
//! [`ExecutiveSummary::derive`] is pure. [`ReportWriter`] only touches its
//! own output files: the cleaned dataset, the per-building summary table,
//! the narrative text and the run metadata.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use energy_core::events::{EventSink, Level};
use energy_core::formatting::format_kwh;
use energy_core::models::{CanonicalDataset, CanonicalRecord, EntitySummary, CANONICAL_COLUMNS};
use energy_core::settings::PipelineConfig;
use energy_core::time_utils::OUTPUT_FORMAT;
use energy_core::{EnergyError, Result};
use energy_data::aggregator::Aggregates;
use serde::Serialize;

pub const CLEANED_DATA_FILE: &str = "cleaned_energy_data.csv";
pub const BUILDING_SUMMARY_FILE: &str = "building_summary.csv";
pub const NARRATIVE_FILE: &str = "summary.txt";
pub const RUN_METADATA_FILE: &str = "run_metadata.json";

// ── ExecutiveSummary ──────────────────────────────────────────────────────────

/// Entity with the largest total consumption.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopEntity {
    pub entity_id: String,
    pub total_kwh: f64,
}

/// The single largest reading in the dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeakEvent {
    pub timestamp: NaiveDateTime,
    pub entity_id: String,
    pub value_kwh: f64,
}

/// Direction of consumption between the first and last week.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Increased,
    DecreasedOrStable,
}

impl Trend {
    /// `Increased` only when `last` is strictly greater than `first`.
    pub fn between(first: f64, last: f64) -> Self {
        if last > first {
            Self::Increased
        } else {
            Self::DecreasedOrStable
        }
    }

    pub fn sentence(self) -> &'static str {
        match self {
            Self::Increased => "Weekly consumption increased over the period.",
            Self::DecreasedOrStable => {
                "Weekly consumption decreased or remained stable over the period."
            }
        }
    }
}

/// Headline facts for the narrative report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutiveSummary {
    pub generated_at: DateTime<Utc>,
    pub total_kwh: f64,
    pub top_entity: TopEntity,
    pub peak: PeakEvent,
    /// Distinct calendar days that have at least one daily total.
    pub day_count: usize,
    /// Distinct weekly buckets across all entities.
    pub week_count: usize,
    pub first_week_kwh: f64,
    pub last_week_kwh: f64,
    pub trend: Trend,
}

impl ExecutiveSummary {
    /// Derive the summary. Returns `None` for an empty dataset.
    ///
    /// Ties on the top entity go to the first summary in `aggregates.summaries`
    /// order; ties on the peak go to the first record in dataset order.
    pub fn derive(
        dataset: &CanonicalDataset,
        aggregates: &Aggregates,
        generated_at: DateTime<Utc>,
    ) -> Option<Self> {
        let top_entity = top_entity(&aggregates.summaries)?;
        let peak = peak_event(dataset)?;

        let day_count = aggregates
            .daily
            .iter()
            .map(|d| d.bucket_start)
            .collect::<BTreeSet<_>>()
            .len();

        let mut weeks: BTreeMap<NaiveDateTime, f64> = BTreeMap::new();
        for w in &aggregates.weekly {
            *weeks.entry(w.bucket_start).or_insert(0.0) += w.total_kwh;
        }
        let first_week_kwh = weeks.values().next().copied().unwrap_or(0.0);
        let last_week_kwh = weeks.values().next_back().copied().unwrap_or(0.0);

        Some(Self {
            generated_at,
            total_kwh: dataset.total_kwh(),
            top_entity,
            peak,
            day_count,
            week_count: weeks.len(),
            first_week_kwh,
            last_week_kwh,
            trend: Trend::between(first_week_kwh, last_week_kwh),
        })
    }

    /// The narrative report, one labelled line per fact, in a fixed order.
    pub fn render_lines(&self) -> Vec<String> {
        vec![
            "Energy Usage Executive Summary".to_string(),
            "================================".to_string(),
            format!(
                "Generated at: {}",
                self.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
            ),
            format!("Total campus consumption: {}", format_kwh(self.total_kwh)),
            format!(
                "Highest-consuming building: {} ({})",
                self.top_entity.entity_id,
                format_kwh(self.top_entity.total_kwh)
            ),
            format!(
                "Peak load time: {} in building {} ({})",
                self.peak.timestamp.format(OUTPUT_FORMAT),
                self.peak.entity_id,
                format_kwh(self.peak.value_kwh)
            ),
            String::new(),
            "Daily & Weekly Trends:".to_string(),
            format!("- Daily totals recorded for {} days.", self.day_count),
            format!(
                "- Weekly totals span {} weeks (first {}, last {}).",
                self.week_count,
                format_kwh(self.first_week_kwh),
                format_kwh(self.last_week_kwh)
            ),
            format!("- {}", self.trend.sentence()),
        ]
    }

    pub fn render(&self) -> String {
        let mut text = self.render_lines().join("\n");
        text.push('\n');
        text
    }
}

/// First summary with the strictly largest total.
fn top_entity(summaries: &[EntitySummary]) -> Option<TopEntity> {
    let mut best: Option<&EntitySummary> = None;
    for s in summaries {
        if best.map_or(true, |b| s.total > b.total) {
            best = Some(s);
        }
    }
    best.map(|s| TopEntity {
        entity_id: s.entity_id.clone(),
        total_kwh: s.total,
    })
}

/// First record with the strictly largest value.
fn peak_event(dataset: &CanonicalDataset) -> Option<PeakEvent> {
    let mut best: Option<&CanonicalRecord> = None;
    for r in dataset {
        if best.map_or(true, |b| r.value_kwh > b.value_kwh) {
            best = Some(r);
        }
    }
    best.map(|r| PeakEvent {
        timestamp: r.timestamp,
        entity_id: r.entity_id.clone(),
        value_kwh: r.value_kwh,
    })
}

// ── ReportWriter ──────────────────────────────────────────────────────────────

/// Paths of everything a run wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportArtifacts {
    pub cleaned_data: PathBuf,
    pub building_summary: PathBuf,
    pub narrative: PathBuf,
    pub run_metadata: PathBuf,
}

/// Writes report artifacts into the configured output directory.
pub struct ReportWriter<'a> {
    output_dir: &'a Path,
    sink: &'a dyn EventSink,
}

impl<'a> ReportWriter<'a> {
    pub fn new(config: &'a PipelineConfig, sink: &'a dyn EventSink) -> Self {
        Self {
            output_dir: &config.output_dir,
            sink,
        }
    }

    /// Write all four artifacts. Files written before a failure stay on disk.
    pub fn persist<M: Serialize>(
        &self,
        dataset: &CanonicalDataset,
        summaries: &[EntitySummary],
        summary: &ExecutiveSummary,
        metadata: &M,
    ) -> Result<ReportArtifacts> {
        Ok(ReportArtifacts {
            cleaned_data: self.write_cleaned_data(dataset)?,
            building_summary: self.write_summary_table(summaries)?,
            narrative: self.write_narrative(summary)?,
            run_metadata: self.write_run_metadata(metadata)?,
        })
    }

    /// Every canonical record, one row each, in dataset order.
    ///
    /// The five canonical columns come first, then the union of all extra
    /// input columns. A record whose source lacked an extra column gets an
    /// empty cell.
    pub fn write_cleaned_data(&self, dataset: &CanonicalDataset) -> Result<PathBuf> {
        let extra = dataset.extra_columns();
        self.write_csv(CLEANED_DATA_FILE, |writer| {
            write_cleaned_rows(writer, dataset, &extra)
        })
    }

    /// One row per entity: `entity_id,mean,min,max,total`.
    pub fn write_summary_table(&self, summaries: &[EntitySummary]) -> Result<PathBuf> {
        self.write_csv(BUILDING_SUMMARY_FILE, |writer| {
            serialize_rows(writer, summaries)
        })
    }

    pub fn write_narrative(&self, summary: &ExecutiveSummary) -> Result<PathBuf> {
        let path = self.prepare(NARRATIVE_FILE)?;
        std::fs::write(&path, summary.render()).map_err(|source| EnergyError::OutputWrite {
            path: path.clone(),
            source,
        })?;
        self.written(&path);
        Ok(path)
    }

    pub fn write_run_metadata<M: Serialize>(&self, metadata: &M) -> Result<PathBuf> {
        let path = self.prepare(RUN_METADATA_FILE)?;
        let json = serde_json::to_string_pretty(metadata)?;
        std::fs::write(&path, json).map_err(|source| EnergyError::OutputWrite {
            path: path.clone(),
            source,
        })?;
        self.written(&path);
        Ok(path)
    }

    // ── Private ───────────────────────────────────────────────────────────────

    fn write_csv<F>(&self, name: &str, fill: F) -> Result<PathBuf>
    where
        F: FnOnce(&mut csv::Writer<File>) -> csv::Result<()>,
    {
        let path = self.prepare(name)?;
        let file = File::create(&path).map_err(|source| EnergyError::OutputWrite {
            path: path.clone(),
            source,
        })?;

        let mut writer = csv::Writer::from_writer(file);
        fill(&mut writer).map_err(|err| csv_failure(&path, err))?;
        writer.flush().map_err(|source| EnergyError::OutputWrite {
            path: path.clone(),
            source,
        })?;

        self.written(&path);
        Ok(path)
    }

    /// Ensure the output directory exists and return the artifact path.
    fn prepare(&self, name: &str) -> Result<PathBuf> {
        std::fs::create_dir_all(self.output_dir).map_err(|source| EnergyError::OutputWrite {
            path: self.output_dir.to_path_buf(),
            source,
        })?;
        Ok(self.output_dir.join(name))
    }

    fn written(&self, path: &Path) {
        self.sink.record(
            Level::INFO,
            "Artifact written",
            &[("path", path.display().to_string())],
        );
    }
}

fn serialize_rows<W, T>(writer: &mut csv::Writer<W>, rows: &[T]) -> csv::Result<()>
where
    W: Write,
    T: Serialize,
{
    for row in rows {
        writer.serialize(row)?;
    }
    Ok(())
}

fn write_cleaned_rows<W: Write>(
    writer: &mut csv::Writer<W>,
    dataset: &CanonicalDataset,
    extra: &[&str],
) -> csv::Result<()> {
    writer.write_record(CANONICAL_COLUMNS.iter().chain(extra))?;
    for record in dataset {
        writer.write_record(cleaned_row(record, extra))?;
    }
    Ok(())
}

fn cleaned_row(record: &CanonicalRecord, extra: &[&str]) -> Vec<String> {
    let mut row = Vec::with_capacity(CANONICAL_COLUMNS.len() + extra.len());
    row.push(record.timestamp.format(OUTPUT_FORMAT).to_string());
    row.push(record.entity_id.clone());
    row.push(record.value_kwh.to_string());
    row.push(record.period_label.clone());
    row.push(record.source_file.clone());
    row.extend(
        extra
            .iter()
            .map(|column| record.extra_value(column).unwrap_or_default().to_string()),
    );
    row
}

/// I/O failures keep the artifact path; anything else is a CSV error.
fn csv_failure(path: &Path, err: csv::Error) -> EnergyError {
    if !err.is_io_error() {
        return EnergyError::Csv(err);
    }
    let source = match err.into_kind() {
        csv::ErrorKind::Io(source) => source,
        other => std::io::Error::other(format!("{other:?}")),
    };
    EnergyError::OutputWrite {
        path: path.to_path_buf(),
        source,
    }
}

/// Print the narrative to stdout.
pub fn echo_narrative(summary: &ExecutiveSummary, out: &mut impl Write) -> std::io::Result<()> {
    out.write_all(summary.render().as_bytes())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
