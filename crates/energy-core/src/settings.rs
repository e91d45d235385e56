use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

use crate::error::{EnergyError, Result};
use crate::time_utils::WeekStart;

/// Log file used when `--log-file` is passed without a value.
pub const DEFAULT_LOG_FILE: &str = "energy_analysis.log";

// ── Settings (CLI) ─────────────────────────────────────────────────────────────

/// Campus energy usage analytics
#[derive(Parser, Debug, Clone)]
#[command(
    name = "campus-energy",
    about = "Ingest building meter CSVs and produce an energy usage report",
    version
)]
pub struct Settings {
    /// Directory containing the input CSV files
    #[arg(long, env = "ENERGY_DATA_DIR", default_value = "data")]
    pub data_dir: PathBuf,

    /// Directory the report artifacts are written to
    #[arg(long, env = "ENERGY_OUTPUT_DIR", default_value = "output")]
    pub output_dir: PathBuf,

    /// First day of the weekly aggregation bucket
    #[arg(long, value_enum, default_value_t = WeekStart::Monday)]
    pub week_start: WeekStart,

    /// Logging level
    #[arg(long, default_value = "INFO", value_parser = ["DEBUG", "INFO", "WARNING", "ERROR"])]
    pub log_level: String,

    /// Log file path (in addition to stderr)
    #[arg(
        long,
        env = "ENERGY_LOG_FILE",
        num_args = 0..=1,
        default_missing_value = DEFAULT_LOG_FILE
    )]
    pub log_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// Write sample CSVs into the data directory when it has none
    #[arg(long)]
    pub generate_sample: bool,

    /// Seed for the sample data generator
    #[arg(long, default_value = "42")]
    pub sample_seed: u64,
}

impl Settings {
    /// Parse the process arguments and apply `--debug`.
    pub fn load() -> Self {
        Self::resolve(Settings::parse())
    }

    /// Same as [`Settings::load`] but from an explicit argument list.
    pub fn load_from_args<I, T>(args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Self::resolve(Settings::parse_from(args))
    }

    fn resolve(mut settings: Settings) -> Settings {
        if settings.debug {
            settings.log_level = "DEBUG".to_string();
        }
        settings
    }

    /// Build the explicit configuration handed to the pipeline components.
    pub fn pipeline_config(&self) -> Result<PipelineConfig> {
        PipelineConfig::new(&self.data_dir, &self.output_dir, self.week_start)
    }
}

// ── PipelineConfig ─────────────────────────────────────────────────────────────

/// Configuration value object passed to each component at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub week_start: WeekStart,
}

impl PipelineConfig {
    /// Rejects empty paths and an output directory equal to the input
    /// directory (the cleaned CSV would be picked up on the next run).
    pub fn new(
        input_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        week_start: WeekStart,
    ) -> Result<Self> {
        let input_dir = input_dir.into();
        let output_dir = output_dir.into();

        if input_dir.as_os_str().is_empty() {
            return Err(EnergyError::Config("input directory is empty".to_string()));
        }
        if output_dir.as_os_str().is_empty() {
            return Err(EnergyError::Config("output directory is empty".to_string()));
        }
        if lexical(&input_dir) == lexical(&output_dir) {
            return Err(EnergyError::Config(format!(
                "output directory must differ from input directory ({})",
                input_dir.display()
            )));
        }

        Ok(Self {
            input_dir,
            output_dir,
            week_start,
        })
    }
}

/// Drop `.` components and fold `name/..` pairs without touching the
/// filesystem.
fn lexical(path: &Path) -> PathBuf {
    let mut out: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir if matches!(out.last(), Some(Component::Normal(_))) => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out.iter().collect()
}

// ── Tests ──────────────────────────────────────────────────────────────────────
