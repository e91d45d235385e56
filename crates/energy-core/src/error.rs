use std::path::PathBuf;
use thiserror::Error;

/// Run-level errors: the only failures that surface to the caller.
#[derive(Error, Debug)]
pub enum EnergyError {
    /// No candidate CSV sources were found in the input directory.
    #[error("No CSV files found in {0}")]
    NoSourceFiles(PathBuf),

    /// Sources were found, but none of them produced a single usable record.
    #[error(
        "No usable data in {dir}: {sources} source(s) discovered, {rejected} rejected, 0 records survived ingestion"
    )]
    NoUsableData {
        dir: PathBuf,
        sources: usize,
        rejected: usize,
    },

    /// An output artifact could not be written.
    #[error("Failed to write {path}: {source}")]
    OutputWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A CSV artifact could not be serialized.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A JSON artifact could not be serialized.
    #[error("Failed to serialize JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl EnergyError {
    /// `true` for the terminal "nothing survived ingestion" conditions.
    pub fn is_corpus_empty(&self) -> bool {
        matches!(self, Self::NoSourceFiles(_) | Self::NoUsableData { .. })
    }
}

/// Structural problems that cause a single source to be rejected.
///
/// These never abort a run; the ingestor logs them with the source path and
/// moves on to the next file.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("no 'timestamp' column")]
    MissingTimestampColumn,

    #[error("no 'kwh'-like column among [{}]", columns.join(", "))]
    MissingValueColumn { columns: Vec<String> },

    #[error("file unreadable: {source}")]
    Unreadable {
        #[source]
        source: std::io::Error,
    },

    #[error("parse failure: {0}")]
    Parse(#[from] csv::Error),
}

impl SourceError {
    /// Short machine-friendly tag used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingTimestampColumn => "missing_timestamp_column",
            Self::MissingValueColumn { .. } => "missing_value_column",
            Self::Unreadable { .. } => "unreadable",
            Self::Parse(_) => "parse_failure",
        }
    }
}

/// Convenience alias used throughout the energy crates.
pub type Result<T> = std::result::Result<T, EnergyError>;
