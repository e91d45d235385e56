//! Turns one raw meter CSV into canonical records.
//!
//! Column names are normalised (trimmed, lowercased) and then resolved
//! through a fixed, ordered rule list. Rows that cannot be used are dropped
//! and counted; only a missing timestamp or value column rejects the whole
//! source.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::OnceLock;

use csv::{ReaderBuilder, StringRecord, Trim};
use energy_core::models::{CanonicalRecord, CANONICAL_COLUMNS};
use energy_core::time_utils::{parse_timestamp, period_label};
use energy_core::SourceError;
use regex::Regex;

// ── Column resolution ─────────────────────────────────────────────────────────

/// How to locate one logical column among a source's headers.
///
/// Exact names are tried first, in order; then the first header containing
/// any of the `contains` fragments wins.
#[derive(Debug, Clone, Copy)]
pub struct ColumnRule {
    pub canonical: &'static str,
    pub exact: &'static [&'static str],
    pub contains: &'static [&'static str],
}

/// Outcome of applying a [`ColumnRule`] to a header row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnResolution {
    Resolved { index: usize, name: String },
    NotFound,
}

impl ColumnResolution {
    pub fn index(&self) -> Option<usize> {
        match self {
            Self::Resolved { index, .. } => Some(*index),
            Self::NotFound => None,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Resolved { name, .. } => Some(name),
            Self::NotFound => None,
        }
    }
}

impl ColumnRule {
    /// Resolve against already-normalised headers.
    pub fn resolve(&self, headers: &[String]) -> ColumnResolution {
        let found = self
            .exact
            .iter()
            .find_map(|exact| headers.iter().position(|h| h == exact))
            .or_else(|| {
                headers
                    .iter()
                    .position(|h| self.contains.iter().any(|frag| h.contains(frag)))
            });

        match found {
            Some(index) => ColumnResolution::Resolved {
                index,
                name: headers[index].clone(),
            },
            None => ColumnResolution::NotFound,
        }
    }
}

pub const TIMESTAMP_COLUMN: ColumnRule = ColumnRule {
    canonical: "timestamp",
    exact: &["timestamp"],
    contains: &[],
};

pub const VALUE_COLUMN: ColumnRule = ColumnRule {
    canonical: "kwh",
    exact: &["kwh"],
    contains: &["kwh", "consum"],
};

pub const ENTITY_COLUMN: ColumnRule = ColumnRule {
    canonical: "building",
    exact: &["building", "entity_id"],
    contains: &[],
};

/// Trim and lowercase a header cell.
pub fn normalize_header(raw: &str) -> String {
    raw.trim().to_lowercase()
}

// ── Output types ──────────────────────────────────────────────────────────────

/// Row-level counters for one source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizeStats {
    /// Data rows encountered (header excluded).
    pub rows_read: usize,
    /// Rows with the wrong number of fields or undecodable bytes.
    pub malformed_rows: usize,
    /// Rows whose timestamp did not parse.
    pub bad_timestamps: usize,
    /// Rows whose value was not a finite number.
    pub bad_values: usize,
}

impl NormalizeStats {
    pub fn rejected_rows(&self) -> usize {
        self.malformed_rows + self.bad_timestamps + self.bad_values
    }
}

/// Everything a single source contributed.
#[derive(Debug, Clone)]
pub struct NormalizedSource {
    pub records: Vec<CanonicalRecord>,
    pub stats: NormalizeStats,
    /// Header the value column was resolved to (e.g. `consumption_kwh`).
    pub value_column: String,
}

// ── RecordNormalizer ──────────────────────────────────────────────────────────

/// Stateless parser for a single meter CSV source.
pub struct RecordNormalizer;

impl RecordNormalizer {
    /// Open and normalise the file at `path`.
    pub fn normalize_path(path: &Path) -> Result<NormalizedSource, SourceError> {
        let file = File::open(path).map_err(|source| SourceError::Unreadable { source })?;
        let source_file = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self::normalize_reader(file, &source_file)
    }

    /// Normalise CSV content from any reader. `source_file` is recorded on
    /// every record and used to derive the entity when no entity column exists.
    pub fn normalize_reader<R: Read>(
        reader: R,
        source_file: &str,
    ) -> Result<NormalizedSource, SourceError> {
        let mut rdr = ReaderBuilder::new()
            .flexible(true)
            .trim(Trim::All)
            .from_reader(reader);

        let headers: Vec<String> = rdr
            .headers()
            .map_err(classify_csv_error)?
            .iter()
            .map(normalize_header)
            .collect();

        let Some(ts_idx) = TIMESTAMP_COLUMN.resolve(&headers).index() else {
            return Err(SourceError::MissingTimestampColumn);
        };
        let (value_idx, value_column) = match VALUE_COLUMN.resolve(&headers) {
            ColumnResolution::Resolved { index, name } => (index, name),
            ColumnResolution::NotFound => {
                return Err(SourceError::MissingValueColumn { columns: headers });
            }
        };
        let entity_idx = ENTITY_COLUMN.resolve(&headers).index();
        let fallback_entity = entity_from_source_name(source_file);
        let extra_idx = extra_columns(&headers, &[Some(ts_idx), Some(value_idx), entity_idx]);

        let mut stats = NormalizeStats::default();
        let mut records = Vec::new();
        let mut record = StringRecord::new();

        loop {
            match rdr.read_record(&mut record) {
                Ok(true) => {}
                Ok(false) => break,
                Err(err) if err.is_io_error() => return Err(classify_csv_error(err)),
                Err(_) => {
                    stats.rows_read += 1;
                    stats.malformed_rows += 1;
                    continue;
                }
            }
            stats.rows_read += 1;

            if record.len() != headers.len() {
                stats.malformed_rows += 1;
                continue;
            }

            let Some(timestamp) = record.get(ts_idx).and_then(parse_timestamp) else {
                stats.bad_timestamps += 1;
                continue;
            };

            let Some(value_kwh) = record.get(value_idx).and_then(parse_value) else {
                stats.bad_values += 1;
                continue;
            };

            let entity_id = entity_idx
                .and_then(|idx| record.get(idx))
                .filter(|cell| !cell.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| fallback_entity.clone());

            records.push(CanonicalRecord {
                timestamp,
                entity_id,
                value_kwh,
                period_label: period_label(timestamp),
                source_file: source_file.to_string(),
                extra: extra_idx
                    .iter()
                    .map(|(idx, name)| {
                        (name.clone(), record.get(*idx).unwrap_or_default().to_string())
                    })
                    .collect(),
            });
        }

        Ok(NormalizedSource {
            records,
            stats,
            value_column,
        })
    }
}

/// Derive an entity id from a source file name.
///
/// Takes the first token of the file stem (split on `_`, `-`, `.` or
/// whitespace) and title-cases it: `admin_jan.csv` → `Admin`.
pub fn entity_from_source_name(source_file: &str) -> String {
    static SEPARATOR: OnceLock<Regex> = OnceLock::new();
    let separator = SEPARATOR.get_or_init(|| Regex::new(r"[_\-.\s]+").expect("regex is valid"));

    let stem = Path::new(source_file)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(source_file);

    let token = separator
        .split(stem)
        .find(|t| !t.is_empty())
        .unwrap_or(stem);

    if token.is_empty() {
        return source_file.to_string();
    }
    title_case(token)
}

// ── Internal helpers ──────────────────────────────────────────────────────────

/// Uppercase the first letter of every alphabetic run, lowercase the rest.
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_alpha = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}

/// Headers with no canonical role, paired with their index.
///
/// Blank headers, repeated headers and headers that shadow a canonical
/// output column are dropped.
fn extra_columns(headers: &[String], resolved: &[Option<usize>]) -> Vec<(usize, String)> {
    let mut out: Vec<(usize, String)> = Vec::new();
    for (idx, name) in headers.iter().enumerate() {
        if name.is_empty()
            || resolved.contains(&Some(idx))
            || CANONICAL_COLUMNS.contains(&name.as_str())
            || out.iter().any(|(_, seen)| seen == name)
        {
            continue;
        }
        out.push((idx, name.clone()));
    }
    out
}

fn parse_value(cell: &str) -> Option<f64> {
    cell.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn classify_csv_error(err: csv::Error) -> SourceError {
    if err.is_io_error() {
        SourceError::Unreadable {
            source: std::io::Error::other(err),
        }
    } else {
        SourceError::Parse(err)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
