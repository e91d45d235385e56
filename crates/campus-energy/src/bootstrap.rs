use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use chrono::{Duration, NaiveDate};
use energy_data::reader::find_csv_files;
use rand::{rngs::StdRng, Rng, SeedableRng};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// ── Logging bootstrap ──────────────────────────────────────────────────────────

/// Map a `--log-level` name to an `EnvFilter` directive.
///
/// Unknown names pass through unchanged so `RUST_LOG`-style directives work.
pub fn level_directive(log_level: &str) -> String {
    match log_level.to_uppercase().as_str() {
        "DEBUG" => "debug".to_string(),
        "INFO" => "info".to_string(),
        "WARNING" | "WARN" => "warn".to_string(),
        "ERROR" | "CRITICAL" => "error".to_string(),
        _ => log_level.to_string(),
    }
}

/// Initialise the global `tracing` subscriber.
///
/// Always logs to stderr. With `log_file` set, a second plain-text layer
/// appends to that file through a non-blocking writer; keep the returned
/// guard alive until exit so buffered lines are flushed.
pub fn setup_logging(
    log_level: &str,
    log_file: Option<&PathBuf>,
) -> anyhow::Result<Option<WorkerGuard>> {
    let filter =
        EnvFilter::try_new(level_directive(log_level)).unwrap_or_else(|_| EnvFilter::new("info"));

    let stderr_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| anyhow!("log file path has no file name: {}", path.display()))?;
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating log directory {}", dir.display()))?;

            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}

// ── Sample data ────────────────────────────────────────────────────────────────

/// Buildings written by [`generate_sample_data`], with their kWh range.
pub const SAMPLE_BUILDINGS: [(&str, f64, f64); 3] = [
    ("Admin", 20.0, 80.0),
    ("Library", 15.0, 60.0),
    ("Hostel", 30.0, 120.0),
];

/// Hourly readings for all of January 2024.
const SAMPLE_HOURS: i64 = 31 * 24;

/// Write one hourly January 2024 CSV per sample building into `data_dir`.
///
/// Does nothing (and returns an empty list) when `data_dir` already holds
/// CSV files. The same `seed` always produces the same files.
pub fn generate_sample_data(data_dir: &Path, seed: u64) -> anyhow::Result<Vec<PathBuf>> {
    if !find_csv_files(data_dir).is_empty() {
        return Ok(Vec::new());
    }
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("creating data directory {}", data_dir.display()))?;

    let start = NaiveDate::from_ymd_opt(2024, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| anyhow!("invalid sample start date"))?;
    let mut rng = StdRng::seed_from_u64(seed);
    let mut written = Vec::with_capacity(SAMPLE_BUILDINGS.len());

    for (name, low, high) in SAMPLE_BUILDINGS {
        let path = data_dir.join(format!("{}_jan.csv", name.to_lowercase()));
        let mut writer = csv::Writer::from_path(&path)
            .with_context(|| format!("creating {}", path.display()))?;
        writer.write_record(["timestamp", "kwh", "building"])?;

        for hour in 0..SAMPLE_HOURS {
            let ts = start + Duration::hours(hour);
            let kwh: f64 = rng.gen_range(low..high);
            writer.write_record([
                ts.format("%Y-%m-%d %H:%M:%S").to_string(),
                format!("{kwh:.2}"),
                name.to_string(),
            ])?;
        }
        writer.flush()?;

        tracing::info!("Sample CSV created: {}", path.display());
        written.push(path);
    }

    Ok(written)
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_level_directive_maps_names() {
        assert_eq!(level_directive("DEBUG"), "debug");
        assert_eq!(level_directive("info"), "info");
        assert_eq!(level_directive("WARNING"), "warn");
        assert_eq!(level_directive("ERROR"), "error");
        assert_eq!(level_directive("energy_data=trace"), "energy_data=trace");
    }

    #[test]
    fn test_generate_sample_data_writes_three_buildings() {
        let tmp = TempDir::new().expect("tempdir");
        let dir = tmp.path().join("data");

        let written = generate_sample_data(&dir, 42).expect("generation succeeds");
        assert_eq!(written.len(), 3);
        assert_eq!(find_csv_files(&dir).len(), 3);

        let mut reader = csv::Reader::from_path(dir.join("hostel_jan.csv")).unwrap();
        let headers: Vec<&str> = reader.headers().unwrap().iter().collect();
        assert_eq!(headers, vec!["timestamp", "kwh", "building"]);
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 744);
        assert_eq!(&rows[0][0], "2024-01-01 00:00:00");
        assert_eq!(&rows[743][0], "2024-01-31 23:00:00");
        for row in &rows {
            let kwh: f64 = row[1].parse().unwrap();
            assert!((30.0..=120.0).contains(&kwh));
            assert_eq!(&row[2], "Hostel");
        }
    }

    #[test]
    fn test_generate_sample_data_is_reproducible() {
        let a = TempDir::new().expect("tempdir");
        let b = TempDir::new().expect("tempdir");
        generate_sample_data(a.path(), 7).unwrap();
        generate_sample_data(b.path(), 7).unwrap();

        let read = |dir: &Path| std::fs::read(dir.join("admin_jan.csv")).unwrap();
        assert_eq!(read(a.path()), read(b.path()));
    }

    #[test]
    fn test_generate_sample_data_skips_populated_dir() {
        let tmp = TempDir::new().expect("tempdir");
        std::fs::write(tmp.path().join("meter.csv"), "timestamp,kwh\n").unwrap();

        let written = generate_sample_data(tmp.path(), 42).unwrap();
        assert!(written.is_empty());
        assert_eq!(find_csv_files(tmp.path()).len(), 1);
    }
}
