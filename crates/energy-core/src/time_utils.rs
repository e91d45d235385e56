use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

// ── Timestamp parsing ─────────────────────────────────────────────────────────

/// Naive patterns tried in order after RFC 3339.
const FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    // Ambiguous slash dates read month-first.
    "%m/%d/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
];

/// Format used whenever a timestamp is written back out.
pub const OUTPUT_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Parse a meter timestamp into its wall-clock representation.
///
/// Offset-carrying strings keep their local time; nothing is converted to
/// UTC. Returns `None` for empty or unrecognised input.
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_local());
    }

    for fmt in FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive);
        }
    }

    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .map(|date| date.and_time(NaiveTime::MIN))
}

/// Canonical `"YYYY-MM"` label for the month containing `ts`.
pub fn period_label(ts: NaiveDateTime) -> String {
    ts.format("%Y-%m").to_string()
}

// ── Buckets ───────────────────────────────────────────────────────────────────

/// First day of a calendar week.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum WeekStart {
    #[default]
    Monday,
    Sunday,
}

impl WeekStart {
    fn weekday(self) -> Weekday {
        match self {
            Self::Monday => Weekday::Mon,
            Self::Sunday => Weekday::Sun,
        }
    }
}

impl std::fmt::Display for WeekStart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Monday => write!(f, "monday"),
            Self::Sunday => write!(f, "sunday"),
        }
    }
}

/// A fixed-width aggregation window. Buckets are half-open: `[start, start + width)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeBucket {
    Day,
    Week(WeekStart),
}

impl TimeBucket {
    /// Start of the bucket that contains `ts`.
    pub fn start_of(self, ts: NaiveDateTime) -> NaiveDateTime {
        let date = ts.date();
        let start_date = match self {
            Self::Day => date,
            Self::Week(week_start) => {
                let offset = (date.weekday().num_days_from_monday() + 7
                    - week_start.weekday().num_days_from_monday())
                    % 7;
                date - Duration::days(i64::from(offset))
            }
        };
        start_date.and_time(NaiveTime::MIN)
    }
}

// ── Serde helper ──────────────────────────────────────────────────────────────

/// `#[serde(with = "...")]` adapter writing timestamps in [`OUTPUT_FORMAT`]
/// and reading them back with [`parse_timestamp`].
pub mod serde_timestamp {
    use chrono::NaiveDateTime;
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&ts.format(super::OUTPUT_FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_timestamp(&raw)
            .ok_or_else(|| D::Error::custom(format!("invalid timestamp \"{raw}\"")))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
