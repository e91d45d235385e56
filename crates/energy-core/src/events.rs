//! Structured event sink injected into every pipeline component.
//!
//! Components report what happened through an [`EventSink`] they receive at
//! construction instead of reaching for a process-wide logger. The binary
//! wires a [`TracingSink`]; tests use a [`MemorySink`] and assert on the
//! captured events.

use std::sync::Mutex;

pub use tracing::Level;

/// A key/value pair attached to an event.
pub type Field<'a> = (&'a str, String);

/// Receives structured pipeline events.
pub trait EventSink {
    fn record(&self, level: Level, message: &str, fields: &[Field<'_>]);
}

// ── TracingSink ───────────────────────────────────────────────────────────────

/// Forwards events to the `tracing` subscriber installed by the binary.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn record(&self, level: Level, message: &str, fields: &[Field<'_>]) {
        let fields = render_fields(fields);
        match level {
            Level::ERROR => tracing::error!(fields = %fields, "{}", message),
            Level::WARN => tracing::warn!(fields = %fields, "{}", message),
            Level::INFO => tracing::info!(fields = %fields, "{}", message),
            Level::DEBUG => tracing::debug!(fields = %fields, "{}", message),
            _ => tracing::trace!(fields = %fields, "{}", message),
        }
    }
}

/// `key=value` pairs joined by spaces.
fn render_fields(fields: &[Field<'_>]) -> String {
    fields
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(" ")
}

// ── MemorySink ────────────────────────────────────────────────────────────────

/// An event captured by [`MemorySink`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedEvent {
    pub level: Level,
    pub message: String,
    pub fields: Vec<(String, String)>,
}

impl RecordedEvent {
    /// Value of the named field, if present.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<RecordedEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far.
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Events recorded at exactly `level`.
    pub fn at_level(&self, level: Level) -> Vec<RecordedEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.level == level)
            .collect()
    }
}

impl EventSink for MemorySink {
    fn record(&self, level: Level, message: &str, fields: &[Field<'_>]) {
        if let Ok(mut events) = self.events.lock() {
            events.push(RecordedEvent {
                level,
                message: message.to_string(),
                fields: fields
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), v.clone()))
                    .collect(),
            });
        }
    }
}
