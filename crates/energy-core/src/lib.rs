//! Shared building blocks for the campus energy pipeline.
//!
//! Canonical record types, the error taxonomy, CLI settings and the
//! pipeline configuration object, time bucketing, the injected event sink,
//! and number formatting for the narrative report.

pub mod error;
pub mod events;
pub mod formatting;
pub mod models;
pub mod settings;
pub mod time_utils;

pub use error::{EnergyError, Result, SourceError};
