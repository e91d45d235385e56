//! Data ingestion and aggregation for the campus energy pipeline.
//!
//! Responsible for discovering and normalising meter CSV files into the
//! canonical dataset, computing daily/weekly totals and per-entity
//! statistics, and building the per-building object model.

pub mod aggregator;
pub mod entity;
pub mod normalizer;
pub mod reader;

pub use energy_core as core;
