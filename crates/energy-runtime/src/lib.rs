//! Pipeline orchestration and report persistence.

pub mod orchestrator;
pub mod report;

pub use orchestrator::{run_pipeline, PipelineOrchestrator, PipelineOutcome, RunMetadata};
pub use report::{ExecutiveSummary, ReportWriter};

pub use energy_core as core;
pub use energy_data as data;
