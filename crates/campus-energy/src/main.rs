mod bootstrap;

use std::process::ExitCode;

use anyhow::Result;
use energy_core::events::TracingSink;
use energy_core::settings::Settings;
use energy_runtime::orchestrator::run_pipeline;
use energy_runtime::report::echo_narrative;

fn main() -> Result<ExitCode> {
    let settings = Settings::load();
    let _log_guard = bootstrap::setup_logging(&settings.log_level, settings.log_file.as_ref())?;

    tracing::info!("Campus Energy v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "Input: {}, Output: {}, Week start: {}",
        settings.data_dir.display(),
        settings.output_dir.display(),
        settings.week_start
    );

    if settings.generate_sample {
        let written = bootstrap::generate_sample_data(&settings.data_dir, settings.sample_seed)?;
        if written.is_empty() {
            tracing::info!("Input directory already holds CSV files; no sample data written");
        }
    }

    let config = settings.pipeline_config()?;

    match run_pipeline(&config, &TracingSink) {
        Ok(outcome) => {
            echo_narrative(&outcome.summary, &mut std::io::stdout().lock())?;
            tracing::info!("Reports written to {}", config.output_dir.display());
            Ok(ExitCode::SUCCESS)
        }
        Err(err) if err.is_corpus_empty() => {
            eprintln!("campus-energy: {err}");
            eprintln!(
                "Place meter CSV files in {} (or pass --generate-sample) and run again.",
                config.input_dir.display()
            );
            Ok(ExitCode::FAILURE)
        }
        Err(err) => Err(err.into()),
    }
}
