// Engine main entry point: replays historical tables and logs each snapshot.
use std::path::PathBuf;

use anyhow::Context;
use engine::config::EngineSettings;
use engine::data::{CsvCandleSource, RetryPolicy, RetryingFetcher};
use engine::sync::Simulation;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting replay engine...");

    let settings = match std::env::args().nth(1).map(PathBuf::from) {
        Some(path) => EngineSettings::load(&path)
            .with_context(|| format!("Failed to load settings from '{}'", path.display()))?,
        None => {
            info!("No settings file given, using defaults");
            EngineSettings::default()
        }
    };

    let source = CsvCandleSource::new(settings.base_path.clone());
    let fetcher = RetryingFetcher::new(source, RetryPolicy::from(&settings.fetch_retry));
    let mut simulation =
        Simulation::from_settings(&settings, fetcher).context("Failed to prepare replay session")?;
    info!(run_id = %simulation.run_id(), symbol = %settings.symbol, "Replay session ready");

    let ticks = simulation
        .run(|snapshot| {
            for window in &snapshot.windows {
                if let Some(current) = window.current() {
                    info!(
                        at = %snapshot.at,
                        timeframe = %window.timeframe(),
                        rows = window.series.len(),
                        partial = window.has_partial,
                        close = current.close,
                        "Window"
                    );
                }
            }
            Ok(())
        })
        .context("Replay aborted")?;

    info!(ticks, "Replay complete");
    Ok(())
}
