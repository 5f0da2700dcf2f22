//! Guide builder: binary entrypoint.
//! Usage: `epg-builder [CONCURRENCY]`. Skips work when today's guide already exists.

use std::process::ExitCode;
use std::sync::Arc;

use epg_builder::{EpgConfig, EpgPipeline, HttpListingsSource, RunOutcome};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("epg_builder=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

async fn run() -> anyhow::Result<RunOutcome> {
    let arg = std::env::args().nth(1);
    let cfg = EpgConfig::load_default()?.with_concurrency_arg(arg.as_deref());
    let source = HttpListingsSource::from_config(&cfg)?;
    EpgPipeline::new(cfg, Arc::new(source)).run().await
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env if present; no-op otherwise.
    let _ = dotenvy::dotenv();
    init_tracing();

    match run().await {
        Ok(RunOutcome::UpToDate) => {
            tracing::info!("guide is up to date, nothing to do");
            ExitCode::SUCCESS
        }
        Ok(RunOutcome::NoChannels) => {
            tracing::warn!("no channels available, existing guide kept");
            ExitCode::SUCCESS
        }
        Ok(RunOutcome::Generated(summary)) if summary.artifact_bytes.is_none() => {
            tracing::warn!(
                channels = summary.channels,
                programmes = summary.programmes,
                "compression failed, existing guide kept"
            );
            ExitCode::SUCCESS
        }
        Ok(RunOutcome::Generated(summary)) => {
            tracing::info!(
                channels = summary.channels,
                programmes = summary.programmes,
                failed_requests = summary.fetch.failed_requests,
                "done"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = ?e, "guide generation failed");
            ExitCode::FAILURE
        }
    }
}
