// src/pipeline.rs
//! One guide build: freshness check, directory fetch, fan-out, render, compress.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use std::sync::Arc;
use std::time::Instant;

use crate::config::EpgConfig;
use crate::freshness::should_regenerate;
use crate::ingest::types::{Fetched, ListingsSource};
use crate::ingest::{FetchCoordinator, FetchStats};
use crate::metrics::{ensure_metrics_described, CHANNELS_TOTAL, LAST_BUILD_TS};
use crate::output::{finalize, remove_if_exists};
use crate::xmltv::{write_staging, RenderOptions};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The artifact was already written today; nothing fetched.
    UpToDate,
    /// The directory was empty (or 404). The previous artifact is left alone.
    NoChannels,
    Generated(RunSummary),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub channels: usize,
    pub programmes: usize,
    pub fetch: FetchStats,
    /// Size of the new artifact, or `None` when compression failed and the
    /// previous artifact was kept.
    pub artifact_bytes: Option<u64>,
}

pub struct EpgPipeline {
    cfg: EpgConfig,
    source: Arc<dyn ListingsSource>,
}

impl EpgPipeline {
    pub fn new(cfg: EpgConfig, source: Arc<dyn ListingsSource>) -> Self {
        Self { cfg, source }
    }

    pub async fn run(&self) -> Result<RunOutcome> {
        self.run_at(Utc::now()).await
    }

    /// Build only if the artifact is missing or dated before `now`'s day.
    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<RunOutcome> {
        if !should_regenerate(&self.cfg.output_path, now, self.cfg.utc_offset()) {
            return Ok(RunOutcome::UpToDate);
        }
        self.generate().await
    }

    /// Unconditional rebuild. A directory failure or a render failure aborts
    /// without touching the existing artifact. A compression failure also
    /// keeps the existing artifact but is reported through the summary.
    pub async fn generate(&self) -> Result<RunOutcome> {
        ensure_metrics_described();
        let t0 = Instant::now();
        tracing::info!(
            source = self.source.name(),
            concurrency = self.cfg.concurrency,
            "generating new guide"
        );

        // Leftover from an interrupted run.
        remove_if_exists(&self.cfg.staging_path).context("removing stale staging file")?;

        let channels = match self
            .source
            .fetch_channels()
            .await
            .context("fetching channel directory")?
        {
            Fetched::Data(c) => c,
            Fetched::NotFound => {
                tracing::warn!("channel directory returned 404");
                Vec::new()
            }
        };
        counter!(CHANNELS_TOTAL).increment(channels.len() as u64);
        if channels.is_empty() {
            tracing::warn!("no channels in directory, keeping existing guide");
            return Ok(RunOutcome::NoChannels);
        }
        tracing::info!(channels = channels.len(), "channel directory fetched");

        let coordinator = FetchCoordinator::new(
            Arc::clone(&self.source),
            self.cfg.concurrency,
            &self.cfg.day_offsets,
        )
        .with_progress_every(self.cfg.progress_every);
        let (programmes, fetch) = coordinator.run(&channels).await;

        let staging = self.cfg.staging_path.clone();
        let artifact = self.cfg.output_path.clone();
        let opts = RenderOptions::from_config(&self.cfg);
        let channel_count = channels.len();
        let programme_count = programmes.len();

        let artifact_bytes = tokio::task::spawn_blocking(move || -> Result<Option<u64>> {
            if let Err(e) = write_staging(&staging, &channels, &programmes, &opts) {
                tracing::error!(error = ?e, "writing guide document failed");
                if let Err(cleanup) = remove_if_exists(&staging) {
                    tracing::warn!(error = ?cleanup, "could not remove staging file");
                }
                return Err(e);
            }
            // finalize logs the error and clears staging; the old artifact stays.
            Ok(finalize(&staging, &artifact).ok())
        })
        .await
        .context("render task failed")??;

        match artifact_bytes {
            Some(bytes) => {
                gauge!(LAST_BUILD_TS).set(Utc::now().timestamp() as f64);
                tracing::info!(
                    channels = channel_count,
                    programmes = programme_count,
                    bytes,
                    elapsed_ms = t0.elapsed().as_millis() as u64,
                    "guide generated"
                );
            }
            None => tracing::warn!(
                channels = channel_count,
                programmes = programme_count,
                elapsed_ms = t0.elapsed().as_millis() as u64,
                "guide rendered but not compressed, previous guide kept"
            ),
        }

        Ok(RunOutcome::Generated(RunSummary {
            channels: channel_count,
            programmes: programme_count,
            fetch,
            artifact_bytes,
        }))
    }
}
