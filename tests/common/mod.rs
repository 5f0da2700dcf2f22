// tests/common/mod.rs
#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::DateTime;
use epg_builder::{Channel, EpgConfig, Fetched, ListingsSource, Programme};
use flate2::read::GzDecoder;
use std::collections::HashSet;
use std::io::Read;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Scripted listings source that records every request it sees.
pub struct MockSource {
    pub channels: Vec<Channel>,
    pub per_request: usize,
    pub not_found: HashSet<(i64, i32)>,
    pub failing: HashSet<(i64, i32)>,
    pub directory_fails: bool,
    pub delay: Duration,
    pub title: Option<String>,
    pub directory_calls: AtomicUsize,
    pub calls: Mutex<Vec<(i64, i32)>>,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl MockSource {
    pub fn new(channels: Vec<Channel>, per_request: usize) -> Self {
        Self {
            channels,
            per_request,
            not_found: HashSet::new(),
            failing: HashSet::new(),
            directory_fails: false,
            delay: Duration::ZERO,
            title: None,
            directory_calls: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_channels(n: i64, per_request: usize) -> Self {
        Self::new((1..=n).map(|i| Channel::new(i, format!("Channel {i}"), 1)).collect(), per_request)
    }

    pub fn calls_for(&self, channel: i64) -> Vec<i32> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| *c == channel)
            .map(|(_, o)| *o)
            .collect()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ListingsSource for MockSource {
    async fn fetch_channels(&self) -> Result<Fetched<Vec<Channel>>> {
        self.directory_calls.fetch_add(1, Ordering::SeqCst);
        if self.directory_fails {
            bail!("unexpected status 500 Internal Server Error");
        }
        Ok(Fetched::Data(self.channels.clone()))
    }

    async fn fetch_programmes(&self, channel: &Channel, day_offset: i32) -> Result<Fetched<Vec<Programme>>> {
        self.calls.lock().unwrap().push((channel.id, day_offset));

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let key = (channel.id, day_offset);
        if self.not_found.contains(&key) {
            return Ok(Fetched::NotFound);
        }
        if self.failing.contains(&key) {
            bail!("connection reset");
        }
        let base = 1_714_395_600_000i64 + i64::from(day_offset) * 86_400_000;
        Ok(Fetched::Data(
            (0..self.per_request)
                .map(|i| Programme {
                    channel_id: channel.id,
                    start: DateTime::from_timestamp_millis(base + i as i64 * 1_800_000).unwrap(),
                    end: DateTime::from_timestamp_millis(base + (i as i64 + 1) * 1_800_000).unwrap(),
                    title: self
                        .title
                        .clone()
                        .unwrap_or_else(|| format!("c{}-o{}-{}", channel.id, day_offset, i)),
                    description: "desc".into(),
                    poster: "poster.jpg".into(),
                })
                .collect(),
        ))
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Config rooted in `dir` so tests never touch the working directory.
pub fn config_in(dir: &Path, concurrency: usize) -> EpgConfig {
    EpgConfig {
        output_path: dir.join("epg.xml.gz"),
        staging_path: dir.join("epg.xml.tmp"),
        concurrency,
        ..EpgConfig::default()
    }
}

pub fn read_guide(path: &Path) -> String {
    let mut out = String::new();
    GzDecoder::new(std::fs::File::open(path).unwrap())
        .read_to_string(&mut out)
        .unwrap();
    out
}
