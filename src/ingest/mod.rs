// src/ingest/mod.rs
pub mod providers;
pub mod types;

use crate::ingest::types::{Fetched, ListingsSource};
use crate::metrics::{
    ensure_metrics_described, FETCH_ERRORS_TOTAL, FETCH_NOT_FOUND_TOTAL, PROGRAMMES_TOTAL,
};
use crate::model::{Channel, Programme};
use crate::xmltv::is_xml_char;
use metrics::counter;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Normalize free text from the source: decode HTML entities, turn raw
/// newlines and characters XML cannot carry into spaces, trim.
pub fn normalize_text(s: &str) -> String {
    let decoded = html_escape::decode_html_entities(s);
    let flat: String = decoded
        .chars()
        .map(|c| match c {
            '\r' | '\n' => ' ',
            c if !is_xml_char(c) => ' ',
            c => c,
        })
        .collect();
    flat.trim().to_string()
}

/// Append-only programme collection shared by all channel tasks of one run.
#[derive(Debug, Default)]
pub struct Aggregate {
    inner: Mutex<Vec<Programme>>,
}

impl Aggregate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&self, items: Vec<Programme>) {
        if items.is_empty() {
            return;
        }
        let mut v = self.inner.lock().expect("aggregate mutex poisoned");
        v.extend(items);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("aggregate mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take everything collected so far, leaving the aggregate empty.
    pub fn drain(&self) -> Vec<Programme> {
        std::mem::take(&mut *self.inner.lock().expect("aggregate mutex poisoned"))
    }
}

/// Counters for one channel task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelTally {
    pub requests: usize,
    pub programmes: usize,
    pub failures: usize,
    pub stopped_on_not_found: bool,
}

/// Totals across a whole fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchStats {
    pub channels: usize,
    pub requests: usize,
    pub programmes: usize,
    pub failed_requests: usize,
    pub not_found_channels: usize,
    pub panicked_tasks: usize,
    /// Most tasks that were spawned but not yet finished at any one time.
    pub peak_outstanding: usize,
}

impl FetchStats {
    fn absorb(&mut self, t: ChannelTally) {
        self.channels += 1;
        self.requests += t.requests;
        self.programmes += t.programmes;
        self.failed_requests += t.failures;
        if t.stopped_on_not_found {
            self.not_found_channels += 1;
        }
    }
}

/// Fetch every day offset for one channel, in order. A 404 ends the channel;
/// any other failure skips just that offset.
pub async fn fetch_channel(
    source: &dyn ListingsSource,
    channel: &Channel,
    day_offsets: &[i32],
    aggregate: &Aggregate,
) -> ChannelTally {
    let mut tally = ChannelTally::default();
    for &offset in day_offsets {
        tally.requests += 1;
        match source.fetch_programmes(channel, offset).await {
            Ok(Fetched::Data(list)) => {
                tally.programmes += list.len();
                counter!(PROGRAMMES_TOTAL).increment(list.len() as u64);
                aggregate.extend(list);
            }
            Ok(Fetched::NotFound) => {
                tracing::debug!(channel = channel.id, offset, "no schedule data");
                counter!(FETCH_NOT_FOUND_TOTAL).increment(1);
                tally.stopped_on_not_found = true;
                break;
            }
            Err(e) => {
                tracing::warn!(
                    error = ?e,
                    channel = channel.id,
                    offset,
                    source = source.name(),
                    "programme fetch failed"
                );
                counter!(FETCH_ERRORS_TOTAL).increment(1);
                tally.failures += 1;
            }
        }
    }
    tally
}

/// Counts a spawned task as outstanding until dropped.
struct Outstanding(Arc<AtomicUsize>);

impl Outstanding {
    fn enter(count: &Arc<AtomicUsize>, peak: &AtomicUsize) -> Self {
        let now = count.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        Self(Arc::clone(count))
    }
}

impl Drop for Outstanding {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Fans channel fetches out over a bounded pool of tokio tasks.
///
/// At most `concurrency` channels fetch at once, and at most twice that many
/// tasks are outstanding at any point. `run` returns only after every task
/// has finished.
pub struct FetchCoordinator {
    source: Arc<dyn ListingsSource>,
    concurrency: usize,
    day_offsets: Arc<[i32]>,
    progress_every: usize,
}

impl FetchCoordinator {
    pub fn new(source: Arc<dyn ListingsSource>, concurrency: usize, day_offsets: &[i32]) -> Self {
        Self {
            source,
            concurrency: concurrency.max(1),
            day_offsets: Arc::from(day_offsets),
            progress_every: 0,
        }
    }

    /// Log progress every `k` completed channels (0 disables).
    pub fn with_progress_every(mut self, k: usize) -> Self {
        self.progress_every = k;
        self
    }

    pub async fn run(&self, channels: &[Channel]) -> (Vec<Programme>, FetchStats) {
        ensure_metrics_described();

        let aggregate = Arc::new(Aggregate::new());
        let workers = Arc::new(Semaphore::new(self.concurrency));
        let admission = Arc::new(Semaphore::new(self.concurrency * 2));
        let completed = Arc::new(AtomicUsize::new(0));
        let outstanding = Arc::new(AtomicUsize::new(0));
        let peak_outstanding = AtomicUsize::new(0);
        let total = channels.len();
        let mut tasks = JoinSet::new();

        for channel in channels {
            // Blocks submission while 2N tasks are outstanding.
            let ticket = match admission.clone().acquire_owned().await {
                Ok(t) => t,
                Err(_) => break,
            };

            let source = Arc::clone(&self.source);
            let workers = Arc::clone(&workers);
            let aggregate = Arc::clone(&aggregate);
            let completed = Arc::clone(&completed);
            let offsets = Arc::clone(&self.day_offsets);
            let channel = channel.clone();
            let progress_every = self.progress_every;
            let guard = Outstanding::enter(&outstanding, &peak_outstanding);

            tasks.spawn(async move {
                let _guard = guard;
                let _ticket = ticket;
                let tally = match workers.acquire_owned().await {
                    Ok(_permit) => {
                        fetch_channel(source.as_ref(), &channel, &offsets, &aggregate).await
                    }
                    Err(_) => ChannelTally::default(),
                };
                let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                if progress_every > 0 && done % progress_every == 0 {
                    tracing::info!(done, total, "channel fetch progress");
                }
                tally
            });
        }

        let mut stats = FetchStats::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(tally) => stats.absorb(tally),
                Err(e) => {
                    tracing::error!(error = %e, "channel fetch task panicked");
                    stats.panicked_tasks += 1;
                }
            }
        }

        stats.peak_outstanding = peak_outstanding.load(Ordering::SeqCst);
        tracing::info!(
            channels = stats.channels,
            requests = stats.requests,
            programmes = stats.programmes,
            failed = stats.failed_requests,
            not_found = stats.not_found_channels,
            "channel fetch finished"
        );

        (aggregate.drain(), stats)
    }
}
