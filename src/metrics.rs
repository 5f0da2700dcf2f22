// src/metrics.rs
//! Metric names emitted through the `metrics` facade. Nothing is exported unless
//! the embedding process installs a recorder.

use metrics::{describe_counter, describe_gauge};
use once_cell::sync::OnceCell;

pub const CHANNELS_TOTAL: &str = "epg_channels_total";
pub const PROGRAMMES_TOTAL: &str = "epg_programmes_total";
pub const FETCH_ERRORS_TOTAL: &str = "epg_fetch_errors_total";
pub const FETCH_NOT_FOUND_TOTAL: &str = "epg_fetch_not_found_total";
pub const LAST_BUILD_TS: &str = "epg_last_build_ts";

/// One-time metrics registration (so series carry descriptions).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(CHANNELS_TOTAL, "Channels returned by the directory fetch.");
        describe_counter!(PROGRAMMES_TOTAL, "Programmes collected from schedule fetches.");
        describe_counter!(
            FETCH_ERRORS_TOTAL,
            "Schedule requests that failed and were skipped."
        );
        describe_counter!(
            FETCH_NOT_FOUND_TOTAL,
            "Schedule requests answered with 404 (channel stopped early)."
        );
        describe_gauge!(LAST_BUILD_TS, "Unix ts of the last successful guide build.");
    });
}
