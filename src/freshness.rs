// src/freshness.rs
//! Day-granularity freshness check for the output artifact.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use std::path::Path;

/// Calendar date of `t` in the fixed zone `tz`.
pub fn local_date(t: DateTime<Utc>, tz: FixedOffset) -> NaiveDate {
    t.with_timezone(&tz).date_naive()
}

/// Regenerate when there is no artifact, or when it was last written on a
/// different calendar day than `now` (both read in `tz`).
pub fn needs_regeneration(
    last_modified: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    tz: FixedOffset,
) -> bool {
    match last_modified {
        None => true,
        Some(m) => local_date(m, tz) != local_date(now, tz),
    }
}

/// Last-modified time of the artifact; `None` if missing or unreadable.
pub fn artifact_modified(path: &Path) -> Option<DateTime<Utc>> {
    let meta = std::fs::metadata(path).ok()?;
    if !meta.is_file() {
        return None;
    }
    meta.modified().ok().map(DateTime::<Utc>::from)
}

pub fn should_regenerate(path: &Path, now: DateTime<Utc>, tz: FixedOffset) -> bool {
    let modified = artifact_modified(path);
    let stale = needs_regeneration(modified, now, tz);
    match modified {
        None => tracing::info!(path = %path.display(), "guide file doesn't exist"),
        Some(_) if stale => tracing::info!(path = %path.display(), "guide file is old"),
        Some(_) => tracing::info!(path = %path.display(), "guide file is up to date"),
    }
    stale
}
