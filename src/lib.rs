// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod config;
pub mod freshness;
pub mod ingest;
pub mod metrics;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod xmltv;

// ---- Re-exports for stable public API ----
pub use crate::config::{EpgConfig, ProgrammeOrder};
pub use crate::ingest::providers::HttpListingsSource;
pub use crate::ingest::types::{Fetched, ListingsSource};
pub use crate::model::{Channel, Programme};
pub use crate::pipeline::{EpgPipeline, RunOutcome, RunSummary};
