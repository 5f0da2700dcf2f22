// src/ingest/providers/mod.rs
pub mod http;

pub use http::HttpListingsSource;
