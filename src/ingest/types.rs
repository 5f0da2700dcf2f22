// src/ingest/types.rs
use anyhow::Result;

use crate::model::{Channel, Programme};

/// Result of a single request that the remote source may answer with 404.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetched<T> {
    Data(T),
    /// 404: no data for this request. Not an error.
    NotFound,
}

impl<T: Default> Fetched<T> {
    pub fn into_data(self) -> T {
        match self {
            Fetched::Data(v) => v,
            Fetched::NotFound => T::default(),
        }
    }
}

/// Remote listings source: a channel directory plus per-channel, per-day schedules.
#[async_trait::async_trait]
pub trait ListingsSource: Send + Sync {
    async fn fetch_channels(&self) -> Result<Fetched<Vec<Channel>>>;

    /// `day_offset` is signed and relative to the source's notion of "today".
    async fn fetch_programmes(
        &self,
        channel: &Channel,
        day_offset: i32,
    ) -> Result<Fetched<Vec<Programme>>>;

    fn name(&self) -> &'static str;
}
