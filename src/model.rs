// src/model.rs
//! Record types shared by the source adapter, the fetch coordinator and the XMLTV writer.

use chrono::{DateTime, Utc};

/// One broadcast channel from the directory.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Channel {
    pub id: i64,
    pub name: String,
    pub language_id: i64, // compared against the priority language tag
}

impl Channel {
    pub fn new(id: i64, name: impl Into<String>, language_id: i64) -> Self {
        Self {
            id,
            name: name.into(),
            language_id,
        }
    }
}

/// One scheduled airing. `channel_id` is not required to exist in the same run's directory.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Programme {
    pub channel_id: i64,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub title: String,
    pub description: String,
    pub poster: String, // opaque artwork reference, may be empty
}
