// src/config/epg.rs
use anyhow::{anyhow, Context, Result};
use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const ENV_CONFIG_PATH: &str = "EPG_CONFIG_PATH";
pub const DEFAULT_TOML_PATH: &str = "config/epg.toml";
pub const DEFAULT_JSON_PATH: &str = "config/epg.json";

pub const DEFAULT_CHANNELS_URL: &str = "https://jiotv.data.cdn.jio.com/apis/v3.0/getMobileChannelList/get/?os=android&devicetype=phone&usertype=tvYR7NSNn7rymo3F";
pub const DEFAULT_PROGRAMMES_URL: &str =
    "https://jiotv.data.cdn.jio.com/apis/v1.3/getepg/get/?offset={offset}&channel_id={channel_id}";
pub const DEFAULT_USER_AGENT: &str = "okhttp/4.2.2";
pub const DEFAULT_CONCURRENCY: usize = 8;
pub const DEFAULT_PRIORITY_LANGUAGE_ID: i64 = 8;
pub const DEFAULT_UTC_OFFSET_MINUTES: i32 = 330; // +05:30
pub const DEFAULT_PROGRESS_EVERY: usize = 25;

/// Largest civil offset in use (UTC+14).
const MAX_OFFSET_MINUTES: i32 = 14 * 60;

fn default_day_offsets() -> Vec<i32> {
    vec![-1, 0, 1]
}

/// Order of the programme section in the rendered document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgrammeOrder {
    /// Whatever order the fetch tasks appended in.
    #[default]
    Arrival,
    /// Stable sort by channel id, then start time.
    Channel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EpgConfig {
    pub channels_url: String,
    /// Must contain `{offset}` and `{channel_id}` placeholders.
    pub programmes_url: String,
    pub user_agent: String,
    pub output_path: PathBuf,
    pub staging_path: PathBuf,
    pub concurrency: usize,
    pub day_offsets: Vec<i32>,
    pub priority_language_id: i64,
    pub utc_offset_minutes: i32,
    pub progress_every: usize,
    pub programme_order: ProgrammeOrder,
    /// Prefix for artwork refs that are not already absolute URLs.
    pub poster_base_url: Option<String>,
    pub generator_name: String,
}

impl Default for EpgConfig {
    fn default() -> Self {
        Self {
            channels_url: DEFAULT_CHANNELS_URL.to_string(),
            programmes_url: DEFAULT_PROGRAMMES_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            output_path: PathBuf::from("epg.xml.gz"),
            staging_path: PathBuf::from("epg.xml.tmp"),
            concurrency: DEFAULT_CONCURRENCY,
            day_offsets: default_day_offsets(),
            priority_language_id: DEFAULT_PRIORITY_LANGUAGE_ID,
            utc_offset_minutes: DEFAULT_UTC_OFFSET_MINUTES,
            progress_every: DEFAULT_PROGRESS_EVERY,
            programme_order: ProgrammeOrder::Arrival,
            poster_base_url: None,
            generator_name: env!("CARGO_PKG_NAME").to_string(),
        }
    }
}

impl EpgConfig {
    /// Load from an explicit path. Supports TOML or JSON, picked by extension.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading epg config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let cfg = parse_config(&content, &ext)
            .with_context(|| format!("parsing epg config {}", path.display()))?;
        Ok(cfg.sanitized())
    }

    /// Load using env var + fallbacks:
    /// 1) $EPG_CONFIG_PATH
    /// 2) config/epg.toml
    /// 3) config/epg.json
    /// 4) built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from_file(&pb);
            }
            return Err(anyhow!("EPG_CONFIG_PATH points to non-existent path"));
        }
        for candidate in [DEFAULT_TOML_PATH, DEFAULT_JSON_PATH] {
            let p = Path::new(candidate);
            if p.exists() {
                return Self::load_from_file(p);
            }
        }
        Ok(Self::default())
    }

    /// Apply the optional CLI concurrency argument. Invalid, absent or zero values are ignored.
    pub fn with_concurrency_arg(mut self, arg: Option<&str>) -> Self {
        match arg.map(str::trim).map(str::parse::<usize>) {
            Some(Ok(n)) if n > 0 => self.concurrency = n,
            Some(_) => {
                tracing::warn!(
                    arg = arg.unwrap_or_default(),
                    concurrency = self.concurrency,
                    "ignoring invalid concurrency argument"
                );
            }
            None => {}
        }
        self
    }

    /// Fixed civil offset used for timestamps and the freshness date.
    pub fn utc_offset(&self) -> FixedOffset {
        self.utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .unwrap_or_else(|| Utc.fix())
    }

    fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        if self.concurrency == 0 {
            self.concurrency = defaults.concurrency;
        }
        if self.day_offsets.is_empty() {
            self.day_offsets = defaults.day_offsets;
        }
        if self.utc_offset_minutes.unsigned_abs() > MAX_OFFSET_MINUTES.unsigned_abs() {
            self.utc_offset_minutes = defaults.utc_offset_minutes;
        }
        if self.poster_base_url.as_deref().is_some_and(|s| s.trim().is_empty()) {
            self.poster_base_url = None;
        }
        self
    }
}

fn parse_config(s: &str, hint_ext: &str) -> Result<EpgConfig> {
    match hint_ext {
        "json" => Ok(serde_json::from_str(s)?),
        "toml" => Ok(toml::from_str(s)?),
        _ => serde_json::from_str::<EpgConfig>(s)
            .map_err(anyhow::Error::from)
            .or_else(|_| toml::from_str(s).map_err(anyhow::Error::from))
            .map_err(|_| anyhow!("unsupported epg config format")),
    }
}
