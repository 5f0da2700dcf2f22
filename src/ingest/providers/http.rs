use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};

use crate::config::EpgConfig;
use crate::ingest::normalize_text;
use crate::ingest::types::{Fetched, ListingsSource};
use crate::model::{Channel, Programme};

/// The source is loose about numeric fields: ids and epochs show up as
/// numbers or as numeric strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum NumOrText {
    Int(i64),
    Float(f64),
    Text(String),
}

impl NumOrText {
    fn as_i64(&self) -> Option<i64> {
        match self {
            NumOrText::Int(n) => Some(*n),
            NumOrText::Float(f) if f.is_finite() => Some(*f as i64),
            NumOrText::Float(_) => None,
            NumOrText::Text(s) => s.trim().parse().ok(),
        }
    }
}

fn flexible_i64<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
    let raw = NumOrText::deserialize(d)?;
    raw.as_i64()
        .ok_or_else(|| serde::de::Error::custom(format!("not an integer: {raw:?}")))
}

#[derive(Debug, Deserialize)]
struct ChannelListResponse {
    result: Vec<ChannelItem>,
}

#[derive(Debug, Deserialize)]
struct ChannelItem {
    #[serde(deserialize_with = "flexible_i64")]
    channel_id: i64,
    #[serde(default)]
    channel_name: Option<String>,
    #[serde(rename = "channelLanguageId", default)]
    channel_language_id: Option<NumOrText>,
}

#[derive(Debug, Deserialize)]
struct EpgResponse {
    #[serde(default)]
    epg: Vec<EpgItem>,
}

#[derive(Debug, Deserialize)]
struct EpgItem {
    #[serde(default)]
    channel_id: Option<NumOrText>,
    #[serde(rename = "startEpoch", default)]
    start_epoch: Option<NumOrText>,
    #[serde(rename = "endEpoch", default)]
    end_epoch: Option<NumOrText>,
    #[serde(default)]
    showname: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(rename = "episodePoster", default)]
    episode_poster: Option<String>,
}

impl ChannelItem {
    fn into_channel(self) -> Channel {
        Channel {
            id: self.channel_id,
            name: normalize_text(self.channel_name.as_deref().unwrap_or_default()),
            language_id: self
                .channel_language_id
                .as_ref()
                .and_then(NumOrText::as_i64)
                .unwrap_or_default(),
        }
    }
}

fn epoch_millis(v: Option<&NumOrText>) -> Option<DateTime<Utc>> {
    v.and_then(NumOrText::as_i64)
        .and_then(DateTime::from_timestamp_millis)
}

fn resolve_poster(poster: &str, base: Option<&str>) -> String {
    let poster = poster.trim();
    match base {
        Some(base)
            if !poster.is_empty()
                && !poster.starts_with("http://")
                && !poster.starts_with("https://") =>
        {
            format!(
                "{}/{}",
                base.trim_end_matches('/'),
                poster.trim_start_matches('/')
            )
        }
        _ => poster.to_string(),
    }
}

impl EpgItem {
    /// `None` when either epoch is missing or unparsable.
    fn into_programme(self, fallback_channel: i64, poster_base: Option<&str>) -> Option<Programme> {
        let start = epoch_millis(self.start_epoch.as_ref())?;
        let end = epoch_millis(self.end_epoch.as_ref())?;
        Some(Programme {
            channel_id: self
                .channel_id
                .as_ref()
                .and_then(NumOrText::as_i64)
                .unwrap_or(fallback_channel),
            start,
            end,
            title: normalize_text(self.showname.as_deref().unwrap_or_default()),
            description: normalize_text(self.description.as_deref().unwrap_or_default()),
            poster: resolve_poster(
                self.episode_poster.as_deref().unwrap_or_default(),
                poster_base,
            ),
        })
    }
}

/// Listings source backed by the remote JSON API.
pub struct HttpListingsSource {
    client: Client,
    channels_url: String,
    programmes_url: String,
    poster_base_url: Option<String>,
}

impl HttpListingsSource {
    /// `programmes_url` is a template with `{offset}` and `{channel_id}` placeholders.
    pub fn new(channels_url: &str, programmes_url: &str, user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .build()
            .context("building http client")?;
        Ok(Self {
            client,
            channels_url: channels_url.to_string(),
            programmes_url: programmes_url.to_string(),
            poster_base_url: None,
        })
    }

    pub fn from_config(cfg: &EpgConfig) -> Result<Self> {
        let mut source = Self::new(&cfg.channels_url, &cfg.programmes_url, &cfg.user_agent)?;
        source.poster_base_url = cfg.poster_base_url.clone();
        Ok(source)
    }

    pub fn programmes_url_for(&self, channel_id: i64, day_offset: i32) -> String {
        self.programmes_url
            .replace("{offset}", &day_offset.to_string())
            .replace("{channel_id}", &channel_id.to_string())
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<Fetched<T>> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(Fetched::NotFound);
        }
        if !status.is_success() {
            bail!("unexpected status {status} from {url}");
        }
        let body = resp.text().await.context("reading response body")?;
        let parsed =
            serde_json::from_str(&body).with_context(|| format!("decoding json from {url}"))?;
        Ok(Fetched::Data(parsed))
    }
}

#[async_trait]
impl ListingsSource for HttpListingsSource {
    async fn fetch_channels(&self) -> Result<Fetched<Vec<Channel>>> {
        let fetched: Fetched<ChannelListResponse> = self.get_json(&self.channels_url).await?;
        Ok(match fetched {
            Fetched::Data(list) => Fetched::Data(
                list.result
                    .into_iter()
                    .map(ChannelItem::into_channel)
                    .collect(),
            ),
            Fetched::NotFound => Fetched::NotFound,
        })
    }

    async fn fetch_programmes(
        &self,
        channel: &Channel,
        day_offset: i32,
    ) -> Result<Fetched<Vec<Programme>>> {
        let url = self.programmes_url_for(channel.id, day_offset);
        let fetched: Fetched<EpgResponse> = self.get_json(&url).await?;
        let Fetched::Data(resp) = fetched else {
            return Ok(Fetched::NotFound);
        };

        let total = resp.epg.len();
        let out: Vec<Programme> = resp
            .epg
            .into_iter()
            .filter_map(|item| item.into_programme(channel.id, self.poster_base_url.as_deref()))
            .collect();
        if out.len() < total {
            tracing::warn!(
                channel = channel.id,
                offset = day_offset,
                dropped = total - out.len(),
                "dropped programmes with unparsable epochs"
            );
        }
        Ok(Fetched::Data(out))
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
