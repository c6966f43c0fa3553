//! Icecast status endpoint polling.
//!
//! Icecast servers publish `status-json.xsl` next to their mounts with a
//! `{"icestats": {"source": ...}}` document where `source` is a single
//! object or an array, depending on mount count. This is the last-resort
//! strategy for stations whose streams carry no inline metadata at all.

use std::sync::Arc;

use futures_util::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use crate::config::WatchConfig;
use crate::error::{Result, WatchError};
use crate::types::{Info, MetaEvent, StrategyHint};
use crate::watch::emit;

/// Hard cap on the status document size. Misconfigured servers have been
/// seen answering mount paths with the audio stream itself.
const STATUS_BODY_LIMIT: usize = 1 << 20;

#[derive(Debug, Default, Deserialize)]
struct StatusDoc {
    #[serde(default)]
    icestats: IceStats,
}

#[derive(Debug, Default, Deserialize)]
struct IceStats {
    #[serde(default)]
    source: serde_json::Value,
}

#[derive(Debug, Default, Deserialize)]
struct SourceEntry {
    #[serde(default)]
    title: String,
    #[serde(default)]
    server_name: String,
    #[serde(default, rename = "icy-name")]
    icy_name: String,
    #[serde(default)]
    server_description: String,
}

pub(crate) struct StatusStrategy {
    client: Client,
    config: Arc<WatchConfig>,
}

impl StatusStrategy {
    pub(crate) fn new(client: Client, config: Arc<WatchConfig>) -> Self {
        Self { client, config }
    }

    /// Polls the status endpoint until cancelled. `api_url` may be empty, in
    /// which case it is derived from the stream URL. The first poll must
    /// succeed for the strategy to count as resolved; later failures are
    /// logged and skipped so a flaky endpoint does not kill the session.
    pub(crate) async fn watch(
        &self,
        token: &CancellationToken,
        stream_url: &str,
        api_url: &str,
        tx: &mpsc::Sender<MetaEvent>,
    ) -> Result<()> {
        let api = if api_url.trim().is_empty() {
            status_url(stream_url)?
        } else {
            api_url.trim().to_string()
        };

        let first = tokio::select! {
            _ = token.cancelled() => return Err(WatchError::Cancelled),
            polled = self.poll_once(&api) => polled?,
        };
        emit(tx, token, MetaEvent::Resolved(StrategyHint::json(&api))).await?;
        emit(tx, token, MetaEvent::Update(first)).await?;

        loop {
            tokio::select! {
                _ = token.cancelled() => return Err(WatchError::Cancelled),
                _ = sleep(self.config.poll_interval()) => {}
            }
            let polled = tokio::select! {
                _ = token.cancelled() => return Err(WatchError::Cancelled),
                polled = self.poll_once(&api) => polled,
            };
            match polled {
                Ok(info) => emit(tx, token, MetaEvent::Update(info)).await?,
                Err(err) => debug!("status: poll {} failed: {}", api, err),
            }
        }
    }

    pub(crate) async fn poll_once(&self, api_url: &str) -> Result<Info> {
        match timeout(self.config.status_timeout(), self.fetch(api_url)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(WatchError::Stream(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "status poll timed out",
            ))),
        }
    }

    async fn fetch(&self, api_url: &str) -> Result<Info> {
        let resp = self.client.get(api_url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(WatchError::StatusUnavailable {
                url: api_url.to_string(),
                status: status.as_u16(),
            });
        }

        let mut body = Vec::new();
        let mut chunks = resp.bytes_stream();
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk?;
            if body.len() + chunk.len() > STATUS_BODY_LIMIT {
                return Err(WatchError::StatusOversized(STATUS_BODY_LIMIT));
            }
            body.extend_from_slice(&chunk);
        }

        let doc: StatusDoc = serde_json::from_slice(&body)?;
        pick_info(flatten_sources(doc.icestats.source)).ok_or(WatchError::NoUsableSource)
    }
}

/// `http://host/dir/mount` maps to `http://host/dir/status-json.xsl`; the
/// query string, if any, is carried over.
fn status_url(stream_url: &str) -> Result<String> {
    let base = Url::parse(stream_url)?;
    let mut api = base.join("status-json.xsl")?;
    api.set_query(base.query());
    Ok(api.to_string())
}

/// Normalizes the `source` field. Entries that fail to decode are dropped
/// rather than failing the whole document.
fn flatten_sources(source: serde_json::Value) -> Vec<SourceEntry> {
    match source {
        serde_json::Value::Object(_) => serde_json::from_value(source)
            .map(|one| vec![one])
            .unwrap_or_default(),
        serde_json::Value::Array(items) => items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect(),
        _ => Vec::new(),
    }
}

/// First source with a non-blank title wins. The station name prefers
/// `server_name` over the legacy `icy-name` field.
fn pick_info(sources: Vec<SourceEntry>) -> Option<Info> {
    for entry in sources {
        let title = entry.title.trim();
        if title.is_empty() {
            continue;
        }
        let station = if entry.server_name.trim().is_empty() {
            entry.icy_name.trim()
        } else {
            entry.server_name.trim()
        };
        return Some(Info {
            title: title.to_string(),
            description: entry.server_description.trim().to_string(),
            station: station.to_string(),
        });
    }
    None
}
