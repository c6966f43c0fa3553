//! Sibling mount discovery.
//!
//! Aggregator hosts often expose the same program on several mounts
//! ("/rock-flac", "/rock-320", "/rock-128k", ...) and only the lossy ones
//! carry inline ICY metadata. When the primary mount has none, this module
//! swaps the trailing bitrate/codec token of the path for a prioritized list
//! of common labels and briefly probes each candidate until one answers with
//! a title. Discoveries are remembered per host+mount family for the life of
//! the process; failures are never cached.

use std::collections::HashMap;
use std::sync::Arc;

use reqwest::Client;
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use crate::config::WatchConfig;
use crate::direct::{body_reader, header_text};
use crate::error::{Result, WatchError};
use crate::icy;
use crate::types::Info;

/// Mount labels to try, best first. Bitrate variants outrank codec-named
/// mounts because they are the most common sibling convention.
const SIBLING_PRIORITIES: [&str; 13] = [
    "320", "320k", "256", "256k", "192", "192k", "128", "128k", "stream", "live", "aac", "aacp",
    "mp3",
];

/// Process-wide memory of working siblings, keyed by host and mount family.
///
/// A cheap clonable handle; every clone sees the same map. Construct one per
/// process (or let [`MetaWatcher`](crate::watch::MetaWatcher) default it) and
/// share it across watchers to keep discoveries alive across sessions.
/// Entries are write-once: later inserts for a known key are ignored.
#[derive(Debug, Clone, Default)]
pub struct SiblingCache {
    inner: Arc<Mutex<HashMap<String, String>>>,
}

impl SiblingCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn get(&self, key: &str) -> Option<String> {
        self.inner.lock().await.get(key).cloned()
    }

    pub(crate) async fn insert_if_absent(&self, key: &str, target: &str) {
        self.inner
            .lock()
            .await
            .entry(key.to_string())
            .or_insert_with(|| target.to_string());
    }
}

pub(crate) struct SiblingStrategy {
    client: Client,
    config: Arc<WatchConfig>,
    cache: SiblingCache,
}

impl SiblingStrategy {
    pub(crate) fn new(client: Client, config: Arc<WatchConfig>, cache: SiblingCache) -> Self {
        Self {
            client,
            config,
            cache,
        }
    }

    /// Finds a sibling mount that exposes ICY metadata. Returns the sibling
    /// URL plus an initial metadata sample (empty on a cache hit).
    pub(crate) async fn discover(
        &self,
        token: &CancellationToken,
        stream_url: &str,
    ) -> Result<(String, Info)> {
        let key = cache_key(stream_url);
        if let Some(key) = &key {
            if let Some(target) = self.cache.get(key).await {
                if !target.is_empty() {
                    debug!("sibling: cache hit {} -> {}", key, target);
                    return Ok((target, Info::default()));
                }
            }
        }

        let (target, info) = self.scan_candidates(token, stream_url).await?;
        if let Some(key) = key {
            self.cache.insert_if_absent(&key, &target).await;
        }
        Ok((target, info))
    }

    async fn scan_candidates(
        &self,
        token: &CancellationToken,
        stream_url: &str,
    ) -> Result<(String, Info)> {
        let base = Url::parse(stream_url)?;
        let candidates = sibling_candidates(base.path());
        if candidates.is_empty() {
            return Err(WatchError::NoSibling);
        }

        let last = candidates.len() - 1;
        for (i, path) in candidates.iter().enumerate() {
            if token.is_cancelled() {
                return Err(WatchError::Cancelled);
            }
            let candidate = candidate_url(&base, path);
            if candidate == stream_url {
                // the primary mount already failed the icy handshake
                continue;
            }
            if let Some(info) = self.probe(token, &candidate).await {
                debug!("sibling: {} resolved via {}", stream_url, candidate);
                return Ok((candidate, info));
            }
            if i < last {
                tokio::select! {
                    _ = token.cancelled() => return Err(WatchError::Cancelled),
                    _ = sleep(self.config.probe_delay()) => {}
                }
            }
        }
        Err(WatchError::NoSibling)
    }

    /// One bounded probe: connect, check the interval header, read a single
    /// metadata block. Anything short of a non-empty title is a miss.
    async fn probe(&self, token: &CancellationToken, candidate: &str) -> Option<Info> {
        let capped = timeout(self.config.probe_timeout(), self.probe_once(candidate));
        let outcome = tokio::select! {
            _ = token.cancelled() => return None,
            outcome = capped => outcome,
        };
        match outcome {
            Ok(Ok(found)) => found,
            Ok(Err(err)) => {
                debug!("sibling: probe {} failed: {}", candidate, err);
                None
            }
            Err(_) => {
                debug!("sibling: probe {} timed out", candidate);
                None
            }
        }
    }

    async fn probe_once(&self, candidate: &str) -> Result<Option<Info>> {
        let resp = self
            .client
            .get(candidate)
            .header(icy::ICY_METADATA, "1")
            .send()
            .await?;

        let metaint = header_text(&resp, icy::ICY_METAINT);
        let Some(metaint) = icy::parse_metaint(&metaint) else {
            return Ok(None);
        };
        let station = header_text(&resp, icy::ICY_NAME);

        let mut reader = body_reader(resp);
        match icy::read_meta_block(&mut reader, metaint).await? {
            Some(title) => Ok(Some(Info {
                title: icy::clean_text(&title),
                description: String::new(),
                station: icy::clean_text(&station),
            })),
            None => Ok(None),
        }
    }
}

/// Builds prioritized sibling paths by swapping the trailing bitrate/codec
/// token of the mount path.
fn sibling_candidates(original_path: &str) -> Vec<String> {
    if original_path.is_empty() {
        return Vec::new();
    }
    let orig = if original_path.starts_with('/') {
        original_path.to_string()
    } else {
        format!("/{original_path}")
    };
    let suffix = detect_suffix(&orig);
    if suffix.is_empty() {
        return Vec::new();
    }
    SIBLING_PRIORITIES
        .iter()
        .map(|label| orig.replacen(suffix, label, 1))
        .collect()
}

/// The token to swap: whatever follows the last `-`, `_` or `.`, or the
/// whole slash-trimmed path when there is no separator.
fn detect_suffix(path: &str) -> &str {
    if path.is_empty() {
        return "";
    }
    match path.rfind(['-', '_', '.']) {
        Some(i) if i + 1 < path.len() => &path[i + 1..],
        _ => path.trim_matches('/'),
    }
}

fn candidate_url(base: &Url, path: &str) -> String {
    let mut u = base.clone();
    u.set_path(path);
    u.set_query(None);
    u.set_fragment(None);
    u.to_string()
}

/// `host|basename` key grouping mounts of one program family. The basename
/// drops the extension and anything from the first `-`/`_` on, so
/// "/rock-flac" and "/rock-320" share a key. `None` when the URL does not
/// parse (such streams are simply never cached).
fn cache_key(raw: &str) -> Option<String> {
    let url = Url::parse(raw).ok()?;
    let mut host = url.host_str()?.to_lowercase();
    if let Some(port) = url.port() {
        host = format!("{host}:{port}");
    }
    Some(format!("{host}|{}", base_name(&url)))
}

fn base_name(url: &Url) -> String {
    let trimmed = url.path().trim_end_matches('/');
    let base = trimmed.rsplit('/').next().unwrap_or("");
    let base = match base.rfind('.') {
        Some(i) => &base[..i],
        None => base,
    };
    match base.find(['-', '_']) {
        Some(i) => base[..i].to_lowercase(),
        None => base.to_lowercase(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_suffix() {
        assert_eq!(detect_suffix("/radio-flac"), "flac");
        assert_eq!(detect_suffix("/radio_64"), "64");
        assert_eq!(detect_suffix("/radio.mp3"), "mp3");
        assert_eq!(detect_suffix("/stream"), "stream");
        assert_eq!(detect_suffix("/a/b/c-hi"), "hi");
        // trailing separator falls back to the trimmed path
        assert_eq!(detect_suffix("/radio-"), "radio-");
    }

    #[test]
    fn test_sibling_candidates_order() {
        let list = sibling_candidates("/rock-flac");
        assert_eq!(list.len(), SIBLING_PRIORITIES.len());
        assert_eq!(list[0], "/rock-320");
        assert_eq!(list[1], "/rock-320k");
        assert_eq!(list[7], "/rock-128k");
        assert_eq!(list[8], "/rock-stream");
        assert_eq!(list[12], "/rock-mp3");
    }

    #[test]
    fn test_sibling_candidates_bare_mount() {
        let list = sibling_candidates("/radio");
        assert_eq!(list[0], "/320");
        assert_eq!(list[8], "/stream");
    }

    #[test]
    fn test_sibling_candidates_replace_first_occurrence_only() {
        let list = sibling_candidates("/128/club-128");
        // the trailing token is "128", and the first occurrence in the path
        // is the directory segment
        assert_eq!(list[0], "/320/club-128");
    }

    #[test]
    fn test_sibling_candidates_empty_path() {
        assert!(sibling_candidates("").is_empty());
    }

    #[test]
    fn test_cache_key_groups_mount_family() {
        let a = cache_key("http://Radio.Example.com:8000/rock-flac").unwrap();
        let b = cache_key("http://radio.example.com:8000/ROCK-320.mp3").unwrap();
        assert_eq!(a, "radio.example.com:8000|rock");
        assert_eq!(a, b);
        assert!(cache_key("not a url").is_none());
    }

    #[test]
    fn test_base_name() {
        let url = Url::parse("http://x/live/Deep_House.aac").unwrap();
        assert_eq!(base_name(&url), "deep");
        let url = Url::parse("http://x/mix/").unwrap();
        assert_eq!(base_name(&url), "mix");
        let url = Url::parse("http://x/").unwrap();
        assert_eq!(base_name(&url), "");
    }

    #[tokio::test]
    async fn test_cache_insert_if_absent_keeps_first_value() {
        let cache = SiblingCache::new();
        cache.insert_if_absent("h|rock", "http://h/rock-320").await;
        cache.insert_if_absent("h|rock", "http://h/rock-128").await;
        assert_eq!(
            cache.get("h|rock").await.as_deref(),
            Some("http://h/rock-320")
        );
        assert_eq!(cache.get("h|jazz").await, None);
    }
}
