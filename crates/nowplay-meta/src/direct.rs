use std::io;
use std::sync::Arc;

use futures_util::StreamExt;
use reqwest::{Client, Response};
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use crate::config::WatchConfig;
use crate::error::{Result, WatchError};
use crate::icy;
use crate::types::{Info, MetaEvent, StrategyHint};
use crate::watch::emit;

/// Adapts a response body into an async reader for the framing layer.
pub(crate) fn body_reader(resp: Response) -> impl AsyncRead + Unpin {
    StreamReader::new(
        resp.bytes_stream()
            .map(|result| result.map_err(|e| io::Error::new(io::ErrorKind::Other, e))),
    )
}

/// Reads a response header as trimmed text; empty when absent or undecodable.
pub(crate) fn header_text(resp: &Response, name: &str) -> String {
    resp.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .trim()
        .to_string()
}

/// Connects straight to the stream URL and reads the ICY metadata blocks
/// interleaved in the response body.
pub(crate) struct DirectStrategy {
    client: Client,
    config: Arc<WatchConfig>,
}

impl DirectStrategy {
    pub(crate) fn new(client: Client, config: Arc<WatchConfig>) -> Self {
        Self { client, config }
    }

    /// Streams title updates until cancellation or a read error. A missing or
    /// unusable `icy-metaint` header fails with `IcyUnavailable` before
    /// anything is emitted. `announce` is sent once, right after the
    /// handshake has been validated.
    pub(crate) async fn watch(
        &self,
        token: &CancellationToken,
        stream_url: &str,
        announce: Option<StrategyHint>,
        tx: &mpsc::Sender<MetaEvent>,
    ) -> Result<()> {
        let resp = self.open(token, stream_url).await?;

        let metaint = header_text(&resp, icy::ICY_METAINT);
        let Some(metaint) = icy::parse_metaint(&metaint) else {
            return Err(WatchError::IcyUnavailable);
        };

        let station = icy::clean_text(&header_text(&resp, icy::ICY_NAME));
        let description = icy::clean_text(&header_text(&resp, icy::ICY_DESCRIPTION));
        debug!(
            "direct: icy handshake ok for {} (metaint={}, station={:?})",
            stream_url, metaint, station
        );

        if !station.is_empty() || !description.is_empty() {
            let info = Info {
                title: String::new(),
                description,
                station: station.clone(),
            };
            emit(tx, token, MetaEvent::Update(info)).await?;
        }
        if let Some(hint) = announce {
            emit(tx, token, MetaEvent::Resolved(hint)).await?;
        }

        let mut reader = body_reader(resp);
        loop {
            let block = tokio::select! {
                _ = token.cancelled() => return Err(WatchError::Cancelled),
                block = icy::read_meta_block(&mut reader, metaint) => block?,
            };
            if let Some(title) = block {
                let info = Info {
                    title: icy::clean_text(&title),
                    description: String::new(),
                    station: station.clone(),
                };
                emit(tx, token, MetaEvent::Update(info)).await?;
            }
        }
    }

    /// GETs the URL with the ICY request header, following 3xx answers by
    /// hand so the metadata headers of the final response stay visible.
    async fn open(&self, token: &CancellationToken, stream_url: &str) -> Result<Response> {
        let mut target = stream_url.to_string();
        for _ in 0..=self.config.redirect_limit {
            let request = self.client.get(&target).header(icy::ICY_METADATA, "1");
            let resp = tokio::select! {
                _ = token.cancelled() => return Err(WatchError::Cancelled),
                resp = request.send() => resp?,
            };
            if resp.status().is_redirection() {
                let location = header_text(&resp, "location");
                if location.is_empty() {
                    return Err(WatchError::RedirectMissingLocation);
                }
                target = resolve_location(&target, &location)?;
                debug!("direct: following redirect to {}", target);
                continue;
            }
            return Ok(resp);
        }
        Err(WatchError::TooManyRedirects(self.config.redirect_limit))
    }
}

fn resolve_location(current: &str, location: &str) -> Result<String> {
    let base = Url::parse(current)?;
    Ok(base.join(location)?.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_location() {
        assert_eq!(
            resolve_location("http://a.example/live/low", "http://b.example/hi").unwrap(),
            "http://b.example/hi"
        );
        assert_eq!(
            resolve_location("http://a.example/live/low", "/hi").unwrap(),
            "http://a.example/hi"
        );
        assert_eq!(
            resolve_location("http://a.example/live/low", "hi").unwrap(),
            "http://a.example/live/hi"
        );
        assert!(resolve_location("not a url", "/hi").is_err());
    }
}
