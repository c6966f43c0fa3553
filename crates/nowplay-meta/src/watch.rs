//! Watch sessions and strategy fallback.
//!
//! [`MetaWatcher`] is the entry point: hand it a stream URL and it spawns a
//! session that tries inline ICY metadata first, then sibling mounts, then
//! the Icecast status endpoint, emitting [`MetaEvent`]s along the way. A
//! [`StrategyHint`] from an earlier session short-circuits the search.

use std::sync::Arc;

use reqwest::redirect::Policy;
use reqwest::Client;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::WatchConfig;
use crate::direct::DirectStrategy;
use crate::error::{Result, WatchError};
use crate::sibling::{SiblingCache, SiblingStrategy};
use crate::status::StatusStrategy;
use crate::types::{MetaEvent, StrategyHint, StrategyKind};

/// Per-session event buffer. Consumers that stop reading eventually block
/// the session instead of growing memory without bound.
const EVENT_BUFFER: usize = 64;

/// Sends an event unless the session is being torn down. Both a cancelled
/// token and a dropped receiver end the session.
pub(crate) async fn emit(
    tx: &mpsc::Sender<MetaEvent>,
    token: &CancellationToken,
    event: MetaEvent,
) -> Result<()> {
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(WatchError::Cancelled),
        sent = tx.send(event) => sent.map_err(|_| WatchError::Cancelled),
    }
}

/// Spawns and owns metadata watch sessions.
///
/// One watcher per process is the intended shape: sessions spawned from the
/// same watcher share an HTTP client and the sibling discovery cache, so a
/// station resolved once is resolved for good.
#[derive(Debug, Clone)]
pub struct MetaWatcher {
    client: Client,
    config: Arc<WatchConfig>,
    siblings: SiblingCache,
}

impl Default for MetaWatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl MetaWatcher {
    pub fn new() -> Self {
        Self::with_config(WatchConfig::default())
    }

    pub fn with_config(config: WatchConfig) -> Self {
        Self::with_cache(config, SiblingCache::new())
    }

    /// Builds a watcher around an existing sibling cache, letting several
    /// watchers (or a rebuilt one) share discoveries.
    pub fn with_cache(config: WatchConfig, siblings: SiblingCache) -> Self {
        // redirects are handled manually so the ICY handshake survives hops
        let client = Client::builder()
            .redirect(Policy::none())
            .connect_timeout(config.connect_timeout())
            .user_agent(&config.user_agent)
            .build()
            .expect("failed to build reqwest client for metadata watcher");
        Self {
            client,
            config: Arc::new(config),
            siblings,
        }
    }

    pub fn sibling_cache(&self) -> SiblingCache {
        self.siblings.clone()
    }

    /// Starts watching a stream. Returns immediately; events arrive on the
    /// returned session. Pass [`StrategyHint::default`] when nothing is
    /// known about the station yet.
    pub fn watch(&self, stream_url: &str, hint: StrategyHint) -> WatchSession {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let token = CancellationToken::new();

        let direct = DirectStrategy::new(self.client.clone(), Arc::clone(&self.config));
        let sibling = SiblingStrategy::new(
            self.client.clone(),
            Arc::clone(&self.config),
            self.siblings.clone(),
        );
        let status = StatusStrategy::new(self.client.clone(), Arc::clone(&self.config));

        let run_token = token.clone();
        let stream_url = stream_url.to_string();
        let task = tokio::spawn(async move {
            let outcome =
                run_session(&direct, &sibling, &status, &run_token, &stream_url, hint, &tx).await;
            if let Err(err) = outcome {
                if !err.is_cancelled() {
                    debug!("watch: session for {} ended: {}", stream_url, err);
                }
            }
        });

        WatchSession {
            events: rx,
            token,
            task,
        }
    }
}

async fn run_session(
    direct: &DirectStrategy,
    sibling: &SiblingStrategy,
    status: &StatusStrategy,
    token: &CancellationToken,
    stream_url: &str,
    hint: StrategyHint,
    tx: &mpsc::Sender<MetaEvent>,
) -> Result<()> {
    match hint.kind {
        Some(StrategyKind::Json) => status.watch(token, stream_url, &hint.url, tx).await,
        Some(StrategyKind::Icy) => {
            let target = if hint.url.trim().is_empty() {
                stream_url
            } else {
                hint.url.trim()
            };
            direct
                .watch(token, target, Some(StrategyHint::icy(target)), tx)
                .await
        }
        None => auto_watch(direct, sibling, status, token, stream_url, tx).await,
    }
}

/// The full fallback chain: direct ICY, then sibling mounts, then the
/// status endpoint. Only "the stream has no inline metadata" moves the
/// chain along; transport errors and clean stream ends are terminal.
async fn auto_watch(
    direct: &DirectStrategy,
    sibling: &SiblingStrategy,
    status: &StatusStrategy,
    token: &CancellationToken,
    stream_url: &str,
    tx: &mpsc::Sender<MetaEvent>,
) -> Result<()> {
    match direct
        .watch(token, stream_url, Some(StrategyHint::icy(stream_url)), tx)
        .await
    {
        Err(err) if err.is_icy_unavailable() => {}
        outcome => return outcome,
    }

    match sibling.discover(token, stream_url).await {
        Ok((target, info)) => {
            debug!("watch: {} carries no metadata, using sibling {}", stream_url, target);
            emit(tx, token, MetaEvent::Resolved(StrategyHint::icy(&target))).await?;
            if !info.is_empty() {
                emit(tx, token, MetaEvent::Update(info)).await?;
            }
            direct.watch(token, &target, None, tx).await
        }
        Err(err) if err.is_cancelled() => Err(err),
        Err(err) => {
            debug!("watch: no sibling for {}: {}", stream_url, err);
            status.watch(token, stream_url, "", tx).await
        }
    }
}

/// A running watch session.
///
/// Receive events with [`recv`](WatchSession::recv); call
/// [`stop`](WatchSession::stop) to tear the session down. `stop` joins the
/// background task, so once it returns no further request is in flight and
/// no event will ever surface. Dropping the session cancels it too, without
/// the join guarantee.
#[derive(Debug)]
pub struct WatchSession {
    events: mpsc::Receiver<MetaEvent>,
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl WatchSession {
    /// The next event, or `None` once the session has ended on its own.
    pub async fn recv(&mut self) -> Option<MetaEvent> {
        self.events.recv().await
    }

    /// Cancels the session and waits for its task to finish.
    pub async fn stop(mut self) {
        self.token.cancel();
        let _ = (&mut self.task).await;
    }
}

impl Drop for WatchSession {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
