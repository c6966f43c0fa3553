use serde::{Deserialize, Serialize};

/// A snapshot of what is currently known about a stream.
///
/// Fields are additive: an update carrying an empty field never means "this
/// value went away", it means the source did not repeat it. Consumers keep
/// the last non-empty value they saw.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Info {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub station: String,
}

impl Info {
    /// True when no field carries any text.
    pub fn is_empty(&self) -> bool {
        self.title.is_empty() && self.description.is_empty() && self.station.is_empty()
    }
}

/// How metadata was (or should be) obtained for a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StrategyKind {
    /// Inline ICY metadata on the streaming socket itself.
    Icy,
    /// An Icecast-style JSON status endpoint polled on an interval.
    Json,
}

/// A previously resolved strategy plus the endpoint it resolved to.
///
/// Hosts persist this per station and pass it back on the next watch, which
/// skips the fallback search entirely. An empty hint (`kind: None`) asks for
/// the full chain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyHint {
    #[serde(default)]
    pub kind: Option<StrategyKind>,
    #[serde(default)]
    pub url: String,
}

impl StrategyHint {
    pub fn icy(url: impl Into<String>) -> Self {
        Self {
            kind: Some(StrategyKind::Icy),
            url: url.into(),
        }
    }

    pub fn json(url: impl Into<String>) -> Self {
        Self {
            kind: Some(StrategyKind::Json),
            url: url.into(),
        }
    }
}

/// What a watch session sends its consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetaEvent {
    /// New metadata snapshot from the active strategy.
    Update(Info),
    /// The session settled on a strategy. Sent at most once per session, and
    /// only after that strategy's first successful handshake; worth
    /// persisting so the next watch of the same station starts here.
    Resolved(StrategyHint),
}
