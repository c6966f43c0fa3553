use thiserror::Error;

pub type Result<T> = std::result::Result<T, WatchError>;

/// Everything a strategy or session can fail with.
///
/// The variants fall into four classes the dispatcher cares about:
/// protocol-absent (`IcyUnavailable`, the expected case that drives
/// fallback), transport (`Http`/`Stream`/redirect variants), malformed or
/// unusable data (`Status*`, `NoUsableSource`, `NoSibling`), and
/// `Cancelled`.
#[derive(Debug, Error)]
pub enum WatchError {
    /// The server answered but does not interleave ICY metadata. Expected on
    /// lossless/passthrough mounts; the auto chain continues past this.
    #[error("stream offers no icy metadata")]
    IcyUnavailable,

    #[error("redirect response carried no location header")]
    RedirectMissingLocation,

    #[error("redirect chain exceeded {0} hops")]
    TooManyRedirects(usize),

    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("http: {0}")]
    Http(#[from] reqwest::Error),

    #[error("stream read: {0}")]
    Stream(#[from] std::io::Error),

    #[error("status endpoint {url} answered {status}")]
    StatusUnavailable { url: String, status: u16 },

    #[error("status document malformed: {0}")]
    StatusMalformed(#[from] serde_json::Error),

    #[error("status document larger than {0} bytes")]
    StatusOversized(usize),

    #[error("status document lists no source with a title")]
    NoUsableSource,

    #[error("no sibling mount offers icy metadata")]
    NoSibling,

    #[error("watch cancelled")]
    Cancelled,
}

impl WatchError {
    /// The "this mount simply has no inline metadata" outcome, as opposed to
    /// a transport fault. Only this failure lets the auto chain move on from
    /// the direct strategy.
    pub fn is_icy_unavailable(&self) -> bool {
        matches!(self, WatchError::IcyUnavailable)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, WatchError::Cancelled)
    }
}
