use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Intentionally generic: ICY sources often reject exotic user agents, so we
/// mimic a plain desktop client.
pub const DEFAULT_USER_AGENT: &str = "nowplay/0.1 (+https://local)";

/// Timing and limit knobs for the watcher.
///
/// Every field has a serde default, so hosts can embed the struct in their
/// own config file and override only what they care about. The library never
/// reads files itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// How long a new title must survive before it is promoted for display.
    #[serde(default = "default_stable_window_secs")]
    pub stable_window_secs: u64,
    /// Interval between status-json polls after the first successful one.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Cap on a single status-json request.
    #[serde(default = "default_status_timeout_secs")]
    pub status_timeout_secs: u64,
    /// Cap on a single sibling probe, connect included.
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
    /// Pause between unsuccessful sibling probes.
    #[serde(default = "default_probe_delay_ms")]
    pub probe_delay_ms: u64,
    /// Manual redirect hops the direct strategy will follow.
    #[serde(default = "default_redirect_limit")]
    pub redirect_limit: usize,
    /// TCP/TLS connect cap for all requests.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl WatchConfig {
    pub fn stable_window(&self) -> Duration {
        Duration::from_secs(self.stable_window_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn status_timeout(&self) -> Duration {
        Duration::from_secs(self.status_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn probe_delay(&self) -> Duration {
        Duration::from_millis(self.probe_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            stable_window_secs: default_stable_window_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            status_timeout_secs: default_status_timeout_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
            probe_delay_ms: default_probe_delay_ms(),
            redirect_limit: default_redirect_limit(),
            connect_timeout_secs: default_connect_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_stable_window_secs() -> u64 {
    6
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_status_timeout_secs() -> u64 {
    2
}

fn default_probe_timeout_secs() -> u64 {
    3
}

fn default_probe_delay_ms() -> u64 {
    80
}

fn default_redirect_limit() -> usize {
    5
}

fn default_connect_timeout_secs() -> u64 {
    7
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}
