//! Client configuration.

use std::time::Duration;

use quire_core::DiffPalette;

pub const DEFAULT_SERVER_URL: &str = "ws://127.0.0.1:9090";

/// Settings shared by document and history sessions.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// WebSocket address of the collaboration server
    pub server_url: String,
    /// Quiet period after the last user edit before the document is saved
    pub save_interval: Duration,
    /// Pause between reconnect attempts
    pub reconnect_delay: Duration,
    /// Messages held while the link is pending
    pub outbox_capacity: usize,
    pub palette: DiffPalette,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            save_interval: Duration::from_millis(1000),
            reconnect_delay: Duration::from_secs(2),
            outbox_capacity: 1024,
            palette: DiffPalette::default(),
        }
    }
}

impl ClientConfig {
    /// Defaults overridden by `QUIRE_SERVER_URL`, `QUIRE_SAVE_INTERVAL_MS`
    /// and `QUIRE_RECONNECT_DELAY_MS`. Unparsable values are ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(url) = lookup("QUIRE_SERVER_URL") {
            config.server_url = url;
        }
        if let Some(ms) = millis(&lookup, "QUIRE_SAVE_INTERVAL_MS") {
            config.save_interval = ms;
        }
        if let Some(ms) = millis(&lookup, "QUIRE_RECONNECT_DELAY_MS") {
            config.reconnect_delay = ms;
        }
        config
    }

    pub fn with_server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = url.into();
        self
    }
}

fn millis(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<Duration> {
    let raw = lookup(key)?;
    match raw.trim().parse::<u64>() {
        Ok(ms) => Some(Duration::from_millis(ms)),
        Err(_) => {
            log::warn!("Ignoring {key}={raw:?}: not a number of milliseconds");
            None
        }
    }
}
