use std::time::Duration;

use fetchline_core::delivery::{CLIENT_POLL_INTERVAL_SECS, PUSH_TIMEOUT_SECS};

/// Connection settings for [`DownloadDriver`](crate::DownloadDriver).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// HTTP base URL of the server, e.g. `http://host:3000`.
    pub base_url: String,
    /// Give up on push after this long without a terminal message.
    pub push_timeout: Duration,
    pub poll_interval: Duration,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            push_timeout: Duration::from_secs(PUSH_TIMEOUT_SECS),
            poll_interval: Duration::from_secs(CLIENT_POLL_INTERVAL_SECS),
        }
    }

    /// WebSocket base derived from `base_url` (`http` -> `ws`, `https` -> `wss`).
    pub fn ws_base_url(&self) -> String {
        if let Some(rest) = self.base_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.base_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            self.base_url.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_browser_contract() {
        let config = ClientConfig::new("http://localhost:3000/");
        assert_eq!(config.base_url, "http://localhost:3000");
        assert_eq!(config.push_timeout, Duration::from_secs(90));
        assert_eq!(config.poll_interval, Duration::from_secs(3));
    }

    #[test]
    fn ws_scheme_follows_http_scheme() {
        assert_eq!(
            ClientConfig::new("http://127.0.0.1:8080").ws_base_url(),
            "ws://127.0.0.1:8080"
        );
        assert_eq!(
            ClientConfig::new("https://files.example.com").ws_base_url(),
            "wss://files.example.com"
        );
    }
}
