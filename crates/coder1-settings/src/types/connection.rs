//! Connection and reconnect settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Where to connect and how hard to try.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionSettings {
    /// HTTP(S) origin the WebSocket URL is derived from.
    pub base_url: String,
    /// Explicit WebSocket URL. Bypasses derivation from `base_url`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Reconnect attempts after an unexpected close before giving up.
    pub max_reconnect_attempts: u32,
    /// Fixed delay before each reconnect attempt, in milliseconds.
    pub reconnect_interval_ms: u64,
    /// Keep-alive ping interval in milliseconds (`0` disables).
    pub heartbeat_interval_ms: u64,
    /// Upper bound on a single connection attempt, in milliseconds.
    pub connect_timeout_ms: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            url: None,
            max_reconnect_attempts: 5,
            reconnect_interval_ms: 3000,
            heartbeat_interval_ms: 30_000,
            connect_timeout_ms: 10_000,
        }
    }
}

impl ConnectionSettings {
    /// Reconnect delay as a `Duration`.
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    /// Heartbeat period, or `None` when disabled.
    pub fn heartbeat_interval(&self) -> Option<Duration> {
        (self.heartbeat_interval_ms > 0).then(|| Duration::from_millis(self.heartbeat_interval_ms))
    }

    /// Connection attempt timeout as a `Duration`.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = ConnectionSettings::default();
        assert_eq!(cfg.base_url, "http://localhost:3000");
        assert!(cfg.url.is_none());
        assert_eq!(cfg.max_reconnect_attempts, 5);
        assert_eq!(cfg.reconnect_interval(), Duration::from_secs(3));
        assert_eq!(cfg.connect_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn zero_heartbeat_disables() {
        let cfg = ConnectionSettings {
            heartbeat_interval_ms: 0,
            ..ConnectionSettings::default()
        };
        assert!(cfg.heartbeat_interval().is_none());
        assert_eq!(
            ConnectionSettings::default().heartbeat_interval(),
            Some(Duration::from_secs(30))
        );
    }
}
