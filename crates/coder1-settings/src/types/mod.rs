//! Settings types.
//!
//! All structs use `#[serde(rename_all = "camelCase", default)]` so a user
//! file only needs to name the values it changes.

mod connection;
mod streams;

pub use connection::ConnectionSettings;
pub use streams::StreamSettings;

use coder1_core::logging::LogFormat;
use serde::{Deserialize, Serialize};

/// Root settings object.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Coder1Settings {
    /// Socket endpoint and reconnect policy.
    pub connection: ConnectionSettings,
    /// Stream defaults and registry behavior.
    pub streams: StreamSettings,
    /// Event fan-out.
    pub events: EventSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

/// Event fan-out settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventSettings {
    /// Broadcast channel capacity. Slow receivers lag past this.
    pub capacity: usize,
}

impl Default for EventSettings {
    fn default() -> Self {
        Self { capacity: 1024 }
    }
}

/// Log output settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Minimum level (`EnvFilter` syntax).
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}
