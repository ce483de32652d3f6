//! # coder1-settings
//!
//! Configuration for the Coder1 stream client, loaded from three layers
//! (in priority order):
//! 1. **Compiled defaults**: [`Coder1Settings::default()`]
//! 2. **User file**: `~/.coder1/stream.json` (deep-merged over defaults)
//! 3. **Environment variables**: `CODER1_*` overrides (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! let settings = coder1_settings::load_settings().unwrap_or_default();
//! println!("reconnect attempts: {}", settings.connection.max_reconnect_attempts);
//! ```

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides, deep_merge, load_settings, load_settings_from_path,
    settings_path, validate,
};
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_are_valid() {
        let settings = Coder1Settings::default();
        assert!(validate(&settings).is_ok());
        assert_eq!(settings.connection.max_reconnect_attempts, 5);
        assert_eq!(settings.connection.reconnect_interval_ms, 3000);
        assert_eq!(settings.streams.completion_grace_ms, 5000);
        assert_eq!(settings.events.capacity, 1024);
    }
}
