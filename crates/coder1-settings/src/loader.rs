//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`Coder1Settings::default()`]
//! 2. If `~/.coder1/stream.json` exists, deep-merge user values over defaults
//! 3. Apply `CODER1_*` environment variable overrides (highest priority)
//! 4. Validate ranges
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::Coder1Settings;

/// Resolve the path to the settings file (`~/.coder1/stream.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".coder1").join("stream.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<Coder1Settings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or out-of-range values are
/// errors.
pub fn load_settings_from_path(path: &Path) -> Result<Coder1Settings> {
    let mut settings = read_settings_file(path)?;
    apply_env_overrides(&mut settings);
    validate(&settings)?;
    Ok(settings)
}

/// Read and merge a settings file over defaults, without env overrides.
pub fn read_settings_file(path: &Path) -> Result<Coder1Settings> {
    let defaults = serde_json::to_value(Coder1Settings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let user: Value =
            serde_json::from_str(&content).map_err(|source| SettingsError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `CODER1_*` overrides from the process environment.
pub fn apply_env_overrides(settings: &mut Coder1Settings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`.
///
/// Empty values are treated as unset. Values that fail to parse or fall out
/// of range are ignored with a warning, leaving the file/default value.
pub fn apply_overrides<F>(settings: &mut Coder1Settings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    // ── Connection ──────────────────────────────────────────────────
    if let Some(v) = env.string("CODER1_BASE_URL") {
        settings.connection.base_url = v;
    }
    if let Some(v) = env.string("CODER1_WS_URL") {
        settings.connection.url = Some(v);
    }
    if let Some(v) = env.u32("CODER1_MAX_RECONNECT_ATTEMPTS", 0, 1_000) {
        settings.connection.max_reconnect_attempts = v;
    }
    if let Some(v) = env.u64("CODER1_RECONNECT_INTERVAL_MS", 1, 600_000) {
        settings.connection.reconnect_interval_ms = v;
    }
    if let Some(v) = env.u64("CODER1_HEARTBEAT_INTERVAL_MS", 0, 600_000) {
        settings.connection.heartbeat_interval_ms = v;
    }
    if let Some(v) = env.u64("CODER1_CONNECT_TIMEOUT_MS", 100, 600_000) {
        settings.connection.connect_timeout_ms = v;
    }

    // ── Streams ─────────────────────────────────────────────────────
    if let Some(v) = env.u64("CODER1_COMPLETION_GRACE_MS", 0, 3_600_000) {
        settings.streams.completion_grace_ms = v;
    }
    if let Some(v) = env.string("CODER1_MODEL") {
        settings.streams.model = v;
    }
    if let Some(v) = env.u32("CODER1_MAX_TOKENS", 1, 1_000_000) {
        settings.streams.max_tokens = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("CODER1_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.string("CODER1_LOG_FORMAT") {
        match v.parse() {
            Ok(format) => settings.logging.format = format,
            Err(e) => warn!(key = "CODER1_LOG_FORMAT", value = %v, error = %e, "invalid env var, ignoring"),
        }
    }
}

/// Reject settings the client cannot run with.
pub fn validate(settings: &Coder1Settings) -> Result<()> {
    let conn = &settings.connection;
    if conn.max_reconnect_attempts > 0 && conn.reconnect_interval_ms == 0 {
        return Err(SettingsError::InvalidValue(
            "connection.reconnectIntervalMs must be > 0 when reconnects are enabled".into(),
        ));
    }
    if conn.connect_timeout_ms == 0 {
        return Err(SettingsError::InvalidValue(
            "connection.connectTimeoutMs must be > 0".into(),
        ));
    }
    let streams = &settings.streams;
    if !(0.0..=2.0).contains(&streams.temperature) {
        return Err(SettingsError::InvalidValue(format!(
            "streams.temperature must be within 0..=2, got {}",
            streams.temperature
        )));
    }
    if streams.max_tokens == 0 {
        return Err(SettingsError::InvalidValue(
            "streams.maxTokens must be > 0".into(),
        ));
    }
    if settings.events.capacity == 0 {
        return Err(SettingsError::InvalidValue(
            "events.capacity must be > 0".into(),
        ));
    }
    Ok(())
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a `u64` within an inclusive range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

struct EnvReader<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn u64(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        let val = self.string(name)?;
        let result = parse_u64_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid u64 env var, ignoring");
        }
        result
    }

    fn u32(&self, name: &str, min: u32, max: u32) -> Option<u32> {
        let v = self.u64(name, u64::from(min), u64::from(max))?;
        u32::try_from(v).ok()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
