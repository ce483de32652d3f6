//! Stream defaults.

use std::time::Duration;

use coder1_core::GenerationOptions;
use serde::{Deserialize, Serialize};

/// Defaults applied to every `stream-request` plus registry timing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StreamSettings {
    /// How long a completed stream stays queryable, in milliseconds.
    pub completion_grace_ms: u64,
    /// Default model identifier.
    pub model: String,
    /// Default token limit.
    pub max_tokens: u32,
    /// Default sampling temperature.
    pub temperature: f64,
    /// Default system prompt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            completion_grace_ms: 5000,
            model: "claude-3-5-sonnet-20241022".to_string(),
            max_tokens: 4096,
            temperature: 0.7,
            system_prompt: None,
        }
    }
}

impl StreamSettings {
    /// Grace window as a `Duration`.
    pub fn completion_grace(&self) -> Duration {
        Duration::from_millis(self.completion_grace_ms)
    }

    /// Generation options built from these defaults.
    pub fn generation_options(&self) -> GenerationOptions {
        GenerationOptions {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            system_prompt: self.system_prompt.clone(),
        }
    }
}
