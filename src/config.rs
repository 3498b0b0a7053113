//! Engine configuration
//!
//! Configuration for the cache, the model service adapter, and title
//! generation. Values come from an optional YAML file with serde
//! defaults filling the gaps, plus `TANGENT_*` environment overrides.

use crate::error::{Result, TangentError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Message cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Model service settings
    #[serde(default)]
    pub model: ModelConfig,

    /// Conversation title generation settings
    #[serde(default)]
    pub title: TitleConfig,
}

impl EngineConfig {
    /// Loads configuration from a YAML file, falling back to defaults
    /// when the file does not exist.
    ///
    /// Environment overrides are applied after the file is read, and the
    /// result is validated.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the YAML configuration file
    ///
    /// # Errors
    ///
    /// Returns [`TangentError::Config`] if the file cannot be read or
    /// parsed, or if the resulting configuration is invalid.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!(path = %path.display(), "config file not found, using defaults");
            Self::default()
        };

        config.apply_env_vars();
        config.validate()?;

        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| TangentError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| TangentError::Config(format!("Failed to parse config: {}", e)))
    }

    fn apply_env_vars(&mut self) {
        if let Ok(model) = std::env::var("TANGENT_MODEL") {
            self.model.model = model;
        }

        if let Ok(base_url) = std::env::var("TANGENT_BASE_URL") {
            self.model.base_url = base_url;
        }

        if let Ok(api_key) = std::env::var("TANGENT_API_KEY") {
            self.model.api_key = Some(api_key);
        }
    }

    /// Checks the configuration for values the engine cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`TangentError::Config`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.cache.capacity == 0 {
            return Err(TangentError::Config(
                "cache.capacity must be at least 1".to_string(),
            ));
        }
        if self.cache.ttl_secs == 0 {
            return Err(TangentError::Config(
                "cache.ttl_secs must be positive".to_string(),
            ));
        }
        if self.cache.sweep_interval_secs == 0 {
            return Err(TangentError::Config(
                "cache.sweep_interval_secs must be positive".to_string(),
            ));
        }
        if self.model.base_url.is_empty() {
            return Err(TangentError::Config(
                "model.base_url must not be empty".to_string(),
            ));
        }
        if self.model.model.is_empty() {
            return Err(TangentError::Config(
                "model.model must not be empty".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&self.model.temperature) {
            return Err(TangentError::Config(
                "model.temperature must be between 0.0 and 2.0".to_string(),
            ));
        }
        if self.model.max_tokens == 0 {
            return Err(TangentError::Config(
                "model.max_tokens must be positive".to_string(),
            ));
        }
        if self.model.request_timeout_secs == 0 {
            return Err(TangentError::Config(
                "model.request_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Message cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of resident entries before LRU eviction kicks in
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,

    /// Entry time-to-live in seconds, measured from insertion
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,

    /// Interval between background sweeps of expired entries (seconds)
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_cache_capacity() -> usize {
    1000
}

fn default_cache_ttl_secs() -> u64 {
    3600
}

fn default_sweep_interval_secs() -> u64 {
    300
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
            ttl_secs: default_cache_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl CacheConfig {
    /// Entry time-to-live as a [`Duration`].
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// Sweep interval as a [`Duration`].
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Model service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Base URL of the chat-completions API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model identifier sent with every request
    #[serde(default = "default_model")]
    pub model: String,

    /// API key; falls back to the `OPENROUTER_API_KEY` environment
    /// variable when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Completion token budget per request
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Deadline for a single model call (seconds); streaming reads use
    /// the same bound per chunk
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

fn default_model() -> String {
    "openai/gpt-4o-mini".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    1000
}

fn default_request_timeout_secs() -> u64 {
    60
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            api_key: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl ModelConfig {
    /// Per-request deadline as a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Title generation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TitleConfig {
    /// Whether a title is generated after the first assistant reply
    #[serde(default = "default_title_enabled")]
    pub enabled: bool,

    /// Deadline for the title model call (seconds)
    #[serde(default = "default_title_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_title_enabled() -> bool {
    true
}

fn default_title_timeout_secs() -> u64 {
    10
}

impl Default for TitleConfig {
    fn default() -> Self {
        Self {
            enabled: default_title_enabled(),
            timeout_secs: default_title_timeout_secs(),
        }
    }
}

impl TitleConfig {
    /// Title call deadline as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
