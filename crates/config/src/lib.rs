//! Configuration loading, validation, and management for Zema.
//!
//! Loads configuration from `~/.zema/config.toml` with environment
//! variable overrides. Validates all settings at startup.
//!
//! The loaded [`AppConfig`] is an ordinary value: components receive the
//! section they need at construction time instead of reading global state.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure.
///
/// Maps directly to `~/.zema/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Log level: debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Local inference service and sampling settings
    #[serde(default)]
    pub llm: LlmConfig,

    /// Conversation history bounds
    #[serde(default)]
    pub history: HistoryConfig,
}

fn default_log_level() -> String {
    "info".into()
}

/// Settings for talking to the local inference service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of the Ollama server
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Chat model identifier (must be installed locally)
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens per response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Leading instruction text; empty disables the system entry
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    #[serde(default = "default_health_timeout")]
    pub health_timeout_secs: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_stream_timeout")]
    pub stream_timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:11434".into()
}
fn default_model() -> String {
    "llama2:13b".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    512
}
fn default_system_prompt() -> String {
    "You are Zema, a helpful privacy-first AI assistant.".into()
}
fn default_health_timeout() -> u64 {
    2
}
fn default_request_timeout() -> u64 {
    60
}
fn default_stream_timeout() -> u64 {
    120
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            system_prompt: default_system_prompt(),
            health_timeout_secs: default_health_timeout(),
            request_timeout_secs: default_request_timeout(),
            stream_timeout_secs: default_stream_timeout(),
        }
    }
}

impl LlmConfig {
    pub fn health_timeout(&self) -> Duration {
        Duration::from_secs(self.health_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn stream_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_timeout_secs)
    }

    /// Whether `base_url` points at this machine.
    pub fn is_loopback(&self) -> bool {
        let rest = self
            .base_url
            .strip_prefix("http://")
            .or_else(|| self.base_url.strip_prefix("https://"))
            .unwrap_or(&self.base_url);
        let authority = rest.split('/').next().unwrap_or_default();
        let host = if let Some(v6) = authority.strip_prefix('[') {
            v6.split(']').next().unwrap_or_default()
        } else {
            authority.split(':').next().unwrap_or_default()
        };
        matches!(host, "localhost" | "127.0.0.1" | "::1")
    }
}

/// Bounds on conversational memory.
///
/// Each use site has its own window; only `retention_cap` limits what is
/// stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Maximum turns kept in the conversation store
    #[serde(default = "default_retention_cap")]
    pub retention_cap: usize,

    /// Prior turns sent with each generation request
    #[serde(default = "default_request_window")]
    pub request_window: usize,

    /// Turns handed to callers that build context bundles
    #[serde(default = "default_context_window")]
    pub context_window: usize,
}

fn default_retention_cap() -> usize {
    100
}
fn default_request_window() -> usize {
    10
}
fn default_context_window() -> usize {
    20
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            retention_cap: default_retention_cap(),
            request_window: default_request_window(),
            context_window: default_context_window(),
        }
    }
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl AppConfig {
    /// Load configuration from the default path (~/.zema/config.toml).
    ///
    /// Environment variables override the file:
    /// - `ZEMA_OLLAMA_URL`
    /// - `ZEMA_MODEL`
    /// - `ZEMA_LOG_LEVEL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::read_file(&config_path)?;
        config.apply_env_overrides();
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::read_file(path)?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("ZEMA_OLLAMA_URL") {
            self.llm.base_url = url;
        }
        if let Ok(model) = std::env::var("ZEMA_MODEL") {
            self.llm.model = model;
        }
        if let Ok(level) = std::env::var("ZEMA_LOG_LEVEL") {
            self.log_level = level;
        }
    }

    fn normalize(&mut self) {
        self.log_level = self.log_level.trim().to_lowercase();
        if self.log_level == "warning" {
            self.log_level = "warn".into();
        }
        self.llm.base_url = self.llm.base_url.trim_end_matches('/').to_string();
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".zema")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "log_level must be one of {LOG_LEVELS:?}, got '{}'",
                self.log_level
            )));
        }

        let llm = &self.llm;
        if !(llm.base_url.starts_with("http://") || llm.base_url.starts_with("https://")) {
            return Err(ConfigError::ValidationError(
                "llm.base_url must start with http:// or https://".into(),
            ));
        }
        if llm.model.trim().is_empty() {
            return Err(ConfigError::ValidationError("llm.model must not be empty".into()));
        }
        if !(0.0..=2.0).contains(&llm.temperature) {
            return Err(ConfigError::ValidationError(
                "llm.temperature must be between 0.0 and 2.0".into(),
            ));
        }
        if !(1..=4096).contains(&llm.max_tokens) {
            return Err(ConfigError::ValidationError(
                "llm.max_tokens must be between 1 and 4096".into(),
            ));
        }
        if llm.health_timeout_secs == 0 || llm.request_timeout_secs == 0 || llm.stream_timeout_secs == 0 {
            return Err(ConfigError::ValidationError("llm timeouts must be > 0".into()));
        }

        let history = &self.history;
        if history.retention_cap == 0 || history.request_window == 0 || history.context_window == 0 {
            return Err(ConfigError::ValidationError("history windows must be > 0".into()));
        }
        if history.request_window > history.retention_cap || history.context_window > history.retention_cap {
            return Err(ConfigError::ValidationError(
                "history windows cannot exceed history.retention_cap".into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            llm: LlmConfig::default(),
            history: HistoryConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
