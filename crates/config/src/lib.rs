//! Configuration loading, validation, and management for GridParley.
//!
//! Loads configuration from `~/.gridparley/config.toml` with environment
//! variable overrides. Validates all settings before any episode starts.

use gridparley_core::{ModelSpec, TaskName};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure.
///
/// Maps directly to `~/.gridparley/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Task scenario to run
    #[serde(default = "default_task")]
    pub task: TaskName,

    /// Model name, resolved against the model catalogue
    #[serde(default = "default_model")]
    pub model: String,

    /// Number of episodes per run
    #[serde(default = "default_max_episodes")]
    pub max_episodes: usize,

    /// Where episode records are written
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Request settings for every decision query
    #[serde(default)]
    pub query: QueryConfig,

    /// Outer (transport) retry policy
    #[serde(default)]
    pub retry: RetryConfig,

    /// Inner (service error) retry policy
    #[serde(default)]
    pub service_retry: ServiceRetryConfig,

    /// How agents turn payloads into actions
    #[serde(default)]
    pub decision: DecisionConfig,

    /// Simulator endpoint
    #[serde(default)]
    pub environment: EnvironmentConfig,

    /// Provider-specific configurations, keyed `openai` / `anthropic`
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

fn default_task() -> TaskName {
    TaskName::EasyContract
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_max_episodes() -> usize {
    1
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("outputs")
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("task", &self.task)
            .field("model", &self.model)
            .field("max_episodes", &self.max_episodes)
            .field("output_dir", &self.output_dir)
            .field("query", &self.query)
            .field("retry", &self.retry)
            .field("service_retry", &self.service_retry)
            .field("decision", &self.decision)
            .field("environment", &self.environment)
            .field("providers", &self.providers)
            .finish()
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    #[serde(default)]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default)]
    pub stop: Vec<String>,

    /// Number of most recent dialogue turns sent with each query
    #[serde(default = "default_recent_k")]
    pub recent_k: usize,
}

fn default_max_tokens() -> u32 {
    256
}
fn default_recent_k() -> usize {
    8
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            max_tokens: default_max_tokens(),
            stop: Vec::new(),
            recent_k: default_recent_k(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_initial_delay_secs")]
    pub initial_delay_secs: f64,

    #[serde(default = "default_exponential_base")]
    pub exponential_base: f64,

    #[serde(default = "default_true")]
    pub jitter: bool,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_initial_delay_secs() -> f64 {
    1.0
}
fn default_exponential_base() -> f64 {
    2.0
}
fn default_true() -> bool {
    true
}
fn default_max_retries() -> u32 {
    10
}

impl RetryConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs_f64(self.initial_delay_secs)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay_secs: default_initial_delay_secs(),
            exponential_base: default_exponential_base(),
            jitter: true,
            max_retries: default_max_retries(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceRetryConfig {
    #[serde(default = "default_service_retries")]
    pub max_retries: u32,

    #[serde(default = "default_backoff_step_secs")]
    pub backoff_step_secs: u64,
}

fn default_service_retries() -> u32 {
    3
}
fn default_backoff_step_secs() -> u64 {
    20
}

impl Default for ServiceRetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_service_retries(),
            backoff_step_secs: default_backoff_step_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionConfig {
    /// Context-free re-queries after an empty or invalid decision
    #[serde(default = "default_max_reconsiderations")]
    pub max_reconsiderations: u32,

    /// Action used when no valid decision could be obtained
    #[serde(default = "default_action")]
    pub default_action: String,

    /// Vocabulary accepted from physical-phase agents
    #[serde(default = "default_physical_actions")]
    pub physical_actions: Vec<String>,

    /// Query all agents of a step concurrently against a step-start snapshot
    #[serde(default)]
    pub parallel: bool,
}

fn default_max_reconsiderations() -> u32 {
    1
}
fn default_action() -> String {
    "noop".into()
}
fn default_physical_actions() -> Vec<String> {
    ["move_up", "move_down", "move_left", "move_right", "noop"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            max_reconsiderations: default_max_reconsiderations(),
            default_action: default_action(),
            physical_actions: default_physical_actions(),
            parallel: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    #[serde(default = "default_env_url")]
    pub base_url: String,

    #[serde(default = "default_env_timeout")]
    pub timeout_secs: u64,
}

fn default_env_url() -> String {
    "http://127.0.0.1:8765".into()
}
fn default_env_timeout() -> u64 {
    60
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            base_url: default_env_url(),
            timeout_secs: default_env_timeout(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path with env overrides.
    ///
    /// Priority: env vars > config file > defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        // Environment variable overrides (highest priority)
        if config.api_key.is_none() {
            config.api_key = std::env::var("GRIDPARLEY_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok())
                .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok());
        }

        if let Ok(model) = std::env::var("GRIDPARLEY_MODEL") {
            config.model = model;
        }

        if let Ok(task) = std::env::var("GRIDPARLEY_TASK") {
            config.task = task
                .parse()
                .map_err(|e: gridparley_core::Error| ConfigError::ValidationError(e.to_string()))?;
        }

        if let Ok(url) = std::env::var("GRIDPARLEY_ENV_URL") {
            config.environment.base_url = url;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".gridparley")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.query.temperature) {
            return Err(ConfigError::ValidationError(
                "query.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.max_episodes == 0 {
            return Err(ConfigError::ValidationError(
                "max_episodes must be at least 1".into(),
            ));
        }

        if self.retry.initial_delay_secs <= 0.0 {
            return Err(ConfigError::ValidationError(
                "retry.initial_delay_secs must be > 0".into(),
            ));
        }

        if self.retry.exponential_base < 1.0 {
            return Err(ConfigError::ValidationError(
                "retry.exponential_base must be >= 1".into(),
            ));
        }

        if !self
            .decision
            .physical_actions
            .contains(&self.decision.default_action)
        {
            return Err(ConfigError::ValidationError(format!(
                "decision.default_action '{}' is not one of decision.physical_actions",
                self.decision.default_action
            )));
        }

        ModelSpec::resolve(&self.model)
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

        Ok(())
    }

    /// The resolved model for this run.
    pub fn model_spec(&self) -> Result<ModelSpec, ConfigError> {
        ModelSpec::resolve(&self.model).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }

    /// API key for a provider: provider-specific first, then the global key.
    pub fn api_key_for(&self, provider: &str) -> Option<String> {
        self.providers
            .get(provider)
            .and_then(|p| p.api_key.clone())
            .or_else(|| self.api_key.clone())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some() || self.providers.values().any(|p| p.api_key.is_some())
    }

    /// Generate a default config TOML string (for `config init`).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            task: default_task(),
            model: default_model(),
            max_episodes: default_max_episodes(),
            output_dir: default_output_dir(),
            query: QueryConfig::default(),
            retry: RetryConfig::default(),
            service_retry: ServiceRetryConfig::default(),
            decision: DecisionConfig::default(),
            environment: EnvironmentConfig::default(),
            providers: HashMap::new(),
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

impl From<ConfigError> for gridparley_core::Error {
    fn from(err: ConfigError) -> Self {
        gridparley_core::Error::config(err.to_string())
    }
}
