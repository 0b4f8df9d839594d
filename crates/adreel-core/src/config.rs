//! Configuration loaded from `adreel.yml`.
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! usable configuration. Credentials are never read from the file; each
//! service section names the environment variable that holds its key.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

/// Default config file name, resolved against the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "adreel.yml";

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdreelConfig {
    pub pipeline: PipelineConfig,
    pub preferences: PreferenceStoreConfig,
    pub copywriter: CopywriterConfig,
    pub renderer: RendererConfig,
    pub email: EmailConfig,
    pub journal: JournalConfig,
}

impl AdreelConfig {
    /// Parses configuration from YAML text and validates it.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        // serde_yaml treats an empty document as null rather than an empty map.
        let config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(yaml)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates the config file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    /// Loads `path` if it exists, otherwise returns the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.pipeline.validate()
    }

    /// Commented starter config written by `adreel init`.
    pub fn template() -> &'static str {
        CONFIG_TEMPLATE
    }
}

/// Pipeline timing and retry settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Render submissions allowed per job before giving up on timeouts.
    pub render_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
    /// First delay between render polls; grows by half per pending poll.
    pub poll_interval_ms: u64,
    pub max_poll_interval_ms: u64,
    /// Wait allowed for one render submission before it counts as timed out.
    pub render_timeout_secs: u64,
    /// Reads of the preference store allowed when it is unavailable.
    pub preference_fetch_attempts: u32,
    /// Jobs run at once by a batch.
    pub max_concurrent_jobs: usize,
    /// Goal used when a request does not name one.
    pub default_goal: String,
    /// Template name passed to the renderer.
    pub render_template: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            render_attempts: 3,
            initial_backoff_ms: 1_000,
            max_backoff_ms: 30_000,
            backoff_multiplier: 2.0,
            poll_interval_ms: 2_000,
            max_poll_interval_ms: 15_000,
            render_timeout_secs: 600,
            preference_fetch_attempts: 3,
            max_concurrent_jobs: 8,
            default_goal: "brand awareness".to_string(),
            render_template: "ad-default".to_string(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.render_attempts == 0 {
            return Err(ConfigError::Invalid(
                "pipeline.render_attempts must be at least 1".to_string(),
            ));
        }
        if self.preference_fetch_attempts == 0 {
            return Err(ConfigError::Invalid(
                "pipeline.preference_fetch_attempts must be at least 1".to_string(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "pipeline.poll_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.max_poll_interval_ms < self.poll_interval_ms {
            return Err(ConfigError::Invalid(
                "pipeline.max_poll_interval_ms must not be below poll_interval_ms".to_string(),
            ));
        }
        if self.backoff_multiplier < 1.0 || !self.backoff_multiplier.is_finite() {
            return Err(ConfigError::Invalid(
                "pipeline.backoff_multiplier must be at least 1.0".to_string(),
            ));
        }
        if self.initial_backoff_ms > self.max_backoff_ms {
            return Err(ConfigError::Invalid(
                "pipeline.initial_backoff_ms must not exceed max_backoff_ms".to_string(),
            ));
        }
        if self.render_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "pipeline.render_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.max_concurrent_jobs == 0 {
            return Err(ConfigError::Invalid(
                "pipeline.max_concurrent_jobs must be at least 1".to_string(),
            ));
        }
        if self.default_goal.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "pipeline.default_goal must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Policy governing render resubmission after timeouts.
    pub fn render_retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.render_attempts,
            ..self.backoff()
        }
    }

    /// Policy governing preference store reads.
    pub fn preference_retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.preference_fetch_attempts,
            ..self.backoff()
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn max_poll_interval(&self) -> Duration {
        Duration::from_millis(self.max_poll_interval_ms)
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_secs(self.render_timeout_secs)
    }

    fn backoff(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: 1,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            multiplier: self.backoff_multiplier,
        }
    }
}

/// PostgREST-style table holding per-user preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreferenceStoreConfig {
    pub base_url: String,
    pub table: String,
    pub api_key_env: String,
    pub timeout_secs: u64,
}

impl Default for PreferenceStoreConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:54321".to_string(),
            table: "user_preferences".to_string(),
            api_key_env: "ADREEL_PREFS_KEY".to_string(),
            timeout_secs: 10,
        }
    }
}

/// OpenAI-compatible chat completions endpoint used for copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CopywriterConfig {
    pub base_url: String,
    pub model: String,
    pub api_key_env: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl Default for CopywriterConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            max_tokens: 120,
            temperature: 0.8,
            timeout_secs: 60,
        }
    }
}

/// Render service accepting template submissions and status polls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    pub base_url: String,
    pub api_key_env: String,
    pub timeout_secs: u64,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3100".to_string(),
            api_key_env: "ADREEL_RENDER_KEY".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Transactional email API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    pub base_url: String,
    pub from: String,
    pub subject: String,
    pub api_key_env: String,
    pub timeout_secs: u64,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.resend.com".to_string(),
            from: "adreel <ads@example.com>".to_string(),
            subject: "Your new video ad is ready".to_string(),
            api_key_env: "RESEND_API_KEY".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Local job journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalConfig {
    pub enabled: bool,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

const CONFIG_TEMPLATE: &str = r#"# adreel configuration
#
# API keys are read from the environment (or a .env file), never from here.

pipeline:
  # Render submissions per job before a timeout becomes terminal
  render_attempts: 3
  initial_backoff_ms: 1000
  max_backoff_ms: 30000
  backoff_multiplier: 2.0
  poll_interval_ms: 2000
  max_poll_interval_ms: 15000
  render_timeout_secs: 600
  preference_fetch_attempts: 3
  max_concurrent_jobs: 8
  default_goal: brand awareness
  render_template: ad-default

preferences:
  base_url: http://localhost:54321
  table: user_preferences
  api_key_env: ADREEL_PREFS_KEY
  timeout_secs: 10

copywriter:
  base_url: https://api.openai.com/v1
  model: gpt-4o-mini
  api_key_env: OPENAI_API_KEY
  max_tokens: 120
  temperature: 0.8
  timeout_secs: 60

renderer:
  base_url: http://localhost:3100
  api_key_env: ADREEL_RENDER_KEY
  timeout_secs: 30

email:
  base_url: https://api.resend.com
  from: adreel <ads@example.com>
  subject: Your new video ad is ready
  api_key_env: RESEND_API_KEY
  timeout_secs: 30

journal:
  enabled: true
"#;
