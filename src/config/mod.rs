//! Configuration module for the pipeline core
//!
//! Provides layered configuration loading from files, environment
//! variables, and defaults.
//!
//! # Configuration Precedence
//!
//! 1. Environment variables (`WISDOM_*`)
//! 2. Configuration file (TOML)
//! 3. Default values (lowest priority)
//!
//! # Example
//!
//! ```rust
//! use wisdom::config::PipelineConfig;
//!
//! // Load defaults
//! let config = PipelineConfig::default();
//! assert_eq!(config.retry_count, 4);
//!
//! // Parse from TOML
//! let toml = r#"
//! variant = "saas"
//! inference_url = "https://wca.example.com"
//! idp_url = "https://iam.example.com"
//! retry_count = 2
//! "#;
//! let config: PipelineConfig = toml::from_str(toml).unwrap();
//! assert_eq!(config.retry_count, 2);
//! ```

mod error;
pub mod logging;

pub use error::ConfigError;
pub use logging::{LogFormat, LoggingConfig};

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::pipeline::PipelineVariant;
use crate::resolver::TrialDefaults;
use crate::retry::RetryPolicy;
use crate::secret::Secret;

/// Configuration for one pipeline instance, loaded once at construction.
/// There is no runtime mutation: rebuilding the pipeline is the only way
/// to change it.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Which pipeline variant to build.
    pub variant: PipelineVariant,
    /// Base URL of the inference service.
    pub inference_url: String,
    /// Base URL of the IDP issuing bearer tokens (SaaS).
    pub idp_url: Option<String>,
    /// Optional basic-auth login for the IDP token endpoint.
    pub idp_login: Option<String>,
    /// Optional basic-auth password for the IDP token endpoint.
    pub idp_password: Option<Secret>,
    /// Operator-imposed fleet-wide API key. Supersedes every other source.
    pub api_key: Option<Secret>,
    /// Fleet-wide default model id.
    pub model_id: Option<String>,
    /// Whether trial plans grant access through the fleet trial defaults.
    pub enable_trial: bool,
    /// API key handed to active-trial users without a stored org key.
    pub trial_api_key: Option<Secret>,
    /// Model id handed to active-trial users without a stored org key.
    pub trial_model_id: Option<String>,
    /// Additional HTTP attempts after the first.
    pub retry_count: u32,
    /// Per-task request timeout; multi-task prompts multiply it.
    pub timeout_task_seconds: u64,
    /// Verify upstream TLS certificates.
    pub verify_tls: bool,
    /// On-prem ZenApiKey username.
    pub username: Option<String>,
    /// Reserved API key for the health probe.
    pub health_api_key: Option<Secret>,
    /// Reserved model id for the health probe.
    pub health_model_id: Option<String>,
    /// Simulated latency of the dummy variant.
    pub dummy_latency_ms: u64,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            variant: PipelineVariant::Dummy,
            inference_url: String::new(),
            idp_url: None,
            idp_login: None,
            idp_password: None,
            api_key: None,
            model_id: None,
            enable_trial: false,
            trial_api_key: None,
            trial_model_id: None,
            retry_count: 4,
            timeout_task_seconds: 10,
            verify_tls: true,
            username: None,
            health_api_key: None,
            health_model_id: None,
            dummy_latency_ms: 0,
            logging: LoggingConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a TOML file
    ///
    /// If path is None, returns default configuration.
    /// If path doesn't exist, returns NotFound error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => {
                if !p.exists() {
                    return Err(ConfigError::NotFound(p.to_path_buf()));
                }
                let content = std::fs::read_to_string(p)?;
                toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
            }
            None => Ok(Self::default()),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supports WISDOM_* environment variables for common settings.
    /// Invalid values are silently ignored (defaults are kept).
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var("WISDOM_INFERENCE_URL") {
            self.inference_url = url;
        }
        if let Ok(url) = std::env::var("WISDOM_IDP_URL") {
            self.idp_url = Some(url);
        }
        if let Ok(key) = std::env::var("WISDOM_API_KEY") {
            self.api_key = Some(Secret::new(key));
        }
        if let Ok(model) = std::env::var("WISDOM_MODEL_ID") {
            self.model_id = Some(model);
        }
        if let Ok(count) = std::env::var("WISDOM_RETRY_COUNT") {
            if let Ok(c) = count.parse() {
                self.retry_count = c;
            }
        }
        if let Ok(timeout) = std::env::var("WISDOM_TIMEOUT_TASK_SECONDS") {
            if let Ok(t) = timeout.parse() {
                self.timeout_task_seconds = t;
            }
        }
        if let Ok(verify) = std::env::var("WISDOM_VERIFY_TLS") {
            self.verify_tls = verify.to_lowercase() != "false";
        }

        // Logging settings
        if let Ok(level) = std::env::var("WISDOM_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("WISDOM_LOG_FORMAT") {
            if let Ok(f) = format.parse() {
                self.logging.format = f;
            }
        }

        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.variant != PipelineVariant::Dummy && self.inference_url.is_empty() {
            return Err(ConfigError::Validation {
                field: "inference_url".to_string(),
                message: "URL cannot be empty".to_string(),
            });
        }

        if self.timeout_task_seconds == 0 {
            return Err(ConfigError::Validation {
                field: "timeout_task_seconds".to_string(),
                message: "timeout must be non-zero".to_string(),
            });
        }

        match self.variant {
            PipelineVariant::Saas => {
                if self.idp_url.as_deref().is_none_or(str::is_empty) {
                    return Err(ConfigError::MissingField("idp_url".to_string()));
                }
            }
            PipelineVariant::OnPrem => {
                if self.username.as_deref().is_none_or(str::is_empty) {
                    return Err(ConfigError::MissingField("username".to_string()));
                }
                if self.api_key.is_none() {
                    return Err(ConfigError::MissingField("api_key".to_string()));
                }
            }
            PipelineVariant::Http | PipelineVariant::Dummy => {}
        }

        if self.enable_trial && (self.trial_api_key.is_none() || self.trial_model_id.is_none()) {
            return Err(ConfigError::Validation {
                field: "enable_trial".to_string(),
                message: "trial_api_key and trial_model_id are required when trials are enabled"
                    .to_string(),
            });
        }

        Ok(())
    }

    /// Trial defaults, iff trials are enabled and fully configured.
    pub fn trial_defaults(&self) -> Option<TrialDefaults> {
        if !self.enable_trial {
            return None;
        }
        Some(TrialDefaults {
            api_key: self.trial_api_key.clone()?,
            model_id: self.trial_model_id.clone()?,
        })
    }

    /// Retry policy derived from the configured retry count.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::with_retry_count(self.retry_count)
    }

    /// Base per-task timeout.
    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_task_seconds)
    }
}
