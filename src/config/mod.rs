//! Configuration module for the batch uploader
//!
//! Handles loading and parsing of YAML configuration files with support for
//! environment variable expansion and validation.

use crate::s3::{Credentials, DEFAULT_ENDPOINT_TEMPLATE};
use crate::upload::DEFAULT_ACL;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

// ============================================================================
// Environment Variable Expansion
// ============================================================================

/// Expand environment variables in a string.
///
/// Supports two syntaxes:
/// - `${VAR_NAME}` - Simple expansion, keeps placeholder if var not found
/// - `${VAR_NAME:-default}` - Expansion with default value (may be empty)
///
/// Variable names must start with a letter or underscore and contain only
/// uppercase letters, digits, and underscores.
pub(crate) fn expand_env_vars(s: &str) -> String {
    let re = match regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}") {
        Ok(re) => re,
        Err(_) => return s.to_string(),
    };
    let mut last_match = 0;
    let mut result = String::with_capacity(s.len());

    for cap in re.captures_iter(s) {
        let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
            continue;
        };

        // Append the text before the match
        result.push_str(&s[last_match..full_match.start()]);

        let value = match std::env::var(var_name.as_str()) {
            Ok(val) => val,
            Err(_) => match cap.get(2) {
                Some(default) => default.as_str().to_string(),
                // No env var and no default. Keep the original placeholder.
                None => full_match.as_str().to_string(),
            },
        };
        result.push_str(&value);

        last_match = full_match.end();
    }

    result.push_str(&s[last_match..]);
    result
}

// ============================================================================
// Validation Helpers
// ============================================================================

/// Validate that a URL starts with http:// or https://
fn is_valid_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub uploader: UploaderConfig,
    pub credentials: CredentialsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Config {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        ConfigLoader::load(path)
    }

    /// Parse and validate configuration from a YAML string
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        ConfigLoader::parse(content)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let uploader = &self.uploader;

        if uploader.default_acl.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "default_acl cannot be empty".into(),
            ));
        }

        if !is_valid_http_url(&uploader.endpoint_template) {
            return Err(ConfigError::ValidationError(
                "Invalid endpoint_template: must start with http:// or https://".into(),
            ));
        }

        if !uploader.endpoint_template.contains("{bucket}") {
            return Err(ConfigError::ValidationError(
                "Invalid endpoint_template: must contain '{bucket}'".into(),
            ));
        }

        if uploader.connect_timeout_secs == 0 || uploader.request_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "Timeouts must be greater than zero".into(),
            ));
        }

        if uploader.callback_thread_name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "callback_thread_name cannot be empty".into(),
            ));
        }

        match (&self.credentials.url, &self.credentials.static_credentials) {
            (Some(url), None) => {
                if !is_valid_http_url(url) {
                    return Err(ConfigError::ValidationError(
                        "Invalid credentials url: must start with http:// or https://".into(),
                    ));
                }
            }
            (None, Some(credentials)) => {
                credentials
                    .validate()
                    .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
            }
            (Some(_), Some(_)) => {
                return Err(ConfigError::ValidationError(
                    "Configure either credentials.url or credentials.static, not both".into(),
                ))
            }
            (None, None) => {
                return Err(ConfigError::ValidationError(
                    "One of credentials.url or credentials.static must be configured".into(),
                ))
            }
        }

        match self.logging.format.as_str() {
            "json" | "pretty" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log format '{}': must be 'json' or 'pretty'",
                    other
                )))
            }
        }

        Ok(())
    }
}

/// Upload behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploaderConfig {
    /// ACL used when a batch does not specify one. Default: "public-read"
    #[serde(default = "default_acl")]
    pub default_acl: String,

    /// Upload endpoint; `{bucket}` is replaced with the credentials bucket.
    /// Default: "https://{bucket}.s3.amazonaws.com"
    #[serde(default = "default_endpoint_template")]
    pub endpoint_template: String,

    /// Default: 60
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Whole-request timeout covering write and read. Default: 480
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Name of the thread listener callbacks run on. Default: "upload-callbacks"
    #[serde(default = "default_callback_thread_name")]
    pub callback_thread_name: String,
}

impl UploaderConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            default_acl: default_acl(),
            endpoint_template: default_endpoint_template(),
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: default_request_timeout(),
            callback_thread_name: default_callback_thread_name(),
        }
    }
}

fn default_acl() -> String {
    DEFAULT_ACL.to_string()
}

fn default_endpoint_template() -> String {
    DEFAULT_ENDPOINT_TEMPLATE.to_string()
}

fn default_connect_timeout() -> u64 {
    60
}

fn default_request_timeout() -> u64 {
    480
}

fn default_callback_thread_name() -> String {
    "upload-callbacks".to_string()
}

/// Where per-batch credentials come from
///
/// # Example
///
/// ```yaml
/// credentials:
///   url: "${CREDENTIALS_URL}"
///   bearer_token: "${CREDENTIALS_TOKEN:-}"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialsConfig {
    /// Credentials service endpoint
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub bearer_token: Option<String>,

    /// Fixed bundle, mostly for testing
    #[serde(default, rename = "static")]
    pub static_credentials: Option<Credentials>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is not set. Default: "info"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// "json" or "pretty". Default: "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
        }
    }
}

fn default_metrics_enabled() -> bool {
    true
}
