//! Configuration management.
//!
//! Settings come from an optional TOML file plus `UNDL_HARVEST_*` environment
//! overrides (nested keys separated by `__`, e.g.
//! `UNDL_HARVEST_RATE_LIMIT__BACKOFF_SECONDS=60`).
//!
//! # Configuration File Format
//!
//! ```toml
//! [api]
//! endpoint = "https://digitallibrary.un.org/api/v1/search"
//! credentials_path = "../exclude/keys.json"
//! credential_field = "undl_api_key"
//! timeout_seconds = 120
//!
//! [rate_limit]
//! backoff_seconds = 300
//! max_retries = 2
//!
//! [progress]
//! interval = 1000
//!
//! [logging]
//! level = "info"
//! ```

mod credentials;

pub use credentials::{load_api_key, ApiKey, ConfigError, API_KEY_ENV};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::utils::RetryConfig;

/// Environment prefix for overrides
pub const ENV_PREFIX: &str = "UNDL_HARVEST";

/// Config file name searched for by [`find_config_file`]
pub const CONFIG_FILE_NAME: &str = "undl-harvest.toml";

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub progress: ProgressConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Search endpoint and credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// JSON file holding the API token
    #[serde(default = "default_credentials_path")]
    pub credentials_path: PathBuf,

    /// Field of the credential file that carries the token
    #[serde(default = "default_credential_field")]
    pub credential_field: String,

    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            credentials_path: default_credentials_path(),
            credential_field: default_credential_field(),
            timeout_seconds: default_timeout(),
        }
    }
}

fn default_endpoint() -> String {
    "https://digitallibrary.un.org/api/v1/search".to_string()
}

fn default_credentials_path() -> PathBuf {
    PathBuf::from("../exclude/keys.json")
}

fn default_credential_field() -> String {
    "undl_api_key".to_string()
}

fn default_timeout() -> u64 {
    120
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Pause after an HTTP 429
    #[serde(default = "default_backoff")]
    pub backoff_seconds: u64,

    /// Retries after the first rate-limited attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            backoff_seconds: default_backoff(),
            max_retries: default_max_retries(),
        }
    }
}

impl RateLimitConfig {
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::new(self.max_retries, Duration::from_secs(self.backoff_seconds))
    }
}

fn default_backoff() -> u64 {
    300 // 5 minutes
}

fn default_max_retries() -> u32 {
    2
}

/// Progress reporting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressConfig {
    /// Records between two progress reports
    #[serde(default = "default_interval")]
    pub interval: usize,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            interval: default_interval(),
        }
    }
}

fn default_interval() -> usize {
    1000
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// `UNDL_HARVEST_<SECTION>__<KEY>` overrides
fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
}

/// Load configuration from a file, with environment overrides
pub fn load_config(path: &PathBuf) -> Result<Config, config::ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::from(path.as_path()))
        .add_source(environment())
        .build()?;

    settings.try_deserialize()
}

/// Get the configuration from environment overrides and defaults
pub fn get_config() -> Result<Config, config::ConfigError> {
    config::Config::builder()
        .add_source(environment())
        .build()?
        .try_deserialize()
}

/// Look for a config file in the working directory, then the user config directory
pub fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.is_file() {
        return Some(local);
    }

    dirs::config_dir()
        .map(|dir| dir.join("undl-harvest").join("config.toml"))
        .filter(|path| path.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.rate_limit.backoff_seconds, 300);
        assert_eq!(config.progress.interval, 1000);
        assert_eq!(config.api.credential_field, "undl_api_key");
        assert_eq!(
            config.rate_limit.retry_config().backoff,
            Duration::from_secs(300)
        );
    }

    #[test]
    fn test_load_config_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("undl-harvest.toml");
        std::fs::write(
            &path,
            r#"
[api]
endpoint = "http://localhost:8080/search"
credentials_path = "/tmp/keys.json"

[rate_limit]
backoff_seconds = 10
max_retries = 4

[progress]
interval = 50
"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.api.endpoint, "http://localhost:8080/search");
        assert_eq!(config.api.credentials_path, PathBuf::from("/tmp/keys.json"));
        assert_eq!(config.api.timeout_seconds, 120);
        assert_eq!(config.rate_limit.max_retries, 4);
        assert_eq!(config.progress.interval, 50);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_environment_override() {
        std::env::set_var("UNDL_HARVEST_RATE_LIMIT__BACKOFF_SECONDS", "60");
        let config = get_config();
        std::env::remove_var("UNDL_HARVEST_RATE_LIMIT__BACKOFF_SECONDS");

        let config = config.unwrap();
        assert_eq!(config.rate_limit.backoff_seconds, 60);
        assert_eq!(config.rate_limit.max_retries, 2);
    }

    #[test]
    fn test_load_config_nonexistent() {
        let path = PathBuf::from("/nonexistent/undl-harvest.toml");
        assert!(load_config(&path).is_err());
    }
}
