//! API token loading.

use std::path::{Path, PathBuf};

/// Environment variable that overrides the credential file
pub const API_KEY_ENV: &str = "UNDL_API_KEY";

/// Search API token. Never printed in full.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The raw token, for the `Authorization` header
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// Configuration errors; fatal before any request is made
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Credential file not found at {0}")]
    CredentialsNotFound(PathBuf),

    #[error("IO error reading {path}: {message}")]
    Io { path: PathBuf, message: String },

    #[error("Invalid credential file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Credential file {path} has no string field '{field}'")]
    MissingKey { path: PathBuf, field: String },

    #[error("Configuration error: {0}")]
    Settings(#[from] config::ConfigError),
}

/// Read the token stored under `field` in a JSON credential file
pub fn load_api_key(path: &Path, field: &str) -> Result<ApiKey, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ConfigError::CredentialsNotFound(path.to_path_buf())
        } else {
            ConfigError::Io {
                path: path.to_path_buf(),
                message: e.to_string(),
            }
        }
    })?;

    let credentials: serde_json::Value =
        serde_json::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    credentials
        .get(field)
        .and_then(|v| v.as_str())
        .map(ApiKey::new)
        .ok_or_else(|| ConfigError::MissingKey {
            path: path.to_path_buf(),
            field: field.to_string(),
        })
}

impl ApiKey {
    /// Token from `UNDL_API_KEY` if set, otherwise from the credential file
    pub fn resolve(path: &Path, field: &str) -> Result<Self, ConfigError> {
        match std::env::var(API_KEY_ENV) {
            Ok(key) if !key.trim().is_empty() => Ok(ApiKey::new(key.trim())),
            _ => load_api_key(path, field),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_load_api_key() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("keys.json");
        std::fs::write(&path, r#"{"undl_api_key": "abc123", "other": 1}"#).unwrap();

        let key = load_api_key(&path, "undl_api_key").unwrap();
        assert_eq!(key.expose(), "abc123");
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.json");

        assert!(matches!(
            load_api_key(&path, "undl_api_key"),
            Err(ConfigError::CredentialsNotFound(_))
        ));
    }

    #[test]
    fn test_missing_or_non_string_field() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("keys.json");
        std::fs::write(&path, r#"{"undl_api_key": 42}"#).unwrap();

        assert!(matches!(
            load_api_key(&path, "undl_api_key"),
            Err(ConfigError::MissingKey { .. })
        ));
        assert!(matches!(
            load_api_key(&path, "other_key"),
            Err(ConfigError::MissingKey { .. })
        ));
    }

    #[test]
    fn test_invalid_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("keys.json");
        std::fs::write(&path, "undl_api_key = abc").unwrap();

        assert!(matches!(
            load_api_key(&path, "undl_api_key"),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_debug_hides_token() {
        let key = ApiKey::new("super-secret");
        assert_eq!(format!("{:?}", key), "ApiKey(***)");
    }
}
