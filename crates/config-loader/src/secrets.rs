use once_cell::sync::OnceCell;
use serde_json::Value;
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, warn};

/// Names the JSON secrets file consulted after the environment.
pub const SECRETS_FILE_VAR: &str = "YB_SECRETS_FILE";

#[derive(Error, Debug, Clone)]
pub enum SecretError {
    #[error("Secret not found: {name}")]
    SecretNotFound { name: String },

    #[error("Failed to read secrets file: {path} - {message}")]
    SecretsFileError { path: String, message: String },

    #[error("Failed to parse secrets file: {message}")]
    SecretsParseError { message: String },
}

/// Source of credentials handed to builds.
pub trait SecretProvider: Send + Sync {
    fn resolve(&self, name: &str) -> Result<String, SecretError>;
}

/// Resolves secrets from environment variables, then from a flat JSON
/// object file (`{"YB_GH_TOKEN": "..."}`) named by `YB_SECRETS_FILE`.
pub struct EnvFileSecretProvider {
    secrets_file_path: Option<PathBuf>,
    cached_secrets: OnceCell<Result<HashMap<String, String>, SecretError>>,
}

impl EnvFileSecretProvider {
    pub fn new() -> Self {
        Self {
            secrets_file_path: env::var(SECRETS_FILE_VAR)
                .ok()
                .filter(|p| !p.is_empty())
                .map(PathBuf::from),
            cached_secrets: OnceCell::new(),
        }
    }

    pub fn with_secrets_file<P: Into<PathBuf>>(secrets_file_path: P) -> Self {
        Self {
            secrets_file_path: Some(secrets_file_path.into()),
            cached_secrets: OnceCell::new(),
        }
    }

    fn load_secrets_from_file(&self) -> Result<HashMap<String, String>, SecretError> {
        let Some(path) = &self.secrets_file_path else {
            return Ok(HashMap::new());
        };
        debug!("Loading secrets from file: {:?}", path);

        let content = fs::read_to_string(path).map_err(|e| SecretError::SecretsFileError {
            path: path.to_string_lossy().to_string(),
            message: e.to_string(),
        })?;
        let parsed: Value =
            serde_json::from_str(&content).map_err(|e| SecretError::SecretsParseError {
                message: e.to_string(),
            })?;
        let obj = parsed
            .as_object()
            .ok_or_else(|| SecretError::SecretsParseError {
                message: "expected a JSON object".to_string(),
            })?;

        let mut secrets = HashMap::new();
        for (name, value) in obj {
            match value.as_str() {
                Some(s) => {
                    secrets.insert(name.clone(), s.to_string());
                }
                None => warn!("Ignoring non-string value for {} in secrets file", name),
            }
        }
        Ok(secrets)
    }

    /// File contents, loaded once. A configured file that cannot be read or
    /// parsed is an error on every lookup that reaches it.
    fn get_cached_secrets(&self) -> Result<&HashMap<String, String>, SecretError> {
        self.cached_secrets
            .get_or_init(|| self.load_secrets_from_file())
            .as_ref()
            .map_err(Clone::clone)
    }
}

impl SecretProvider for EnvFileSecretProvider {
    fn resolve(&self, name: &str) -> Result<String, SecretError> {
        if let Ok(value) = env::var(name) {
            if !value.is_empty() {
                debug!("Resolved secret {} from environment", name);
                return Ok(value);
            }
        }

        if let Some(value) = self.get_cached_secrets()?.get(name) {
            debug!("Resolved secret {} from secrets file", name);
            return Ok(value.clone());
        }

        Err(SecretError::SecretNotFound {
            name: name.to_string(),
        })
    }
}

impl Default for EnvFileSecretProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn environment_wins_over_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secrets.json");
        fs::write(&path, r#"{"YB_TEST_SECRET_A": "from-file"}"#).unwrap();

        env::set_var("YB_TEST_SECRET_A", "from-env");
        let provider = EnvFileSecretProvider::with_secrets_file(&path);
        assert_eq!(provider.resolve("YB_TEST_SECRET_A").unwrap(), "from-env");
        env::remove_var("YB_TEST_SECRET_A");
    }

    #[test]
    #[serial]
    fn file_is_consulted_when_env_is_unset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secrets.json");
        fs::write(&path, r#"{"YB_TEST_SECRET_B": "from-file", "N": 3}"#).unwrap();

        env::remove_var("YB_TEST_SECRET_B");
        let provider = EnvFileSecretProvider::with_secrets_file(&path);
        assert_eq!(provider.resolve("YB_TEST_SECRET_B").unwrap(), "from-file");
        assert!(matches!(
            provider.resolve("N"),
            Err(SecretError::SecretNotFound { .. })
        ));
    }

    #[test]
    #[serial]
    fn unreadable_file_is_reported() {
        env::remove_var("YB_TEST_SECRET_C");
        let provider = EnvFileSecretProvider::with_secrets_file("/nonexistent/secrets.json");
        assert!(matches!(
            provider.resolve("YB_TEST_SECRET_C"),
            Err(SecretError::SecretsFileError { .. })
        ));
    }

    #[test]
    #[serial]
    fn malformed_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secrets.json");
        fs::write(&path, "YB_TEST_SECRET_D=abc").unwrap();

        env::remove_var("YB_TEST_SECRET_D");
        let provider = EnvFileSecretProvider::with_secrets_file(&path);
        assert!(matches!(
            provider.resolve("YB_TEST_SECRET_D"),
            Err(SecretError::SecretsParseError { .. })
        ));
    }

    #[test]
    #[serial]
    fn no_configured_file_means_not_found() {
        env::remove_var(SECRETS_FILE_VAR);
        env::remove_var("YB_TEST_SECRET_E");
        let provider = EnvFileSecretProvider::new();
        assert!(matches!(
            provider.resolve("YB_TEST_SECRET_E"),
            Err(SecretError::SecretNotFound { .. })
        ));
    }
}
