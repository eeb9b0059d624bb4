use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

use crate::secrets::{EnvFileSecretProvider, SecretError, SecretProvider};
use crate::ConfigError;

pub const GITHUB_TOKEN_VAR: &str = "YB_GH_TOKEN";
pub const CONTAINER_RUNTIME_VAR: &str = "YB_CONTAINER_RUNTIME";
pub const DATA_DIR_VAR: &str = "YB_DATA_DIR";
pub const NO_CONTAINER_VAR: &str = "YB_NO_CONTAINER";
pub const TINI_URL_VAR: &str = "YB_TINI_URL";
pub const CONTAINER_USER_VAR: &str = "YB_CONTAINER_USER";
pub const COMMAND_TIMEOUT_VAR: &str = "YB_COMMAND_TIMEOUT";

/// Process-wide build settings.
#[derive(Clone, PartialEq, Eq)]
pub struct BuildConfig {
    /// Token for authenticated fetches from GitHub. `None` when unset or empty.
    pub github_token: Option<String>,
    pub container_runtime: String,
    /// `uid:gid` for build containers; the invoking user when `None`.
    pub container_user: Option<String>,
    pub data_dir: PathBuf,
    pub no_container: bool,
    pub tini_url: Option<String>,
    pub command_timeout: Option<Duration>,
}

impl std::fmt::Debug for BuildConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildConfig")
            .field("github_token", &self.github_token.as_ref().map(|_| "***"))
            .field("container_runtime", &self.container_runtime)
            .field("container_user", &self.container_user)
            .field("data_dir", &self.data_dir)
            .field("no_container", &self.no_container)
            .field("tini_url", &self.tini_url)
            .field("command_timeout", &self.command_timeout)
            .finish()
    }
}

impl BuildConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_with(&EnvFileSecretProvider::new())
    }

    pub fn from_env_with<P: SecretProvider + ?Sized>(provider: &P) -> Result<Self, ConfigError> {
        let github_token = match provider.resolve(GITHUB_TOKEN_VAR) {
            Ok(token) if !token.is_empty() => Some(token),
            Ok(_) | Err(SecretError::SecretNotFound { .. }) => None,
            Err(error) => return Err(ConfigError::SecretResolutionFailed { error }),
        };

        let container_runtime = non_empty(CONTAINER_RUNTIME_VAR).unwrap_or_else(|| "docker".to_string());

        let data_dir = match non_empty(DATA_DIR_VAR) {
            Some(dir) => PathBuf::from(dir),
            None => default_data_dir()?,
        };

        let no_container = match non_empty(NO_CONTAINER_VAR) {
            Some(value) => parse_bool(NO_CONTAINER_VAR, &value)?,
            None => false,
        };

        let command_timeout = non_empty(COMMAND_TIMEOUT_VAR)
            .map(|value| {
                humantime::parse_duration(&value).map_err(|e| ConfigError::InvalidValue {
                    key: COMMAND_TIMEOUT_VAR.to_string(),
                    message: e.to_string(),
                })
            })
            .transpose()?;

        let config = Self {
            github_token,
            container_runtime,
            container_user: non_empty(CONTAINER_USER_VAR),
            data_dir,
            no_container,
            tini_url: non_empty(TINI_URL_VAR),
            command_timeout,
        };
        debug!("Build configuration: {:?}", config);
        Ok(config)
    }
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected a boolean, got {:?}", value),
        }),
    }
}

fn default_data_dir() -> Result<PathBuf, ConfigError> {
    dirs::data_dir()
        .map(|d| d.join("yourbase"))
        .ok_or_else(|| ConfigError::InvalidValue {
            key: DATA_DIR_VAR.to_string(),
            message: "no platform data directory; set YB_DATA_DIR".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_values() {
        assert!(parse_bool("K", "YES").unwrap());
        assert!(!parse_bool("K", "0").unwrap());
        assert!(parse_bool("K", "maybe").is_err());
    }

    #[test]
    fn debug_redacts_token() {
        let config = BuildConfig {
            github_token: Some("abc123".to_string()),
            container_runtime: "docker".to_string(),
            container_user: None,
            data_dir: PathBuf::from("/tmp/yb"),
            no_container: false,
            tini_url: None,
            command_timeout: None,
        };
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("abc123"));
        assert!(rendered.contains("***"));
    }
}
