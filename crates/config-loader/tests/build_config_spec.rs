use config_loader::secrets::SECRETS_FILE_VAR;
use config_loader::settings::{
    COMMAND_TIMEOUT_VAR, CONTAINER_RUNTIME_VAR, CONTAINER_USER_VAR, DATA_DIR_VAR,
    GITHUB_TOKEN_VAR, NO_CONTAINER_VAR, TINI_URL_VAR,
};
use config_loader::{BuildConfig, ConfigError, EnvFileSecretProvider, SecretError};
use serial_test::serial;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

fn clear_env() {
    for key in [
        GITHUB_TOKEN_VAR,
        CONTAINER_RUNTIME_VAR,
        DATA_DIR_VAR,
        NO_CONTAINER_VAR,
        TINI_URL_VAR,
        COMMAND_TIMEOUT_VAR,
        CONTAINER_USER_VAR,
        SECRETS_FILE_VAR,
    ] {
        env::remove_var(key);
    }
}

#[test]
#[serial]
fn defaults_when_environment_is_empty() {
    clear_env();
    env::set_var(DATA_DIR_VAR, "/tmp/yb-data");

    let config = BuildConfig::from_env().unwrap();
    assert_eq!(config.github_token, None);
    assert_eq!(config.container_runtime, "docker");
    assert_eq!(config.container_user, None);
    assert_eq!(config.data_dir, PathBuf::from("/tmp/yb-data"));
    assert!(!config.no_container);
    assert_eq!(config.tini_url, None);
    assert_eq!(config.command_timeout, None);
    clear_env();
}

#[test]
#[serial]
fn reads_every_setting() {
    clear_env();
    env::set_var(GITHUB_TOKEN_VAR, "abc123");
    env::set_var(CONTAINER_RUNTIME_VAR, "podman");
    env::set_var(CONTAINER_USER_VAR, "1000:1000");
    env::set_var(DATA_DIR_VAR, "/srv/yb");
    env::set_var(NO_CONTAINER_VAR, "true");
    env::set_var(TINI_URL_VAR, "http://mirror.local/tini");
    env::set_var(COMMAND_TIMEOUT_VAR, "10m");

    let config = BuildConfig::from_env().unwrap();
    assert_eq!(config.github_token.as_deref(), Some("abc123"));
    assert_eq!(config.container_runtime, "podman");
    assert_eq!(config.container_user.as_deref(), Some("1000:1000"));
    assert_eq!(config.data_dir, PathBuf::from("/srv/yb"));
    assert!(config.no_container);
    assert_eq!(config.tini_url.as_deref(), Some("http://mirror.local/tini"));
    assert_eq!(config.command_timeout, Some(Duration::from_secs(600)));
    clear_env();
}

#[test]
#[serial]
fn empty_token_counts_as_absent() {
    clear_env();
    env::set_var(GITHUB_TOKEN_VAR, "");
    env::set_var(DATA_DIR_VAR, "/tmp/yb-data");
    let config = BuildConfig::from_env().unwrap();
    assert_eq!(config.github_token, None);
    clear_env();
}

#[test]
#[serial]
fn bad_timeout_is_rejected() {
    clear_env();
    env::set_var(DATA_DIR_VAR, "/tmp/yb-data");
    env::set_var(COMMAND_TIMEOUT_VAR, "soon");
    let err = BuildConfig::from_env().unwrap_err();
    assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == COMMAND_TIMEOUT_VAR));
    clear_env();
}

#[test]
#[serial]
fn token_is_read_from_secrets_file() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("secrets.json");
    std::fs::write(&path, r#"{"YB_GH_TOKEN": "from-file"}"#).unwrap();
    env::set_var(DATA_DIR_VAR, "/tmp/yb-data");
    env::set_var(SECRETS_FILE_VAR, &path);

    let config = BuildConfig::from_env().unwrap();
    assert_eq!(config.github_token.as_deref(), Some("from-file"));
    clear_env();
}

#[test]
#[serial]
fn broken_secrets_file_fails_instead_of_dropping_the_token() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("secrets.json");
    std::fs::write(&path, "not json").unwrap();
    env::set_var(DATA_DIR_VAR, "/tmp/yb-data");

    let err = BuildConfig::from_env_with(&EnvFileSecretProvider::with_secrets_file(&path))
        .unwrap_err();
    assert!(matches!(
        err,
        ConfigError::SecretResolutionFailed {
            error: SecretError::SecretsParseError { .. }
        }
    ));

    let err = BuildConfig::from_env_with(&EnvFileSecretProvider::with_secrets_file(
        "/nonexistent/secrets.json",
    ))
    .unwrap_err();
    assert!(matches!(
        err,
        ConfigError::SecretResolutionFailed {
            error: SecretError::SecretsFileError { .. }
        }
    ));
    clear_env();
}
