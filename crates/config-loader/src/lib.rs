//! Configuration for yourbase builds: the `.yourbase.yml` package file,
//! buildpack specifications and environment-driven settings.

use thiserror::Error;

pub mod buildpack;
pub mod package;
pub mod secrets;
pub mod settings;

pub use buildpack::BuildpackSpec;
pub use package::{
    find_package, load_package, BuildTarget, ContainerDefinition, Dependencies, Package,
    DEFAULT_CONTAINER_IMAGE, PACKAGE_CONFIG_FILE,
};
pub use secrets::{EnvFileSecretProvider, SecretError, SecretProvider};
pub use settings::BuildConfig;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Package file not found: {path}")]
    PackageNotFound { path: String },

    #[error("IO error: {path}: {message}")]
    Io { path: String, message: String },

    #[error("Failed to parse {path}: {message}")]
    Parse { path: String, message: String },

    #[error("Invalid package: {message}")]
    InvalidPackage { message: String },

    #[error("No such target: {target}")]
    TargetNotFound { target: String },

    #[error("Invalid buildpack spec {spec:?}: {message}")]
    InvalidBuildpackSpec { spec: String, message: String },

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Secret resolution failed: {error}")]
    SecretResolutionFailed { error: SecretError },
}
