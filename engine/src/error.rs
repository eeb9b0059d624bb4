use biome::BiomeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("set up environment for target {target}: {source}")]
    Setup {
        target: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("target {target}: {source}")]
    Target {
        target: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("create network: {source}")]
    Network {
        #[source]
        source: BiomeError,
    },

    #[error("write {path}: {source}")]
    Credential {
        path: String,
        #[source]
        source: BiomeError,
    },
}

impl BuildError {
    pub(crate) fn setup(target: &str, source: impl Into<anyhow::Error>) -> Self {
        BuildError::Setup {
            target: target.to_string(),
            source: source.into(),
        }
    }

    pub(crate) fn target(target: &str, source: impl Into<anyhow::Error>) -> Self {
        BuildError::Target {
            target: target.to_string(),
            source: source.into(),
        }
    }
}
