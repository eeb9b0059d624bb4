use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

use crate::ConfigError;

pub const PACKAGE_CONFIG_FILE: &str = ".yourbase.yml";

/// Image used for targets that do not declare a container.
pub const DEFAULT_CONTAINER_IMAGE: &str = "yourbase/yb_ubuntu:18.04";

/// A package: a directory holding a `.yourbase.yml` file.
#[derive(Debug, Clone, PartialEq)]
pub struct Package {
    pub name: String,
    pub dir: PathBuf,
    pub targets: Vec<BuildTarget>,
}

#[derive(Debug, Deserialize)]
struct PackageFile {
    #[serde(default)]
    build_targets: Vec<BuildTarget>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildTarget {
    pub name: String,
    #[serde(default)]
    pub commands: Vec<String>,
    /// Working directory for the commands, relative to the package directory.
    #[serde(default)]
    pub root: String,
    /// Raw `KEY=VALUE` declarations.
    #[serde(default)]
    pub environment: Vec<String>,
    #[serde(default)]
    pub dependencies: Dependencies,
    #[serde(default)]
    pub container: Option<ContainerDefinition>,
    /// Always build on the host, even when containers are enabled.
    #[serde(default)]
    pub host_only: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dependencies {
    /// Buildpack specs such as `go:1.21.0`.
    #[serde(default)]
    pub build: Vec<String>,
    /// Auxiliary containers, keyed by the name other declarations use to
    /// refer to them.
    #[serde(default)]
    pub containers: BTreeMap<String, ContainerDefinition>,
}

/// A container as declared in the package file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerDefinition {
    pub image: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub ports: Vec<String>,
    #[serde(default)]
    pub mounts: Vec<String>,
    #[serde(default)]
    pub environment: Vec<String>,
    /// Whitespace-separated command line.
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub workdir: Option<String>,
}

impl ContainerDefinition {
    /// Translate to the form the container runtime client consumes.
    ///
    /// Environment entries without `=` are passed with an empty value.
    pub fn to_runtime(&self) -> biome::ContainerDefinition {
        let environment = self
            .environment
            .iter()
            .map(|entry| match entry.split_once('=') {
                Some((k, v)) => (k.to_string(), v.to_string()),
                None => (entry.to_string(), String::new()),
            })
            .collect();
        let command = self
            .command
            .as_deref()
            .map(|c| c.split_whitespace().map(str::to_string).collect::<Vec<_>>())
            .filter(|argv| !argv.is_empty());
        biome::ContainerDefinition {
            image: self.image.clone(),
            mounts: self.mounts.clone(),
            ports: self.ports.clone(),
            environment,
            command,
            work_dir: self.workdir.clone(),
            label: self.label.clone(),
        }
    }
}

impl BuildTarget {
    /// The container this target builds in, falling back to the default image.
    pub fn container_definition(&self) -> ContainerDefinition {
        self.container.clone().unwrap_or_else(|| ContainerDefinition {
            image: DEFAULT_CONTAINER_IMAGE.to_string(),
            ..ContainerDefinition::default()
        })
    }
}

impl Package {
    pub fn target(&self, name: &str) -> Result<&BuildTarget, ConfigError> {
        self.targets
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| ConfigError::TargetNotFound {
                target: name.to_string(),
            })
    }
}

/// Load the package whose configuration file is at `path`.
#[instrument]
pub fn load_package(path: &Path) -> Result<Package, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::PackageNotFound {
            path: path.to_string_lossy().to_string(),
        });
    }
    let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.to_string_lossy().to_string(),
        message: e.to_string(),
    })?;
    let file: PackageFile = serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse {
        path: path.to_string_lossy().to_string(),
        message: e.to_string(),
    })?;

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let dir = fs::canonicalize(&dir).unwrap_or(dir);
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    validate_targets(&file.build_targets)?;
    debug!("Loaded package {} with {} targets", name, file.build_targets.len());
    Ok(Package {
        name,
        dir,
        targets: file.build_targets,
    })
}

/// Search `start` and its ancestors for a package file and load it.
pub fn find_package(start: &Path) -> Result<Package, ConfigError> {
    let mut current = start.to_path_buf();
    loop {
        let candidate = current.join(PACKAGE_CONFIG_FILE);
        if candidate.is_file() {
            return load_package(&candidate);
        }
        if !current.pop() {
            break;
        }
    }
    Err(ConfigError::PackageNotFound {
        path: start.join(PACKAGE_CONFIG_FILE).to_string_lossy().to_string(),
    })
}

fn validate_targets(targets: &[BuildTarget]) -> Result<(), ConfigError> {
    let mut seen = BTreeSet::new();
    for target in targets {
        if target.name.trim().is_empty() {
            return Err(ConfigError::InvalidPackage {
                message: "build target with empty name".to_string(),
            });
        }
        if !seen.insert(target.name.as_str()) {
            return Err(ConfigError::InvalidPackage {
                message: format!("build target {} declared more than once", target.name),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_definition_translates_to_runtime_form() {
        let def = ContainerDefinition {
            image: "postgres:14".to_string(),
            environment: vec!["POSTGRES_PASSWORD=pw".to_string(), "EMPTY".to_string()],
            command: Some("postgres -c fsync=off".to_string()),
            workdir: Some("/data".to_string()),
            ..ContainerDefinition::default()
        };
        let runtime = def.to_runtime();
        assert_eq!(runtime.image, "postgres:14");
        assert_eq!(runtime.environment["POSTGRES_PASSWORD"], "pw");
        assert_eq!(runtime.environment["EMPTY"], "");
        assert_eq!(
            runtime.command,
            Some(vec!["postgres".to_string(), "-c".to_string(), "fsync=off".to_string()])
        );
        assert_eq!(runtime.work_dir.as_deref(), Some("/data"));
    }

    #[test]
    fn blank_command_becomes_none() {
        let def = ContainerDefinition {
            image: "redis".to_string(),
            command: Some("   ".to_string()),
            ..ContainerDefinition::default()
        };
        assert!(def.to_runtime().command.is_none());
    }

    #[test]
    fn target_without_container_uses_default_image() {
        let target = BuildTarget {
            name: "default".to_string(),
            ..BuildTarget::default()
        };
        assert_eq!(target.container_definition().image, DEFAULT_CONTAINER_IMAGE);
    }

    #[test]
    fn duplicate_targets_are_rejected() {
        let t = BuildTarget {
            name: "web".to_string(),
            ..BuildTarget::default()
        };
        let err = validate_targets(&[t.clone(), t]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPackage { .. }));
    }
}
