use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ConfigError;

static NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.-]+$").expect("valid buildpack name regex"));

/// A build-time tool requirement such as `python:3.9.2`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BuildpackSpec {
    pub name: String,
    pub version: String,
}

impl BuildpackSpec {
    pub fn parse(spec: &str) -> Result<Self, ConfigError> {
        let invalid = |message: &str| ConfigError::InvalidBuildpackSpec {
            spec: spec.to_string(),
            message: message.to_string(),
        };

        let (name, version) = spec
            .split_once(':')
            .ok_or_else(|| invalid("expected <name>:<version>"))?;
        let (name, version) = (name.trim(), version.trim());
        if name.is_empty() {
            return Err(invalid("empty name"));
        }
        if version.is_empty() {
            return Err(invalid("empty version"));
        }
        if !NAME.is_match(name) {
            return Err(invalid("name may only contain letters, digits, '.', '_' and '-'"));
        }
        Ok(Self {
            name: name.to_string(),
            version: version.to_string(),
        })
    }
}

impl FromStr for BuildpackSpec {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for BuildpackSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.version)
    }
}
