//! Environment variables and the environment overlay decorator.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::close::{BiomeCloser, Teardown};
use crate::{Biome, BiomeError, Context, Descriptor, Dirs, Invocation};

static ENV_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid env key regex"));

static CONTAINER_IP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\{\{\s*\.Containers\.IP\s+"([^"]+)"\s*\}\}"#).expect("valid placeholder regex")
});

/// A set of environment variables plus PATH adjustments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    #[serde(default)]
    pub vars: BTreeMap<String, String>,
    #[serde(default, rename = "prependPath")]
    pub prepend_path: Vec<String>,
    #[serde(default, rename = "appendPath")]
    pub append_path: Vec<String>,
}

impl Environment {
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: vars
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty() && self.prepend_path.is_empty() && self.append_path.is_empty()
    }

    /// Layer `other` on top of `self`; `other` wins on variable conflicts.
    pub fn merge(&self, other: &Environment) -> Environment {
        let mut vars = self.vars.clone();
        vars.extend(other.vars.iter().map(|(k, v)| (k.clone(), v.clone())));

        let mut prepend_path = other.prepend_path.clone();
        prepend_path.extend(self.prepend_path.iter().cloned());

        let mut append_path = self.append_path.clone();
        append_path.extend(other.append_path.iter().cloned());

        Environment {
            vars,
            prepend_path,
            append_path,
        }
    }

    /// Compute PATH from `base` (unless PATH is set explicitly) and the
    /// prepend/append lists. Returns `None` when nothing would change.
    pub fn path_value(&self, base: &str, separator: char) -> Option<String> {
        let explicit = self.vars.get("PATH");
        if explicit.is_none() && self.prepend_path.is_empty() && self.append_path.is_empty() {
            return None;
        }
        let base = explicit.map(String::as_str).unwrap_or(base);
        let parts: Vec<&str> = self
            .prepend_path
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(base).filter(|b| !b.is_empty()))
            .chain(self.append_path.iter().map(String::as_str))
            .collect();
        Some(parts.join(&separator.to_string()))
    }
}

/// Decorates a biome with extra environment variables.
///
/// Commands run through the overlay see the wrapped biome's environment plus
/// these variables; an invocation's own variables still take precedence.
pub struct EnvBiome {
    inner: Box<dyn BiomeCloser>,
    env: Environment,
}

impl EnvBiome {
    pub fn new(inner: Box<dyn BiomeCloser>, env: Environment) -> Self {
        Self { inner, env }
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }
}

/// Wrap `bio` in an overlay, boxing the result for further decoration.
pub fn with_env(bio: Box<dyn BiomeCloser>, env: Environment) -> Box<dyn BiomeCloser> {
    Box::new(EnvBiome::new(bio, env))
}

impl Biome for EnvBiome {
    fn describe(&self) -> Descriptor {
        self.inner.describe()
    }

    fn dirs(&self) -> &Dirs {
        self.inner.dirs()
    }

    fn join_path(&self, parts: &[&str]) -> String {
        self.inner.join_path(parts)
    }

    fn run(&self, ctx: &Context, mut invocation: Invocation<'_>) -> Result<(), BiomeError> {
        invocation.env = self.env.merge(&invocation.env);
        self.inner.run(ctx, invocation)
    }

    fn write_file(&self, ctx: &Context, path: &str, data: &[u8]) -> Result<(), BiomeError> {
        self.inner.write_file(ctx, path, data)
    }

    fn environment(&self) -> Environment {
        self.inner.environment().merge(&self.env)
    }
}

impl BiomeCloser for EnvBiome {
    fn close(&self) -> Teardown {
        self.inner.close()
    }
}

/// Validated `KEY=VALUE` declarations whose values may reference auxiliary
/// containers with `{{ .Containers.IP "name" }}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvTemplate {
    vars: BTreeMap<String, String>,
}

/// Parse raw environment declarations into a template.
pub fn map_vars<S: AsRef<str>>(decls: &[S]) -> Result<EnvTemplate, BiomeError> {
    let mut vars = BTreeMap::new();
    for decl in decls {
        let decl = decl.as_ref();
        let (key, value) = decl.split_once('=').ok_or_else(|| BiomeError::InvalidEnv {
            message: format!("{:?} is not of the form KEY=VALUE", decl),
        })?;
        if !ENV_KEY.is_match(key) {
            return Err(BiomeError::InvalidEnv {
                message: format!("invalid variable name {:?}", key),
            });
        }
        let remainder = CONTAINER_IP.replace_all(value, "");
        if remainder.contains("{{") || remainder.contains("}}") {
            return Err(BiomeError::InvalidEnv {
                message: format!("{}: unsupported template expression in {:?}", key, value),
            });
        }
        if vars.insert(key.to_string(), value.to_string()).is_some() {
            return Err(BiomeError::InvalidEnv {
                message: format!("{} declared more than once", key),
            });
        }
    }
    Ok(EnvTemplate { vars })
}

impl EnvTemplate {
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn vars(&self) -> &BTreeMap<String, String> {
        &self.vars
    }

    /// Names of the containers referenced by any value, sorted and deduplicated.
    pub fn referenced_containers(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .vars
            .values()
            .flat_map(|v| CONTAINER_IP.captures_iter(v))
            .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Resolve placeholders using `container_ip`.
    pub fn expand<F>(&self, container_ip: F) -> Result<Environment, BiomeError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut vars = BTreeMap::new();
        for (key, raw) in &self.vars {
            let mut missing = None;
            let value = CONTAINER_IP.replace_all(raw, |caps: &regex::Captures<'_>| {
                let name = &caps[1];
                container_ip(name).unwrap_or_else(|| {
                    missing.get_or_insert_with(|| name.to_string());
                    String::new()
                })
            });
            if let Some(name) = missing {
                return Err(BiomeError::InvalidEnv {
                    message: format!("{}: no address for container {:?}", key, name),
                });
            }
            vars.insert(key.clone(), value.into_owned());
        }
        Ok(Environment {
            vars,
            ..Environment::default()
        })
    }
}
