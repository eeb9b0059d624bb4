//! Biomes backed by a running container.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use crate::close::{BiomeCloser, Teardown};
use crate::env::Environment;
use crate::{Biome, BiomeError, Context, Descriptor, Dirs, Invocation, Sink};

/// Minimal init used as the entrypoint of every build container.
pub const TINI_URL: &str = "https://github.com/krallin/tini/releases/download/v0.19.0/tini-static-amd64";

pub const PACKAGE_MOUNT: &str = "/workspace";
pub const HOME_MOUNT: &str = "/home/yourbase";
pub const TOOLS_DIR: &str = "/opt/yourbase/tools";
pub const INIT_MOUNT: &str = "/tini";

const DEFAULT_PATH: &str = "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

/// Runtime description of a container, as understood by the container client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerDefinition {
    pub image: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mounts: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
    #[serde(default, rename = "workDir", skip_serializing_if = "Option::is_none")]
    pub work_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Everything needed to start a build container.
pub struct ContainerOptions<'a> {
    pub package_dir: &'a Path,
    pub home_dir: &'a Path,
    pub init_exe: &'a Path,
    pub definition: &'a ContainerDefinition,
    /// Network the container joins; empty for the runtime default.
    pub network_id: &'a str,
    /// Receives output of the image pull so the operator can follow it.
    pub pull_output: &'a mut dyn Write,
}

/// A command to execute inside a running container. The output sink has its
/// own lifetime so a caller's sink can be forwarded as is.
pub struct ExecRequest<'a, 'o> {
    pub container_id: &'a str,
    pub argv: &'a [String],
    pub dir: &'a str,
    pub env: &'a BTreeMap<String, String>,
    pub stdin: Option<&'a [u8]>,
    pub output: Sink<'o>,
}

/// Boundary to the container runtime. Implementations must be thread-safe;
/// biomes for different targets share one client.
pub trait ContainerClient: Send + Sync {
    fn name(&self) -> &str;

    fn create_network(&self, ctx: &Context, name: &str, driver: &str) -> Result<String, BiomeError>;

    fn remove_network(&self, ctx: &Context, id: &str) -> Result<(), BiomeError>;

    /// Pull, create and start a container, returning its ID. A container
    /// that was created but failed to start is removed before returning.
    fn create_container(
        &self,
        ctx: &Context,
        opts: ContainerOptions<'_>,
    ) -> Result<String, BiomeError>;

    /// Run a command inside a container; non-zero exit is an error.
    fn exec(&self, ctx: &Context, request: ExecRequest<'_, '_>) -> Result<(), BiomeError>;

    fn remove_container(&self, ctx: &Context, id: &str) -> Result<(), BiomeError>;
}

/// Runs commands inside a running container.
pub struct Container {
    client: Arc<dyn ContainerClient>,
    id: String,
    dirs: Dirs,
}

/// Start a container for a build and return it as a biome.
pub fn create_container(
    ctx: &Context,
    client: Arc<dyn ContainerClient>,
    opts: ContainerOptions<'_>,
) -> Result<Container, BiomeError> {
    let image = opts.definition.image.clone();
    let id = client.create_container(ctx, opts)?;
    tracing::debug!(container = %id, image = %image, "container started");
    Ok(Container {
        client,
        id,
        dirs: Dirs {
            package: PACKAGE_MOUNT.to_string(),
            home: HOME_MOUNT.to_string(),
            tools: TOOLS_DIR.to_string(),
        },
    })
}

impl Container {
    pub fn id(&self) -> &str {
        &self.id
    }

    fn resolve_dir(&self, dir: Option<&str>) -> String {
        match dir {
            None => self.dirs.package.clone(),
            Some(d) if d.starts_with('/') => d.to_string(),
            Some(d) => self.join_path(&[self.dirs.package.as_str(), d]),
        }
    }
}

impl Biome for Container {
    fn describe(&self) -> Descriptor {
        Descriptor::container()
    }

    fn dirs(&self) -> &Dirs {
        &self.dirs
    }

    fn join_path(&self, parts: &[&str]) -> String {
        join_posix(parts)
    }

    fn run(&self, ctx: &Context, invocation: Invocation<'_>) -> Result<(), BiomeError> {
        if invocation.argv.is_empty() {
            return Err(BiomeError::EmptyArgv);
        }
        let mut env = invocation.env.vars.clone();
        env.insert("HOME".to_string(), self.dirs.home.clone());
        if let Some(path) = invocation.env.path_value(DEFAULT_PATH, ':') {
            env.insert("PATH".to_string(), path);
        }
        let dir = self.resolve_dir(invocation.dir.as_deref());
        self.client.exec(
            ctx,
            ExecRequest {
                container_id: &self.id,
                argv: &invocation.argv,
                dir: &dir,
                env: &env,
                stdin: invocation.stdin,
                output: invocation.output,
            },
        )
    }

    fn environment(&self) -> Environment {
        Environment::default()
    }
}

impl BiomeCloser for Container {
    fn close(&self) -> Teardown {
        let mut teardown = Teardown::clean();
        let ctx = Context::teardown();
        tracing::debug!(container = %self.id, "removing container");
        if let Err(err) = self.client.remove_container(&ctx, &self.id) {
            teardown.warn(format!("remove container {}", self.id), err);
        }
        teardown
    }
}

/// Join path segments with `/`, collapsing duplicate separators.
pub fn join_posix(parts: &[&str]) -> String {
    let mut out = String::new();
    for part in parts.iter().filter(|p| !p.is_empty()) {
        if part.starts_with('/') {
            out = part.trim_end_matches('/').to_string();
            if out.is_empty() {
                out.push('/');
            }
            continue;
        }
        if !out.is_empty() && !out.ends_with('/') {
            out.push('/');
        }
        out.push_str(part.trim_end_matches('/'));
    }
    out
}
