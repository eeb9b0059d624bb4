//! Execution environments ("biomes") for build commands.
//!
//! A biome is either the host ([`local::Local`]) or a running container
//! ([`container::Container`]). Cross-cutting concerns are layered on as
//! decorators that implement the same [`Biome`] trait: [`env::EnvBiome`]
//! adds environment variables and [`close::WithClose`] adds teardown actions.

use serde::{Deserialize, Serialize};
use std::io::Write;

pub mod close;
pub mod container;
pub mod context;
pub mod docker;
pub mod env;
pub mod local;
mod error;
mod process;
mod run;

pub use close::{with_close, Advisory, BiomeCloser, Teardown, WithClose};
pub use container::{
    create_container, Container, ContainerClient, ContainerDefinition, ContainerOptions,
    ExecRequest,
};
pub use context::{CancelHandle, Context};
pub use docker::DockerCli;
pub use env::{map_vars, with_env, EnvBiome, EnvTemplate, Environment};
pub use error::BiomeError;
pub use local::Local;
pub use run::run_command;

/// Well-known directories of a biome, expressed as paths inside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dirs {
    pub package: String,
    pub home: String,
    pub tools: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BiomeKind {
    Local,
    Container,
}

/// Identifies the kind of machine a biome runs commands on. Used to key
/// per-target home directories.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Descriptor {
    pub kind: BiomeKind,
    pub os: String,
    pub arch: String,
}

impl Descriptor {
    pub fn local() -> Self {
        Self {
            kind: BiomeKind::Local,
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
        }
    }

    pub fn container() -> Self {
        Self {
            kind: BiomeKind::Container,
            os: "linux".to_string(),
            arch: "x86_64".to_string(),
        }
    }

    /// Filesystem-safe key, e.g. `local-linux-x86_64`.
    pub fn key(&self) -> String {
        let kind = match self.kind {
            BiomeKind::Local => "local",
            BiomeKind::Container => "container",
        };
        format!("{}-{}-{}", kind, self.os, self.arch)
    }
}

/// Where an invocation's output goes.
#[derive(Default)]
pub enum Sink<'a> {
    #[default]
    Discard,
    /// Straight to the operator's terminal.
    Inherit,
    /// Both streams interleaved into one writer.
    Combined(&'a mut dyn Write),
    Split {
        stdout: &'a mut dyn Write,
        stderr: &'a mut dyn Write,
    },
}

/// A single command to run in a biome. Consumed by [`Biome::run`].
#[derive(Default)]
pub struct Invocation<'a> {
    pub argv: Vec<String>,
    /// Working directory; relative paths resolve against the package directory.
    pub dir: Option<String>,
    pub env: Environment,
    pub stdin: Option<&'a [u8]>,
    pub output: Sink<'a>,
}

impl<'a> Invocation<'a> {
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn dir(mut self, dir: impl Into<String>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    pub fn env(mut self, env: Environment) -> Self {
        self.env = env;
        self
    }

    pub fn stdin(mut self, data: &'a [u8]) -> Self {
        self.stdin = Some(data);
        self
    }

    pub fn output(mut self, sink: Sink<'a>) -> Self {
        self.output = sink;
        self
    }

    pub fn combined_output(self, writer: &'a mut dyn Write) -> Self {
        self.output(Sink::Combined(writer))
    }
}

/// An environment build commands run in.
pub trait Biome: Send + Sync {
    fn describe(&self) -> Descriptor;

    fn dirs(&self) -> &Dirs;

    /// Join path segments using the biome's path conventions.
    fn join_path(&self, parts: &[&str]) -> String;

    /// Run a command and wait for it. A non-zero exit is an error.
    fn run(&self, ctx: &Context, invocation: Invocation<'_>) -> Result<(), BiomeError>;

    /// Write `data` to `path` inside the biome.
    fn write_file(&self, ctx: &Context, path: &str, data: &[u8]) -> Result<(), BiomeError> {
        self.run(
            ctx,
            Invocation::new(["sh", "-c", "cat > \"$0\"", path]).stdin(data),
        )
    }

    /// Variables layered onto every command by decorators.
    fn environment(&self) -> Environment {
        Environment::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_and_container_descriptors_never_share_a_key() {
        let local = Descriptor {
            os: "linux".to_string(),
            arch: "x86_64".to_string(),
            ..Descriptor::local()
        };
        assert_ne!(local.key(), Descriptor::container().key());
        assert_eq!(Descriptor::container().key(), "container-linux-x86_64");
    }

    #[test]
    fn invocation_builder_collects_argv() {
        let inv = Invocation::new(["chmod", "600", "/home/.netrc"]).dir("sub");
        assert_eq!(inv.argv, vec!["chmod", "600", "/home/.netrc"]);
        assert_eq!(inv.dir.as_deref(), Some("sub"));
        assert!(matches!(inv.output, Sink::Discard));
    }
}
