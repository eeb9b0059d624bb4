//! [`ContainerClient`] backed by a docker-compatible runtime CLI.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::process::Command;
use tempfile::NamedTempFile;

use crate::container::{
    ContainerClient, ContainerOptions, ExecRequest, HOME_MOUNT, INIT_MOUNT, PACKAGE_MOUNT,
};
use crate::process;
use crate::{BiomeError, Context, Sink};

/// Drives `docker` (or a compatible binary such as `podman`) as a subprocess.
#[derive(Debug, Clone)]
pub struct DockerCli {
    runtime: String,
    /// `uid:gid` build containers run as; the invoking user when unset.
    user: Option<String>,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new("docker")
    }
}

impl DockerCli {
    pub fn new(runtime: impl Into<String>) -> Self {
        Self {
            runtime: runtime.into(),
            user: None,
        }
    }

    pub fn with_user(mut self, user: Option<String>) -> Self {
        self.user = user.filter(|u| !u.trim().is_empty());
        self
    }

    pub fn runtime(&self) -> &str {
        &self.runtime
    }

    fn command(&self) -> Command {
        Command::new(&self.runtime)
    }

    /// Run the runtime, returning trimmed stdout. Failures carry the
    /// runtime's combined output.
    fn output(&self, ctx: &Context, operation: &str, command: Command) -> Result<String, BiomeError> {
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let status = process::run(
            ctx,
            command,
            None,
            Sink::Split {
                stdout: &mut stdout,
                stderr: &mut stderr,
            },
        )?;
        if !status.success() {
            let mut message = String::from_utf8_lossy(&stderr).trim().to_string();
            if message.is_empty() {
                message = String::from_utf8_lossy(&stdout).trim().to_string();
            }
            if message.is_empty() {
                message = format!("exit status {:?}", status.code());
            }
            return Err(self.runtime_error(operation, message));
        }
        Ok(String::from_utf8_lossy(&stdout).trim().to_string())
    }

    fn runtime_error(&self, operation: &str, message: impl Into<String>) -> BiomeError {
        BiomeError::Runtime {
            runtime: self.runtime.clone(),
            operation: operation.to_string(),
            message: message.into(),
        }
    }

    fn configure_create(&self, command: &mut Command, opts: &ContainerOptions<'_>) {
        let definition = opts.definition;
        command.arg("create");
        if !opts.network_id.is_empty() {
            command.arg("--network").arg(opts.network_id);
        }
        command
            .arg("--user")
            .arg(self.user.clone().unwrap_or_else(invoking_user));
        command.arg("--mount").arg(bind_mount(opts.package_dir, PACKAGE_MOUNT, false));
        command.arg("--mount").arg(bind_mount(opts.home_dir, HOME_MOUNT, false));
        command.arg("--mount").arg(bind_mount(opts.init_exe, INIT_MOUNT, true));
        for mount in &definition.mounts {
            command.arg("--volume").arg(mount);
        }
        for port in &definition.ports {
            command.arg("--publish").arg(port);
        }
        command.arg("--env").arg(format!("HOME={}", HOME_MOUNT));
        for (key, value) in &definition.environment {
            command.arg("--env").arg(format!("{}={}", key, value));
        }
        if let Some(label) = &definition.label {
            command.arg("--label").arg(format!("yourbase.label={}", label));
        }
        command
            .arg("--workdir")
            .arg(definition.work_dir.as_deref().unwrap_or(PACKAGE_MOUNT));
        command.arg("--entrypoint").arg(INIT_MOUNT);
        command.arg(&definition.image);
        command.arg("--");
        match &definition.command {
            Some(argv) if !argv.is_empty() => {
                command.args(argv);
            }
            _ => {
                command.arg("sleep").arg("infinity");
            }
        }
    }
}

impl ContainerClient for DockerCli {
    fn name(&self) -> &str {
        &self.runtime
    }

    fn create_network(&self, ctx: &Context, name: &str, driver: &str) -> Result<String, BiomeError> {
        let mut command = self.command();
        command
            .arg("network")
            .arg("create")
            .arg("--driver")
            .arg(driver)
            .arg(name);
        let id = self.output(ctx, "network create", command)?;
        if id.is_empty() {
            return Err(self.runtime_error("network create", "runtime returned no network ID"));
        }
        Ok(id)
    }

    fn remove_network(&self, ctx: &Context, id: &str) -> Result<(), BiomeError> {
        let mut command = self.command();
        command.arg("network").arg("rm").arg(id);
        self.output(ctx, "network rm", command).map(|_| ())
    }

    fn create_container(
        &self,
        ctx: &Context,
        mut opts: ContainerOptions<'_>,
    ) -> Result<String, BiomeError> {
        let image = opts.definition.image.clone();
        if image.trim().is_empty() {
            return Err(self.runtime_error("create", "container definition has no image"));
        }

        let mut pull = self.command();
        pull.arg("pull").arg(&image);
        process::run_checked(ctx, pull, None, Sink::Combined(&mut *opts.pull_output), "pull")
            .map_err(|err| match err {
                BiomeError::Exit { .. } => self.runtime_error("pull", err.to_string()),
                other => other,
            })?;

        let mut create = self.command();
        self.configure_create(&mut create, &opts);
        let id = self.output(ctx, "create", create)?;

        let mut start = self.command();
        start.arg("start").arg(&id);
        if let Err(err) = self.output(ctx, "start", start) {
            if let Err(rm_err) = self.remove_container(&Context::teardown(), &id) {
                tracing::warn!(container = %id, "Unable to remove container after failed start: {}", rm_err);
            }
            return Err(err);
        }
        Ok(id)
    }

    fn exec(&self, ctx: &Context, request: ExecRequest<'_, '_>) -> Result<(), BiomeError> {
        let mut command = self.command();
        command.arg("exec");
        if request.stdin.is_some() {
            command.arg("--interactive");
        }
        command.arg("--workdir").arg(request.dir);
        // The runtime process keeps the operator's environment; build
        // variables reach the container only through the env file.
        let env_file = write_env_file(request.env)?;
        if let Some(file) = &env_file {
            command.arg("--env-file").arg(file.path());
        }
        command.arg(request.container_id);
        command.args(request.argv);

        let program = request.argv.first().cloned().unwrap_or_default();
        let result = process::run_checked(ctx, command, request.stdin, request.output, &program);
        drop(env_file);
        result
    }

    fn remove_container(&self, ctx: &Context, id: &str) -> Result<(), BiomeError> {
        let mut command = self.command();
        command.arg("rm").arg("--force").arg(id);
        self.output(ctx, "rm", command).map(|_| ())
    }
}

/// Write `env` as an owner-only `--env-file`, removed when the handle drops.
/// The format has no quoting, so values spanning lines are rejected.
fn write_env_file(env: &BTreeMap<String, String>) -> Result<Option<NamedTempFile>, BiomeError> {
    if env.is_empty() {
        return Ok(None);
    }
    let mut file = tempfile::Builder::new().prefix("yb-env-").tempfile()?;
    for (key, value) in env {
        if value.contains('\n') || value.contains('\r') {
            return Err(BiomeError::InvalidEnv {
                message: format!("{}: value spans multiple lines", key),
            });
        }
        writeln!(file, "{}={}", key, value)?;
    }
    file.flush()?;
    Ok(Some(file))
}

fn bind_mount(source: &Path, target: &str, readonly: bool) -> String {
    format!(
        "type=bind,source={},target={},readonly={}",
        source.display(),
        target,
        readonly
    )
}

fn invoking_user() -> String {
    #[cfg(unix)]
    {
        let uid = unsafe { libc::geteuid() };
        let gid = unsafe { libc::getegid() };
        format!("{}:{}", uid, gid)
    }
    #[cfg(not(unix))]
    {
        "65534:65534".to_string()
    }
}
