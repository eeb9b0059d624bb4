use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use biome::{
    create_container, with_env, BiomeCloser, ContainerClient, ContainerDefinition,
    ContainerOptions, Context, Descriptor, Environment, Local,
};
use config_loader::BuildTarget;
use tracing::debug;
use ybdata::DataDirs;

use crate::error::BuildError;
use crate::netrc::inject_netrc;

/// How to build in a container. Absent in [`NewBiomeOptions`] means local.
#[derive(Clone)]
pub struct ContainerMode {
    pub client: Arc<dyn ContainerClient>,
    pub definition: ContainerDefinition,
    /// Shared build network; empty for the runtime default.
    pub network_id: String,
    /// Where to fetch the container init binary from.
    pub init_url: String,
    pub http: reqwest::blocking::Client,
}

#[derive(Clone)]
pub struct NewBiomeOptions {
    pub package_dir: PathBuf,
    pub target: String,
    pub data_dirs: DataDirs,
    pub base_env: Environment,
    /// Credential injected as `.netrc`; `None` or empty skips injection.
    pub github_token: Option<String>,
    pub container: Option<ContainerMode>,
}

impl NewBiomeOptions {
    /// A copy that builds on the host.
    pub fn disable_container(&self) -> Self {
        Self {
            container: None,
            ..self.clone()
        }
    }

    /// Options for building `target`: its name, its container image, and
    /// local mode for host-only targets.
    pub fn for_target(&self, target: &BuildTarget) -> Self {
        let mut opts = if target.host_only {
            self.disable_container()
        } else {
            self.clone()
        };
        opts.target = target.name.clone();
        if let Some(mode) = opts.container.as_mut() {
            mode.definition = target.container_definition().to_runtime();
        }
        opts
    }
}

/// Provision the biome for one target.
///
/// The result always carries credential injection and the base environment;
/// on error nothing is left running.
pub fn new_biome(ctx: &Context, opts: &NewBiomeOptions) -> Result<Box<dyn BiomeCloser>, BuildError> {
    let token = opts.github_token.as_deref().unwrap_or("");
    let bio = match &opts.container {
        None => {
            let home = opts
                .data_dirs
                .build_home(&opts.package_dir, &opts.target, &Descriptor::local())
                .map_err(|err| BuildError::setup(&opts.target, err))?;
            debug!("Home located at {}", home.display());
            let local: Box<dyn BiomeCloser> = Box::new(Local::new(
                &opts.package_dir,
                &home,
                &opts.data_dirs.tools_dir(),
            ));
            local
        }
        Some(mode) => new_container_biome(ctx, opts, mode)?,
    };

    let bio = inject_netrc(ctx, bio, token).map_err(|err| BuildError::setup(&opts.target, err))?;
    Ok(with_env(bio, opts.base_env.clone()))
}

fn new_container_biome(
    ctx: &Context,
    opts: &NewBiomeOptions,
    mode: &ContainerMode,
) -> Result<Box<dyn BiomeCloser>, BuildError> {
    let home = opts
        .data_dirs
        .build_home(&opts.package_dir, &opts.target, &Descriptor::container())
        .map_err(|err| BuildError::setup(&opts.target, err))?;
    debug!("Home located at {}", home.display());

    let init = opts
        .data_dirs
        .download(ctx, &mode.http, &mode.init_url)
        .map_err(|err| BuildError::setup(&opts.target, err))?;

    let mut pull_output = io::stderr();
    let container = create_container(
        ctx,
        mode.client.clone(),
        ContainerOptions {
            package_dir: &opts.package_dir,
            home_dir: &home,
            init_exe: init.path(),
            definition: &mode.definition,
            network_id: &mode.network_id,
            pull_output: &mut pull_output,
        },
    );
    init.close();
    let container = container.map_err(|err| BuildError::setup(&opts.target, err))?;
    Ok(Box::new(container))
}
