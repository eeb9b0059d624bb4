use anyhow::{Context as _, Result};
use biome::container::TINI_URL;
use biome::{Biome, BiomeError, ContainerClient, Context, DockerCli, Invocation, Sink};
use clap::{Parser, Subcommand};
use config_loader::{find_package, BuildConfig, Package};
use engine::{
    new_biome, new_network, target_to_phase, target_to_phase_deps, ContainerMode,
    NewBiomeOptions,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};
use ybdata::DataDirs;

/// Conventional status for a process stopped by SIGINT.
const INTERRUPTED_EXIT_CODE: i32 = 130;

#[derive(Parser)]
#[command(name = "ybctl", version)]
struct Cli {
    /// Directory to search for .yourbase.yml (defaults to the current directory)
    #[arg(long, short = 'C', global = true, value_name = "DIR")]
    package_dir: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the dependency and execution plan of a target as JSON
    Plan {
        #[arg(value_name = "TARGET")]
        target: String,
    },
    /// Run a command in the environment of a target
    Exec {
        #[arg(value_name = "TARGET")]
        target: String,
        /// Build on the host even if containers are available
        #[arg(long)]
        no_container: bool,
        #[arg(last = true, required = true, value_name = "ARGV")]
        argv: Vec<String>,
    },
    /// Print version and exit
    Version,
}

fn init_tracing() {
    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.cmd {
        Commands::Plan { target } => {
            let package = load_package(cli.package_dir)?;
            plan(&package, &target)?;
        }
        Commands::Exec {
            target,
            no_container,
            argv,
        } => {
            let package = load_package(cli.package_dir)?;
            let code = exec(&package, &target, no_container, argv)?;
            std::process::exit(code);
        }
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
        }
    }
    Ok(())
}

fn load_package(dir: Option<PathBuf>) -> Result<Package> {
    let start = match dir {
        Some(dir) => dir,
        None => std::env::current_dir().context("determine current directory")?,
    };
    Ok(find_package(&start)?)
}

fn plan(package: &Package, target_name: &str) -> Result<()> {
    let target = package.target(target_name)?;
    let deps = target_to_phase_deps(target)?;
    let phase = target_to_phase(target);
    let out = serde_json::json!({ "deps": deps, "phase": phase });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

/// Provision the target's biome, run `argv` in it and tear everything down.
/// Returns the exit code to leave with.
fn exec(package: &Package, target_name: &str, no_container: bool, argv: Vec<String>) -> Result<i32> {
    let config = BuildConfig::from_env()?;
    let target = package.target(target_name)?;
    let deps = target_to_phase_deps(target)?;
    let phase = target_to_phase(target);
    let base_env = deps
        .environment_template
        .expand(|_| None)
        .with_context(|| format!("target {}: resolve environment", target.name))?;

    // An interrupt cancels the running command; teardown still runs under
    // its own context before the process exits.
    let (ctx, interrupt) = Context::with_cancel();
    ctrlc::set_handler(move || {
        tracing::info!("Interrupted, cleaning up...");
        interrupt.cancel();
    })
    .context("Failed to set interrupt handler")?;
    let ctx = match config.command_timeout {
        Some(timeout) => ctx.with_timeout(timeout),
        None => ctx,
    };

    let use_container = !(config.no_container || no_container);
    let client: Option<Arc<dyn ContainerClient>> = if use_container {
        Some(Arc::new(
            DockerCli::new(&config.container_runtime).with_user(config.container_user.clone()),
        ))
    } else {
        None
    };

    tracing::debug!(build_target = %target.name, container = use_container, "preparing biome");
    let network = new_network(&ctx, client.clone())?;
    let opts = NewBiomeOptions {
        package_dir: package.dir.clone(),
        target: target.name.clone(),
        data_dirs: DataDirs::new(&config.data_dir),
        base_env,
        github_token: config.github_token.clone(),
        container: client.map(|client| ContainerMode {
            client,
            definition: target.container_definition().to_runtime(),
            network_id: network.id().to_string(),
            init_url: config.tini_url.clone().unwrap_or_else(|| TINI_URL.to_string()),
            http: reqwest::blocking::Client::new(),
        }),
    }
    .for_target(target);

    let outcome = run_in_biome(&ctx, &opts, &phase.root, argv);
    let teardown = network.teardown();
    for advisory in &teardown.advisories {
        eprintln!("warning: {}", advisory);
    }

    if matches!(ctx.check(), Err(BiomeError::Canceled)) {
        eprintln!("interrupted");
        return Ok(INTERRUPTED_EXIT_CODE);
    }
    match outcome {
        Ok(()) => Ok(0),
        Err(err) => {
            if let Some(BiomeError::Exit {
                code: Some(code), ..
            }) = err.downcast_ref::<BiomeError>()
            {
                return Ok(*code);
            }
            Err(err)
        }
    }
}

fn run_in_biome(ctx: &Context, opts: &NewBiomeOptions, root: &str, argv: Vec<String>) -> Result<()> {
    let bio = new_biome(ctx, opts)?;
    let mut invocation = Invocation::new(argv).output(Sink::Inherit);
    if !root.is_empty() {
        invocation = invocation.dir(root);
    }
    let result = bio.run(ctx, invocation);
    let teardown = bio.close();
    for advisory in &teardown.advisories {
        eprintln!("warning: {}", advisory);
    }
    Ok(result?)
}
