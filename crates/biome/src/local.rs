use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::close::{BiomeCloser, Teardown};
use crate::process;
use crate::{Biome, BiomeError, Context, Descriptor, Dirs, Invocation};

/// Runs commands directly on the host.
#[derive(Debug, Clone)]
pub struct Local {
    dirs: Dirs,
}

impl Local {
    pub fn new(package_dir: &Path, home_dir: &Path, tools_dir: &Path) -> Self {
        Self {
            dirs: Dirs {
                package: package_dir.to_string_lossy().to_string(),
                home: home_dir.to_string_lossy().to_string(),
                tools: tools_dir.to_string_lossy().to_string(),
            },
        }
    }

    fn resolve_dir(&self, dir: Option<&str>) -> PathBuf {
        let package = Path::new(&self.dirs.package);
        match dir {
            None => package.to_path_buf(),
            Some(d) if Path::new(d).is_absolute() => PathBuf::from(d),
            Some(d) => package.join(d),
        }
    }
}

impl Biome for Local {
    fn describe(&self) -> Descriptor {
        Descriptor::local()
    }

    fn dirs(&self) -> &Dirs {
        &self.dirs
    }

    fn join_path(&self, parts: &[&str]) -> String {
        let mut path = PathBuf::new();
        for part in parts {
            path.push(part);
        }
        path.to_string_lossy().to_string()
    }

    fn run(&self, ctx: &Context, invocation: Invocation<'_>) -> Result<(), BiomeError> {
        let program = invocation
            .argv
            .first()
            .cloned()
            .ok_or(BiomeError::EmptyArgv)?;

        let mut command = Command::new(&program);
        command.args(&invocation.argv[1..]);
        command.current_dir(self.resolve_dir(invocation.dir.as_deref()));
        command.env("HOME", &self.dirs.home);
        for (key, value) in &invocation.env.vars {
            command.env(key, value);
        }
        let host_path = std::env::var("PATH").unwrap_or_default();
        let separator = if cfg!(windows) { ';' } else { ':' };
        if let Some(path) = invocation.env.path_value(&host_path, separator) {
            command.env("PATH", path);
        }

        process::run_checked(
            ctx,
            command,
            invocation.stdin,
            invocation.output,
            &program,
        )
    }

    fn write_file(&self, ctx: &Context, path: &str, data: &[u8]) -> Result<(), BiomeError> {
        ctx.check()?;
        let path = Path::new(path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, data)?;
        Ok(())
    }
}

impl BiomeCloser for Local {
    fn close(&self) -> Teardown {
        Teardown::clean()
    }
}
