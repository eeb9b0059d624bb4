//! On-disk data owned by yourbase: per-target home directories and a
//! download cache.

use biome::{BiomeError, Context, Descriptor};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum DataError {
    #[error("IO error: {path}: {message}")]
    Io { path: String, message: String },

    #[error("invalid target name {target:?}")]
    InvalidTarget { target: String },

    #[error("download {url}: {message}")]
    Download { url: String, message: String },

    #[error("download {url}: HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    #[error(transparent)]
    Context(#[from] BiomeError),
}

/// Root of the yourbase data directory.
#[derive(Debug, Clone)]
pub struct DataDirs {
    root: PathBuf,
}

/// A cached download, held open until the caller is done with it.
#[derive(Debug)]
pub struct CachedFile {
    path: PathBuf,
    file: File,
}

impl CachedFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file(&self) -> &File {
        &self.file
    }

    pub fn close(self) {
        drop(self.file);
    }
}

impl DataDirs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Shared directory buildpacks install toolchains into.
    pub fn tools_dir(&self) -> PathBuf {
        self.root.join("tools")
    }

    /// Home directory for `target` of the package at `package_dir` when built
    /// in a biome described by `descriptor`. Created if missing.
    pub fn build_home(
        &self,
        package_dir: &Path,
        target: &str,
        descriptor: &Descriptor,
    ) -> Result<PathBuf, DataError> {
        validate_target(target)?;
        let package_key = &digest_hex(package_dir.to_string_lossy().as_bytes())[..16];
        let home = self
            .root
            .join("homes")
            .join(package_key)
            .join(target)
            .join(descriptor.key());
        fs::create_dir_all(&home).map_err(|e| io_error(&home, e))?;
        debug!("Home for target {} at {}", target, home.display());
        Ok(home)
    }

    /// Location `url` is cached at.
    pub fn download_path(&self, url: &str) -> PathBuf {
        self.root
            .join("downloads")
            .join(digest_hex(url.as_bytes()))
            .join(basename(url))
    }

    /// Fetch `url` into the download cache unless it is already there.
    pub fn download(
        &self,
        ctx: &Context,
        client: &reqwest::blocking::Client,
        url: &str,
    ) -> Result<CachedFile, DataError> {
        let dest = self.download_path(url);
        if dest.is_file() {
            debug!("Using cached {} for {}", dest.display(), url);
            return open_cached(dest);
        }
        ctx.check()?;

        let dir = dest.parent().unwrap_or(&self.root).to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| io_error(&dir, e))?;

        info!("Downloading {}", url);
        let mut request = client.get(url);
        if let Some(deadline) = ctx.deadline() {
            request = request.timeout(deadline.saturating_duration_since(Instant::now()));
        }
        let mut response = request
            .send()
            .map_err(|e| transfer_error(ctx, url, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(DataError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(|e| io_error(&dir, e))?;
        let mut buf = [0u8; 64 * 1024];
        loop {
            ctx.check()?;
            let n = response
                .read(&mut buf)
                .map_err(|e| transfer_error(ctx, url, e))?;
            if n == 0 {
                break;
            }
            tmp.write_all(&buf[..n]).map_err(|e| io_error(tmp.path(), e))?;
        }
        tmp.flush().map_err(|e| io_error(tmp.path(), e))?;
        mark_executable(tmp.path())?;
        tmp.persist(&dest)
            .map_err(|e| io_error(&dest, e.error))?;
        debug!("Cached {} at {}", url, dest.display());
        open_cached(dest)
    }
}

/// A transfer that failed because the context ran out reports the context
/// error rather than the transport's.
fn transfer_error(ctx: &Context, url: &str, err: impl std::fmt::Display) -> DataError {
    if let Err(done) = ctx.check() {
        return done.into();
    }
    DataError::Download {
        url: url.to_string(),
        message: err.to_string(),
    }
}

fn open_cached(path: PathBuf) -> Result<CachedFile, DataError> {
    let file = File::open(&path).map_err(|e| io_error(&path, e))?;
    Ok(CachedFile { path, file })
}

fn validate_target(target: &str) -> Result<(), DataError> {
    let invalid = target.is_empty()
        || target == "."
        || target.contains("..")
        || target.contains('/')
        || target.contains('\\');
    if invalid {
        return Err(DataError::InvalidTarget {
            target: target.to_string(),
        });
    }
    Ok(())
}

fn digest_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn basename(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    match path.rsplit('/').next() {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => "download".to_string(),
    }
}

fn io_error(path: &Path, err: std::io::Error) -> DataError {
    DataError::Io {
        path: path.to_string_lossy().to_string(),
        message: err.to_string(),
    }
}

#[cfg(unix)]
fn mark_executable(path: &Path) -> Result<(), DataError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).map_err(|e| io_error(path, e))
}

#[cfg(not(unix))]
fn mark_executable(_path: &Path) -> Result<(), DataError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basename_ignores_query() {
        assert_eq!(
            basename("https://github.com/krallin/tini/releases/download/v0.19.0/tini-static-amd64?x=1"),
            "tini-static-amd64"
        );
        assert_eq!(basename("https://example.com/"), "download");
    }

    #[test]
    fn target_names_cannot_escape_the_home_tree() {
        for bad in ["", ".", "..", "a/b", "../web", "a\\b"] {
            assert!(validate_target(bad).is_err(), "{:?} accepted", bad);
        }
        assert!(validate_target("web").is_ok());
        assert!(validate_target("build-1.2").is_ok());
    }

    #[test]
    fn local_and_container_homes_differ() {
        let root = tempfile::tempdir().unwrap();
        let dirs = DataDirs::new(root.path());
        let pkg = Path::new("/src/app");
        let local = dirs.build_home(pkg, "web", &Descriptor::local()).unwrap();
        let container = dirs.build_home(pkg, "web", &Descriptor::container()).unwrap();
        assert_ne!(local, container);
        assert!(local.is_dir());
        assert!(container.is_dir());
        assert_eq!(local, dirs.build_home(pkg, "web", &Descriptor::local()).unwrap());
    }
}
