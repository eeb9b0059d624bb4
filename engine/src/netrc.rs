//! Scoped GitHub credentials for a build.

use biome::{run_command, with_close, with_env, Biome, BiomeCloser, Context, Environment, Teardown};
use config_loader::settings::GITHUB_TOKEN_VAR;
use tracing::{info, warn};

use crate::error::BuildError;

pub const NETRC_FILENAME: &str = ".netrc";

const NETRC_MACHINE: &str = "github.com";
const NETRC_LOGIN: &str = "x-access-token";

/// Render the single `.netrc` record for `token`. Empty for an empty token.
pub fn generate_netrc(token: &str) -> Vec<u8> {
    if token.is_empty() {
        return Vec::new();
    }
    format!(
        "machine {} login {} password {}\n",
        NETRC_MACHINE, NETRC_LOGIN, token
    )
    .into_bytes()
}

/// Place a `.netrc` for `token` in the biome's home directory and expose the
/// token as `YB_GH_TOKEN`.
///
/// The file is removed when the returned biome is closed. An empty token
/// returns `bio` untouched. If the file cannot be written, `bio` is closed
/// before the error is returned.
pub fn inject_netrc(
    ctx: &Context,
    bio: Box<dyn BiomeCloser>,
    token: &str,
) -> Result<Box<dyn BiomeCloser>, BuildError> {
    if token.is_empty() {
        return Ok(bio);
    }

    info!("Writing {}", NETRC_FILENAME);
    let path = bio.join_path(&[bio.dirs().home.as_str(), NETRC_FILENAME]);
    if let Err(source) = bio.write_file(ctx, &path, &generate_netrc(token)) {
        let teardown = bio.close();
        if !teardown.is_clean() {
            warn!("{} cleanup step(s) failed after netrc write error", teardown.advisories.len());
        }
        return Err(BuildError::Credential { path, source });
    }

    if let Err(err) = run_command(ctx, bio.as_ref(), &["chmod", "600", path.as_str()]) {
        // Not fatal; the file is removed at teardown either way.
        warn!("Making temporary {} private: {}", NETRC_FILENAME, err);
    }

    let bio = with_close(bio, |inner| {
        let mut teardown = Teardown::clean();
        let ctx = Context::teardown();
        let path = inner.join_path(&[inner.dirs().home.as_str(), NETRC_FILENAME]);
        if let Err(err) = run_command(&ctx, inner, &["rm", "-f", path.as_str()]) {
            teardown.warn(format!("clean up {}", NETRC_FILENAME), err);
        }
        teardown
    });

    Ok(with_env(
        bio,
        Environment::from_vars([(GITHUB_TOKEN_VAR, token)]),
    ))
}
