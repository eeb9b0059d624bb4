//! Environment assembly for one build target: biome provisioning,
//! credential injection, the shared build network and phase translation.

pub mod error;
pub mod factory;
pub mod netrc;
pub mod network;
pub mod phase;

pub use error::BuildError;
pub use factory::{new_biome, ContainerMode, NewBiomeOptions};
pub use netrc::{generate_netrc, inject_netrc, NETRC_FILENAME};
pub use network::{new_network, NetworkHandle};
pub use phase::{target_to_phase, target_to_phase_deps, Phase, PhaseDeps};
