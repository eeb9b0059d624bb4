use std::fmt;
use std::sync::Arc;

use biome::{ContainerClient, Context, Teardown};
use tracing::info;

use crate::error::BuildError;

const NETWORK_DRIVER: &str = "bridge";

/// The network shared by all containers of one build.
///
/// Without a container client the handle is empty and tearing it down does
/// nothing. Teardown consumes the handle so removal is attempted once.
pub struct NetworkHandle {
    id: String,
    name: String,
    client: Option<Arc<dyn ContainerClient>>,
}

impl fmt::Debug for NetworkHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkHandle")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

impl NetworkHandle {
    pub fn none() -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            client: None,
        }
    }

    /// Runtime network ID; empty when no network was created.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_none(&self) -> bool {
        self.client.is_none()
    }

    /// Remove the network. Call only after every container on it is gone.
    pub fn teardown(self) -> Teardown {
        let mut teardown = Teardown::clean();
        let Some(client) = self.client else {
            return teardown;
        };
        info!("Removing network {}...", self.name);
        if let Err(err) = client.remove_network(&Context::teardown(), &self.id) {
            teardown.warn(
                format!("remove network {} ({})", self.name, self.id),
                err,
            );
        }
        teardown
    }
}

/// Create a uniquely named bridge network, or an empty handle when `client`
/// is `None`.
pub fn new_network(
    ctx: &Context,
    client: Option<Arc<dyn ContainerClient>>,
) -> Result<NetworkHandle, BuildError> {
    let Some(client) = client else {
        return Ok(NetworkHandle::none());
    };
    let name = hex::encode(rand::random::<[u8; 8]>());
    info!("Creating network {}...", name);
    let id = client
        .create_network(ctx, &name, NETWORK_DRIVER)
        .map_err(|source| BuildError::Network { source })?;
    Ok(NetworkHandle {
        id,
        name,
        client: Some(client),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_client_yields_empty_handle() {
        let handle = new_network(&Context::background(), None).unwrap();
        assert!(handle.is_none());
        assert_eq!(handle.id(), "");
        assert!(handle.teardown().is_clean());
    }
}
