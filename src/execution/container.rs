//! Ownership of the run's container and its guaranteed removal.
//!
//! A [`ContainerGuard`] is created as soon as the engine hands back a
//! container ID. Removal happens exactly once: through [`ContainerGuard::release`]
//! on the normal path, or from `Drop` if the guard is abandoned (for example
//! when the run future itself is dropped).

use std::sync::Arc;
use std::time::Duration;

use crate::execution::docker_client::ContainerEngine;

/// Deadline for the forced removal, independent of the run's own timeout.
pub const CLEANUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Exclusive handle to a created container.
pub struct ContainerGuard {
    engine: Arc<dyn ContainerEngine>,
    id: Option<String>,
}

impl ContainerGuard {
    pub fn new(engine: Arc<dyn ContainerEngine>, id: impl Into<String>) -> Self {
        Self {
            engine,
            id: Some(id.into()),
        }
    }

    /// Container ID as returned by the engine.
    pub fn id(&self) -> &str {
        self.id.as_deref().unwrap_or_default()
    }

    /// Force-removes the container. Failures are logged, never returned.
    pub async fn release(mut self) {
        if let Some(id) = self.id.take() {
            remove_container(self.engine.as_ref(), &id).await;
        }
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        let Some(id) = self.id.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let engine = Arc::clone(&self.engine);
                handle.spawn(async move { remove_container(engine.as_ref(), &id).await });
            }
            Err(_) => {
                tracing::warn!(container = %id, "no runtime available, container left behind");
            }
        }
    }
}

async fn remove_container(engine: &dyn ContainerEngine, id: &str) {
    tracing::debug!(container = %id, "removing container");
    match tokio::time::timeout(CLEANUP_TIMEOUT, engine.remove_container(id)).await {
        Ok(Ok(())) => tracing::debug!(container = %id, "container removed"),
        Ok(Err(e)) => tracing::debug!(container = %id, error = %e, "container removal failed"),
        Err(_) => tracing::warn!(
            container = %id,
            timeout_secs = CLEANUP_TIMEOUT.as_secs(),
            "container removal timed out"
        ),
    }
}
