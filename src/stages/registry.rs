//! Service registry stage.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::ServiceConfig;
use crate::di::{well_known, DependencyContainer};
use crate::lifecycle::{BootstrapHandler, CancelSignal, StageError, StartupTimer};
use crate::stages::probe;

/// Waits until the configured registry accepts connections and registers its
/// address for later stages.
pub struct RegistryBootstrap;

#[async_trait]
impl BootstrapHandler for RegistryBootstrap {
    fn name(&self) -> &str {
        "registry"
    }

    async fn bootstrap(
        &self,
        container: &DependencyContainer,
        timer: &StartupTimer,
        _cancel: &CancelSignal,
    ) -> Result<(), StageError> {
        let config = container
            .get_as::<Arc<ServiceConfig>>(&well_known::CONFIGURATION)
            .await?;
        let Some(address) = config.registry.address.clone() else {
            return Err(StageError::misconfigured("registry stage requires registry.address"));
        };

        let limit = Duration::from_millis(config.registry.connect_timeout_ms).min(timer.remaining());
        probe("registry", &address, limit).await?;
        tracing::info!(address = %address, service = %config.service.name, "Registry reachable");

        container.register_instance(well_known::REGISTRY, address)?;
        Ok(())
    }
}
