//! Telemetry stage.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::ServiceConfig;
use crate::di::{well_known, DependencyContainer};
use crate::lifecycle::{BootstrapHandler, CancelSignal, StageError, StartupTimer};
use crate::observability::metrics::install_prometheus;
use crate::observability::Telemetry;

/// Registers the service's counters and, when enabled, the Prometheus exporter.
pub struct TelemetryBootstrap;

#[async_trait]
impl BootstrapHandler for TelemetryBootstrap {
    fn name(&self) -> &str {
        "telemetry"
    }

    async fn bootstrap(
        &self,
        container: &DependencyContainer,
        _timer: &StartupTimer,
        _cancel: &CancelSignal,
    ) -> Result<(), StageError> {
        let config = container
            .get_as::<Arc<ServiceConfig>>(&well_known::CONFIGURATION)
            .await?;

        if config.telemetry.prometheus_enabled {
            let addr: SocketAddr = config.telemetry.prometheus_address.parse().map_err(|e| {
                StageError::misconfigured(format!(
                    "invalid telemetry.prometheus_address '{}': {}",
                    config.telemetry.prometheus_address, e
                ))
            })?;
            install_prometheus(addr).map_err(|e| StageError::unavailable("prometheus exporter", e))?;
        }

        container.register_instance(well_known::TELEMETRY, Arc::new(Telemetry::new()))?;
        Ok(())
    }
}
