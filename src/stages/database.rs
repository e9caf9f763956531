//! Database stage.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::ServiceConfig;
use crate::core_data::{keys, EventStore};
use crate::di::{well_known, DependencyContainer};
use crate::lifecycle::{BootstrapHandler, CancelSignal, StageError, StartupTimer};
use crate::secrets::{self, SecretProvider};
use crate::stages::probe;

/// Waits for the database, then opens the event store with credentials from
/// the secret provider.
pub struct DatabaseBootstrap;

#[async_trait]
impl BootstrapHandler for DatabaseBootstrap {
    fn name(&self) -> &str {
        "database"
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
        let provider = container
            .get_as::<Arc<dyn SecretProvider>>(&well_known::SECRET_PROVIDER)
            .await?;

        if let Some(address) = &config.database.probe_address {
            let limit = Duration::from_millis(config.database.connect_timeout_ms).min(timer.remaining());
            probe("database", address, limit).await?;
            tracing::debug!(address = %address, "Database reachable");
        }

        let credentials = secrets::credentials(provider.as_ref(), &config.database.credentials_path).await?;

        let store = Arc::new(EventStore::open(&credentials, config.database.max_events));
        container.register_instance(keys::EVENT_STORE, store)?;
        Ok(())
    }
}
