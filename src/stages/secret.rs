//! Secret store stage.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::ServiceConfig;
use crate::di::{well_known, DependencyContainer};
use crate::lifecycle::{BootstrapHandler, CancelSignal, StageError, StartupTimer};
use crate::secrets::{self, build_provider};

/// Connects to the secret store and registers the provider once it can
/// serve the database credentials.
pub struct SecretStoreBootstrap;

#[async_trait]
impl BootstrapHandler for SecretStoreBootstrap {
    fn name(&self) -> &str {
        "secret-store"
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

        let provider = build_provider(&config.secret_store);
        secrets::credentials(provider.as_ref(), &config.database.credentials_path).await?;

        tracing::info!(kind = provider.kind(), "Secret store ready");
        container.register_instance(well_known::SECRET_PROVIDER, provider)?;
        Ok(())
    }
}
