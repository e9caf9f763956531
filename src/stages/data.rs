//! Core-data domain stage.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{ServiceConfig, SharedWritable};
use crate::core_data::{keys, update_handlers, EventStore, MetadataStore};
use crate::di::{well_known, ContainerError, DependencyContainer};
use crate::events::DomainEventDispatcher;
use crate::lifecycle::{BootstrapHandler, CancelSignal, StageError, StartupTimer};

/// Seeds device metadata and starts the domain event dispatcher.
pub struct CoreDataBootstrap;

#[async_trait]
impl BootstrapHandler for CoreDataBootstrap {
    fn name(&self) -> &str {
        "core-data"
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
        let writable = container.get_as::<SharedWritable>(&well_known::WRITABLE).await?;
        // Ingestion is useless without persistence.
        container.get_as::<Arc<EventStore>>(&keys::EVENT_STORE).await?;

        // Both entries or neither, so a failed attempt leaves nothing behind.
        for key in [&keys::METADATA, &keys::DISPATCHER] {
            if container.contains(key) {
                return Err(ContainerError::DuplicateKey(key.clone()).into());
            }
        }

        let metadata = MetadataStore::from_devices(&config.devices);
        tracing::info!(devices = metadata.device_count(), "Device metadata loaded");

        let dispatcher = Arc::new(DomainEventDispatcher::start(
            &config.events,
            update_handlers(&metadata, &writable),
        ));

        let registered = container
            .register_instance(keys::METADATA, metadata)
            .and_then(|()| container.register_instance(keys::DISPATCHER, dispatcher.clone()));
        if let Err(e) = registered {
            dispatcher.close();
            return Err(e.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{shared_writable, WritableConfig};
    use crate::secrets::Credentials;

    fn container() -> DependencyContainer {
        let container = DependencyContainer::new();
        container
            .register_instance(well_known::CONFIGURATION, Arc::new(ServiceConfig::default()))
            .unwrap();
        container
            .register_instance(well_known::WRITABLE, shared_writable(WritableConfig::default()))
            .unwrap();
        let credentials = Credentials { username: "core".into(), password: "pw".into() };
        container
            .register_instance(keys::EVENT_STORE, Arc::new(EventStore::open(&credentials, 10)))
            .unwrap();
        container
    }

    #[tokio::test]
    async fn test_registers_metadata_and_dispatcher() {
        let container = container();
        CoreDataBootstrap
            .bootstrap(&container, &StartupTimer::from_secs(1, 5), &CancelSignal::never())
            .await
            .unwrap();

        assert!(container.contains(&keys::METADATA));
        let dispatcher = container
            .get_as::<Arc<DomainEventDispatcher>>(&keys::DISPATCHER)
            .await
            .unwrap();
        dispatcher.shutdown().await;
    }

    #[tokio::test]
    async fn test_taken_key_registers_nothing() {
        let container = container();
        container.register_instance(keys::DISPATCHER, 0u8).unwrap();

        let err = CoreDataBootstrap
            .bootstrap(&container, &StartupTimer::from_secs(1, 5), &CancelSignal::never())
            .await
            .unwrap_err();

        assert!(err.is_fatal());
        assert!(matches!(err, StageError::Container(ContainerError::DuplicateKey(ref k)) if *k == keys::DISPATCHER));
        assert!(!container.contains(&keys::METADATA));
    }
}
