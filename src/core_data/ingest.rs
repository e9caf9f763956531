//! Event ingestion.

use std::any::Any;
use std::sync::Arc;

use thiserror::Error;

use crate::config::{ServiceConfig, SharedWritable};
use crate::core_data::keys;
use crate::core_data::metadata::{now_millis, MetadataStore};
use crate::core_data::store::{Event, EventStore, StoreError};
use crate::di::{well_known, ContainerError, DependencyContainer, ServiceKey};
use crate::events::{DomainEvent, DomainEventDispatcher, EventPublisher};
use crate::messaging::{MessageBus, MessageEnvelope};
use crate::observability::Telemetry;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IngestError {
    #[error("event has no device name")]
    MissingDevice,

    #[error("event has no readings")]
    NoReadings,

    #[error("device '{0}' is not registered")]
    UnknownDevice(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IngestError {
    fn reason(&self) -> &'static str {
        match self {
            IngestError::MissingDevice | IngestError::NoReadings => "validation",
            IngestError::UnknownDevice(_) => "unknown_device",
            IngestError::Store(_) => "store",
        }
    }
}

/// The dependencies of the ingestion path, resolved from the container.
pub struct CoreData {
    store: Arc<EventStore>,
    metadata: MetadataStore,
    events: EventPublisher,
    writable: SharedWritable,
    telemetry: Option<Arc<Telemetry>>,
    bus: Option<Arc<dyn MessageBus>>,
    topic: String,
}

async fn optional<T>(container: &DependencyContainer, key: &ServiceKey) -> Result<Option<T>, ContainerError>
where
    T: Any + Send + Sync + Clone,
{
    if !container.contains(key) {
        return Ok(None);
    }
    container.get_as::<T>(key).await.map(Some)
}

impl CoreData {
    /// Resolve the ingestion dependencies.
    ///
    /// The store, metadata, dispatcher and configuration are required;
    /// telemetry and the message bus are used when their stages have run.
    pub async fn resolve(container: &DependencyContainer) -> Result<Self, ContainerError> {
        let store = container.get_as::<Arc<EventStore>>(&keys::EVENT_STORE).await?;
        let metadata = container.get_as::<MetadataStore>(&keys::METADATA).await?;
        let dispatcher = container
            .get_as::<Arc<DomainEventDispatcher>>(&keys::DISPATCHER)
            .await?;
        let writable = container.get_as::<SharedWritable>(&well_known::WRITABLE).await?;
        let config = container
            .get_as::<Arc<ServiceConfig>>(&well_known::CONFIGURATION)
            .await?;

        Ok(Self {
            store,
            metadata,
            events: dispatcher.publisher(),
            writable,
            telemetry: optional(container, &well_known::TELEMETRY).await?,
            bus: optional(container, &well_known::MESSAGE_BUS).await?,
            topic: config.message_queue.topic.clone(),
        })
    }

    /// Validate, persist and announce one event. Returns the event id.
    ///
    /// Only validation and persistence can fail the call. Bus and domain
    /// event delivery problems are logged.
    pub async fn add_event(&self, event: Event) -> Result<String, IngestError> {
        let result = self.persist(event);
        let event = match result {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, "Event rejected");
                if let Some(telemetry) = &self.telemetry {
                    telemetry.record_rejected(e.reason());
                }
                return Err(e);
            }
        };

        if let Some(telemetry) = &self.telemetry {
            telemetry.record_ingested();
        }

        if self.writable.load().persist_and_publish {
            self.publish_to_bus(&event).await;
        }

        for domain_event in [
            DomainEvent::device_last_reported(&event.device),
            DomainEvent::device_service_last_reported(&event.device),
        ] {
            if let Err(e) = self.events.publish(domain_event).await {
                tracing::warn!(device = %event.device, error = %e, "Domain event not published");
            }
        }

        tracing::debug!(id = %event.id, device = %event.device, readings = event.readings.len(), "Event added");
        Ok(event.id)
    }

    fn persist(&self, mut event: Event) -> Result<Event, IngestError> {
        if event.device.trim().is_empty() {
            return Err(IngestError::MissingDevice);
        }
        if event.readings.is_empty() {
            return Err(IngestError::NoReadings);
        }
        if self.writable.load().metadata_check && !self.metadata.contains_device(&event.device) {
            return Err(IngestError::UnknownDevice(event.device));
        }

        if event.id.is_empty() {
            event.id = uuid::Uuid::new_v4().to_string();
        }
        event.created = now_millis();
        if event.origin == 0 {
            event.origin = event.created;
        }

        self.store.add(event.clone())?;
        Ok(event)
    }

    async fn publish_to_bus(&self, event: &Event) {
        let Some(bus) = &self.bus else {
            tracing::trace!(id = %event.id, "Message bus not ready, event not published");
            return;
        };

        let payload = match serde_json::to_vec(event) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(id = %event.id, error = %e, "Failed to serialize event");
                return;
            }
        };

        match bus
            .publish(MessageEnvelope::json(&self.topic, &event.id, payload))
            .await
        {
            Ok(()) => {
                if let Some(telemetry) = &self.telemetry {
                    telemetry.record_bus_published();
                }
            }
            Err(e) => tracing::warn!(id = %event.id, error = %e, "Failed to publish event to message bus"),
        }
    }

    pub fn store(&self) -> &EventStore {
        &self.store
    }
}
