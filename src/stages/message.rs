//! Message bus stage.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::ServiceConfig;
use crate::di::{well_known, DependencyContainer};
use crate::lifecycle::{BootstrapHandler, CancelSignal, StageError, StartupTimer};
use crate::messaging::{BroadcastBus, MessageBus};

/// Connects the message bus ingested events are forwarded to.
pub struct MessageBusBootstrap;

#[async_trait]
impl BootstrapHandler for MessageBusBootstrap {
    fn name(&self) -> &str {
        "message-bus"
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

        let queue = &config.message_queue;
        if queue.kind != "memory" {
            return Err(StageError::misconfigured(format!(
                "message_queue.type \"{}\" is not supported",
                queue.kind
            )));
        }

        let bus: Arc<dyn MessageBus> = Arc::new(BroadcastBus::new(queue.capacity));
        tracing::info!(kind = bus.kind(), topic = %queue.topic, "Connected to message bus");
        container.register_instance(well_known::MESSAGE_BUS, bus)?;
        Ok(())
    }
}
