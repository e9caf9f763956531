//! In-process message bus.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;

/// A published message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    pub topic: String,
    pub correlation_id: String,
    pub content_type: String,
    pub payload: Vec<u8>,
}

impl MessageEnvelope {
    pub fn json(topic: impl Into<String>, correlation_id: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            topic: topic.into(),
            correlation_id: correlation_id.into(),
            content_type: "application/json".to_string(),
            payload,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BusError {
    #[error("message bus is disconnected")]
    Disconnected,
}

/// Outbound messaging.
#[async_trait]
pub trait MessageBus: Send + Sync {
    async fn publish(&self, envelope: MessageEnvelope) -> Result<(), BusError>;

    /// Backend name for logs.
    fn kind(&self) -> &'static str;
}

/// Fan-out bus over a Tokio broadcast channel.
///
/// Slow subscribers lag and lose the oldest messages; publishers never wait.
#[derive(Debug)]
pub struct BroadcastBus {
    tx: broadcast::Sender<MessageEnvelope>,
    connected: AtomicBool,
}

impl BroadcastBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            connected: AtomicBool::new(true),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MessageEnvelope> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Refuse further publishes.
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::Release);
    }
}

#[async_trait]
impl MessageBus for BroadcastBus {
    async fn publish(&self, envelope: MessageEnvelope) -> Result<(), BusError> {
        if !self.connected.load(Ordering::Acquire) {
            return Err(BusError::Disconnected);
        }
        let topic = envelope.topic.clone();
        match self.tx.send(envelope) {
            Ok(receivers) => tracing::trace!(topic = %topic, receivers, "Message published"),
            Err(_) => tracing::trace!(topic = %topic, "Message published with no subscribers"),
        }
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "memory"
    }
}
