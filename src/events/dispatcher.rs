//! Single-consumer domain event dispatcher.
//!
//! # Responsibilities
//! - Own the bounded event channel and its one consumer task
//! - Dispatch each event to the update function registered for its kind
//! - Keep update failures (errors and panics) local to the event
//! - Drain buffered events on close
//!
//! # Design Decisions
//! - One consumer, so update functions never run concurrently with each other
//! - Per-producer FIFO comes from the mpsc channel; producers are not ordered among themselves
//! - Full channel: block the producer by default, or drop with a warning (`drop_newest`)

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::FutureExt;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::config::{BackpressurePolicy, EventConfig};
use crate::di::BoxError;
use crate::events::{DomainEvent, EventKind};
use crate::lifecycle::{CancelSignal, Shutdown};

/// An update function for one kind of event.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &DomainEvent) -> Result<(), BoxError>;
}

/// Adapter turning an async closure into an [`EventHandler`].
pub struct FnEventHandler<F>(F);

#[async_trait]
impl<F, Fut> EventHandler for FnEventHandler<F>
where
    F: Fn(DomainEvent) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
{
    async fn handle(&self, event: &DomainEvent) -> Result<(), BoxError> {
        (self.0)(event.clone()).await
    }
}

/// Update functions keyed by event kind.
#[derive(Clone, Default)]
pub struct HandlerTable {
    handlers: HashMap<EventKind, Arc<dyn EventHandler>>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `kind`, replacing any previous one.
    pub fn on(mut self, kind: EventKind, handler: impl EventHandler + 'static) -> Self {
        self.handlers.insert(kind, Arc::new(handler));
        self
    }

    pub fn on_fn<F, Fut>(self, kind: EventKind, f: F) -> Self
    where
        F: Fn(DomainEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.on(kind, FnEventHandler(f))
    }

    pub fn get(&self, kind: EventKind) -> Option<&Arc<dyn EventHandler>> {
        self.handlers.get(&kind)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Why an event was not enqueued.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum PublishError {
    #[error("event channel is closed")]
    Closed,

    #[error("event channel is full, event dropped")]
    Dropped,
}

/// Consumer-side counters, returned when the consumer exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Events handed to an update function.
    pub dispatched: u64,
    /// Dispatched events whose update function failed or panicked.
    pub failed: u64,
    /// Events with no update function registered for their kind.
    pub unhandled: u64,
}

/// Producer handle. Cheap to clone; one per producing task is fine.
#[derive(Debug, Clone)]
pub struct EventPublisher {
    tx: mpsc::Sender<DomainEvent>,
    policy: BackpressurePolicy,
}

impl EventPublisher {
    /// Enqueue `event` without waiting for it to be processed.
    pub async fn publish(&self, event: DomainEvent) -> Result<(), PublishError> {
        let kind = event.kind();
        let result = match self.policy {
            BackpressurePolicy::Block => self.tx.send(event).await.map_err(|_| PublishError::Closed),
            BackpressurePolicy::DropNewest => match self.tx.try_send(event) {
                Ok(()) => Ok(()),
                Err(TrySendError::Full(event)) => {
                    tracing::warn!(
                        event_kind = %kind,
                        device = event.device_name(),
                        "Event channel full, dropping event"
                    );
                    metrics::counter!("domain_events_dropped_total", "kind" => kind.as_str()).increment(1);
                    Err(PublishError::Dropped)
                }
                Err(TrySendError::Closed(_)) => Err(PublishError::Closed),
            },
        };

        if result.is_ok() {
            metrics::counter!("domain_events_published_total", "kind" => kind.as_str()).increment(1);
        }
        result
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// The process-wide dispatcher: the channel plus its single consumer task.
pub struct DomainEventDispatcher {
    publisher: EventPublisher,
    closer: Shutdown,
    consumer: Mutex<Option<JoinHandle<DispatchStats>>>,
}

impl DomainEventDispatcher {
    /// Create the channel and spawn the consumer.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(config: &EventConfig, handlers: HandlerTable) -> Self {
        let capacity = config.capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let closer = Shutdown::new();

        let consumer = tokio::spawn(
            consume(rx, handlers, closer.subscribe())
                .instrument(tracing::info_span!("domain_events")),
        );

        tracing::info!(
            capacity,
            backpressure = ?config.backpressure,
            "Domain event dispatcher started"
        );

        Self {
            publisher: EventPublisher {
                tx,
                policy: config.backpressure,
            },
            closer,
            consumer: Mutex::new(Some(consumer)),
        }
    }

    pub fn publisher(&self) -> EventPublisher {
        self.publisher.clone()
    }

    pub async fn publish(&self, event: DomainEvent) -> Result<(), PublishError> {
        self.publisher.publish(event).await
    }

    /// Stop accepting events. Buffered events are still dispatched.
    pub fn close(&self) {
        self.closer.trigger();
    }

    pub fn is_closed(&self) -> bool {
        self.closer.is_triggered() || self.publisher.is_closed()
    }

    /// Close, then wait for the consumer to drain and exit.
    ///
    /// Only the first call observes the consumer's statistics; later calls
    /// return zeroed stats.
    pub async fn shutdown(&self) -> DispatchStats {
        self.close();
        let consumer = self
            .consumer
            .lock()
            .expect("dispatcher consumer mutex poisoned")
            .take();

        match consumer {
            Some(handle) => match handle.await {
                Ok(stats) => stats,
                Err(e) => {
                    tracing::error!(error = %e, "Domain event consumer task failed");
                    DispatchStats::default()
                }
            },
            None => DispatchStats::default(),
        }
    }
}

async fn consume(
    mut rx: mpsc::Receiver<DomainEvent>,
    handlers: HandlerTable,
    closed: CancelSignal,
) -> DispatchStats {
    let mut stats = DispatchStats::default();
    let mut closing = false;

    loop {
        tokio::select! {
            biased;
            _ = closed.cancelled(), if !closing => {
                tracing::debug!("Event channel closed, draining");
                rx.close();
                closing = true;
            }
            event = rx.recv() => match event {
                Some(event) => dispatch(&handlers, event, &mut stats).await,
                None => break,
            },
        }
    }

    tracing::info!(
        dispatched = stats.dispatched,
        failed = stats.failed,
        unhandled = stats.unhandled,
        "Domain event consumer stopped"
    );
    stats
}

async fn dispatch(handlers: &HandlerTable, event: DomainEvent, stats: &mut DispatchStats) {
    let kind = event.kind();
    let Some(handler) = handlers.get(kind) else {
        tracing::warn!(event_kind = %kind, device = event.device_name(), "No handler for event, dropping");
        metrics::counter!("domain_events_unhandled_total", "kind" => kind.as_str()).increment(1);
        stats.unhandled += 1;
        return;
    };

    stats.dispatched += 1;
    metrics::counter!("domain_events_dispatched_total", "kind" => kind.as_str()).increment(1);

    let outcome = AssertUnwindSafe(handler.handle(&event)).catch_unwind().await;
    let failure = match outcome {
        Ok(Ok(())) => return,
        Ok(Err(e)) => e.to_string(),
        Err(_) => "update function panicked".to_string(),
    };

    stats.failed += 1;
    metrics::counter!("domain_events_failed_total", "kind" => kind.as_str()).increment(1);
    tracing::error!(event_kind = %kind, device = event.device_name(), error = %failure, "Event update failed");
}
