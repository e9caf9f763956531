//! Domain event subsystem.
//!
//! # Data Flow
//! ```text
//! Ingestion path (any task)
//!     → EventPublisher::publish(DomainEvent)      (returns once enqueued)
//!     → bounded mpsc channel
//!     → consumer task (exactly one)
//!     → HandlerTable[event.kind()] update function
//!
//! Shutdown:
//!     DomainEventDispatcher::close → channel closed → buffered events drained → consumer exits
//! ```
//!
//! # Design Decisions
//! - Events are a closed sum type; the handler table is keyed by its variant tag
//! - Update failures are logged and counted, never surfaced to producers

pub mod dispatcher;
pub mod types;

pub use dispatcher::{
    DispatchStats, DomainEventDispatcher, EventHandler, EventPublisher, FnEventHandler, HandlerTable,
    PublishError,
};
pub use types::{DomainEvent, EventKind};
