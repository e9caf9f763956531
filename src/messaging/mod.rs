//! Message bus subsystem.
//!
//! # Data Flow
//! ```text
//! add_event (ingest)
//!     → MessageEnvelope { topic, correlation_id, payload }
//!     → MessageBus::publish
//!     → every BroadcastBus subscriber
//! ```
//!
//! # Design Decisions
//! - Only an in-process bus is provided; the trait is the seam for brokers
//! - Publishing with no subscribers is not an error

pub mod bus;

pub use bus::{BroadcastBus, BusError, MessageBus, MessageEnvelope};
