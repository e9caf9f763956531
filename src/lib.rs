//! Edge microservice bootstrap library.
//!
//! Ordered, deadline-bounded service startup over a lazy dependency
//! container, plus the domain event dispatcher and the core-data service
//! built on top of them.

pub mod config;
pub mod core_data;
pub mod di;
pub mod events;
pub mod lifecycle;
pub mod messaging;
pub mod observability;
pub mod secrets;
pub mod stages;

pub use config::schema::ServiceConfig;
pub use di::{DependencyContainer, ServiceKey};
pub use events::{DomainEvent, DomainEventDispatcher};
pub use lifecycle::{BootstrapHandler, Shutdown, StartupTimer};
