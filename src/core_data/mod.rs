//! Core-data service domain.
//!
//! # Data Flow
//! ```text
//! POST /api/v1/event (routes.rs)
//!     → CoreData::add_event (ingest.rs): validate, metadata check
//!     → EventStore::add (store.rs)
//!     → MessageBus::publish (when the bus stage has run)
//!     → DeviceLastReported + DeviceServiceLastReported → dispatcher
//!     → update functions (metadata.rs) touch last-connected timestamps
//! ```
//!
//! # Design Decisions
//! - Everything is looked up in the container, never held globally
//! - Update functions read the writable flags at handling time, so hot reload applies immediately

pub mod ingest;
pub mod metadata;
pub mod routes;
pub mod store;

pub use ingest::{CoreData, IngestError};
pub use metadata::{
    now_millis, update_handlers, Device, DeviceLastReportedUpdater, DeviceService, MetadataError,
    MetadataStore, ServiceLastReportedUpdater,
};
pub use routes::{router, ApiError, CORRELATION_HEADER};
pub use store::{Event, EventStore, Reading, StoreError};

/// Container keys owned by core-data.
pub mod keys {
    use crate::di::ServiceKey;

    pub const EVENT_STORE: ServiceKey = ServiceKey::from_static("EventStore");
    pub const METADATA: ServiceKey = ServiceKey::from_static("Metadata");
    pub const DISPATCHER: ServiceKey = ServiceKey::from_static("DomainEventDispatcher");
}
