//! Dependency injection subsystem.
//!
//! # Data Flow
//! ```text
//! main
//!     → DependencyContainer::new()
//!     → bootstrap stages register constructors / instances
//!     → container.seal() once the stage chain has succeeded
//!     → request handlers and domain logic call container.get(key)
//! ```
//!
//! # Design Decisions
//! - The container is an explicit handle passed to whoever needs it, never a global
//! - Resolution is lazy and single-flight: one constructor run per key, ever
//! - Entries never regress or get overwritten; a key is owned by the stage that registered it

pub mod container;
pub mod keys;

pub use container::{BoxError, ContainerError, DependencyContainer, Instance};
pub use keys::{well_known, ServiceKey};
