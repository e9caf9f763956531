//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     StartupTimer + DependencyContainer + ordered stages
//!     → run each stage, retrying the failing one (timer.rs)
//!     → success: seal container, hand over to the listener
//!     → deadline or cancel: fatal, process exits non-zero
//!
//! Shutdown (shutdown.rs):
//!     Shutdown::trigger → every CancelSignal fires
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//! ```
//!
//! # Design Decisions
//! - Ordered startup: secrets, database, domain, telemetry, listener, message bus
//! - A single deadline is shared by the whole chain
//! - Cancellation is a first-class input to startup, not an afterthought

pub mod handler;
pub mod shutdown;
pub mod signals;
pub mod startup;
pub mod timer;

pub use handler::{stage, BootstrapHandler, FnHandler, StageError};
pub use shutdown::{CancelSignal, Shutdown};
pub use startup::{run, BootstrapError, BootstrapReport, StageReport};
pub use timer::{StartupTimer, Waited};
