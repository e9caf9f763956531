//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured tracing events and spans)
//!     → metrics.rs (counters via the metrics facade + Telemetry snapshot)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → GET /api/v1/metrics (Telemetry snapshot)
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Logging is initialized before bootstrap so stage failures are visible
//! - The Prometheus exporter is installed by the telemetry stage, not by main

pub mod logging;
pub mod metrics;

pub use logging::init_logging;
pub use metrics::{Telemetry, TelemetrySnapshot};
