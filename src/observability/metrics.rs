//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Keep an in-process snapshot of service activity for `/api/v1/metrics`
//! - Mirror the same counters into the `metrics` facade
//! - Install the Prometheus exporter when enabled
//!
//! # Metrics
//! - `bootstrap_stage_attempts_total` (counter): attempts by stage
//! - `domain_events_{published,dropped,dispatched,failed,unhandled}_total` (counter): by kind
//! - `core_data_events_ingested_total` (counter): readings accepted
//! - `core_data_events_rejected_total` (counter): readings refused
//! - `core_data_bus_published_total` (counter): events forwarded to the message bus

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use serde::Serialize;

/// Counters kept by the service itself.
#[derive(Debug)]
pub struct Telemetry {
    started: Instant,
    events_ingested: AtomicU64,
    events_rejected: AtomicU64,
    bus_published: AtomicU64,
}

/// Point-in-time view of [`Telemetry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TelemetrySnapshot {
    pub uptime_secs: u64,
    pub events_ingested: u64,
    pub events_rejected: u64,
    pub bus_published: u64,
}

impl Telemetry {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            events_ingested: AtomicU64::new(0),
            events_rejected: AtomicU64::new(0),
            bus_published: AtomicU64::new(0),
        }
    }

    pub fn record_ingested(&self) {
        self.events_ingested.fetch_add(1, Ordering::Relaxed);
        ::metrics::counter!("core_data_events_ingested_total").increment(1);
    }

    pub fn record_rejected(&self, reason: &'static str) {
        self.events_rejected.fetch_add(1, Ordering::Relaxed);
        ::metrics::counter!("core_data_events_rejected_total", "reason" => reason).increment(1);
    }

    pub fn record_bus_published(&self) {
        self.bus_published.fetch_add(1, Ordering::Relaxed);
        ::metrics::counter!("core_data_bus_published_total").increment(1);
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            uptime_secs: self.started.elapsed().as_secs(),
            events_ingested: self.events_ingested.load(Ordering::Relaxed),
            events_rejected: self.events_rejected.load(Ordering::Relaxed),
            bus_published: self.bus_published.load(Ordering::Relaxed),
        }
    }
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new()
    }
}

/// Install the global Prometheus recorder and its scrape endpoint.
///
/// Must be called from within a Tokio runtime. Fails if a recorder is
/// already installed.
pub fn install_prometheus(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Prometheus exporter listening");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_counts() {
        let telemetry = Telemetry::new();
        telemetry.record_ingested();
        telemetry.record_ingested();
        telemetry.record_rejected("validation");
        telemetry.record_bus_published();

        let snap = telemetry.snapshot();
        assert_eq!(snap.events_ingested, 2);
        assert_eq!(snap.events_rejected, 1);
        assert_eq!(snap.bus_published, 1);
    }
}
