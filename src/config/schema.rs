//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for a service.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Root configuration for a service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// Identity, listener and boot policy.
    pub service: ServiceInfo,

    /// Log level and format.
    pub logging: LoggingConfig,

    /// Where database credentials come from.
    pub secret_store: SecretStoreConfig,

    /// Persistence settings.
    pub database: DatabaseConfig,

    /// Message bus settings.
    pub message_queue: MessageQueueConfig,

    /// Domain event channel settings.
    pub events: EventConfig,

    /// Metrics exporter settings.
    pub telemetry: TelemetryConfig,

    /// Service registry the service waits for before anything else.
    pub registry: RegistryConfig,

    /// Settings that may change at runtime without restart.
    pub writable: WritableConfig,

    /// Devices known at startup.
    pub devices: Vec<DeviceConfig>,
}

/// Service identity and boot policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceInfo {
    /// Service name, used in logs and as the registry key.
    pub name: String,

    /// Host to bind the HTTP listener on.
    pub host: String,

    /// Port to bind the HTTP listener on (0 = ephemeral).
    pub port: u16,

    /// Total time allowed for the bootstrap chain, in seconds.
    pub boot_timeout_secs: u64,

    /// Sleep between attempts of a failing stage, in seconds.
    pub boot_retry_secs: u64,

    /// Per-request timeout for the HTTP listener, in seconds.
    pub request_timeout_secs: u64,

    /// Logged once bootstrap has completed.
    pub startup_msg: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            name: "core-data".to_string(),
            host: "0.0.0.0".to_string(),
            port: 48080,
            boot_timeout_secs: 30,
            boot_retry_secs: 1,
            request_timeout_secs: 5,
            startup_msg: "This is the Core Data Microservice".to_string(),
        }
    }
}

impl ServiceInfo {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive (trace, debug, info, warn, error).
    pub level: String,

    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Secret store backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SecretStoreKind {
    /// Secrets are read from `insecure` in this file.
    #[default]
    Insecure,
    /// Secrets are read from a JSON document mounted at `path`.
    File,
}

/// Secret store configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct SecretStoreConfig {
    #[serde(rename = "type")]
    pub kind: SecretStoreKind,

    /// Path of the mounted secrets document (file store only).
    pub path: String,

    /// Secrets by path, then by key (insecure store only).
    pub insecure: BTreeMap<String, BTreeMap<String, String>>,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Secret path holding `username` and `password`.
    pub credentials_path: String,

    /// When set, the database stage waits until this `host:port` accepts TCP connections.
    pub probe_address: Option<String>,

    /// Connect timeout for the probe, in milliseconds.
    pub connect_timeout_ms: u64,

    /// Maximum number of readings retained in memory.
    pub max_events: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            credentials_path: "coredata".to_string(),
            probe_address: None,
            connect_timeout_ms: 1000,
            max_events: 10_000,
        }
    }
}

/// Service registry settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// `host:port` of the registry. Unset means no registry is used.
    pub address: Option<String>,

    /// Connect timeout for the reachability check, in milliseconds.
    pub connect_timeout_ms: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            address: None,
            connect_timeout_ms: 1000,
        }
    }
}

/// Message bus configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MessageQueueConfig {
    /// Bus implementation. Only "memory" is available.
    #[serde(rename = "type")]
    pub kind: String,

    /// Topic ingested events are published on.
    pub topic: String,

    /// Per-subscriber buffer of the in-process bus.
    pub capacity: usize,
}

impl Default for MessageQueueConfig {
    fn default() -> Self {
        Self {
            kind: "memory".to_string(),
            topic: "events".to_string(),
            capacity: 256,
        }
    }
}

/// What `publish` does when the event channel is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackpressurePolicy {
    /// Wait for free capacity.
    #[default]
    Block,
    /// Drop the new event with a warning.
    DropNewest,
}

/// Domain event channel configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EventConfig {
    /// Channel capacity.
    pub capacity: usize,

    pub backpressure: BackpressurePolicy,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            capacity: 128,
            backpressure: BackpressurePolicy::Block,
        }
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Install the Prometheus exporter.
    pub prometheus_enabled: bool,

    /// Exporter bind address.
    pub prometheus_address: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            prometheus_enabled: false,
            prometheus_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Runtime-reloadable settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct WritableConfig {
    /// Reject readings from devices that are not in the metadata store.
    pub metadata_check: bool,

    /// Update a device's last-connected time when it reports.
    pub device_update_last_connected: bool,

    /// Update the owning service's last-connected time when a device reports.
    pub service_update_last_connected: bool,

    /// Publish ingested events on the message bus.
    pub persist_and_publish: bool,
}

impl Default for WritableConfig {
    fn default() -> Self {
        Self {
            metadata_check: false,
            device_update_last_connected: true,
            service_update_last_connected: true,
            persist_and_publish: true,
        }
    }
}

/// A device known at startup.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeviceConfig {
    pub name: String,

    /// Name of the device service that owns this device.
    pub service: String,
}
