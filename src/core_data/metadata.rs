//! Device metadata and the domain event update functions.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use thiserror::Error;

use crate::config::{DeviceConfig, SharedWritable};
use crate::di::BoxError;
use crate::events::{DomainEvent, EventHandler, EventKind, HandlerTable};

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Device {
    pub name: String,
    /// Owning device service.
    pub service: String,
    pub last_connected: i64,
    pub last_reported: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceService {
    pub name: String,
    pub last_connected: i64,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MetadataError {
    #[error("device '{0}' not found")]
    DeviceNotFound(String),

    #[error("device service '{0}' not found")]
    ServiceNotFound(String),
}

/// Known devices and the services that own them.
#[derive(Debug, Clone, Default)]
pub struct MetadataStore {
    devices: Arc<DashMap<String, Device>>,
    services: Arc<DashMap<String, DeviceService>>,
}

impl MetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_devices(devices: &[DeviceConfig]) -> Self {
        let store = Self::new();
        for device in devices {
            store.add_device(&device.name, &device.service);
        }
        store
    }

    /// Add a device, creating its service entry if needed.
    pub fn add_device(&self, name: &str, service: &str) {
        self.services
            .entry(service.to_string())
            .or_insert_with(|| DeviceService {
                name: service.to_string(),
                last_connected: 0,
            });
        self.devices.insert(
            name.to_string(),
            Device {
                name: name.to_string(),
                service: service.to_string(),
                last_connected: 0,
                last_reported: 0,
            },
        );
    }

    pub fn device(&self, name: &str) -> Option<Device> {
        self.devices.get(name).map(|d| d.value().clone())
    }

    pub fn service(&self, name: &str) -> Option<DeviceService> {
        self.services.get(name).map(|s| s.value().clone())
    }

    pub fn contains_device(&self, name: &str) -> bool {
        self.devices.contains_key(name)
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// Record that `name` reported at `at`.
    pub fn touch_device(&self, name: &str, at: i64) -> Result<(), MetadataError> {
        let mut device = self
            .devices
            .get_mut(name)
            .ok_or_else(|| MetadataError::DeviceNotFound(name.to_string()))?;
        device.last_connected = at;
        device.last_reported = at;
        Ok(())
    }

    /// Record that the service owning `device_name` was alive at `at`.
    ///
    /// Returns the service name.
    pub fn touch_service_of(&self, device_name: &str, at: i64) -> Result<String, MetadataError> {
        let service_name = self
            .devices
            .get(device_name)
            .map(|d| d.service.clone())
            .ok_or_else(|| MetadataError::DeviceNotFound(device_name.to_string()))?;

        let mut service = self
            .services
            .get_mut(&service_name)
            .ok_or_else(|| MetadataError::ServiceNotFound(service_name.clone()))?;
        service.last_connected = at;
        Ok(service_name)
    }
}

/// Updates a device's last-connected time on [`DomainEvent::DeviceLastReported`].
pub struct DeviceLastReportedUpdater {
    metadata: MetadataStore,
    writable: SharedWritable,
}

#[async_trait]
impl EventHandler for DeviceLastReportedUpdater {
    async fn handle(&self, event: &DomainEvent) -> Result<(), BoxError> {
        if !self.writable.load().device_update_last_connected {
            tracing::debug!(device = event.device_name(), "Device last-connected updates disabled");
            return Ok(());
        }
        self.metadata.touch_device(event.device_name(), now_millis())?;
        tracing::debug!(device = event.device_name(), "Device last-connected updated");
        Ok(())
    }
}

/// Updates the owning service's last-connected time on
/// [`DomainEvent::DeviceServiceLastReported`].
pub struct ServiceLastReportedUpdater {
    metadata: MetadataStore,
    writable: SharedWritable,
}

#[async_trait]
impl EventHandler for ServiceLastReportedUpdater {
    async fn handle(&self, event: &DomainEvent) -> Result<(), BoxError> {
        if !self.writable.load().service_update_last_connected {
            tracing::debug!(device = event.device_name(), "Service last-connected updates disabled");
            return Ok(());
        }
        let service = self.metadata.touch_service_of(event.device_name(), now_millis())?;
        tracing::debug!(device = event.device_name(), service = %service, "Service last-connected updated");
        Ok(())
    }
}

/// The handler table core-data starts its dispatcher with.
pub fn update_handlers(metadata: &MetadataStore, writable: &SharedWritable) -> HandlerTable {
    HandlerTable::new()
        .on(
            EventKind::DeviceLastReported,
            DeviceLastReportedUpdater {
                metadata: metadata.clone(),
                writable: writable.clone(),
            },
        )
        .on(
            EventKind::DeviceServiceLastReported,
            ServiceLastReportedUpdater {
                metadata: metadata.clone(),
                writable: writable.clone(),
            },
        )
}
