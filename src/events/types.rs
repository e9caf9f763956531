//! Domain event types.

use std::fmt;

/// A fact about device or device-service activity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainEvent {
    /// The named device has just reported data.
    DeviceLastReported { device_name: String },
    /// The service owning the named device is alive.
    DeviceServiceLastReported { device_name: String },
}

impl DomainEvent {
    pub fn device_last_reported(device_name: impl Into<String>) -> Self {
        Self::DeviceLastReported {
            device_name: device_name.into(),
        }
    }

    pub fn device_service_last_reported(device_name: impl Into<String>) -> Self {
        Self::DeviceServiceLastReported {
            device_name: device_name.into(),
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            DomainEvent::DeviceLastReported { .. } => EventKind::DeviceLastReported,
            DomainEvent::DeviceServiceLastReported { .. } => EventKind::DeviceServiceLastReported,
        }
    }

    pub fn device_name(&self) -> &str {
        match self {
            DomainEvent::DeviceLastReported { device_name }
            | DomainEvent::DeviceServiceLastReported { device_name } => device_name,
        }
    }
}

/// Variant tag of a [`DomainEvent`], used to key the handler table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    DeviceLastReported,
    DeviceServiceLastReported,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::DeviceLastReported => "device_last_reported",
            EventKind::DeviceServiceLastReported => "device_service_last_reported",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
