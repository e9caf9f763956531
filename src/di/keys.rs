//! Service keys.

use std::borrow::Cow;
use std::fmt;

/// Stable identifier for a container entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceKey(Cow<'static, str>);

impl ServiceKey {
    /// Key usable in `const` context.
    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for ServiceKey {
    fn from(name: &'static str) -> Self {
        Self::from_static(name)
    }
}

/// Keys shared by every service built on this crate.
pub mod well_known {
    use super::ServiceKey;

    pub const CONFIGURATION: ServiceKey = ServiceKey::from_static("Configuration");
    pub const WRITABLE: ServiceKey = ServiceKey::from_static("WritableConfiguration");
    pub const SECRET_PROVIDER: ServiceKey = ServiceKey::from_static("SecretProvider");
    pub const TELEMETRY: ServiceKey = ServiceKey::from_static("Telemetry");
    pub const MESSAGE_BUS: ServiceKey = ServiceKey::from_static("MessageBus");
    pub const HTTP_SERVER: ServiceKey = ServiceKey::from_static("HttpServer");
    pub const REGISTRY: ServiceKey = ServiceKey::from_static("Registry");
}
