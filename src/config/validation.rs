//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, capacities > 0)
//! - Reject backends this build cannot provide
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServiceConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::fmt;

use crate::config::schema::{SecretStoreKind, ServiceConfig};

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A numeric setting must be positive.
    Zero(&'static str),
    /// The retry interval is longer than the whole boot timeout.
    RetryExceedsTimeout { retry_secs: u64, timeout_secs: u64 },
    EmptyHost,
    /// `registry.address` is set but blank.
    EmptyRegistryAddress,
    /// `secret_store.type = "file"` without a path.
    MissingSecretPath,
    UnsupportedMessageQueue(String),
    DuplicateDevice(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::Zero(field) => write!(f, "{} must be greater than zero", field),
            ValidationError::RetryExceedsTimeout {
                retry_secs,
                timeout_secs,
            } => write!(
                f,
                "service.boot_retry_secs ({}) exceeds service.boot_timeout_secs ({})",
                retry_secs, timeout_secs
            ),
            ValidationError::EmptyHost => write!(f, "service.host must not be empty"),
            ValidationError::EmptyRegistryAddress => write!(f, "registry.address must not be empty when set"),
            ValidationError::MissingSecretPath => {
                write!(f, "secret_store.path is required when secret_store.type = \"file\"")
            }
            ValidationError::UnsupportedMessageQueue(kind) => {
                write!(f, "message_queue.type \"{}\" is not supported", kind)
            }
            ValidationError::DuplicateDevice(name) => write!(f, "device \"{}\" is defined twice", name),
        }
    }
}

/// Check `config` for semantic errors.
pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let service = &config.service;

    if service.host.trim().is_empty() {
        errors.push(ValidationError::EmptyHost);
    }
    if service.boot_timeout_secs == 0 {
        errors.push(ValidationError::Zero("service.boot_timeout_secs"));
    }
    if service.boot_retry_secs == 0 {
        errors.push(ValidationError::Zero("service.boot_retry_secs"));
    }
    if service.boot_timeout_secs > 0 && service.boot_retry_secs > service.boot_timeout_secs {
        errors.push(ValidationError::RetryExceedsTimeout {
            retry_secs: service.boot_retry_secs,
            timeout_secs: service.boot_timeout_secs,
        });
    }
    if service.request_timeout_secs == 0 {
        errors.push(ValidationError::Zero("service.request_timeout_secs"));
    }

    if config.secret_store.kind == SecretStoreKind::File && config.secret_store.path.trim().is_empty() {
        errors.push(ValidationError::MissingSecretPath);
    }

    if let Some(address) = &config.registry.address {
        if address.trim().is_empty() {
            errors.push(ValidationError::EmptyRegistryAddress);
        }
        if config.registry.connect_timeout_ms == 0 {
            errors.push(ValidationError::Zero("registry.connect_timeout_ms"));
        }
    }

    if config.database.max_events == 0 {
        errors.push(ValidationError::Zero("database.max_events"));
    }

    if config.message_queue.kind != "memory" {
        errors.push(ValidationError::UnsupportedMessageQueue(
            config.message_queue.kind.clone(),
        ));
    }
    if config.message_queue.capacity == 0 {
        errors.push(ValidationError::Zero("message_queue.capacity"));
    }

    if config.events.capacity == 0 {
        errors.push(ValidationError::Zero("events.capacity"));
    }

    let mut seen = HashSet::new();
    for device in &config.devices {
        if !seen.insert(device.name.as_str()) {
            errors.push(ValidationError::DuplicateDevice(device.name.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::DeviceConfig;

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(validate_config(&ServiceConfig::default()), Ok(()));
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = ServiceConfig::default();
        config.service.boot_timeout_secs = 0;
        config.events.capacity = 0;
        config.message_queue.kind = "mqtt".into();
        config.secret_store.kind = SecretStoreKind::File;
        config.devices = vec![
            DeviceConfig { name: "d1".into(), service: "s".into() },
            DeviceConfig { name: "d1".into(), service: "s".into() },
        ];

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::Zero("service.boot_timeout_secs")));
        assert!(errors.contains(&ValidationError::Zero("events.capacity")));
        assert!(errors.contains(&ValidationError::UnsupportedMessageQueue("mqtt".into())));
        assert!(errors.contains(&ValidationError::MissingSecretPath));
        assert!(errors.contains(&ValidationError::DuplicateDevice("d1".into())));
    }

    #[test]
    fn test_retry_longer_than_timeout() {
        let mut config = ServiceConfig::default();
        config.service.boot_timeout_secs = 2;
        config.service.boot_retry_secs = 5;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::RetryExceedsTimeout { retry_secs: 5, timeout_secs: 2 }]
        );
    }
    #[test]
    fn test_blank_registry_address() {
        let mut config = ServiceConfig::default();
        config.registry.address = Some(" ".into());
        config.registry.connect_timeout_ms = 0;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::EmptyRegistryAddress,
                ValidationError::Zero("registry.connect_timeout_ms"),
            ]
        );
    }
}
