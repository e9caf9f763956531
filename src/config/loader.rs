//! Configuration loading from disk.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::schema::ServiceConfig;
use crate::config::validation::{validate_config, ValidationError};

/// File name looked up inside the configuration directory.
pub const CONFIG_FILE_NAME: &str = "configuration.toml";

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(toml::de::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, e) => write!(f, "IO error reading {}: {}", path.display(), e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Resolve `<confdir>/[<profile>/]configuration.toml`.
pub fn config_path(confdir: &Path, profile: Option<&str>) -> PathBuf {
    let mut path = confdir.to_path_buf();
    if let Some(profile) = profile.filter(|p| !p.is_empty()) {
        path.push(profile);
    }
    path.push(CONFIG_FILE_NAME);
    path
}

/// Command-line settings that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub boot_timeout_secs: Option<u64>,
    pub boot_retry_secs: Option<u64>,
    pub registry_address: Option<String>,
}

impl Overrides {
    pub fn apply(&self, config: &mut ServiceConfig) {
        if let Some(secs) = self.boot_timeout_secs {
            config.service.boot_timeout_secs = secs;
        }
        if let Some(secs) = self.boot_retry_secs {
            config.service.boot_retry_secs = secs;
        }
        if let Some(address) = &self.registry_address {
            config.registry.address = Some(address.clone());
        }
    }
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<ServiceConfig, ConfigError> {
    parse_config_with(content, &Overrides::default())
}

/// Parse configuration text, apply `overrides`, then validate the result.
pub fn parse_config_with(content: &str, overrides: &Overrides) -> Result<ServiceConfig, ConfigError> {
    let mut config: ServiceConfig = toml::from_str(content).map_err(ConfigError::Parse)?;
    overrides.apply(&mut config);
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ServiceConfig, ConfigError> {
    load_config_with(path, &Overrides::default())
}

/// Load configuration from a TOML file with command-line overrides applied
/// before validation.
pub fn load_config_with(path: &Path, overrides: &Overrides) -> Result<ServiceConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
    parse_config_with(&content, overrides)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{BackpressurePolicy, SecretStoreKind};

    #[test]
    fn test_config_path_with_profile() {
        assert_eq!(
            config_path(Path::new("res"), Some("docker")),
            PathBuf::from("res/docker/configuration.toml")
        );
        assert_eq!(config_path(Path::new("res"), None), PathBuf::from("res/configuration.toml"));
        assert_eq!(config_path(Path::new("res"), Some("")), PathBuf::from("res/configuration.toml"));
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse_config("[service]\nport = 9000\n").unwrap();
        assert_eq!(config.service.port, 9000);
        assert_eq!(config.service.boot_timeout_secs, 30);
        assert_eq!(config.service.boot_retry_secs, 1);
        assert_eq!(config.events.backpressure, BackpressurePolicy::Block);
    }

    #[test]
    fn test_full_sections_parse() {
        let text = r#"
            [service]
            name = "core-data"
            boot_timeout_secs = 5

            [secret_store]
            type = "insecure"

            [secret_store.insecure.coredata]
            username = "core"
            password = "secret"

            [events]
            capacity = 8
            backpressure = "drop_newest"

            [writable]
            metadata_check = true

            [[devices]]
            name = "thermostat-1"
            service = "device-virtual"
        "#;

        let config = parse_config(text).unwrap();
        assert_eq!(config.secret_store.kind, SecretStoreKind::Insecure);
        assert_eq!(config.secret_store.insecure["coredata"]["username"], "core");
        assert_eq!(config.events.capacity, 8);
        assert_eq!(config.events.backpressure, BackpressurePolicy::DropNewest);
        assert!(config.writable.metadata_check);
        assert_eq!(config.devices[0].service, "device-virtual");
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let err = parse_config("[events]\ncapacity = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("events.capacity"));
    }

    #[test]
    fn test_overrides_are_validated() {
        let zero_retry = Overrides {
            boot_retry_secs: Some(0),
            ..Overrides::default()
        };
        let err = parse_config_with("", &zero_retry).unwrap_err();
        assert!(err.to_string().contains("service.boot_retry_secs must be greater than zero"));

        let retry_too_long = Overrides {
            boot_timeout_secs: Some(5),
            boot_retry_secs: Some(60),
            ..Overrides::default()
        };
        match parse_config_with("[service]\nboot_timeout_secs = 120\n", &retry_too_long).unwrap_err() {
            ConfigError::Validation(errors) => assert_eq!(
                errors,
                vec![ValidationError::RetryExceedsTimeout { retry_secs: 60, timeout_secs: 5 }]
            ),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_overrides_take_precedence() {
        let overrides = Overrides {
            boot_timeout_secs: Some(10),
            boot_retry_secs: Some(2),
            registry_address: Some("127.0.0.1:8500".into()),
        };
        let config = parse_config_with("[service]\nboot_timeout_secs = 120\n", &overrides).unwrap();
        assert_eq!(config.service.boot_timeout_secs, 10);
        assert_eq!(config.service.boot_retry_secs, 2);
        assert_eq!(config.registry.address.as_deref(), Some("127.0.0.1:8500"));
    }

    #[test]
    fn test_missing_file() {
        let err = load_config(Path::new("/definitely/not/here/configuration.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(..)));
    }
}
