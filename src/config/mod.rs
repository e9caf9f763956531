//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! <confdir>/[<profile>/]configuration.toml
//!     → loader.rs (parse & deserialize, apply command-line overrides)
//!     → validation.rs (semantic checks)
//!     → ServiceConfig (validated, immutable)
//!     → registered in the container for stages and handlers
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → atomic swap of the writable section
//!     → event update functions observe the new flags
//! ```
//!
//! # Design Decisions
//! - Only the writable section changes at runtime; everything else needs a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{config_path, load_config, load_config_with, parse_config, parse_config_with, ConfigError, Overrides};
pub use schema::{
    BackpressurePolicy, DatabaseConfig, DeviceConfig, EventConfig, LogFormat, LoggingConfig,
    MessageQueueConfig, RegistryConfig, SecretStoreConfig, SecretStoreKind, ServiceConfig, ServiceInfo,
    TelemetryConfig, WritableConfig,
};
pub use watcher::{shared_writable, ConfigWatcher, SharedWritable};
