//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the global tracing subscriber once per process
//! - Pick JSON or human-readable output from config
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - `RUST_LOG` wins over the configured level when set

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, LoggingConfig};

/// Build the filter: `RUST_LOG` if set, otherwise the configured level for
/// this crate and `warn` for everything else.
pub fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,edge_bootstrap={level},core_data={level},tower_http={level}",
            level = config.level
        ))
    })
}

/// Install the global subscriber.
///
/// Returns an error if a subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<(), tracing_subscriber::util::TryInitError> {
    let registry = tracing_subscriber::registry().with(env_filter(config));

    match config.format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .try_init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).try_init(),
    }
}
