//! Core Data microservice.
//!
//! Loads configuration, runs the ordered bootstrap chain under a shared
//! deadline, then serves until SIGINT/SIGTERM.
//!
//! ```text
//!   configuration.toml ──▶ ServiceConfig ──▶ DependencyContainer
//!                                                 │
//!   [registry ─▶] secret-store ─▶ database ─▶ core-data ─▶ telemetry ─▶ http-server ─▶ message-bus
//!        (each stage retried until StartupTimer expires or a signal arrives)
//!                                                 │
//!                              serve ◀────────────┘
//!                                │  SIGTERM
//!                                ▼
//!                  HTTP drain ─▶ dispatcher drain ─▶ exit
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use edge_bootstrap::config::{config_path, load_config_with, shared_writable, ConfigWatcher, Overrides};
use edge_bootstrap::core_data::keys;
use edge_bootstrap::di::{well_known, DependencyContainer};
use edge_bootstrap::events::DomainEventDispatcher;
use edge_bootstrap::lifecycle::{self, signals::spawn_signal_listener, Shutdown, StartupTimer};
use edge_bootstrap::observability::init_logging;
use edge_bootstrap::stages::{core_data_stages, register_configuration, ServerHandle};

#[derive(Parser, Debug)]
#[command(name = "core-data", version, about = "Core Data microservice")]
struct Cli {
    /// Configuration directory.
    #[arg(short, long, default_value = "res")]
    confdir: PathBuf,

    /// Profile subdirectory of the configuration directory.
    #[arg(short, long)]
    profile: Option<String>,

    /// Override service.boot_timeout_secs.
    #[arg(long)]
    boot_timeout: Option<u64>,

    /// Override service.boot_retry_secs.
    #[arg(long)]
    boot_retry: Option<u64>,

    /// Wait for the service registry at this `host:port` before starting.
    #[arg(short, long)]
    registry: Option<String>,

    /// Do not watch the configuration file for changes.
    #[arg(long)]
    no_watch: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let path = config_path(&cli.confdir, cli.profile.as_deref());
    let overrides = Overrides {
        boot_timeout_secs: cli.boot_timeout,
        boot_retry_secs: cli.boot_retry,
        registry_address: cli.registry.clone(),
    };
    let config = match load_config_with(&path, &overrides) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("core-data: {}", e);
            return ExitCode::from(2);
        }
    };

    if let Err(e) = init_logging(&config.logging) {
        eprintln!("core-data: failed to initialize logging: {}", e);
    }

    tracing::info!(
        service = %config.service.name,
        version = env!("CARGO_PKG_VERSION"),
        config = %path.display(),
        "Service starting"
    );

    let shutdown = Arc::new(Shutdown::new());
    spawn_signal_listener(shutdown.clone());
    let cancel = shutdown.subscribe();

    let timer = StartupTimer::from_secs(config.service.boot_retry_secs, config.service.boot_timeout_secs);
    let startup_msg = config.service.startup_msg.clone();
    let writable = shared_writable(config.writable.clone());
    let stages = core_data_stages(&config);
    let container = DependencyContainer::new();
    if let Err(e) = register_configuration(&container, config, writable.clone()) {
        tracing::error!(error = %e, "Failed to register configuration");
        return ExitCode::FAILURE;
    }

    let report = match lifecycle::run(&stages, &timer, &container, &cancel).await {
        Ok(report) => report,
        Err(e) => {
            tracing::error!(stage = e.stage(), error = %e, "Bootstrap failed");
            shutdown.trigger();
            close_dispatcher(&container).await;
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(elapsed_ms = report.elapsed.as_millis() as u64, "{}", startup_msg);

    // Keep the watcher alive for the life of the process.
    let _watcher = if cli.no_watch {
        None
    } else {
        match ConfigWatcher::new(&path, writable).run() {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                tracing::warn!(error = %e, "Config watcher unavailable, writable settings are fixed");
                None
            }
        }
    };

    match container.get_as::<ServerHandle>(&well_known::HTTP_SERVER).await {
        Ok(server) => {
            if let Err(e) = server.wait().await {
                tracing::error!(error = %e, "HTTP server failed");
                shutdown.trigger();
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "No HTTP server registered, waiting for shutdown signal");
            cancel.cancelled().await;
        }
    }

    close_dispatcher(&container).await;
    tracing::info!("Shutdown complete");
    ExitCode::SUCCESS
}

/// Drain and stop the domain event dispatcher if the chain got far enough to start it.
async fn close_dispatcher(container: &DependencyContainer) {
    if !container.contains(&keys::DISPATCHER) {
        return;
    }
    match container
        .get_as::<Arc<DomainEventDispatcher>>(&keys::DISPATCHER)
        .await
    {
        Ok(dispatcher) => {
            let stats = dispatcher.shutdown().await;
            tracing::info!(
                dispatched = stats.dispatched,
                failed = stats.failed,
                unhandled = stats.unhandled,
                "Domain events drained"
            );
        }
        Err(e) => tracing::warn!(error = %e, "Dispatcher lookup failed"),
    }
}
