//! OS signal handling.
//!
//! # Responsibilities
//! - Listen for SIGINT (Ctrl-C) and SIGTERM
//! - Translate the first one into [`Shutdown::trigger`]
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - The same trigger cancels an in-flight bootstrap and drains a running service

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::lifecycle::Shutdown;

/// Spawn a task that triggers `shutdown` on the first termination signal.
pub fn spawn_signal_listener(shutdown: Arc<Shutdown>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let signal = wait_for_termination().await;
        tracing::info!(signal, "Termination signal received, shutting down");
        shutdown.trigger();
    })
}

#[cfg(unix)]
async fn wait_for_termination() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to install SIGTERM handler, listening for Ctrl-C only");
            return ctrl_c().await;
        }
    };

    tokio::select! {
        name = ctrl_c() => name,
        _ = sigterm.recv() => "SIGTERM",
    }
}

#[cfg(not(unix))]
async fn wait_for_termination() -> &'static str {
    ctrl_c().await
}

async fn ctrl_c() -> &'static str {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    "SIGINT"
}
