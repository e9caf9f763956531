//! HTTP listener stage.

use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::config::ServiceConfig;
use crate::core_data::router;
use crate::di::{well_known, DependencyContainer};
use crate::lifecycle::{BootstrapHandler, CancelSignal, StageError, StartupTimer};

/// Handle to the running HTTP server, registered in the container.
#[derive(Clone)]
pub struct ServerHandle {
    local_addr: SocketAddr,
    task: Arc<Mutex<Option<JoinHandle<io::Result<()>>>>>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Wait for the server to stop. It stops once the process cancel signal
    /// fires and in-flight requests have completed.
    ///
    /// Only the first caller waits; later calls return immediately.
    pub async fn wait(&self) -> io::Result<()> {
        let task = self.task.lock().expect("server handle mutex poisoned").take();
        match task {
            Some(task) => task.await.map_err(io::Error::other)?,
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for ServerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerHandle")
            .field("local_addr", &self.local_addr)
            .finish()
    }
}

/// Binds the listener and starts serving the core-data routes.
pub struct HttpServerBootstrap;

#[async_trait]
impl BootstrapHandler for HttpServerBootstrap {
    fn name(&self) -> &str {
        "http-server"
    }

    async fn bootstrap(
        &self,
        container: &DependencyContainer,
        _timer: &StartupTimer,
        cancel: &CancelSignal,
    ) -> Result<(), StageError> {
        let config = container
            .get_as::<Arc<ServiceConfig>>(&well_known::CONFIGURATION)
            .await?;

        let address = config.service.bind_address();
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|e| StageError::unavailable("http listener", format!("{}: {}", address, e)))?;
        let local_addr = listener.local_addr()?;

        let handle = ServerHandle {
            local_addr,
            task: Arc::new(Mutex::new(None)),
        };
        container.register_instance(well_known::HTTP_SERVER, handle.clone())?;

        let app = router(
            container.clone(),
            Duration::from_secs(config.service.request_timeout_secs),
        );
        let shutdown = cancel.clone();
        let task = tokio::spawn(async move {
            tracing::info!(address = %local_addr, "HTTP server starting");
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await?;
            tracing::info!("HTTP server stopped");
            Ok::<(), io::Error>(())
        });
        *handle.task.lock().expect("server handle mutex poisoned") = Some(task);
        Ok(())
    }
}
