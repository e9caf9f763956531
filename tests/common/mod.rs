//! Shared utilities for integration tests.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use edge_bootstrap::config::{shared_writable, DeviceConfig, ServiceConfig};
use edge_bootstrap::di::{well_known, DependencyContainer};
use edge_bootstrap::lifecycle::{self, stage, BootstrapHandler, BootstrapReport, Shutdown, StageError, StartupTimer};
use edge_bootstrap::stages::{core_data_stages, register_configuration, ServerHandle};

/// Shared invocation log: one entry per stage attempt.
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn push(&self, name: &str) {
        self.0.lock().unwrap().push(name.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, name: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|n| *n == name).count()
    }
}

/// A stage that fails `failures` times before succeeding.
pub fn flaky(name: &'static str, failures: u32, log: &CallLog) -> Box<dyn BootstrapHandler> {
    let log = log.clone();
    let attempts = Arc::new(AtomicU32::new(0));
    stage(name, move |_, _, _| {
        let log = log.clone();
        let attempts = attempts.clone();
        async move {
            log.push(name);
            if attempts.fetch_add(1, Ordering::SeqCst) < failures {
                return Err(StageError::unavailable("flaky dependency", "not yet"));
            }
            Ok(())
        }
    })
}

/// A stage that never succeeds.
#[allow(dead_code)]
pub fn failing(name: &'static str, log: &CallLog) -> Box<dyn BootstrapHandler> {
    flaky(name, u32::MAX, log)
}

/// A core-data configuration bound to an ephemeral local port.
#[allow(dead_code)]
pub fn core_data_config() -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.service.host = "127.0.0.1".into();
    config.service.port = 0;
    config.service.boot_timeout_secs = 5;
    config.secret_store.insecure.insert(
        "coredata".into(),
        BTreeMap::from([
            ("username".to_string(), "core".to_string()),
            ("password".to_string(), "password".to_string()),
        ]),
    );
    config.devices = vec![DeviceConfig {
        name: "thermostat-1".into(),
        service: "device-virtual".into(),
    }];
    config
}

/// A fully bootstrapped core-data service.
#[allow(dead_code)]
pub struct RunningService {
    pub container: DependencyContainer,
    pub shutdown: Arc<Shutdown>,
    pub server: ServerHandle,
    pub report: BootstrapReport,
}

#[allow(dead_code)]
impl RunningService {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr(), path)
    }

    pub fn addr(&self) -> SocketAddr {
        self.server.local_addr()
    }
}

/// Run the real core-data chain and return once it is serving.
#[allow(dead_code)]
pub async fn start_core_data(config: ServiceConfig) -> RunningService {
    let timer = StartupTimer::from_secs(config.service.boot_retry_secs, config.service.boot_timeout_secs);
    let shutdown = Arc::new(Shutdown::new());
    let container = DependencyContainer::new();
    let writable = shared_writable(config.writable.clone());
    let stages = core_data_stages(&config);
    register_configuration(&container, config, writable).unwrap();

    let report = lifecycle::run(&stages, &timer, &container, &shutdown.subscribe())
        .await
        .expect("core-data bootstrap failed");
    let server = container
        .get_as::<ServerHandle>(&well_known::HTTP_SERVER)
        .await
        .unwrap();

    RunningService {
        container,
        shutdown,
        server,
        report,
    }
}
