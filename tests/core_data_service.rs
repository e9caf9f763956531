//! End-to-end tests of the core-data service over HTTP.

use std::sync::Arc;
use std::time::Duration;

use edge_bootstrap::config::{shared_writable, SecretStoreKind};
use edge_bootstrap::core_data::{keys, MetadataStore, CORRELATION_HEADER};
use edge_bootstrap::di::DependencyContainer;
use edge_bootstrap::events::DomainEventDispatcher;
use edge_bootstrap::lifecycle::{run, BootstrapError, Shutdown, StartupTimer};
use edge_bootstrap::stages::{core_data_stages, register_configuration};
use serde_json::json;

mod common;

#[tokio::test]
async fn test_full_chain_serves_requests() {
    let service = common::start_core_data(common::core_data_config()).await;

    let names: Vec<_> = service.report.stages.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["secret-store", "database", "core-data", "telemetry", "http-server", "message-bus"]
    );
    assert!(service.container.is_sealed());

    let client = reqwest::Client::new();
    let resp = client
        .get(service.url("/api/v1/ping"))
        .header(CORRELATION_HEADER, "abc-123")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()[CORRELATION_HEADER], "abc-123");
    assert_eq!(resp.text().await.unwrap(), "pong");

    let version: serde_json::Value = reqwest::get(service.url("/api/version"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(version["version"], env!("CARGO_PKG_VERSION"));

    service.shutdown.trigger();
    service.server.wait().await.unwrap();
}

#[tokio::test]
async fn test_ingest_updates_store_and_metadata() {
    let service = common::start_core_data(common::core_data_config()).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(service.url("/api/v1/event"))
        .json(&json!({
            "device": "thermostat-1",
            "readings": [{ "name": "temperature", "value": "21.5" }]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    assert!(!resp.text().await.unwrap().is_empty());

    let count: usize = client
        .get(service.url("/api/v1/event/count"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(count, 1);

    let device_count: usize = client
        .get(service.url("/api/v1/event/count/thermostat-1"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(device_count, 1);
    let other_count: usize = client
        .get(service.url("/api/v1/event/count/unknown-device"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(other_count, 0);

    let metrics: serde_json::Value = client
        .get(service.url("/api/v1/metrics"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(metrics["events_ingested"], 1);
    assert_eq!(metrics["events_stored"], 1);
    assert_eq!(metrics["bus_published"], 1);

    service.shutdown.trigger();
    service.server.wait().await.unwrap();

    let dispatcher = service
        .container
        .get_as::<Arc<DomainEventDispatcher>>(&keys::DISPATCHER)
        .await
        .unwrap();
    let stats = dispatcher.shutdown().await;
    assert_eq!(stats.dispatched, 2);
    assert_eq!(stats.failed, 0);

    let metadata = service
        .container
        .get_as::<MetadataStore>(&keys::METADATA)
        .await
        .unwrap();
    assert!(metadata.device("thermostat-1").unwrap().last_reported > 0);
    assert!(metadata.service("device-virtual").unwrap().last_connected > 0);
}

#[tokio::test]
async fn test_invalid_event_is_rejected() {
    let service = common::start_core_data(common::core_data_config()).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(service.url("/api/v1/event"))
        .json(&json!({ "device": "thermostat-1", "readings": [] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    service.shutdown.trigger();
    service.server.wait().await.unwrap();
}

#[tokio::test]
async fn test_config_endpoint_hides_secrets() {
    let service = common::start_core_data(common::core_data_config()).await;

    let body = reqwest::get(service.url("/api/v1/config"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(body.contains("thermostat-1"));
    assert!(!body.contains("password\":\"password"));

    service.shutdown.trigger();
    service.server.wait().await.unwrap();
}

/// Boot with the file secret store pointed at `path`.
async fn boot_with_secret_file(path: &std::path::Path, timeout_secs: u64) -> Result<Vec<u32>, BootstrapError> {
    let mut config = common::core_data_config();
    config.secret_store.kind = SecretStoreKind::File;
    config.secret_store.path = path.display().to_string();
    config.service.boot_timeout_secs = timeout_secs;

    let timer = StartupTimer::from_secs(1, timeout_secs);
    let shutdown = Shutdown::new();
    let container = DependencyContainer::new();
    let writable = shared_writable(config.writable.clone());
    let stages = core_data_stages(&config);
    register_configuration(&container, config, writable).unwrap();

    let result = run(&stages, &timer, &container, &shutdown.subscribe()).await;
    shutdown.trigger();
    result.map(|report| report.stages.iter().map(|s| s.attempts).collect())
}

#[tokio::test]
async fn test_missing_secrets_fail_bootstrap() {
    let path = std::env::temp_dir().join(format!("core-data-secrets-{}.json", uuid::Uuid::new_v4()));

    let err = boot_with_secret_file(&path, 1).await.unwrap_err();
    assert_eq!(err.stage(), "secret-store");
    assert!(matches!(err, BootstrapError::DeadlineExceeded { attempts: 2, .. }));
}

#[tokio::test]
async fn test_secrets_written_late_are_picked_up_on_retry() {
    let path = std::env::temp_dir().join(format!("core-data-secrets-{}.json", uuid::Uuid::new_v4()));

    let writer_path = path.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        let doc = json!({ "coredata": { "username": "core", "password": "late" } });
        tokio::fs::write(&writer_path, doc.to_string()).await.unwrap();
    });

    let attempts = boot_with_secret_file(&path, 5).await.unwrap();
    assert_eq!(attempts[0], 2);
    assert!(attempts[1..].iter().all(|a| *a == 1));

    std::fs::remove_file(&path).unwrap_or_default();
}

#[tokio::test]
async fn test_malformed_secrets_fail_without_retry() {
    let path = std::env::temp_dir().join(format!("core-data-secrets-{}.json", uuid::Uuid::new_v4()));
    std::fs::write(&path, "{ not json").unwrap();

    let err = boot_with_secret_file(&path, 5).await.unwrap_err();
    assert_eq!(err.stage(), "secret-store");
    assert!(matches!(err, BootstrapError::Fatal { attempts: 1, .. }));

    std::fs::remove_file(&path).unwrap_or_default();
}
