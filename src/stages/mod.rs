//! Bootstrap stages of the core-data service.
//!
//! # Data Flow
//! ```text
//! main registers Configuration + WritableConfiguration
//!     → registry       registers Registry (only when an address is configured)
//!     → secret-store   registers SecretProvider
//!     → database       registers EventStore
//!     → core-data      registers Metadata + DomainEventDispatcher
//!     → telemetry      registers Telemetry (+ Prometheus exporter)
//!     → http-server    registers HttpServer, starts serving
//!     → message-bus    registers MessageBus
//! ```
//!
//! # Design Decisions
//! - Each stage acquires first and registers last, so a failed attempt can be retried
//! - Stages only talk to each other through the container

pub mod data;
pub mod database;
pub mod http;
pub mod message;
pub mod registry;
pub mod secret;
pub mod telemetry;

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;

pub use data::CoreDataBootstrap;
pub use database::DatabaseBootstrap;
pub use http::{HttpServerBootstrap, ServerHandle};
pub use message::MessageBusBootstrap;
pub use registry::RegistryBootstrap;
pub use secret::SecretStoreBootstrap;
pub use telemetry::TelemetryBootstrap;

use crate::config::{ServiceConfig, SharedWritable};
use crate::di::{well_known, ContainerError, DependencyContainer};
use crate::lifecycle::{BootstrapHandler, StageError};

/// Register the configuration every stage reads.
pub fn register_configuration(
    container: &DependencyContainer,
    config: ServiceConfig,
    writable: SharedWritable,
) -> Result<(), ContainerError> {
    container.register_instance(well_known::CONFIGURATION, Arc::new(config))?;
    container.register_instance(well_known::WRITABLE, writable)
}

/// Check that `address` accepts TCP connections within `limit`.
pub(crate) async fn probe(dependency: &'static str, address: &str, limit: Duration) -> Result<(), StageError> {
    match tokio::time::timeout(limit, TcpStream::connect(address)).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) => Err(StageError::unavailable(dependency, format!("{}: {}", address, e))),
        Err(_) => Err(StageError::unavailable(
            dependency,
            format!("{}: connect timed out after {:?}", address, limit),
        )),
    }
}

/// The core-data startup chain, in order.
pub fn core_data_stages(config: &ServiceConfig) -> Vec<Box<dyn BootstrapHandler>> {
    let mut stages: Vec<Box<dyn BootstrapHandler>> = Vec::new();
    if config.registry.address.is_some() {
        stages.push(Box::new(RegistryBootstrap));
    }
    stages.extend([
        Box::new(SecretStoreBootstrap) as Box<dyn BootstrapHandler>,
        Box::new(DatabaseBootstrap),
        Box::new(CoreDataBootstrap),
        Box::new(TelemetryBootstrap),
        Box::new(HttpServerBootstrap),
        Box::new(MessageBusBootstrap),
    ]);
    stages
}
