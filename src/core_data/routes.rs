//! REST routes of the core-data service.
//!
//! Handlers take their dependencies from the container on every request, so
//! a route whose dependency has not been registered answers 503 instead of
//! failing at router construction.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{Path, State},
    http::{HeaderValue, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::Instrument;

use crate::config::{ServiceConfig, SharedWritable, WritableConfig};
use crate::core_data::ingest::{CoreData, IngestError};
use crate::core_data::keys;
use crate::core_data::store::{Event, EventStore, StoreError};
use crate::di::{well_known, ContainerError, DependencyContainer};
use crate::observability::{Telemetry, TelemetrySnapshot};

/// Header carrying the request's correlation id.
pub const CORRELATION_HEADER: &str = "x-correlation-id";

/// Build the router.
#[allow(deprecated)]
pub fn router(container: DependencyContainer, request_timeout: Duration) -> Router {
    Router::new()
        .route("/api/version", get(version))
        .route("/api/v1/ping", get(ping))
        .route("/api/v1/config", get(get_config))
        .route("/api/v1/metrics", get(get_metrics))
        .route("/api/v1/event", post(add_event))
        .route("/api/v1/event/count", get(event_count))
        .route("/api/v1/event/count/{device}", get(device_event_count))
        .with_state(container)
        .layer(middleware::from_fn(correlation_id))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
}

/// Errors surfaced to HTTP clients.
#[derive(Debug)]
pub enum ApiError {
    /// A dependency the route needs is not (yet) registered.
    Unavailable(ContainerError),
    Ingest(IngestError),
}

impl From<ContainerError> for ApiError {
    fn from(e: ContainerError) -> Self {
        ApiError::Unavailable(e)
    }
}

impl From<IngestError> for ApiError {
    fn from(e: IngestError) -> Self {
        ApiError::Ingest(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unavailable(e) => {
                tracing::warn!(error = %e, "Request dependency unavailable");
                (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response()
            }
            ApiError::Ingest(e) => {
                let status = match e {
                    IngestError::MissingDevice | IngestError::NoReadings => StatusCode::BAD_REQUEST,
                    IngestError::UnknownDevice(_) => StatusCode::NOT_FOUND,
                    IngestError::Store(StoreError::DuplicateId(_)) => StatusCode::CONFLICT,
                };
                (status, e.to_string()).into_response()
            }
        }
    }
}

async fn ping() -> &'static str {
    "pong"
}

#[derive(Debug, Serialize)]
pub struct VersionResponse {
    pub version: &'static str,
}

async fn version() -> Json<VersionResponse> {
    Json(VersionResponse {
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Current configuration, with the live writable section and without
/// plain-text secrets.
async fn get_config(State(container): State<DependencyContainer>) -> Result<Json<ServiceConfig>, ApiError> {
    let config = container
        .get_as::<Arc<ServiceConfig>>(&well_known::CONFIGURATION)
        .await?;
    let writable = container.get_as::<SharedWritable>(&well_known::WRITABLE).await?;

    let mut view = ServiceConfig::clone(&config);
    view.writable = WritableConfig::clone(&writable.load());
    view.secret_store.insecure.clear();
    Ok(Json(view))
}

#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    #[serde(flatten)]
    pub telemetry: TelemetrySnapshot,
    pub events_stored: usize,
}

async fn get_metrics(State(container): State<DependencyContainer>) -> Result<Json<MetricsResponse>, ApiError> {
    let telemetry = container.get_as::<Arc<Telemetry>>(&well_known::TELEMETRY).await?;
    let store = container.get_as::<Arc<EventStore>>(&keys::EVENT_STORE).await?;
    Ok(Json(MetricsResponse {
        telemetry: telemetry.snapshot(),
        events_stored: store.count(),
    }))
}

async fn add_event(
    State(container): State<DependencyContainer>,
    Json(event): Json<Event>,
) -> Result<(StatusCode, String), ApiError> {
    let core = CoreData::resolve(&container).await?;
    let id = core.add_event(event).await?;
    Ok((StatusCode::CREATED, id))
}

async fn event_count(State(container): State<DependencyContainer>) -> Result<Json<usize>, ApiError> {
    let store = container.get_as::<Arc<EventStore>>(&keys::EVENT_STORE).await?;
    Ok(Json(store.count()))
}

async fn device_event_count(
    State(container): State<DependencyContainer>,
    Path(device): Path<String>,
) -> Result<Json<usize>, ApiError> {
    let store = container.get_as::<Arc<EventStore>>(&keys::EVENT_STORE).await?;
    Ok(Json(store.count_for_device(&device)))
}

/// Propagate or assign a correlation id and run the request inside a span
/// carrying it.
pub async fn correlation_id(mut request: Request<Body>, next: Next) -> Response {
    let id = match request.headers().get(CORRELATION_HEADER) {
        Some(value) => value.clone(),
        None => {
            let generated = HeaderValue::try_from(uuid::Uuid::new_v4().to_string())
                .unwrap_or_else(|_| HeaderValue::from_static("unknown"));
            request.headers_mut().insert(CORRELATION_HEADER, generated.clone());
            generated
        }
    };

    let span = tracing::debug_span!("request", correlation_id = id.to_str().unwrap_or_default());
    let mut response = next.run(request).instrument(span).await;
    response.headers_mut().insert(CORRELATION_HEADER, id);
    response
}
