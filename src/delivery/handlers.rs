use std::collections::HashMap;
use std::time::Instant;

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use tracing::{debug, error, info, warn};

use crate::core::error::{DeliveryError, ErrorKind};
use crate::core::types::StorageKey;
use crate::observability::metrics as obs;
use crate::resolver::MetadataResolver;
use crate::storage::{resolve_content_type, VideoStore};

use super::body::MeteredStream;
use super::router::{HealthState, StorageState, StreamingState};

// ---------------------------------------------------------------------------
// Storage service
// ---------------------------------------------------------------------------

/// `GET /video?<key_param>=<key>` on the storage service.
///
/// Flow: read key → fetch from the object store → stream the body.
/// Missing key is 400 without touching the store; a missing object is 404.
pub async fn serve_video<S: VideoStore>(
    State(state): State<StorageState<S>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, DeliveryError> {
    let key = required_param(&params, &state.key_param)
        .map_err(|e| log_rejection("storage", e))?;

    debug!(bucket = %state.bucket, key, "fetching object");
    let fetch_start = Instant::now();
    let object = match state.store.fetch(&state.bucket, key).await {
        Ok(object) => object,
        Err(e) => {
            obs::inc_store_error(e.label());
            return Err(log_rejection("storage", e.into()));
        }
    };
    obs::record_store_fetch_duration(fetch_start.elapsed().as_secs_f64());

    let content_type = resolve_content_type(object.content_type.as_deref(), key);
    let mut response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type);
    if let Some(len) = object.content_length {
        response = response.header(header::CONTENT_LENGTH, len);
    }

    let body = Body::from_stream(MeteredStream::new(
        object.body,
        "storage",
        key,
        object.content_length,
    ));
    response.body(body).map_err(|e| {
        log_rejection(
            "storage",
            DeliveryError::Internal {
                reason: format!("failed to build response: {}", e),
            },
        )
    })
}

// ---------------------------------------------------------------------------
// Streaming service
// ---------------------------------------------------------------------------

/// `GET /video?<id_param>=<identifier>` on the streaming service.
///
/// Flow: validate identifier → resolve to a storage key → request the key
/// from the storage service → relay the body. Nothing is written to the
/// client until the storage service has answered with a 2xx status.
pub async fn stream_video<R: MetadataResolver>(
    State(state): State<StreamingState<R>>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<Response, DeliveryError> {
    let identifier = required_param(&params, &state.id_param)
        .map_err(|e| log_rejection("streaming", e))?;

    let key = resolve_key(state.resolver.as_ref(), identifier).await?;
    info!(identifier, key = %key, "streaming video");

    let upstream = state
        .upstream
        .fetch(&key, &headers)
        .await
        .map_err(|e| log_rejection("streaming", e.into()))?;

    let mut response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, state.content_type.clone());
    let content_length = upstream.content_length();
    if let Some(len) = content_length {
        response = response.header(header::CONTENT_LENGTH, len);
    }

    let body = Body::from_stream(MeteredStream::new(
        Box::pin(upstream.bytes_stream()),
        "streaming",
        key.as_str(),
        content_length,
    ));
    response.body(body).map_err(|e| {
        log_rejection(
            "streaming",
            DeliveryError::Internal {
                reason: format!("failed to build response: {}", e),
            },
        )
    })
}

async fn resolve_key<R: MetadataResolver>(
    resolver: &R,
    identifier: &str,
) -> Result<StorageKey, DeliveryError> {
    let start = Instant::now();
    let resolved = resolver.resolve(identifier).await;
    obs::record_resolver_lookup_duration(start.elapsed().as_secs_f64());

    resolved.map_err(|e| {
        obs::inc_resolver_error(e.label());
        log_rejection("streaming", e.into())
    })
}

// ---------------------------------------------------------------------------
// Health endpoints
// ---------------------------------------------------------------------------

/// `GET /healthz`: liveness probe.
pub async fn healthz(State(state): State<HealthState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "role": state.role.as_str(),
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// `GET /metrics`: Prometheus text exposition.
pub async fn metrics_handler(State(state): State<HealthState>) -> Response {
    match state.metrics_handle {
        Some(handle) => (
            StatusCode::OK,
            [(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain; version=0.0.4; charset=utf-8"),
            )],
            handle.render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Fetch a required, non-empty query parameter.
fn required_param<'a>(
    params: &'a HashMap<String, String>,
    name: &str,
) -> Result<&'a str, DeliveryError> {
    match params.get(name).map(String::as_str) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(DeliveryError::MissingParameter {
            param: name.to_string(),
        }),
    }
}

/// Log a rejected request at a level matching its kind, then hand the
/// error back for conversion into a status-only response.
fn log_rejection(service: &'static str, err: DeliveryError) -> DeliveryError {
    let status = err.status_code().as_u16();
    let code = err.error_code();
    match err.kind() {
        ErrorKind::InvalidRequest => debug!(service, status, code, error = %err, "request rejected"),
        ErrorKind::NotFound => info!(service, status, code, error = %err, "video not found"),
        ErrorKind::DependencyUnavailable => {
            warn!(service, status, code, error = %err, "dependency failed")
        }
        ErrorKind::InternalFault => error!(service, status, code, error = %err, "internal error"),
    }
    err
}
