use std::sync::Arc;
use std::time::Instant;

use axum::routing::get;
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};

use crate::core::types::ServiceRole;
use crate::resolver::MetadataResolver;
use crate::storage::VideoStore;

use super::handlers;
use super::middleware::{access_log, RequestIdLayer};
use super::upstream::StorageClient;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// State for the storage service handlers.
pub struct StorageState<S> {
    pub store: Arc<S>,
    pub bucket: String,
    /// Query parameter carrying the object key.
    pub key_param: String,
}

// Manual impl: `S` itself need not be `Clone`, only the `Arc` around it.
impl<S> Clone for StorageState<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            bucket: self.bucket.clone(),
            key_param: self.key_param.clone(),
        }
    }
}

/// State for the streaming service handlers.
pub struct StreamingState<R> {
    pub resolver: Arc<R>,
    pub upstream: Arc<StorageClient>,
    /// Query parameter carrying the client identifier.
    pub id_param: String,
    /// Content-Type declared on every successful response.
    pub content_type: String,
}

impl<R> Clone for StreamingState<R> {
    fn clone(&self) -> Self {
        Self {
            resolver: self.resolver.clone(),
            upstream: self.upstream.clone(),
            id_param: self.id_param.clone(),
            content_type: self.content_type.clone(),
        }
    }
}

/// State for `/healthz` and `/metrics`.
#[derive(Clone)]
pub struct HealthState {
    pub role: ServiceRole,
    pub start_time: Instant,
    /// `None` when metrics are disabled; `/metrics` then answers 404.
    pub metrics_handle: Option<PrometheusHandle>,
}

// ---------------------------------------------------------------------------
// Routers
// ---------------------------------------------------------------------------

/// Storage service routes:
///
/// - `GET /video?<key_param>=<key>`: stream an object from the bucket
/// - `GET /healthz`
/// - `GET /metrics`
pub fn build_storage_router<S: VideoStore>(state: StorageState<S>, health: HealthState) -> Router {
    tracing::info!(
        bucket = %state.bucket,
        key_param = %state.key_param,
        "storage routes configured"
    );

    let role = health.role;
    let video = Router::new()
        .route("/video", get(handlers::serve_video::<S>))
        .with_state(state);

    finish(video.merge(health_router(health)), role)
}

/// Streaming service routes:
///
/// - `GET /video?<id_param>=<identifier>`: resolve and relay a video
/// - `GET /healthz`
/// - `GET /metrics`
pub fn build_streaming_router<R: MetadataResolver>(
    state: StreamingState<R>,
    health: HealthState,
) -> Router {
    tracing::info!(
        id_param = %state.id_param,
        content_type = %state.content_type,
        "streaming routes configured"
    );

    let role = health.role;
    let video = Router::new()
        .route("/video", get(handlers::stream_video::<R>))
        .with_state(state);

    finish(video.merge(health_router(health)), role)
}

fn health_router(health: HealthState) -> Router {
    Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(health)
}

/// Common layers. `RequestIdLayer` is outermost so the access log and the
/// handlers both see the final request ID.
fn finish(router: Router, role: ServiceRole) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([http::Method::GET, http::Method::HEAD, http::Method::OPTIONS])
        .allow_headers([http::header::RANGE])
        .expose_headers([
            http::header::CONTENT_LENGTH,
            http::header::CONTENT_TYPE,
        ])
        .max_age(std::time::Duration::from_secs(86400));

    router
        .layer(cors)
        .layer(axum::middleware::from_fn_with_state(role, access_log))
        .layer(RequestIdLayer)
}

/// Convenience for tests and embedding: a streaming state whose downstream
/// client targets `upstream_url`.
pub fn streaming_state<R: MetadataResolver>(
    resolver: Arc<R>,
    config: &crate::core::config::StreamingConfig,
) -> Result<StreamingState<R>, crate::core::error::UpstreamError> {
    Ok(StreamingState {
        resolver,
        upstream: Arc::new(StorageClient::new(config)?),
        id_param: config.id_param.clone(),
        content_type: config.content_type.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::StreamingConfig;
    use crate::core::types::StorageKey;
    use crate::resolver::memory::InMemoryResolver;
    use crate::storage::memory::InMemoryVideoStore;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;

    const ID: &str = "5d9e690ad76fe06a3d7ae416";

    fn health(role: ServiceRole) -> HealthState {
        HealthState {
            role,
            start_time: Instant::now(),
            metrics_handle: None,
        }
    }

    async fn storage_app() -> (Router, Arc<InMemoryVideoStore>) {
        let store = Arc::new(InMemoryVideoStore::with_chunk_size(4));
        store
            .put("videos", "SampleVideo_1280x720_1mb.mp4", &b"0123456789"[..], None)
            .await;
        let state = StorageState {
            store: store.clone(),
            bucket: "videos".to_string(),
            key_param: "path".to_string(),
        };
        (build_storage_router(state, health(ServiceRole::Storage)), store)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_storage_serves_object() {
        let (app, _) = storage_app().await;
        let response = app
            .oneshot(get("/video?path=SampleVideo_1280x720_1mb.mp4"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "video/mp4");
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "10");
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"0123456789");
    }

    #[tokio::test]
    async fn test_storage_missing_key_is_400_without_fetch() {
        let (app, store) = storage_app().await;
        for uri in ["/video", "/video?path="] {
            let response = app.clone().oneshot(get(uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        }
        assert_eq!(store.fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_storage_missing_object_is_404_with_empty_body() {
        let (app, _) = storage_app().await;
        let response = app.oneshot(get("/video?path=missing.mp4")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_storage_unavailable_is_502() {
        let (app, store) = storage_app().await;
        store.set_unavailable(true);
        let response = app
            .oneshot(get("/video?path=SampleVideo_1280x720_1mb.mp4"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_healthz_reports_role() {
        let (app, _) = storage_app().await;
        let response = app.oneshot(get("/healthz")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["role"], "storage");
    }

    #[tokio::test]
    async fn test_metrics_disabled_is_404() {
        let (app, _) = storage_app().await;
        let response = app.oneshot(get("/metrics")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    fn streaming_app(resolver: Arc<InMemoryResolver>) -> Router {
        // Nothing listens here; these tests stop before the downstream hop.
        let mut config = StreamingConfig::default();
        config.upstream_url = "http://127.0.0.1:9".to_string();
        let state = streaming_state(resolver, &config).unwrap();
        build_streaming_router(state, health(ServiceRole::Streaming))
    }

    #[tokio::test]
    async fn test_streaming_missing_id_is_400() {
        let resolver = Arc::new(InMemoryResolver::new());
        let app = streaming_app(resolver.clone());
        for uri in ["/video", "/video?id="] {
            let response = app.clone().oneshot(get(uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        }
        assert_eq!(resolver.lookup_count(), 0);
    }

    #[tokio::test]
    async fn test_streaming_malformed_id_is_417() {
        let resolver = Arc::new(InMemoryResolver::new());
        let app = streaming_app(resolver.clone());
        let response = app.oneshot(get("/video?id=not-an-id")).await.unwrap();
        assert_eq!(response.status(), StatusCode::EXPECTATION_FAILED);
        assert_eq!(resolver.lookup_count(), 0);
    }

    #[tokio::test]
    async fn test_streaming_unknown_id_is_404() {
        let resolver = Arc::new(InMemoryResolver::new());
        let app = streaming_app(resolver.clone());
        let response = app
            .oneshot(get(&format!("/video?id={}", ID)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(resolver.lookup_count(), 1);
    }

    #[tokio::test]
    async fn test_streaming_resolver_unavailable_is_500() {
        let resolver = Arc::new(InMemoryResolver::new());
        resolver.set_unavailable(true);
        let app = streaming_app(resolver);
        let response = app
            .oneshot(get(&format!("/video?id={}", ID)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_streaming_unreachable_storage_is_502() {
        let resolver = Arc::new(InMemoryResolver::new());
        resolver
            .insert(ID.parse().unwrap(), StorageKey::new("a.mp4"))
            .await;
        let app = streaming_app(resolver);
        let response = app
            .oneshot(get(&format!("/video?id={}", ID)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(body.is_empty());
    }
}
