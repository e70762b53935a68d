use std::task::{Context, Poll};
use std::time::Instant;

use axum::extract::{Request as AxumRequest, State};
use axum::http::{header::HeaderName, HeaderValue, Request, Response};
use axum::middleware::Next;
use axum::response::Response as AxumResponse;
use tower::{Layer, Service};
use tracing::{info, Instrument};
use uuid::Uuid;

use crate::core::types::ServiceRole;
use crate::observability::metrics as obs;

// ---------------------------------------------------------------------------
// X-Request-Id middleware
// ---------------------------------------------------------------------------

/// Header name for request ID propagation.
pub static X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Longest inbound request ID that is reused as-is.
const MAX_REQUEST_ID_LEN: usize = 128;

/// Layer that adds `X-Request-Id` to every request and response.
///
/// - A well-formed inbound `X-Request-Id` is reused.
/// - Otherwise a new UUIDv4 is generated.
/// - The ID is set on the request (so the streaming service forwards it to
///   the storage service) and echoed on the response.
#[derive(Clone)]
pub struct RequestIdLayer;

impl<S> Layer<S> for RequestIdLayer {
    type Service = RequestIdMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestIdMiddleware { inner }
    }
}

/// Middleware service that injects `X-Request-Id`.
#[derive(Clone)]
pub struct RequestIdMiddleware<S> {
    inner: S,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for RequestIdMiddleware<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    ReqBody: Send + 'static,
    ResBody: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        let request_id = req
            .headers()
            .get(&X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .filter(|s| is_usable_request_id(s))
            .map(|s| s.to_string())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        // Overwrite so a rejected inbound value never travels further.
        if let Ok(val) = HeaderValue::from_str(&request_id) {
            req.headers_mut().insert(X_REQUEST_ID.clone(), val);
        }

        let mut inner = self.inner.clone();

        Box::pin(async move {
            let mut response = inner.call(req).await?;
            if let Ok(val) = HeaderValue::from_str(&request_id) {
                response.headers_mut().insert(X_REQUEST_ID.clone(), val);
            }
            Ok(response)
        })
    }
}

fn is_usable_request_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_REQUEST_ID_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
}

// ---------------------------------------------------------------------------
// Access log
// ---------------------------------------------------------------------------

/// One log line and one set of HTTP metrics per request.
///
/// Latency is measured to response headers; the body may keep streaming
/// long after this returns. Must sit inside `RequestIdLayer` so the ID is
/// already on the request.
pub async fn access_log(
    State(role): State<ServiceRole>,
    req: AxumRequest,
    next: Next,
) -> AxumResponse {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let route = route_label(&path);
    let request_id = req
        .headers()
        .get(&X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();

    let span = tracing::info_span!(
        "request",
        service = role.as_str(),
        request_id = %request_id,
        method = %method,
        path = %path,
    );

    let start = Instant::now();
    let response = next.run(req).instrument(span.clone()).await;
    let latency = start.elapsed();
    let status = response.status().as_u16();

    obs::inc_http_request(role.as_str(), route, status);
    obs::record_http_request_duration(role.as_str(), route, latency.as_secs_f64());

    span.in_scope(|| {
        info!(
            status,
            latency_ms = latency.as_millis() as u64,
            "request completed"
        );
    });

    response
}

/// Fixed route label, keeping metric cardinality bounded.
fn route_label(path: &str) -> &'static str {
    match path {
        "/video" => "/video",
        "/healthz" => "/healthz",
        "/metrics" => "/metrics",
        _ => "other",
    }
}
