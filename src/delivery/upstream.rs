use std::time::{Duration, Instant};

use axum::http::{header, HeaderMap, HeaderName};
use tracing::{debug, warn};

use crate::core::config::StreamingConfig;
use crate::core::error::UpstreamError;
use crate::core::redact::is_sensitive_header;
use crate::core::types::StorageKey;
use crate::observability::metrics as obs;

/// Headers that describe the inbound connection rather than the request,
/// so they are not copied onto the downstream request.
const HOP_BY_HOP: [HeaderName; 9] = [
    header::CONNECTION,
    header::HOST,
    header::CONTENT_LENGTH,
    header::TRANSFER_ENCODING,
    header::TE,
    header::TRAILER,
    header::UPGRADE,
    header::PROXY_AUTHORIZATION,
    header::PROXY_AUTHENTICATE,
];

// ---------------------------------------------------------------------------
// StorageClient
// ---------------------------------------------------------------------------

/// HTTP client for the storage service hop.
///
/// Wraps one `reqwest::Client` (a connection pool) built at startup and
/// shared by every streaming request.
#[derive(Debug, Clone)]
pub struct StorageClient {
    http: reqwest::Client,
    video_url: String,
    key_param: String,
    response_timeout: Duration,
}

impl StorageClient {
    pub fn new(config: &StreamingConfig) -> Result<Self, UpstreamError> {
        let video_url = format!("{}/video", config.upstream_base_url());
        reqwest::Url::parse(&video_url).map_err(|e| UpstreamError::InvalidUrl {
            url: video_url.clone(),
            reason: e.to_string(),
        })?;

        // No whole-request timeout: it would also cap the body, and video
        // bodies are arbitrarily long.
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| UpstreamError::InvalidUrl {
                url: video_url.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            http,
            video_url,
            key_param: config.upstream_key_param.clone(),
            response_timeout: Duration::from_secs(config.request_timeout_secs),
        })
    }

    /// `GET {upstream}/video?<key_param>=<key>` with the caller's headers.
    ///
    /// Succeeds only when the request completed **and** the status is 2xx;
    /// the returned response's body has not been read yet.
    pub async fn fetch(
        &self,
        key: &StorageKey,
        inbound_headers: &HeaderMap,
    ) -> Result<reqwest::Response, UpstreamError> {
        let forwarded = forwardable_headers(inbound_headers);
        debug!(
            forwarded = forwarded.len(),
            credentials = forwarded.keys().any(|n| is_sensitive_header(n.as_str())),
            "forwarding request headers"
        );

        let request = self
            .http
            .get(&self.video_url)
            .query(&[(self.key_param.as_str(), key.as_str())])
            .headers(forwarded)
            .build()
            .map_err(|e| UpstreamError::InvalidUrl {
                url: self.video_url.clone(),
                reason: e.to_string(),
            })?;
        let url = request.url().to_string();

        let start = Instant::now();
        let sent = tokio::time::timeout(self.response_timeout, self.http.execute(request)).await;
        obs::record_upstream_request_duration(start.elapsed().as_secs_f64());

        let response = match sent {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                let err = UpstreamError::Transport {
                    url,
                    reason: e.to_string(),
                };
                obs::inc_upstream_error(err.label());
                return Err(err);
            }
            Err(_) => {
                let err = UpstreamError::Transport {
                    url,
                    reason: format!(
                        "no response within {}s",
                        self.response_timeout.as_secs()
                    ),
                };
                obs::inc_upstream_error(err.label());
                return Err(err);
            }
        };

        let status = response.status();
        if !status.is_success() {
            // The body is dropped unread; nothing from it reaches the client.
            warn!(%url, %status, "storage service returned non-success status");
            let err = UpstreamError::Status { url, status };
            obs::inc_upstream_error(err.label());
            return Err(err);
        }

        debug!(%url, %status, content_length = ?response.content_length(), "storage service responded");
        Ok(response)
    }
}

/// Copy inbound headers for the downstream request, minus hop-by-hop ones.
pub fn forwardable_headers(inbound: &HeaderMap) -> HeaderMap {
    let mut headers = inbound.clone();
    for name in HOP_BY_HOP.iter() {
        headers.remove(name);
    }
    headers.remove("keep-alive");
    headers
}
