use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Error taxonomy
// ---------------------------------------------------------------------------

/// Coarse classification every hop maps its failures into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidRequest,
    NotFound,
    DependencyUnavailable,
    InternalFault,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::NotFound => "not_found",
            ErrorKind::DependencyUnavailable => "dependency_unavailable",
            ErrorKind::InternalFault => "internal_fault",
        }
    }
}

// ---------------------------------------------------------------------------
// Object store errors
// ---------------------------------------------------------------------------

/// Errors originating from the object store client.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    #[error("object store unavailable for {bucket}/{key}: {reason}")]
    Unavailable {
        bucket: String,
        key: String,
        reason: String,
    },

    #[error("object body read failed for {key}: {reason}")]
    Read { key: String, reason: String },
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::NotFound { .. } => ErrorKind::NotFound,
            StoreError::Unavailable { .. } | StoreError::Read { .. } => {
                ErrorKind::DependencyUnavailable
            }
        }
    }

    /// Label used for the `error_type` metric dimension.
    pub fn label(&self) -> &'static str {
        match self {
            StoreError::NotFound { .. } => "not_found",
            StoreError::Unavailable { .. } => "unavailable",
            StoreError::Read { .. } => "read",
        }
    }
}

// ---------------------------------------------------------------------------
// Metadata resolver errors
// ---------------------------------------------------------------------------

/// Errors originating from the metadata resolver.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("malformed identifier: {identifier}")]
    MalformedIdentifier { identifier: String },

    #[error("no metadata record for identifier {identifier}")]
    NotFound { identifier: String },

    #[error("metadata resolver unavailable: {reason}")]
    Unavailable { reason: String },
}

impl ResolveError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ResolveError::MalformedIdentifier { .. } => ErrorKind::InvalidRequest,
            ResolveError::NotFound { .. } => ErrorKind::NotFound,
            ResolveError::Unavailable { .. } => ErrorKind::DependencyUnavailable,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ResolveError::MalformedIdentifier { .. } => "malformed",
            ResolveError::NotFound { .. } => "not_found",
            ResolveError::Unavailable { .. } => "unavailable",
        }
    }
}

// ---------------------------------------------------------------------------
// Downstream (storage service) errors
// ---------------------------------------------------------------------------

/// Errors from the streaming service's request to the storage service.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("storage service request to {url} failed: {reason}")]
    Transport { url: String, reason: String },

    #[error("storage service returned {status} for {url}")]
    Status { url: String, status: StatusCode },

    #[error("invalid storage service url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

impl UpstreamError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            UpstreamError::Status { status, .. } if *status == StatusCode::NOT_FOUND => {
                ErrorKind::NotFound
            }
            UpstreamError::Transport { .. } | UpstreamError::Status { .. } => {
                ErrorKind::DependencyUnavailable
            }
            UpstreamError::InvalidUrl { .. } => ErrorKind::InternalFault,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            UpstreamError::Transport { .. } => "transport",
            UpstreamError::Status { .. } => "status",
            UpstreamError::InvalidUrl { .. } => "invalid_url",
        }
    }
}

// ---------------------------------------------------------------------------
// Delivery errors (HTTP boundary)
// ---------------------------------------------------------------------------

/// Errors surfaced at the HTTP boundary of either service.
///
/// Responses carry only the status code. The detail in the `Display` output
/// is for logs and never reaches the client.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("missing query parameter '{param}'")]
    MissingParameter { param: String },

    #[error("malformed identifier: {identifier}")]
    MalformedIdentifier { identifier: String },

    #[error("not found: {what}")]
    NotFound { what: String },

    #[error("object store unavailable: {reason}")]
    StoreUnavailable { reason: String },

    #[error("metadata resolver unavailable: {reason}")]
    ResolverUnavailable { reason: String },

    #[error("storage service unreachable: {reason}")]
    UpstreamUnreachable { reason: String },

    #[error("storage service failed: {reason}")]
    UpstreamFailed { reason: String },

    #[error("internal error: {reason}")]
    Internal { reason: String },
}

impl DeliveryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DeliveryError::MissingParameter { .. } | DeliveryError::MalformedIdentifier { .. } => {
                ErrorKind::InvalidRequest
            }
            DeliveryError::NotFound { .. } => ErrorKind::NotFound,
            DeliveryError::StoreUnavailable { .. }
            | DeliveryError::ResolverUnavailable { .. }
            | DeliveryError::UpstreamUnreachable { .. }
            | DeliveryError::UpstreamFailed { .. } => ErrorKind::DependencyUnavailable,
            DeliveryError::Internal { .. } => ErrorKind::InternalFault,
        }
    }

    /// Map a DeliveryError to its HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            DeliveryError::MissingParameter { .. } => StatusCode::BAD_REQUEST,
            DeliveryError::MalformedIdentifier { .. } => StatusCode::EXPECTATION_FAILED,
            DeliveryError::NotFound { .. } => StatusCode::NOT_FOUND,
            DeliveryError::StoreUnavailable { .. } => StatusCode::BAD_GATEWAY,
            DeliveryError::ResolverUnavailable { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            DeliveryError::UpstreamUnreachable { .. } => StatusCode::BAD_GATEWAY,
            DeliveryError::UpstreamFailed { .. } => StatusCode::FAILED_DEPENDENCY,
            DeliveryError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable error code for logs and metrics.
    pub fn error_code(&self) -> &'static str {
        match self {
            DeliveryError::MissingParameter { .. } => "missing_parameter",
            DeliveryError::MalformedIdentifier { .. } => "malformed_identifier",
            DeliveryError::NotFound { .. } => "not_found",
            DeliveryError::StoreUnavailable { .. } => "store_unavailable",
            DeliveryError::ResolverUnavailable { .. } => "resolver_unavailable",
            DeliveryError::UpstreamUnreachable { .. } => "upstream_unreachable",
            DeliveryError::UpstreamFailed { .. } => "upstream_failed",
            DeliveryError::Internal { .. } => "internal_error",
        }
    }
}

impl From<StoreError> for DeliveryError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { key, .. } => DeliveryError::NotFound { what: key },
            other => DeliveryError::StoreUnavailable {
                reason: other.to_string(),
            },
        }
    }
}

impl From<ResolveError> for DeliveryError {
    fn from(e: ResolveError) -> Self {
        match e {
            ResolveError::MalformedIdentifier { identifier } => {
                DeliveryError::MalformedIdentifier { identifier }
            }
            ResolveError::NotFound { identifier } => DeliveryError::NotFound { what: identifier },
            ResolveError::Unavailable { reason } => DeliveryError::ResolverUnavailable { reason },
        }
    }
}

impl From<UpstreamError> for DeliveryError {
    fn from(e: UpstreamError) -> Self {
        let reason = e.to_string();
        match e.kind() {
            ErrorKind::NotFound => DeliveryError::NotFound { what: reason },
            ErrorKind::InternalFault => DeliveryError::Internal { reason },
            _ => match e {
                UpstreamError::Transport { .. } => DeliveryError::UpstreamUnreachable { reason },
                _ => DeliveryError::UpstreamFailed { reason },
            },
        }
    }
}

impl IntoResponse for DeliveryError {
    fn into_response(self) -> Response {
        self.status_code().into_response()
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Startup configuration problems. Each message names the setting to fix.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("please specify {setting} with the environment variable {env_var}")]
    Missing {
        setting: &'static str,
        env_var: &'static str,
    },

    #[error("invalid value for {setting}: {reason}")]
    Invalid {
        setting: &'static str,
        reason: String,
    },

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("{feature} support is not compiled in; rebuild with `--features {feature}`")]
    FeatureDisabled { feature: &'static str },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_mapping() {
        let not_found: DeliveryError = StoreError::NotFound {
            bucket: "videos".into(),
            key: "missing.mp4".into(),
        }
        .into();
        assert_eq!(not_found.status_code(), StatusCode::NOT_FOUND);

        let unavailable: DeliveryError = StoreError::Unavailable {
            bucket: "videos".into(),
            key: "a.mp4".into(),
            reason: "connection refused".into(),
        }
        .into();
        assert_eq!(unavailable.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(unavailable.kind(), ErrorKind::DependencyUnavailable);
    }

    #[test]
    fn test_resolve_error_mapping() {
        let malformed: DeliveryError = ResolveError::MalformedIdentifier {
            identifier: "xyz".into(),
        }
        .into();
        assert_eq!(malformed.status_code(), StatusCode::EXPECTATION_FAILED);
        assert_eq!(malformed.kind(), ErrorKind::InvalidRequest);

        let missing: DeliveryError = ResolveError::NotFound {
            identifier: "5d9e690ad76fe06a3d7ae416".into(),
        }
        .into();
        assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);

        let down: DeliveryError = ResolveError::Unavailable {
            reason: "server selection timeout".into(),
        }
        .into();
        assert_eq!(down.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_ne!(down.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_upstream_error_mapping() {
        let url = "http://video-storage/video?path=a.mp4".to_string();

        let transport: DeliveryError = UpstreamError::Transport {
            url: url.clone(),
            reason: "connection refused".into(),
        }
        .into();
        assert_eq!(transport.status_code(), StatusCode::BAD_GATEWAY);

        let missing: DeliveryError = UpstreamError::Status {
            url: url.clone(),
            status: StatusCode::NOT_FOUND,
        }
        .into();
        assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);

        let failed: DeliveryError = UpstreamError::Status {
            url,
            status: StatusCode::BAD_GATEWAY,
        }
        .into();
        assert_eq!(failed.status_code(), StatusCode::FAILED_DEPENDENCY);
    }

    #[test]
    fn test_error_response_has_no_detail() {
        let err = DeliveryError::Internal {
            reason: "secret internals".into(),
        };
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.headers().get(axum::http::header::CONTENT_TYPE).is_none());
    }
}
