use std::time::Duration;

use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::Client;
use futures::StreamExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

use crate::core::config::StorageConfig;
use crate::core::error::StoreError;

use super::{FetchedObject, VideoStore};

// ---------------------------------------------------------------------------
// S3VideoStore
// ---------------------------------------------------------------------------

/// Production object store wrapping `aws-sdk-s3`.
///
/// Supports both AWS S3 and S3-compatible stores (MinIO, DigitalOcean Spaces, etc.)
/// via configurable endpoint and path-style addressing. The client is cheap to
/// clone and safe to share across requests.
pub struct S3VideoStore {
    client: Client,
    request_timeout: Duration,
}

impl S3VideoStore {
    /// Create a new S3VideoStore from configuration.
    pub fn new(config: &StorageConfig) -> Self {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "videoflow-config",
        );

        let mut s3_config_builder = aws_sdk_s3::Config::builder()
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .force_path_style(config.path_style);

        if !config.endpoint.is_empty() {
            s3_config_builder = s3_config_builder.endpoint_url(&config.endpoint);
        }

        Self {
            client: Client::from_conf(s3_config_builder.build()),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }
}

impl VideoStore for S3VideoStore {
    async fn fetch(&self, bucket: &str, key: &str) -> Result<FetchedObject, StoreError> {
        let request = self.client.get_object().bucket(bucket).key(key).send();

        // Bounds the time to the response headers only; the body is read
        // at the pace the client consumes it.
        let output = match tokio::time::timeout(self.request_timeout, request).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(classify_get_error(bucket, key, e)),
            Err(_) => {
                warn!(bucket, key, timeout_secs = self.request_timeout.as_secs(), "S3 GET timed out");
                return Err(StoreError::Unavailable {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    reason: format!("timed out after {}s", self.request_timeout.as_secs()),
                });
            }
        };

        let content_length = output
            .content_length
            .and_then(|len| u64::try_from(len).ok());
        let content_type = output.content_type;
        debug!(bucket, key, ?content_length, "S3 object opened");

        let read_key = key.to_string();
        let body = ReaderStream::new(output.body.into_async_read()).map(move |chunk| {
            chunk.map_err(|e| StoreError::Read {
                key: read_key.clone(),
                reason: e.to_string(),
            })
        });

        Ok(FetchedObject {
            body: Box::pin(body),
            content_length,
            content_type,
        })
    }
}

/// Split GET failures into "no such object" and "store unavailable".
fn classify_get_error(
    bucket: &str,
    key: &str,
    err: SdkError<GetObjectError, HttpResponse>,
) -> StoreError {
    let no_such_key = err
        .as_service_error()
        .map(|e| e.is_no_such_key())
        .unwrap_or(false);
    let status_404 = err
        .raw_response()
        .map(|r| r.status().as_u16() == 404)
        .unwrap_or(false);

    if no_such_key || status_404 {
        return StoreError::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        };
    }

    let reason = DisplayErrorContext(&err).to_string();
    warn!(bucket, key, error = %reason, "S3 GET failed");
    StoreError::Unavailable {
        bucket: bucket.to_string(),
        key: key.to_string(),
        reason,
    }
}
