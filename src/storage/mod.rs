pub mod memory;
#[cfg(feature = "s3")]
pub mod s3;

use std::pin::Pin;

use bytes::Bytes;
use futures::Stream;

use crate::core::error::StoreError;

// ---------------------------------------------------------------------------
// VideoStore trait
// ---------------------------------------------------------------------------

/// A readable object body. Dropping it releases the underlying store read.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, StoreError>> + Send>>;

/// Trait-based abstraction over the object store.
///
/// The production implementation (`S3VideoStore`) wraps `aws-sdk-s3`. Tests
/// use `InMemoryVideoStore` without external deps. Implementations must be
/// safe to share across every in-flight request.
pub trait VideoStore: Send + Sync + 'static {
    /// Open a streaming read of `bucket/key` positioned at offset 0.
    ///
    /// Returns `StoreError::NotFound` when no object exists and
    /// `StoreError::Unavailable` for every other failure.
    fn fetch(
        &self,
        bucket: &str,
        key: &str,
    ) -> impl std::future::Future<Output = Result<FetchedObject, StoreError>> + Send;
}

// ---------------------------------------------------------------------------
// Storage types
// ---------------------------------------------------------------------------

/// A successfully opened object.
pub struct FetchedObject {
    pub body: ByteStream,
    pub content_length: Option<u64>,
    pub content_type: Option<String>,
}

impl std::fmt::Debug for FetchedObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchedObject")
            .field("content_length", &self.content_length)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Content type helpers
// ---------------------------------------------------------------------------

/// Determine content type from the key's file extension.
///
/// Unknown extensions are served as `video/mp4`, the only media this
/// service stores.
pub fn content_type_for_key(key: &str) -> &'static str {
    let lower = key.to_ascii_lowercase();
    if lower.ends_with(".mp4") || lower.ends_with(".m4v") || lower.ends_with(".m4s") {
        "video/mp4"
    } else if lower.ends_with(".webm") {
        "video/webm"
    } else if lower.ends_with(".mov") {
        "video/quicktime"
    } else if lower.ends_with(".mkv") {
        "video/x-matroska"
    } else if lower.ends_with(".ts") {
        "video/mp2t"
    } else if lower.ends_with(".m3u8") {
        "application/vnd.apple.mpegurl"
    } else {
        "video/mp4"
    }
}

/// Pick the content type to serve: the store's value unless it is missing
/// or the generic binary type, otherwise inferred from the key.
pub fn resolve_content_type(stored: Option<&str>, key: &str) -> String {
    match stored {
        Some(ct) if !ct.is_empty() && ct != "application/octet-stream" => ct.to_string(),
        _ => content_type_for_key(key).to_string(),
    }
}
