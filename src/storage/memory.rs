use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::RwLock;

use crate::core::error::StoreError;

use super::{FetchedObject, VideoStore};

/// Chunk size used when streaming objects out of memory.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// InMemoryVideoStore (tests and local development)
// ---------------------------------------------------------------------------

/// In-memory object store keyed by `(bucket, key)`.
///
/// Objects are streamed back in `chunk_size` pieces so callers see the same
/// chunked body shape as a network store. `set_unavailable(true)` makes
/// every fetch fail with `StoreError::Unavailable`.
pub struct InMemoryVideoStore {
    objects: Arc<RwLock<HashMap<(String, String), StoredObject>>>,
    chunk_size: usize,
    unavailable: AtomicBool,
    fetches: AtomicU64,
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    content_type: Option<String>,
}

impl InMemoryVideoStore {
    pub fn new() -> Self {
        Self::with_chunk_size(DEFAULT_CHUNK_SIZE)
    }

    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            objects: Arc::new(RwLock::new(HashMap::new())),
            chunk_size: chunk_size.max(1),
            unavailable: AtomicBool::new(false),
            fetches: AtomicU64::new(0),
        }
    }

    pub async fn put(
        &self,
        bucket: &str,
        key: &str,
        data: impl Into<Bytes>,
        content_type: Option<&str>,
    ) {
        let mut objects = self.objects.write().await;
        objects.insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                data: data.into(),
                content_type: content_type.map(str::to_string),
            },
        );
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of `fetch` calls served so far, successful or not.
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl Default for InMemoryVideoStore {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoStore for InMemoryVideoStore {
    async fn fetch(&self, bucket: &str, key: &str) -> Result<FetchedObject, StoreError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable {
                bucket: bucket.to_string(),
                key: key.to_string(),
                reason: "store marked unavailable".to_string(),
            });
        }

        let objects = self.objects.read().await;
        let obj = objects
            .get(&(bucket.to_string(), key.to_string()))
            .ok_or_else(|| StoreError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })?;

        let data = obj.data.clone();
        let chunk_size = self.chunk_size;
        let total = data.len();
        let chunks = (0..total)
            .step_by(chunk_size)
            .map(move |start| Ok::<Bytes, StoreError>(data.slice(start..(start + chunk_size).min(total))));

        Ok(FetchedObject {
            body: Box::pin(futures::stream::iter(chunks)),
            content_length: Some(total as u64),
            content_type: obj.content_type.clone(),
        })
    }
}
