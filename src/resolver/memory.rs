use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::RwLock;

use crate::core::error::ResolveError;
use crate::core::types::{StorageKey, VideoId};

use super::{parse_identifier, MetadataResolver};

/// Map-backed resolver for tests and local development.
///
/// `lookup_count` counts visits to the backing map, so callers can assert a
/// request never reached the store.
#[derive(Default)]
pub struct InMemoryResolver {
    records: RwLock<HashMap<VideoId, StorageKey>>,
    unavailable: AtomicBool,
    lookups: AtomicU64,
}

impl InMemoryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, id: VideoId, key: StorageKey) {
        self.records.write().await.insert(id, key);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn lookup_count(&self) -> u64 {
        self.lookups.load(Ordering::SeqCst)
    }
}

impl MetadataResolver for InMemoryResolver {
    async fn resolve(&self, identifier: &str) -> Result<StorageKey, ResolveError> {
        let id = parse_identifier(identifier)?;

        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ResolveError::Unavailable {
                reason: "metadata store marked unavailable".to_string(),
            });
        }

        self.records
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| ResolveError::NotFound {
                identifier: id.to_string(),
            })
    }
}
