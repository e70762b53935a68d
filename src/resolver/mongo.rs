use std::time::Duration;

use mongodb::bson::oid::ObjectId;
use mongodb::bson::{doc, Document};
use mongodb::{Client, Collection};
use tracing::{debug, warn};

use crate::core::config::MetadataConfig;
use crate::core::error::ResolveError;
use crate::core::types::StorageKey;

use super::{parse_identifier, MetadataResolver};

// ---------------------------------------------------------------------------
// MongoResolver
// ---------------------------------------------------------------------------

/// Resolves identifiers against a single MongoDB collection.
///
/// Each record is `{ _id: ObjectId, <key_field>: "<storage key>" }`. The
/// driver's client pools connections internally and is shared by all
/// requests.
pub struct MongoResolver {
    client: Client,
    collection: Collection<Document>,
    key_field: String,
    request_timeout: Duration,
}

impl MongoResolver {
    /// Build the resolver. The driver connects lazily, so an unreachable
    /// server surfaces on the first lookup rather than here.
    pub async fn connect(config: &MetadataConfig) -> Result<Self, ResolveError> {
        let client = Client::with_uri_str(&config.uri)
            .await
            .map_err(|e| ResolveError::Unavailable {
                reason: format!("invalid metadata connection string: {}", e),
            })?;

        Ok(Self {
            client: client.clone(),
            collection: client
                .database(&config.database)
                .collection::<Document>(&config.collection),
            key_field: config.key_field.clone(),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
        })
    }

    /// Round-trip to the server, used as a startup connectivity check.
    pub async fn ping(&self) -> Result<(), ResolveError> {
        let db = self.client.database("admin");
        tokio::time::timeout(self.request_timeout, db.run_command(doc! { "ping": 1 }))
            .await
            .map_err(|_| ResolveError::Unavailable {
                reason: "ping timed out".to_string(),
            })?
            .map_err(|e| ResolveError::Unavailable {
                reason: e.to_string(),
            })?;
        Ok(())
    }
}

impl MetadataResolver for MongoResolver {
    async fn resolve(&self, identifier: &str) -> Result<StorageKey, ResolveError> {
        let id = parse_identifier(identifier)?;
        let oid = ObjectId::from_bytes(id.bytes());

        let mut projection = Document::new();
        projection.insert(self.key_field.clone(), 1);
        let lookup = self
            .collection
            .find_one(doc! { "_id": oid })
            .projection(projection);

        let record = match tokio::time::timeout(self.request_timeout, lookup).await {
            Ok(Ok(record)) => record,
            Ok(Err(e)) => {
                warn!(%id, error = %e, "metadata lookup failed");
                return Err(ResolveError::Unavailable {
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                warn!(%id, timeout_secs = self.request_timeout.as_secs(), "metadata lookup timed out");
                return Err(ResolveError::Unavailable {
                    reason: format!("lookup timed out after {}s", self.request_timeout.as_secs()),
                });
            }
        };

        let record = record.ok_or_else(|| ResolveError::NotFound {
            identifier: id.to_string(),
        })?;

        match record.get_str(&self.key_field) {
            Ok(key) if !key.is_empty() => {
                debug!(%id, key, "identifier resolved");
                Ok(StorageKey::new(key))
            }
            _ => {
                warn!(%id, field = %self.key_field, "metadata record has no storage key");
                Err(ResolveError::Unavailable {
                    reason: format!("record {} has no usable '{}' field", id, self.key_field),
                })
            }
        }
    }
}
