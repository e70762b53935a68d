pub mod memory;
#[cfg(feature = "mongo")]
pub mod mongo;

use crate::core::error::ResolveError;
use crate::core::types::{StorageKey, VideoId};

// ---------------------------------------------------------------------------
// MetadataResolver trait
// ---------------------------------------------------------------------------

/// Maps a client-facing identifier to the storage key of its video.
///
/// Implementations are long-lived handles shared by every request.
pub trait MetadataResolver: Send + Sync + 'static {
    /// Resolve `identifier` to exactly one storage key.
    ///
    /// Malformed identifiers fail with `ResolveError::MalformedIdentifier`
    /// before any backing store is contacted.
    fn resolve(
        &self,
        identifier: &str,
    ) -> impl std::future::Future<Output = Result<StorageKey, ResolveError>> + Send;
}

/// Parse a client identifier into the resolver key space.
pub fn parse_identifier(identifier: &str) -> Result<VideoId, ResolveError> {
    identifier
        .parse::<VideoId>()
        .map_err(|_| ResolveError::MalformedIdentifier {
            identifier: identifier.to_string(),
        })
}

// ---------------------------------------------------------------------------
// PassthroughResolver
// ---------------------------------------------------------------------------

/// Treats the client identifier as the storage key. No lookup, no failures
/// beyond the empty-identifier check every caller performs first.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughResolver;

impl MetadataResolver for PassthroughResolver {
    async fn resolve(&self, identifier: &str) -> Result<StorageKey, ResolveError> {
        Ok(StorageKey::new(identifier))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_passthrough_returns_identifier() {
        let key = PassthroughResolver
            .resolve("SampleVideo_1280x720_1mb.mp4")
            .await
            .unwrap();
        assert_eq!(key.as_str(), "SampleVideo_1280x720_1mb.mp4");
    }

    #[test]
    fn test_parse_identifier() {
        assert!(parse_identifier("5d9e690ad76fe06a3d7ae416").is_ok());
        let err = parse_identifier("not-an-id").unwrap_err();
        assert!(matches!(err, ResolveError::MalformedIdentifier { identifier } if identifier == "not-an-id"));
    }
}
