use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Length of a video identity in bytes (rendered as 24 hex characters).
pub const VIDEO_ID_LEN: usize = 12;

/// Identity of a video metadata record.
///
/// Client-facing identifiers are 24 hexadecimal characters, the same shape
/// as a document-store object id. Parsing is case-insensitive; display is
/// always lowercase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VideoId([u8; VIDEO_ID_LEN]);

impl VideoId {
    pub fn from_bytes(bytes: [u8; VIDEO_ID_LEN]) -> Self {
        Self(bytes)
    }

    pub fn bytes(&self) -> [u8; VIDEO_ID_LEN] {
        self.0
    }
}

/// Returned when a string is not a 24-hex-character video identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidVideoId;

impl fmt::Display for InvalidVideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "expected {} hexadecimal characters",
            VIDEO_ID_LEN * 2
        )
    }
}

impl std::error::Error for InvalidVideoId {}

impl FromStr for VideoId {
    type Err = InvalidVideoId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != VIDEO_ID_LEN * 2 {
            return Err(InvalidVideoId);
        }

        let mut bytes = [0u8; VIDEO_ID_LEN];
        hex::decode_to_slice(s, &mut bytes).map_err(|_| InvalidVideoId)?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// A key into the object store's namespace for a single bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StorageKey(String);

impl StorageKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StorageKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// Service roles
// ---------------------------------------------------------------------------

/// Which of the two services this process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceRole {
    /// Fetches objects from the object store and streams them out.
    Storage,
    /// Resolves client identifiers and relays bytes from the storage service.
    Streaming,
}

impl ServiceRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceRole::Storage => "storage",
            ServiceRole::Streaming => "streaming",
        }
    }
}

impl fmt::Display for ServiceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "storage" => Ok(ServiceRole::Storage),
            "streaming" => Ok(ServiceRole::Streaming),
            other => Err(format!(
                "unknown service role '{}', expected 'storage' or 'streaming'",
                other
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_id_parse_and_display() {
        let id: VideoId = "5d9e690ad76fe06a3d7ae416".parse().unwrap();
        assert_eq!(id.to_string(), "5d9e690ad76fe06a3d7ae416");
        assert_eq!(id.bytes()[0], 0x5d);
        assert_eq!(id.bytes()[11], 0x16);
    }

    #[test]
    fn test_video_id_uppercase_normalized() {
        let id: VideoId = "5D9E690AD76FE06A3D7AE416".parse().unwrap();
        assert_eq!(id.to_string(), "5d9e690ad76fe06a3d7ae416");
    }

    #[test]
    fn test_video_id_rejects_malformed() {
        assert!("".parse::<VideoId>().is_err());
        assert!("abc".parse::<VideoId>().is_err());
        assert!("5d9e690ad76fe06a3d7ae41".parse::<VideoId>().is_err());
        assert!("5d9e690ad76fe06a3d7ae4166".parse::<VideoId>().is_err());
        assert!("zz9e690ad76fe06a3d7ae416".parse::<VideoId>().is_err());
        assert!("SampleVideo_1280x720_1mb".parse::<VideoId>().is_err());
        // 24 bytes, but 12 characters.
        assert!("éééééééééééé".parse::<VideoId>().is_err());
    }

    #[test]
    fn test_video_id_display_matches_bytes() {
        let id = VideoId::from_bytes([0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 0xab, 0xff]);
        assert_eq!(id.to_string(), "00010203040506070809abff");
        assert_eq!(id.to_string().parse::<VideoId>(), Ok(id));
    }

    #[test]
    fn test_service_role_parse() {
        assert_eq!("storage".parse::<ServiceRole>(), Ok(ServiceRole::Storage));
        assert_eq!(
            " Streaming ".parse::<ServiceRole>(),
            Ok(ServiceRole::Streaming)
        );
        assert!("proxy".parse::<ServiceRole>().is_err());
    }
}
