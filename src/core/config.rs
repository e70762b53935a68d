use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

use super::error::ConfigError;
use super::types::ServiceRole;

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub streaming: StreamingConfig,
    pub metadata: MetadataConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub role: ServiceRole,
    pub host: String,
    pub port: u16,
}

/// Which object store implementation backs the storage service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    S3,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "s3" => Ok(StorageBackend::S3),
            "memory" => Ok(StorageBackend::Memory),
            other => Err(format!("unknown storage backend '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub endpoint: String,
    pub bucket: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub region: String,
    pub path_style: bool,
    /// Query parameter carrying the storage key (`path` or `id`).
    pub key_param: String,
    pub request_timeout_secs: u64,
}

/// How the streaming service turns a client identifier into a storage key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolverKind {
    /// The identifier is used as the storage key unchanged.
    Passthrough,
    /// The identifier is looked up in the metadata collection.
    Mongo,
}

impl FromStr for ResolverKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "passthrough" => Ok(ResolverKind::Passthrough),
            "mongo" | "mongodb" => Ok(ResolverKind::Mongo),
            other => Err(format!("unknown resolver '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Base URL of the storage service, e.g. `http://video-storage:8080`.
    pub upstream_url: String,
    /// Query parameter carrying the client identifier.
    pub id_param: String,
    /// Query parameter the storage service expects the key in.
    pub upstream_key_param: String,
    pub resolver: ResolverKind,
    pub content_type: String,
    pub connect_timeout_secs: u64,
    /// Deadline for the storage service to answer with a status line.
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    pub uri: String,
    pub database: String,
    pub collection: String,
    /// Document field holding the storage key.
    pub key_field: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub log_format: String,
    pub metrics_enabled: bool,
}

impl AppConfig {
    /// Load configuration with layered overrides:
    /// 1. built-in defaults
    /// 2. TOML file from `VIDEOFLOW_CONFIG`, else `config/default.toml` if it exists
    /// 3. Environment variables (`VIDEOFLOW_*` prefix)
    ///
    /// The result is validated for the configured role before it is returned.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var("VIDEOFLOW_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => {
                let default_path = Path::new("config/default.toml");
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    Self::default()
                }
            }
        };

        config.apply_env_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML config file. Missing sections and keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Apply `VIDEOFLOW_*` overrides read through `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("VIDEOFLOW_ROLE") {
            self.server.role = v.parse().map_err(|reason| ConfigError::Invalid {
                setting: "VIDEOFLOW_ROLE",
                reason,
            })?;
        }
        if let Some(v) = lookup("VIDEOFLOW_HOST") {
            self.server.host = v;
        }
        if let Some(v) = lookup("VIDEOFLOW_PORT") {
            self.server.port = v.trim().parse().map_err(|e| ConfigError::Invalid {
                setting: "VIDEOFLOW_PORT",
                reason: format!("'{}' is not a port number: {}", v, e),
            })?;
        }

        if let Some(v) = lookup("VIDEOFLOW_STORAGE_BACKEND") {
            self.storage.backend = v.parse().map_err(|reason| ConfigError::Invalid {
                setting: "VIDEOFLOW_STORAGE_BACKEND",
                reason,
            })?;
        }
        if let Some(v) = lookup("VIDEOFLOW_STORAGE_ENDPOINT") {
            self.storage.endpoint = v;
        }
        if let Some(v) = lookup("VIDEOFLOW_STORAGE_BUCKET") {
            self.storage.bucket = v;
        }
        if let Some(v) = lookup("VIDEOFLOW_STORAGE_ACCESS_KEY_ID") {
            self.storage.access_key_id = v;
        }
        if let Some(v) = lookup("VIDEOFLOW_STORAGE_SECRET_ACCESS_KEY") {
            self.storage.secret_access_key = v;
        }
        if let Some(v) = lookup("VIDEOFLOW_STORAGE_REGION") {
            self.storage.region = v;
        }
        if let Some(v) = lookup("VIDEOFLOW_STORAGE_KEY_PARAM") {
            self.storage.key_param = v;
        }

        if let Some(v) = lookup("VIDEOFLOW_STREAMING_UPSTREAM_URL") {
            self.streaming.upstream_url = v;
        }
        if let Some(v) = lookup("VIDEOFLOW_STREAMING_ID_PARAM") {
            self.streaming.id_param = v;
        }
        if let Some(v) = lookup("VIDEOFLOW_STREAMING_UPSTREAM_KEY_PARAM") {
            self.streaming.upstream_key_param = v;
        }
        if let Some(v) = lookup("VIDEOFLOW_STREAMING_RESOLVER") {
            self.streaming.resolver = v.parse().map_err(|reason| ConfigError::Invalid {
                setting: "VIDEOFLOW_STREAMING_RESOLVER",
                reason,
            })?;
        }

        if let Some(v) = lookup("VIDEOFLOW_METADATA_URI") {
            self.metadata.uri = v;
        }
        if let Some(v) = lookup("VIDEOFLOW_METADATA_DATABASE") {
            self.metadata.database = v;
        }
        if let Some(v) = lookup("VIDEOFLOW_METADATA_COLLECTION") {
            self.metadata.collection = v;
        }

        if let Some(v) = lookup("VIDEOFLOW_LOG_LEVEL") {
            self.observability.log_level = v;
        }
        if let Some(v) = lookup("VIDEOFLOW_LOG_FORMAT") {
            self.observability.log_format = v;
        }

        Ok(())
    }

    /// Fail fast on settings the configured role cannot run without.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.server.role {
            ServiceRole::Storage => self.validate_storage(),
            ServiceRole::Streaming => self.validate_streaming(),
        }
    }

    fn validate_storage(&self) -> Result<(), ConfigError> {
        let storage = &self.storage;
        require(&storage.bucket, "the S3 bucket name", "VIDEOFLOW_STORAGE_BUCKET")?;
        require(
            &storage.key_param,
            "the key query parameter name",
            "VIDEOFLOW_STORAGE_KEY_PARAM",
        )?;

        if storage.backend == StorageBackend::S3 {
            if !cfg!(feature = "s3") {
                return Err(ConfigError::FeatureDisabled { feature: "s3" });
            }
            require(
                &storage.access_key_id,
                "the S3 access key id",
                "VIDEOFLOW_STORAGE_ACCESS_KEY_ID",
            )?;
            require(
                &storage.secret_access_key,
                "the S3 secret access key",
                "VIDEOFLOW_STORAGE_SECRET_ACCESS_KEY",
            )?;
            require(&storage.region, "the S3 region", "VIDEOFLOW_STORAGE_REGION")?;
        }
        Ok(())
    }

    fn validate_streaming(&self) -> Result<(), ConfigError> {
        let streaming = &self.streaming;
        require(
            &streaming.upstream_url,
            "the video storage service URL",
            "VIDEOFLOW_STREAMING_UPSTREAM_URL",
        )?;
        reqwest::Url::parse(&streaming.upstream_base_url()).map_err(|e| ConfigError::Invalid {
            setting: "streaming.upstream_url",
            reason: format!("'{}': {}", streaming.upstream_url, e),
        })?;
        require(
            &streaming.id_param,
            "the identifier query parameter name",
            "VIDEOFLOW_STREAMING_ID_PARAM",
        )?;
        require(
            &streaming.upstream_key_param,
            "the storage service key parameter name",
            "VIDEOFLOW_STREAMING_UPSTREAM_KEY_PARAM",
        )?;

        if streaming.resolver == ResolverKind::Mongo {
            if !cfg!(feature = "mongo") {
                return Err(ConfigError::FeatureDisabled { feature: "mongo" });
            }
            require(
                &self.metadata.uri,
                "the metadata database connection string",
                "VIDEOFLOW_METADATA_URI",
            )?;
            require(
                &self.metadata.database,
                "the metadata database name",
                "VIDEOFLOW_METADATA_DATABASE",
            )?;
            require(
                &self.metadata.collection,
                "the metadata collection name",
                "VIDEOFLOW_METADATA_COLLECTION",
            )?;
        }
        Ok(())
    }
}

fn require(value: &str, setting: &'static str, env_var: &'static str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Missing { setting, env_var });
    }
    Ok(())
}

impl StreamingConfig {
    /// Upstream base URL with a scheme and without a trailing slash.
    ///
    /// A bare `host:port` is treated as plain HTTP.
    pub fn upstream_base_url(&self) -> String {
        let url = self.upstream_url.trim().trim_end_matches('/');
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!("http://{}", url)
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            role: ServiceRole::Storage,
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::S3,
            endpoint: "http://localhost:9000".to_string(),
            bucket: String::new(),
            access_key_id: String::new(),
            secret_access_key: String::new(),
            region: "us-east-1".to_string(),
            path_style: true,
            key_param: "path".to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            upstream_url: String::new(),
            id_param: "id".to_string(),
            upstream_key_param: "path".to_string(),
            resolver: ResolverKind::Passthrough,
            content_type: "video/mp4".to_string(),
            connect_timeout_secs: 5,
            request_timeout_secs: 30,
        }
    }
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            uri: String::new(),
            database: String::new(),
            collection: "videos".to_string(),
            key_field: "videoPath".to_string(),
            request_timeout_secs: 10,
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "json".to_string(),
            metrics_enabled: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn storage_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.storage.bucket = "videos".to_string();
        config.storage.access_key_id = "root".to_string();
        config.storage.secret_access_key = "password".to_string();
        config
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.role, ServiceRole::Storage);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.storage.key_param, "path");
        assert_eq!(config.streaming.id_param, "id");
        assert_eq!(config.streaming.content_type, "video/mp4");
        assert_eq!(config.metadata.collection, "videos");
        assert_eq!(config.metadata.key_field, "videoPath");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [server]
            role = "streaming"
            port = 4000

            [streaming]
            upstream_url = "http://video-storage:8080"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.role, ServiceRole::Streaming);
        assert_eq!(config.server.port, 4000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.streaming.id_param, "id");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let vars = env(&[
            ("VIDEOFLOW_ROLE", "streaming"),
            ("VIDEOFLOW_PORT", "3000"),
            ("VIDEOFLOW_STREAMING_UPSTREAM_URL", "video-storage:80"),
            ("VIDEOFLOW_STREAMING_RESOLVER", "mongo"),
            ("VIDEOFLOW_METADATA_URI", "mongodb://db:27017"),
            ("VIDEOFLOW_METADATA_DATABASE", "video-streaming"),
        ]);
        let mut config = AppConfig::default();
        config
            .apply_env_overrides(|name| vars.get(name).cloned())
            .unwrap();

        assert_eq!(config.server.role, ServiceRole::Streaming);
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.streaming.resolver, ResolverKind::Mongo);
        assert_eq!(
            config.streaming.upstream_base_url(),
            "http://video-storage:80"
        );
        assert_eq!(config.metadata.database, "video-streaming");
    }

    #[test]
    fn test_invalid_port_is_rejected() {
        let vars = env(&[("VIDEOFLOW_PORT", "eighty")]);
        let mut config = AppConfig::default();
        let err = config
            .apply_env_overrides(|name| vars.get(name).cloned())
            .unwrap_err();
        assert!(err.to_string().contains("VIDEOFLOW_PORT"));
    }

    #[test]
    fn test_unknown_role_is_rejected() {
        let vars = env(&[("VIDEOFLOW_ROLE", "proxy")]);
        let mut config = AppConfig::default();
        assert!(config
            .apply_env_overrides(|name| vars.get(name).cloned())
            .is_err());
    }

    #[test]
    fn test_storage_requires_bucket() {
        let mut config = storage_config();
        config.storage.bucket.clear();
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Missing {
                env_var: "VIDEOFLOW_STORAGE_BUCKET",
                ..
            }
        ));
        assert!(err.to_string().contains("VIDEOFLOW_STORAGE_BUCKET"));
    }

    #[test]
    fn test_memory_backend_needs_no_credentials() {
        let mut config = AppConfig::default();
        config.storage.backend = StorageBackend::Memory;
        config.storage.bucket = "videos".to_string();
        assert!(config.validate().is_ok());
    }

    #[cfg(feature = "s3")]
    #[test]
    fn test_s3_backend_requires_credentials() {
        let mut config = storage_config();
        assert!(config.validate().is_ok());

        config.storage.secret_access_key.clear();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Missing {
                env_var: "VIDEOFLOW_STORAGE_SECRET_ACCESS_KEY",
                ..
            })
        ));
    }

    #[test]
    fn test_streaming_requires_upstream() {
        let mut config = AppConfig::default();
        config.server.role = ServiceRole::Streaming;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Missing {
                env_var: "VIDEOFLOW_STREAMING_UPSTREAM_URL",
                ..
            })
        ));
    }

    #[cfg(feature = "mongo")]
    #[test]
    fn test_mongo_resolver_requires_database() {
        let mut config = AppConfig::default();
        config.server.role = ServiceRole::Streaming;
        config.streaming.upstream_url = "http://video-storage".to_string();
        config.streaming.resolver = ResolverKind::Mongo;
        config.metadata.uri = "mongodb://db:27017".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Missing {
                env_var: "VIDEOFLOW_METADATA_DATABASE",
                ..
            })
        ));
    }

    #[test]
    fn test_upstream_base_url_normalization() {
        let mut streaming = StreamingConfig::default();
        streaming.upstream_url = "http://video-storage:8080/".to_string();
        assert_eq!(streaming.upstream_base_url(), "http://video-storage:8080");

        streaming.upstream_url = "https://storage.internal".to_string();
        assert_eq!(streaming.upstream_base_url(), "https://storage.internal");

        streaming.upstream_url = "video-storage:8080".to_string();
        assert_eq!(streaming.upstream_base_url(), "http://video-storage:8080");
    }

    #[test]
    fn test_example_config_is_valid() {
        let config = AppConfig::from_toml(include_str!("../../config/example.toml")).unwrap();
        assert_eq!(config.server.role, ServiceRole::Storage);
        assert_eq!(config.storage.bucket, "videos");
        assert_eq!(config.streaming.resolver, ResolverKind::Mongo);
        assert_eq!(config.metadata.key_field, "videoPath");
        if cfg!(feature = "s3") {
            config.validate().unwrap();
        }
    }
}
