//! Configuration for a sync run
//!
//! A run is described by a [`StoreConfig`] (where to write) and a
//! [`SyncConfig`] (what to mirror and how hard to try). Both can be read
//! from an optional `config.toml` and are then overridden by CLI flags.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Name of the configuration file inside the config directory
pub const CONFIG_FILE: &str = "config.toml";

/// Environment variable overriding the config directory
pub const CONFIG_DIR_ENV: &str = "UPSYNC_CONFIG_DIR";

/// Retry settings applied to every remote call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first one
    pub max_attempts: u32,

    /// Fixed delay between attempts
    pub delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_ms: 500,
        }
    }
}

/// Connection details for the target bucket
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub bucket: String,

    /// Auth principal (access key)
    pub operator: String,

    /// Auth secret (secret key)
    pub password: String,

    /// Storage endpoint URL; empty uses the SDK default
    pub endpoint: String,

    pub region: String,

    /// Bucket lookup style: auto, path, or dns
    pub bucket_lookup: String,

    /// CDN base URL that receives `PURGE` requests for synced paths
    pub purge_endpoint: Option<String>,
}

impl StoreConfig {
    /// Validate required fields and URL syntax
    pub fn validate(&self) -> Result<()> {
        if self.bucket.trim().is_empty() {
            return Err(Error::Config("bucket is required".to_string()));
        }
        if !self.endpoint.is_empty() {
            url::Url::parse(&self.endpoint)
                .map_err(|e| Error::Config(format!("invalid endpoint '{}': {e}", self.endpoint)))?;
        }
        if let Some(purge) = &self.purge_endpoint {
            url::Url::parse(purge)
                .map_err(|e| Error::Config(format!("invalid purge endpoint '{purge}': {e}")))?;
        }
        Ok(())
    }
}

/// What to mirror and how
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Root of the local tree
    pub local_dir: PathBuf,

    /// Remote prefix the local tree is mirrored under. Empty is the root.
    pub publish_dir: String,

    pub retry: RetryConfig,

    /// Page size requested from directory listings
    pub list_page_size: i32,

    /// Number of concurrent orphan-file deletions
    pub delete_workers: usize,

    /// Ask the backend for asynchronous deletes where supported
    pub async_delete: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            local_dir: PathBuf::new(),
            publish_dir: String::new(),
            retry: RetryConfig::default(),
            list_page_size: 10_000,
            delete_workers: 20,
            async_delete: true,
        }
    }
}

impl SyncConfig {
    /// Create a config for mirroring `local_dir` under `publish_dir`
    pub fn new(local_dir: impl AsRef<Path>, publish_dir: &str) -> Self {
        let mut config = Self::default();
        config.set_local_dir(local_dir);
        config.set_publish_dir(publish_dir);
        config
    }

    /// Set the local root, dropping a leading `./`
    ///
    /// A root that is nothing but `./` stays the current directory.
    pub fn set_local_dir(&mut self, local_dir: impl AsRef<Path>) {
        let local_dir = local_dir.as_ref();
        self.local_dir = match local_dir.to_str() {
            Some(raw) => match raw.strip_prefix("./") {
                Some("") => PathBuf::from("."),
                Some(rest) => PathBuf::from(rest),
                None => local_dir.to_path_buf(),
            },
            None => local_dir.to_path_buf(),
        };
    }

    /// Set the publish prefix, trimming surrounding dots and slashes
    pub fn set_publish_dir(&mut self, publish_dir: &str) {
        self.publish_dir = publish_dir
            .trim_matches(|c| c == '.' || c == '/')
            .to_string();
    }

    /// Canonical key of the publish root
    pub fn publish_root(&self) -> String {
        crate::path::normalize(&self.publish_dir)
    }

    pub fn validate(&self) -> Result<()> {
        if self.local_dir.as_os_str().is_empty() {
            return Err(Error::Config("local directory is required".to_string()));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::Config("retry attempts must be at least 1".to_string()));
        }
        if self.delete_workers == 0 {
            return Err(Error::Config("delete workers must be at least 1".to_string()));
        }
        if self.list_page_size <= 0 {
            return Err(Error::Config("list page size must be positive".to_string()));
        }
        Ok(())
    }
}

/// Contents of `config.toml`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub sync: SyncConfig,
}

/// Locates and loads the configuration file
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: PathBuf,
}

impl ConfigManager {
    /// Use `$UPSYNC_CONFIG_DIR`, falling back to the platform config dir
    pub fn new() -> Result<Self> {
        if let Ok(dir) = std::env::var(CONFIG_DIR_ENV)
            && !dir.is_empty()
        {
            return Ok(Self::with_dir(dir));
        }

        let base = dirs::config_dir()
            .ok_or_else(|| Error::Config("cannot determine config directory".to_string()))?;
        Ok(Self::with_dir(base.join("upsync")))
    }

    pub fn with_dir(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
        }
    }

    pub fn config_path(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE)
    }

    /// Load the config file; a missing file yields the defaults
    pub fn load(&self) -> Result<Config> {
        let path = self.config_path();
        match std::fs::read_to_string(&path) {
            Ok(contents) => {
                tracing::debug!(path = %path.display(), "Loaded config file");
                Ok(toml::from_str(&contents)?)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Config::default()),
            Err(e) => Err(Error::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sync_config_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.delay_ms, 500);
        assert_eq!(config.list_page_size, 10_000);
        assert_eq!(config.delete_workers, 20);
        assert!(config.async_delete);
    }

    #[test]
    fn test_path_normalization() {
        let config = SyncConfig::new("./public", "./blog/");
        assert_eq!(config.local_dir, PathBuf::from("public"));
        assert_eq!(config.publish_dir, "blog");
        assert_eq!(config.publish_root(), "blog");

        let config = SyncConfig::new("/srv/site", "/");
        assert_eq!(config.local_dir, PathBuf::from("/srv/site"));
        assert_eq!(config.publish_dir, "");
        assert_eq!(config.publish_root(), "/");

        for current in [".", "./"] {
            let config = SyncConfig::new(current, "");
            assert_eq!(config.local_dir, PathBuf::from("."), "local dir {current:?}");
            assert!(config.validate().is_ok(), "local dir {current:?}");
        }
    }

    #[test]
    fn test_sync_config_validate() {
        assert!(SyncConfig::new("public", "").validate().is_ok());
        assert!(SyncConfig::default().validate().is_err());

        let mut config = SyncConfig::new("public", "");
        config.delete_workers = 0;
        assert!(config.validate().is_err());

        let mut config = SyncConfig::new("public", "");
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_store_config_validate() {
        let mut store = StoreConfig {
            bucket: "site".to_string(),
            ..Default::default()
        };
        assert!(store.validate().is_ok());

        store.endpoint = "not a url".to_string();
        assert!(store.validate().is_err());

        store.endpoint = "http://localhost:9000".to_string();
        store.purge_endpoint = Some("https://cdn.example.com".to_string());
        assert!(store.validate().is_ok());

        store.bucket = String::new();
        assert!(matches!(store.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let manager = ConfigManager::with_dir(temp_dir.path());

        let config = manager.load().unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_config_file() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(
            temp_dir.path().join(CONFIG_FILE),
            r#"
[store]
bucket = "site"
endpoint = "http://localhost:9000"
purge_endpoint = "https://cdn.example.com"

[sync]
local_dir = "public"
delete_workers = 8

[sync.retry]
max_attempts = 5
"#,
        )
        .unwrap();

        let config = ConfigManager::with_dir(temp_dir.path()).load().unwrap();
        assert_eq!(config.store.bucket, "site");
        assert_eq!(
            config.store.purge_endpoint.as_deref(),
            Some("https://cdn.example.com")
        );
        assert_eq!(config.sync.local_dir, PathBuf::from("public"));
        assert_eq!(config.sync.delete_workers, 8);
        assert_eq!(config.sync.retry.max_attempts, 5);
        assert_eq!(config.sync.retry.delay_ms, 500);
        assert_eq!(config.sync.list_page_size, 10_000);
    }

    #[test]
    fn test_load_invalid_file() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join(CONFIG_FILE), "[store\nbucket = 1").unwrap();

        let result = ConfigManager::with_dir(temp_dir.path()).load();
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
