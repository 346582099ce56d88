//! Configuration management
//!
//! Handles loading and parsing of JSON configuration files with environment
//! variable overrides for the database path and the FX API key.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::codec::{ImageCodec, DEFAULT_QUALITY, MAX_IMAGES_PER_TRADE, MAX_IMAGE_BYTES};
use crate::error::{JournalError, JournalResult};
use crate::persistence::{ChunkedStore, CHUNK_SIZE, DEFAULT_NAMESPACE};
use crate::storage::{KeyValueStore, MemoryStore, SqliteStore};

pub const DB_PATH_ENV: &str = "TRADE_JOURNAL_DB";
pub const API_KEY_ENV: &str = "FREECURRENCY_API_KEY";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JournalConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub images: ImageConfig,
    #[serde(default)]
    pub market_data: MarketDataConfig,
}

impl JournalConfig {
    /// Load configuration from JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).context("Failed to read config file")?;
        let mut config: JournalConfig =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;
        config.apply_env();
        Ok(config)
    }

    /// Like [`JournalConfig::from_file`], falling back to defaults when the
    /// file does not exist
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            info!("Loading config from {}", path.display());
            Self::from_file(path)
        } else {
            debug!("No config at {}, using defaults", path.display());
            let mut config = Self::default();
            config.apply_env();
            Ok(config)
        }
    }

    fn apply_env(&mut self) {
        if let Ok(db_path) = std::env::var(DB_PATH_ENV) {
            self.storage.backend = StorageBackend::Sqlite;
            self.storage.path = db_path;
        }
        if let Ok(api_key) = std::env::var(API_KEY_ENV) {
            self.market_data.api_key = Some(api_key);
        }
    }

    pub fn validate(&self) -> JournalResult<()> {
        if self.storage.chunk_size == 0 {
            return Err(JournalError::Config("storage.chunk_size must be > 0".to_string()));
        }
        if self.storage.namespace.trim().is_empty() {
            return Err(JournalError::Config("storage.namespace must not be empty".to_string()));
        }
        if !(self.images.quality > 0.0 && self.images.quality <= 1.0) {
            return Err(JournalError::Config(format!(
                "images.quality ({}) must be in (0, 1]",
                self.images.quality
            )));
        }
        Ok(())
    }

    /// Open the configured storage backend
    pub fn open_store(&self) -> JournalResult<Arc<dyn KeyValueStore>> {
        let quota = self.storage.max_entry_bytes;
        match self.storage.backend {
            StorageBackend::Memory => Ok(Arc::new(match quota {
                Some(limit) => MemoryStore::with_quota(limit),
                None => MemoryStore::new(),
            })),
            StorageBackend::Sqlite => {
                Ok(Arc::new(SqliteStore::new(&self.storage.path)?.with_quota(quota)))
            }
        }
    }

    /// Chunked persistence engine over the configured backend
    pub fn engine(&self) -> JournalResult<ChunkedStore> {
        self.validate()?;
        Ok(ChunkedStore::new(self.open_store()?)
            .with_namespace(self.storage.namespace.clone())
            .with_chunk_size(self.storage.chunk_size)
            .with_codec(ImageCodec::new(self.images.quality)))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    #[default]
    Sqlite,
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => write!(f, "memory"),
            Self::Sqlite => write!(f, "sqlite"),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// SQLite database file, ignored by the memory backend
    pub path: String,
    pub namespace: String,
    pub chunk_size: usize,
    /// Per-entry ceiling; `None` disables the quota
    pub max_entry_bytes: Option<usize>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            backend: StorageBackend::Sqlite,
            path: "journal.db".to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            chunk_size: CHUNK_SIZE,
            max_entry_bytes: Some(5 * 1024 * 1024),
        }
    }
}

/// Image attachment limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    /// JPEG re-encode quality in (0, 1]
    pub quality: f32,
    pub max_images: usize,
    pub max_image_bytes: u64,
}

impl Default for ImageConfig {
    fn default() -> Self {
        ImageConfig {
            quality: DEFAULT_QUALITY,
            max_images: MAX_IMAGES_PER_TRADE,
            max_image_bytes: MAX_IMAGE_BYTES,
        }
    }
}

/// FX rate API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketDataConfig {
    pub base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub base_currency: String,
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        MarketDataConfig {
            base_url: "https://api.freecurrencyapi.com/v1".to_string(),
            api_key: None,
            base_currency: "USD".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: JournalConfig =
            serde_json::from_str(r#"{ "storage": { "backend": "memory", "chunk_size": 10 } }"#).unwrap();

        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.storage.chunk_size, 10);
        assert_eq!(config.storage.namespace, DEFAULT_NAMESPACE);
        assert_eq!(config.images.max_images, MAX_IMAGES_PER_TRADE);
        assert_eq!(config.market_data.base_currency, "USD");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = JournalConfig::default();
        assert!(config.validate().is_ok());

        config.storage.chunk_size = 0;
        assert!(matches!(config.validate(), Err(JournalError::Config(_))));

        config.storage.chunk_size = CHUNK_SIZE;
        config.images.quality = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_memory_engine_from_config() {
        let mut config = JournalConfig::default();
        config.storage.backend = StorageBackend::Memory;
        config.storage.namespace = "test_ns".to_string();

        let engine = config.engine().unwrap();
        assert_eq!(engine.namespace(), "test_ns");
        assert_eq!(engine.count_key(), "test_ns_count");
        assert_eq!(engine.chunk_size(), CHUNK_SIZE);
    }
}
