//! Configuration for dlab-ci
//!
//! Bootstrap values (root folder, port, logging, storage backend) come
//! from the TOML file. Import tunables resolve with
//! Database → ENV → TOML → built-in default priority, so an operator can
//! retune a running deployment through the `settings` table.

use dlab_common::config::LoggingConfig;
use dlab_common::{Error, Result};
use serde::Deserialize;
use sqlx::SqlitePool;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::services::asset_pipeline::AssetPipelineConfig;
use crate::services::{AssetStore, HttpAssetStore, LocalAssetStore, PipelineConfig, TrackerConfig};
use crate::utils::RetryPolicy;

pub const MODULE_NAME: &str = "dlab-ci";
pub const DEFAULT_PORT: u16 = 5780;

pub const SETTING_UPLOAD_CONCURRENCY: &str = "ci_upload_concurrency";
pub const SETTING_UPLOAD_MAX_ATTEMPTS: &str = "ci_upload_max_attempts";
pub const SETTING_UPLOAD_BACKOFF_MS: &str = "ci_upload_backoff_ms";
pub const SETTING_MAX_ARCHIVE_BYTES: &str = "ci_max_archive_bytes";
pub const SETTING_PROGRESS_PERSIST_INTERVAL: &str = "ci_progress_persist_interval";
pub const SETTING_DATABASE_MAX_LOCK_WAIT_MS: &str = "ci_database_max_lock_wait_ms";

/// `dlab-ci.toml`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CiTomlConfig {
    #[serde(default)]
    pub root_folder: Option<PathBuf>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub import: ImportTomlConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Local,
    Http,
}

/// `[storage]` section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Local backend directory; defaults to `<root>/assets`
    pub local_root: Option<PathBuf>,
    /// HTTP backend endpoint, e.g. `http://minio:9000`
    pub endpoint: Option<String>,
    pub bucket: String,
    pub public_base_url: String,
    /// Name of the environment variable holding the HTTP bearer token
    pub auth_token_env: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Local,
            local_root: None,
            endpoint: None,
            bucket: "dlab-assets".to_string(),
            public_base_url: format!("http://127.0.0.1:{}/assets", DEFAULT_PORT),
            auth_token_env: None,
        }
    }
}

impl StorageConfig {
    /// Directory the local backend writes to
    pub fn local_root(&self, root_folder: &Path) -> PathBuf {
        self.local_root
            .clone()
            .unwrap_or_else(|| root_folder.join("assets"))
    }

    pub fn build_store(&self, root_folder: &Path) -> Result<Arc<dyn AssetStore>> {
        match self.backend {
            StorageBackend::Local => {
                let root = self.local_root(root_folder);
                info!(root = %root.display(), "Asset storage: local filesystem");
                Ok(Arc::new(LocalAssetStore::new(root, self.public_base_url.clone())))
            }
            StorageBackend::Http => {
                let endpoint = self
                    .endpoint
                    .clone()
                    .ok_or_else(|| Error::Config("storage.endpoint is required for the http backend".to_string()))?;
                let auth_token = self.auth_token_env.as_deref().and_then(|name| match std::env::var(name) {
                    Ok(token) if !token.trim().is_empty() => Some(token),
                    _ => {
                        warn!(env = name, "Storage auth token variable is unset; uploading without credentials");
                        None
                    }
                });
                info!(endpoint = %endpoint, bucket = %self.bucket, "Asset storage: HTTP object store");
                let store = HttpAssetStore::new(endpoint, self.bucket.clone(), self.public_base_url.clone(), auth_token)
                    .map_err(|e| Error::Config(format!("Failed to build HTTP asset store: {}", e)))?;
                Ok(Arc::new(store))
            }
        }
    }
}

/// `[import]` section; every field optional
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ImportTomlConfig {
    pub upload_concurrency: Option<usize>,
    pub upload_max_attempts: Option<u32>,
    pub upload_backoff_ms: Option<u64>,
    pub max_archive_bytes: Option<u64>,
    pub progress_persist_interval: Option<usize>,
    pub database_max_lock_wait_ms: Option<u64>,
}

/// Resolved import tunables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportSettings {
    pub upload_concurrency: usize,
    pub upload_max_attempts: u32,
    pub upload_backoff_ms: u64,
    pub max_archive_bytes: u64,
    pub progress_persist_interval: usize,
    pub database_max_lock_wait_ms: u64,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            upload_concurrency: 6,
            upload_max_attempts: 3,
            upload_backoff_ms: 200,
            max_archive_bytes: 256 * 1024 * 1024,
            progress_persist_interval: 25,
            database_max_lock_wait_ms: 5000,
        }
    }
}

impl ImportSettings {
    /// Resolve every tunable: Database → ENV → TOML → default
    pub async fn resolve(db: &SqlitePool, toml: &ImportTomlConfig) -> Result<Self> {
        let defaults = Self::default();
        let settings = Self {
            upload_concurrency: resolve_setting(
                db,
                SETTING_UPLOAD_CONCURRENCY,
                toml.upload_concurrency,
                defaults.upload_concurrency,
            )
            .await?
            .max(1),
            upload_max_attempts: resolve_setting(
                db,
                SETTING_UPLOAD_MAX_ATTEMPTS,
                toml.upload_max_attempts,
                defaults.upload_max_attempts,
            )
            .await?
            .max(1),
            upload_backoff_ms: resolve_setting(
                db,
                SETTING_UPLOAD_BACKOFF_MS,
                toml.upload_backoff_ms,
                defaults.upload_backoff_ms,
            )
            .await?,
            max_archive_bytes: resolve_setting(
                db,
                SETTING_MAX_ARCHIVE_BYTES,
                toml.max_archive_bytes,
                defaults.max_archive_bytes,
            )
            .await?,
            progress_persist_interval: resolve_setting(
                db,
                SETTING_PROGRESS_PERSIST_INTERVAL,
                toml.progress_persist_interval,
                defaults.progress_persist_interval,
            )
            .await?
            .max(1),
            database_max_lock_wait_ms: resolve_setting(
                db,
                SETTING_DATABASE_MAX_LOCK_WAIT_MS,
                toml.database_max_lock_wait_ms,
                defaults.database_max_lock_wait_ms,
            )
            .await?,
        };
        info!(?settings, "Import settings resolved");
        Ok(settings)
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            max_archive_bytes: self.max_archive_bytes,
            assets: AssetPipelineConfig {
                concurrency: self.upload_concurrency,
                retry: RetryPolicy::new(self.upload_max_attempts, self.upload_backoff_ms),
                upload: true,
            },
            tracker: TrackerConfig {
                persist_interval: self.progress_persist_interval,
                max_lock_wait_ms: self.database_max_lock_wait_ms,
                ..TrackerConfig::default()
            },
            cancel_poll_interval: self.progress_persist_interval,
        }
    }
}

/// `ci_upload_concurrency` → `DLAB_CI_UPLOAD_CONCURRENCY`
pub fn env_var_name(setting: &str) -> String {
    format!("DLAB_{}", setting.to_ascii_uppercase())
}

async fn resolve_setting<T>(db: &SqlitePool, key: &str, toml_value: Option<T>, default: T) -> Result<T>
where
    T: FromStr + Display + Copy,
{
    if let Some(value) = dlab_common::db::get_parsed_setting::<T>(db, key).await? {
        debug!(key, %value, "Setting from database");
        return Ok(value);
    }

    let env_name = env_var_name(key);
    if let Ok(raw) = std::env::var(&env_name) {
        match raw.trim().parse::<T>() {
            Ok(value) => {
                debug!(key, %value, "Setting from environment");
                return Ok(value);
            }
            Err(_) => warn!(env = %env_name, value = %raw, "Ignoring unparseable environment setting"),
        }
    }

    if let Some(value) = toml_value {
        debug!(key, %value, "Setting from TOML config");
        return Ok(value);
    }

    Ok(default)
}
