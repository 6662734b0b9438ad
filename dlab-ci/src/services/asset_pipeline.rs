//! Asset pipeline
//!
//! Reads every referenced asset path from the archive, hashes it, collapses
//! byte-identical files onto one stored asset, and uploads what the asset
//! registry does not already hold. Uploads run with bounded parallelism and
//! are retried with exponential backoff.

use futures::stream::{self, StreamExt};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::asset_store::AssetStore;
use crate::archive::CompendiumArchive;
use crate::db;
use crate::models::{AssetMapping, AssetMappingEntry, ImportIssue, IssueCode, StoredAsset};
use crate::utils::{retry_with_backoff, RetryPolicy};

#[derive(Debug, Error)]
pub enum AssetPipelineError {
    #[error("Import cancelled")]
    Cancelled,

    #[error("Asset registry error: {0}")]
    Database(#[from] dlab_common::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssetPipelineConfig {
    pub concurrency: usize,
    pub retry: RetryPolicy,
    /// When false, assets are hashed and mapped but never uploaded or registered
    pub upload: bool,
}

impl Default for AssetPipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: 6,
            retry: RetryPolicy::new(3, 200),
            upload: true,
        }
    }
}

/// A path that could not be mapped
#[derive(Debug, Clone, PartialEq)]
pub struct AssetFailure {
    pub path: String,
    pub code: IssueCode,
    pub message: String,
}

impl AssetFailure {
    pub fn to_issue(&self) -> ImportIssue {
        ImportIssue::skip(self.code, Some(self.path.clone()), self.message.clone())
    }
}

#[derive(Debug, Default)]
pub struct AssetPipelineOutcome {
    pub mapping: AssetMapping,
    pub failures: Vec<AssetFailure>,
    /// Distinct assets written to storage by this job
    pub uploaded: usize,
    /// Distinct assets found already registered by an earlier job
    pub reused: usize,
}

/// Bytes shared by one or more archive paths
struct AssetGroup {
    hash: String,
    bytes: Arc<[u8]>,
    paths: Vec<String>,
}

enum GroupResult {
    Stored { asset: StoredAsset, reused: bool },
    Failed(String),
}

pub struct AssetPipeline {
    store: Arc<dyn AssetStore>,
    db: SqlitePool,
    config: AssetPipelineConfig,
}

impl AssetPipeline {
    pub fn new(store: Arc<dyn AssetStore>, db: SqlitePool, config: AssetPipelineConfig) -> Self {
        Self { store, db, config }
    }

    /// Map every path in `paths`
    ///
    /// `on_asset` is called with each path group as it starts, for progress display.
    pub async fn process<F>(
        &self,
        archive: &CompendiumArchive,
        paths: BTreeSet<String>,
        cancel: &CancellationToken,
        on_asset: F,
    ) -> Result<AssetPipelineOutcome, AssetPipelineError>
    where
        F: Fn(&str) + Send + Sync,
    {
        let mut outcome = AssetPipelineOutcome::default();
        let mut groups: Vec<AssetGroup> = Vec::new();
        let mut by_hash: HashMap<String, usize> = HashMap::new();

        for path in paths {
            let Some(bytes) = archive.read(&path) else {
                outcome.failures.push(AssetFailure {
                    message: "referenced asset is not in the archive".to_string(),
                    path,
                    code: IssueCode::AssetMissing,
                });
                continue;
            };
            let hash = sha256_hex(&bytes);
            match by_hash.get(&hash) {
                Some(&index) => groups[index].paths.push(path),
                None => {
                    by_hash.insert(hash.clone(), groups.len());
                    groups.push(AssetGroup {
                        hash,
                        bytes,
                        paths: vec![path],
                    });
                }
            }
        }

        tracing::debug!(
            unique_assets = groups.len(),
            missing = outcome.failures.len(),
            "Asset groups prepared"
        );

        let on_asset = &on_asset;
        let results: Vec<(AssetGroup, Result<GroupResult, AssetPipelineError>)> = stream::iter(groups)
            .map(|group| async move {
                if cancel.is_cancelled() {
                    return (group, Err(AssetPipelineError::Cancelled));
                }
                on_asset(&group.paths[0]);
                let result = self.store_group(&group).await;
                (group, result)
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;

        for (group, result) in results {
            match result? {
                GroupResult::Stored { asset, reused } => {
                    if reused {
                        outcome.reused += 1;
                    } else if self.config.upload {
                        outcome.uploaded += 1;
                    }
                    for path in group.paths {
                        outcome.mapping.insert(AssetMappingEntry {
                            original_path: path,
                            storage_key: asset.storage_key.clone(),
                            public_url: asset.public_url.clone(),
                            asset_id: asset.id,
                            hash: asset.hash.clone(),
                        });
                    }
                }
                GroupResult::Failed(message) => {
                    for path in group.paths {
                        outcome.failures.push(AssetFailure {
                            path,
                            code: IssueCode::AssetUploadError,
                            message: message.clone(),
                        });
                    }
                }
            }
        }

        if cancel.is_cancelled() {
            return Err(AssetPipelineError::Cancelled);
        }

        outcome.failures.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(outcome)
    }

    async fn store_group(&self, group: &AssetGroup) -> Result<GroupResult, AssetPipelineError> {
        let (mime_type, extension) = detect_type(&group.bytes, &group.paths[0]);
        let kind = mime_type.split('/').next().unwrap_or("application");
        let storage_key = format!("{}/{}.{}", kind, group.hash, extension);

        let candidate = StoredAsset {
            id: Uuid::new_v4(),
            hash: group.hash.clone(),
            public_url: self.store.public_url(&storage_key),
            storage_key,
            mime_type: mime_type.clone(),
            size_bytes: group.bytes.len() as u64,
            created_at: chrono::Utc::now(),
        };

        if !self.config.upload {
            return Ok(GroupResult::Stored {
                asset: candidate,
                reused: false,
            });
        }

        if let Some(existing) = db::assets::find_by_hash(&self.db, &group.hash).await? {
            tracing::debug!(hash = %group.hash, asset_id = %existing.id, "Reusing registered asset");
            return Ok(GroupResult::Stored {
                asset: existing,
                reused: true,
            });
        }

        let upload = retry_with_backoff("asset upload", self.config.retry, |attempt| {
            let bytes = group.bytes.clone();
            let key = candidate.storage_key.as_str();
            let mime = mime_type.as_str();
            async move {
                tracing::debug!(key, attempt, "Uploading asset");
                self.store.put(key, bytes, mime).await
            }
        })
        .await;

        match upload {
            Ok(()) => {
                let asset = db::assets::insert_or_get(&self.db, &candidate).await?;
                tracing::info!(key = %asset.storage_key, bytes = asset.size_bytes, "Asset stored");
                Ok(GroupResult::Stored { asset, reused: false })
            }
            Err(exhausted) => Ok(GroupResult::Failed(format!(
                "upload failed after {} attempts: {}",
                exhausted.attempts, exhausted.last_error
            ))),
        }
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// MIME type and file extension, sniffed from content first, then the path
pub fn detect_type(bytes: &[u8], path: &str) -> (String, String) {
    if let Some(kind) = infer::get(bytes) {
        return (kind.mime_type().to_string(), kind.extension().to_string());
    }

    let extension = path
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && !ext.contains('/'));
    let mime = match extension.as_deref() {
        Some("svg") => "image/svg+xml",
        Some("json") => "application/json",
        Some("txt") | Some("md") => "text/plain",
        Some("webp") => "image/webp",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => "application/octet-stream",
    };
    (mime.to_string(), extension.unwrap_or_else(|| "bin".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_HEADER: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D];

    #[test]
    fn test_sha256_hex() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_detect_type_prefers_content() {
        let (mime, ext) = detect_type(PNG_HEADER, "assets/token.jpg");
        assert_eq!(mime, "image/png");
        assert_eq!(ext, "png");
    }

    #[test]
    fn test_detect_type_falls_back_to_extension() {
        assert_eq!(
            detect_type(b"<svg xmlns='http://www.w3.org/2000/svg'/>", "assets/map.SVG"),
            ("image/svg+xml".to_string(), "svg".to_string())
        );
        assert_eq!(
            detect_type(b"???", "assets/blob"),
            ("application/octet-stream".to_string(), "bin".to_string())
        );
    }
}
