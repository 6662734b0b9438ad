//! Object storage backends for imported assets
//!
//! Keys are content-addressed (`image/<sha256>.png`), so writing the same
//! key twice is always safe.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Storage rejected upload with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Storage error: {0}")]
    Other(String),
}

#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Store `bytes` under `key`
    async fn put(&self, key: &str, bytes: Arc<[u8]>, content_type: &str) -> Result<(), StorageError>;

    /// Public URL a stored key is served from
    fn public_url(&self, key: &str) -> String;

    /// Backend name for logs and health
    fn backend(&self) -> &'static str;
}

/// Filesystem backend rooted in a directory, served elsewhere under `public_base_url`
#[derive(Debug, Clone)]
pub struct LocalAssetStore {
    root: PathBuf,
    public_base_url: String,
}

impl LocalAssetStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl AssetStore for LocalAssetStore {
    async fn put(&self, key: &str, bytes: Arc<[u8]>, _content_type: &str) -> Result<(), StorageError> {
        let path = self.root.join(key);
        if let Ok(meta) = tokio::fs::metadata(&path).await {
            if meta.len() == bytes.len() as u64 {
                tracing::debug!(key, "Asset already stored");
                return Ok(());
            }
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        // Each writer gets its own temporary file; the rename is atomic
        let tmp = path.with_extension(format!("{}.partial", Uuid::new_v4()));
        if let Err(e) = tokio::fs::write(&tmp, &bytes[..]).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url, key)
    }

    fn backend(&self) -> &'static str {
        "local"
    }
}

/// S3-compatible HTTP backend: `PUT {endpoint}/{bucket}/{key}`
#[derive(Debug, Clone)]
pub struct HttpAssetStore {
    client: reqwest::Client,
    endpoint: String,
    bucket: String,
    public_base_url: String,
    auth_token: Option<String>,
}

impl HttpAssetStore {
    pub fn new(
        endpoint: impl Into<String>,
        bucket: impl Into<String>,
        public_base_url: impl Into<String>,
        auth_token: Option<String>,
    ) -> Result<Self, StorageError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            bucket: bucket.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
            auth_token,
        })
    }
}

#[async_trait]
impl AssetStore for HttpAssetStore {
    async fn put(&self, key: &str, bytes: Arc<[u8]>, content_type: &str) -> Result<(), StorageError> {
        let url = format!("{}/{}/{}", self.endpoint, self.bucket, key);
        let mut request = self
            .client
            .put(&url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes.to_vec());
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(StorageError::Rejected {
            status: status.as_u16(),
            body: body.chars().take(200).collect(),
        })
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.public_base_url, self.bucket, key)
    }

    fn backend(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_store_writes_and_is_idempotent() {
        let temp = tempfile::tempdir().unwrap();
        let store = LocalAssetStore::new(temp.path(), "http://localhost:5780/assets/");
        let bytes: Arc<[u8]> = Arc::from(&b"png-bytes"[..]);

        store.put("image/abc.png", bytes.clone(), "image/png").await.unwrap();
        store.put("image/abc.png", bytes, "image/png").await.unwrap();

        let written = std::fs::read(temp.path().join("image/abc.png")).unwrap();
        assert_eq!(written, b"png-bytes");
        assert_eq!(
            store.public_url("image/abc.png"),
            "http://localhost:5780/assets/image/abc.png"
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_puts_of_same_key_all_succeed() {
        let temp = tempfile::tempdir().unwrap();
        let store = Arc::new(LocalAssetStore::new(temp.path(), "http://localhost:5780/assets"));
        let bytes: Arc<[u8]> = Arc::from(vec![7u8; 256 * 1024]);

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            let bytes = bytes.clone();
            tasks.push(tokio::spawn(async move {
                store.put("image/shared.png", bytes, "image/png").await
            }));
        }
        for task in tasks {
            assert!(task.await.unwrap().is_ok());
        }

        let written = std::fs::read(temp.path().join("image/shared.png")).unwrap();
        assert_eq!(written.len(), 256 * 1024);
        let leftovers: Vec<_> = std::fs::read_dir(temp.path().join("image"))
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".partial"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_http_store_public_url_includes_bucket() {
        let store = HttpAssetStore::new("http://minio:9000/", "dlab", "https://cdn.example.com", None).unwrap();
        assert_eq!(store.public_url("image/abc.png"), "https://cdn.example.com/dlab/image/abc.png");
    }
}
