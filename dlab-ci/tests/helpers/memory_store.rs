//! In-memory asset store with injectable failures

use async_trait::async_trait;
use dlab_ci::services::{AssetStore, StorageError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const ALWAYS: u32 = u32::MAX;

#[derive(Debug, Default)]
pub struct MemoryAssetStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    attempts: AtomicUsize,
    failures_left: AtomicU32,
}

impl MemoryAssetStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every upload fails
    pub fn failing() -> Arc<Self> {
        Self::flaky(ALWAYS)
    }

    /// The first `failures` uploads fail, later ones succeed
    pub fn flaky(failures: u32) -> Arc<Self> {
        let store = Self::default();
        store.failures_left.store(failures, Ordering::SeqCst);
        Arc::new(store)
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn put_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AssetStore for MemoryAssetStore {
    async fn put(&self, key: &str, bytes: Arc<[u8]>, _content_type: &str) -> Result<(), StorageError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            if left != ALWAYS {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
            }
            return Err(StorageError::Rejected {
                status: 503,
                body: "simulated outage".to_string(),
            });
        }
        self.objects.lock().unwrap().insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("memory://assets/{}", key)
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
