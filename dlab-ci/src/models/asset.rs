//! Asset mapping model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Where one archive path ended up
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetMappingEntry {
    pub original_path: String,
    pub storage_key: String,
    pub public_url: String,
    pub asset_id: Uuid,
    /// SHA-256 of the bytes, lowercase hex
    pub hash: String,
}

/// Archive path → stored asset, for one job
///
/// Several paths may point at the same asset when their bytes are identical.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetMapping {
    entries: BTreeMap<String, AssetMappingEntry>,
}

impl AssetMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entry: AssetMappingEntry) {
        self.entries.insert(entry.original_path.clone(), entry);
    }

    pub fn get(&self, path: &str) -> Option<&AssetMappingEntry> {
        self.entries.get(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &AssetMappingEntry> {
        self.entries.values()
    }

    /// Number of distinct stored assets behind the mapping
    pub fn unique_assets(&self) -> usize {
        let mut ids: Vec<Uuid> = self.entries.values().map(|e| e.asset_id).collect();
        ids.sort();
        ids.dedup();
        ids.len()
    }
}

/// Row of the `assets` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredAsset {
    pub id: Uuid,
    pub hash: String,
    pub storage_key: String,
    pub public_url: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str, asset_id: Uuid) -> AssetMappingEntry {
        AssetMappingEntry {
            original_path: path.to_string(),
            storage_key: "image/abc.png".to_string(),
            public_url: "http://assets/image/abc.png".to_string(),
            asset_id,
            hash: "abc".to_string(),
        }
    }

    #[test]
    fn test_unique_assets_collapses_shared_ids() {
        let shared = Uuid::new_v4();
        let mut mapping = AssetMapping::new();
        mapping.insert(entry("assets/a.png", shared));
        mapping.insert(entry("assets/b.png", shared));
        mapping.insert(entry("assets/c.png", Uuid::new_v4()));

        assert_eq!(mapping.len(), 3);
        assert_eq!(mapping.unique_assets(), 2);
    }
}
