//! Compendium manifest model

use serde::{Deserialize, Serialize};

pub const DEFAULT_ASSET_DIRECTORY: &str = "assets";
pub const DEFAULT_CONTENT_DIRECTORY: &str = "content";

/// Archive-level metadata read from `manifest.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompendiumManifest {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub version: String,
    pub plugin_id: String,
    pub content_types: Vec<String>,
    pub asset_directory: String,
    pub content_directory: String,
}
