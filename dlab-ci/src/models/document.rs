//! Canonical documents and compendium records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Platform document category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentType {
    Actor,
    Item,
    VttDocument,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Actor => "actor",
            DocumentType::Item => "item",
            DocumentType::VttDocument => "vtt-document",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "actor" => Ok(DocumentType::Actor),
            "item" => Ok(DocumentType::Item),
            "vtt-document" => Ok(DocumentType::VttDocument),
            other => Err(format!("unknown document type: {}", other)),
        }
    }
}

/// A converted document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    /// Stable key other records use in `_ref` markers
    pub source_key: String,
    pub document_type: DocumentType,
    pub plugin_document_type: String,
    pub plugin_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub campaign_id: Option<String>,
    pub plugin_data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compendium_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// A persisted collection of documents produced by one import
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Compendium {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub plugin_id: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Document count per plugin document type
    pub entries_by_type: BTreeMap<String, usize>,
    pub total_entries: usize,
    pub imported_by: String,
    pub imported_at: DateTime<Utc>,
}

/// Count documents per plugin document type
pub fn count_by_type<'a>(documents: impl IntoIterator<Item = &'a Document>) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for doc in documents {
        *counts.entry(doc.plugin_document_type.clone()).or_insert(0) += 1;
    }
    counts
}
