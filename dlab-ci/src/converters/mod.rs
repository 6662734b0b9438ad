//! Type converters
//!
//! A converter maps one raw source record into the canonical document
//! shape. Converters are pure: no I/O, no clock, no randomness. They
//! declare the archive paths that should fill the image and thumbnail
//! slots; the pipeline binds those once assets are uploaded.

pub mod dnd5e;
pub mod record;

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::archive::{singular, ManifestError};
use crate::models::{CompendiumManifest, DocumentType, ValidationResult};
use crate::utils::slugify;

/// Per-import facts a converter may need
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionContext {
    pub plugin_id: String,
    pub content_type: String,
    pub campaign_id: Option<String>,
    /// Normalized archive path of the asset directory
    pub asset_root: String,
}

/// A successfully converted record, not yet bound to ids or assets
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertedRecord {
    pub name: String,
    /// Source book abbreviation, used to disambiguate slugs
    pub source: Option<String>,
    pub document_type: DocumentType,
    pub plugin_document_type: String,
    pub plugin_data: Value,
    /// Archive path for the image slot
    pub image_path: Option<String>,
    /// Archive path for the thumbnail slot
    pub thumbnail_path: Option<String>,
    /// Validation outcome; only warnings when conversion succeeded
    pub validation: ValidationResult,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConversionError {
    #[error("{}", .0.error_summary())]
    Invalid(ValidationResult),
}

impl ConversionError {
    pub fn validation(&self) -> &ValidationResult {
        match self {
            ConversionError::Invalid(result) => result,
        }
    }
}

/// One content category of one plugin
pub trait Converter: Send + Sync {
    /// Content type this converter handles (e.g. `spells`)
    fn content_type(&self) -> &'static str;

    fn convert(&self, raw: &Value, context: &ConversionContext) -> Result<ConvertedRecord, ConversionError>;
}

/// `(pluginId, contentType)` → converter
#[derive(Clone, Default)]
pub struct ConverterRegistry {
    converters: HashMap<(String, String), Arc<dyn Converter>>,
}

impl std::fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<_> = self.converters.keys().collect();
        keys.sort();
        f.debug_struct("ConverterRegistry").field("converters", &keys).finish()
    }
}

impl ConverterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in game system
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        dnd5e::register(&mut registry);
        registry
    }

    pub fn register(&mut self, plugin_id: &str, converter: Arc<dyn Converter>) {
        let key = (plugin_id.to_string(), converter.content_type().to_string());
        if self.converters.insert(key, converter).is_some() {
            tracing::warn!(plugin_id, "Replaced previously registered converter");
        }
    }

    pub fn get(&self, plugin_id: &str, content_type: &str) -> Option<Arc<dyn Converter>> {
        self.converters
            .get(&(plugin_id.to_string(), content_type.to_string()))
            .cloned()
    }

    pub fn contains(&self, plugin_id: &str, content_type: &str) -> bool {
        self.get(plugin_id, content_type).is_some()
    }

    /// Look up the converter of every declared content type, in manifest order
    pub fn resolve(&self, manifest: &CompendiumManifest) -> Result<Vec<(String, Arc<dyn Converter>)>, ManifestError> {
        manifest
            .content_types
            .iter()
            .map(|content_type| {
                self.get(&manifest.plugin_id, content_type)
                    .map(|converter| (content_type.clone(), converter))
                    .ok_or_else(|| ManifestError::UnsupportedContentType {
                        plugin_id: manifest.plugin_id.clone(),
                        content_type: content_type.clone(),
                    })
            })
            .collect()
    }
}

/// Explicit source id of a raw record (`id` as string or number)
pub fn explicit_id(raw: &Value) -> Option<String> {
    match raw.get("id") {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

/// `{singular content type}:{slug(name)}`, e.g. `spell:fireball`
pub fn name_key(content_type: &str, name: &str) -> String {
    format!("{}:{}", singular(content_type), slugify(name))
}

/// Every key a record answers to; the first one is canonical
///
/// The plural `{contentType}:{slug}` form is accepted as an alias.
pub fn source_keys(content_type: &str, explicit: Option<&str>, name: Option<&str>) -> Vec<String> {
    let mut keys = Vec::with_capacity(3);
    if let Some(id) = explicit {
        keys.push(id.to_string());
    }
    if let Some(name) = name.filter(|n| !slugify(n).is_empty()) {
        keys.push(name_key(content_type, name));
        let plural = format!("{}:{}", content_type, slugify(name));
        if !keys.contains(&plural) {
            keys.push(plural);
        }
    }
    keys
}

/// `{"_ref": key}` marker
pub fn reference(key: impl Into<String>) -> Value {
    serde_json::json!({ "_ref": key.into() })
}
