//! Manifest reader
//!
//! Parses `manifest.json` at the archive root and validates it against the
//! converter registry. Unknown keys are ignored.

use serde_json::{Map, Value};
use thiserror::Error;

use super::{normalize_path, CompendiumArchive};
use crate::converters::ConverterRegistry;
use crate::models::{CompendiumManifest, DEFAULT_ASSET_DIRECTORY, DEFAULT_CONTENT_DIRECTORY};

pub const MANIFEST_FILE: &str = "manifest.json";

/// Unrecoverable manifest problems
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ManifestError {
    #[error("manifest.json not found at archive root")]
    Missing,

    #[error("manifest.json is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("manifest.json must be a JSON object")]
    NotAnObject,

    #[error("manifest field '{0}' is required")]
    MissingField(&'static str),

    #[error("manifest field '{field}' {message}")]
    InvalidField { field: &'static str, message: String },

    #[error("manifest contentTypes must not be empty")]
    EmptyContentTypes,

    #[error("manifest field '{field}' escapes the archive root: {value}")]
    EscapesRoot { field: &'static str, value: String },

    #[error("no converter registered for content type '{content_type}' of plugin '{plugin_id}'")]
    UnsupportedContentType { plugin_id: String, content_type: String },
}

/// Manifest plus the archive paths its directory settings resolve to
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedManifest {
    pub manifest: CompendiumManifest,
    /// Normalized asset directory; empty string means archive root
    pub asset_root: String,
    /// Normalized content directory; empty string means archive root
    pub content_root: String,
}

/// Read and validate the archive manifest
pub fn read_manifest(
    archive: &CompendiumArchive,
    registry: &ConverterRegistry,
) -> Result<ResolvedManifest, ManifestError> {
    let bytes = archive.read(MANIFEST_FILE).ok_or(ManifestError::Missing)?;
    let value: Value =
        serde_json::from_slice(&bytes).map_err(|e| ManifestError::InvalidJson(e.to_string()))?;
    let resolved = parse_manifest(&value)?;

    for content_type in &resolved.manifest.content_types {
        if !registry.contains(&resolved.manifest.plugin_id, content_type) {
            return Err(ManifestError::UnsupportedContentType {
                plugin_id: resolved.manifest.plugin_id.clone(),
                content_type: content_type.clone(),
            });
        }
    }

    tracing::debug!(
        name = %resolved.manifest.name,
        plugin_id = %resolved.manifest.plugin_id,
        content_types = ?resolved.manifest.content_types,
        "Manifest validated"
    );
    Ok(resolved)
}

/// Shape validation, independent of the registry
pub fn parse_manifest(value: &Value) -> Result<ResolvedManifest, ManifestError> {
    let object = value.as_object().ok_or(ManifestError::NotAnObject)?;

    let name = required_string(object, "name")?;
    let version = required_string(object, "version")?;
    let plugin_id = required_string(object, "pluginId")?;
    let description = optional_string(object, "description")?;
    let content_types = content_types(object)?;

    let asset_directory =
        optional_string(object, "assetDirectory")?.unwrap_or_else(|| DEFAULT_ASSET_DIRECTORY.to_string());
    let content_directory =
        optional_string(object, "contentDirectory")?.unwrap_or_else(|| DEFAULT_CONTENT_DIRECTORY.to_string());

    let asset_root = resolve_directory("assetDirectory", &asset_directory)?;
    let content_root = resolve_directory("contentDirectory", &content_directory)?;

    Ok(ResolvedManifest {
        manifest: CompendiumManifest {
            name,
            description,
            version,
            plugin_id,
            content_types,
            asset_directory,
            content_directory,
        },
        asset_root,
        content_root,
    })
}

fn required_string(object: &Map<String, Value>, field: &'static str) -> Result<String, ManifestError> {
    match object.get(field) {
        None | Some(Value::Null) => Err(ManifestError::MissingField(field)),
        Some(Value::String(s)) if s.trim().is_empty() => Err(ManifestError::MissingField(field)),
        Some(Value::String(s)) => Ok(s.trim().to_string()),
        Some(_) => Err(ManifestError::InvalidField {
            field,
            message: "must be a string".to_string(),
        }),
    }
}

fn optional_string(object: &Map<String, Value>, field: &'static str) -> Result<Option<String>, ManifestError> {
    match object.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.trim().to_string())),
        Some(_) => Err(ManifestError::InvalidField {
            field,
            message: "must be a string".to_string(),
        }),
    }
}

fn content_types(object: &Map<String, Value>) -> Result<Vec<String>, ManifestError> {
    let array = match object.get("contentTypes") {
        None | Some(Value::Null) => return Err(ManifestError::MissingField("contentTypes")),
        Some(Value::Array(array)) => array,
        Some(_) => {
            return Err(ManifestError::InvalidField {
                field: "contentTypes",
                message: "must be an array of strings".to_string(),
            })
        }
    };

    let mut types: Vec<String> = Vec::with_capacity(array.len());
    for entry in array {
        let content_type = entry
            .as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ManifestError::InvalidField {
                field: "contentTypes",
                message: "must contain only non-blank strings".to_string(),
            })?;
        if !types.iter().any(|t| t == content_type) {
            types.push(content_type.to_string());
        }
    }

    if types.is_empty() {
        return Err(ManifestError::EmptyContentTypes);
    }
    Ok(types)
}

fn resolve_directory(field: &'static str, value: &str) -> Result<String, ManifestError> {
    normalize_path(value).map_err(|_| ManifestError::EscapesRoot {
        field,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn archive_with_manifest(manifest: Value) -> CompendiumArchive {
        CompendiumArchive::from_entries(vec![(MANIFEST_FILE, serde_json::to_vec(&manifest).unwrap())]).unwrap()
    }

    fn valid_manifest() -> Value {
        json!({
            "name": "Player's Handbook",
            "version": "1.0.0",
            "pluginId": "dnd-5e-2024",
            "contentTypes": ["backgrounds", "spells"],
            "extraKey": {"ignored": true}
        })
    }

    #[test]
    fn test_valid_manifest_applies_defaults() {
        let archive = archive_with_manifest(valid_manifest());
        let resolved = read_manifest(&archive, &ConverterRegistry::with_builtin()).unwrap();

        assert_eq!(resolved.manifest.name, "Player's Handbook");
        assert_eq!(resolved.manifest.asset_directory, "assets");
        assert_eq!(resolved.content_root, "content");
        assert_eq!(resolved.manifest.content_types, vec!["backgrounds", "spells"]);
    }

    #[test]
    fn test_missing_manifest() {
        let archive = CompendiumArchive::from_entries(vec![("content/spells.json", b"[]".to_vec())]).unwrap();
        let err = read_manifest(&archive, &ConverterRegistry::with_builtin()).unwrap_err();
        assert_eq!(err, ManifestError::Missing);
    }

    #[test]
    fn test_blank_required_field() {
        let mut manifest = valid_manifest();
        manifest["name"] = json!("   ");
        let err = parse_manifest(&manifest).unwrap_err();
        assert_eq!(err, ManifestError::MissingField("name"));
    }

    #[test]
    fn test_empty_content_types() {
        let mut manifest = valid_manifest();
        manifest["contentTypes"] = json!([]);
        assert_eq!(parse_manifest(&manifest).unwrap_err(), ManifestError::EmptyContentTypes);
    }

    #[test]
    fn test_directory_escaping_root() {
        let mut manifest = valid_manifest();
        manifest["assetDirectory"] = json!("../outside");
        assert!(matches!(
            parse_manifest(&manifest).unwrap_err(),
            ManifestError::EscapesRoot { field: "assetDirectory", .. }
        ));
    }

    #[test]
    fn test_unknown_content_type_is_rejected() {
        let mut manifest = valid_manifest();
        manifest["contentTypes"] = json!(["backgrounds", "vehicles"]);
        let archive = archive_with_manifest(manifest);

        let err = read_manifest(&archive, &ConverterRegistry::with_builtin()).unwrap_err();
        assert_eq!(
            err,
            ManifestError::UnsupportedContentType {
                plugin_id: "dnd-5e-2024".to_string(),
                content_type: "vehicles".to_string(),
            }
        );
    }

    #[test]
    fn test_unknown_plugin_is_rejected() {
        let mut manifest = valid_manifest();
        manifest["pluginId"] = json!("pathfinder-2e");
        let archive = archive_with_manifest(manifest);
        assert!(matches!(
            read_manifest(&archive, &ConverterRegistry::with_builtin()),
            Err(ManifestError::UnsupportedContentType { .. })
        ));
    }
}
