//! Content file loading
//!
//! Each content type lives either in `<contentRoot>/<type>.json` or in a
//! `<contentRoot>/<type>/` directory of `*.json` files. A file holds an
//! array of records, an object wrapping the array under the plural or
//! singular type name, or one bare record.

use serde_json::Value;
use thiserror::Error;

use super::{join_path, CompendiumArchive};

/// Per-file content problems; other files of the same type still load
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ContentError {
    #[error("no content found for '{content_type}' (expected {expected})")]
    NotFound { content_type: String, expected: String },

    #[error("{path}: invalid JSON: {message}")]
    InvalidJson { path: String, message: String },

    #[error("{path}: expected an array of records, an object keyed by '{content_type}', or a single record")]
    UnexpectedShape { path: String, content_type: String },
}

/// One raw record pulled from a content file
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRecord {
    /// `<file>#<index>`
    pub location: String,
    pub content_type: String,
    pub raw: Value,
}

impl SourceRecord {
    /// Record name for progress display, when it has one
    pub fn display_name(&self) -> Option<&str> {
        self.raw.get("name").and_then(Value::as_str)
    }
}

/// Records and file-level errors for one content type
#[derive(Debug, Default)]
pub struct ContentLoad {
    pub records: Vec<SourceRecord>,
    pub errors: Vec<ContentError>,
}

/// Singular form of a content type name: `classes` → `class`, `spells` → `spell`
pub fn singular(content_type: &str) -> String {
    if let Some(stem) = content_type.strip_suffix("ies") {
        return format!("{}y", stem);
    }
    for suffix in ["sses", "shes", "ches", "xes"] {
        if content_type.ends_with(suffix) {
            return content_type[..content_type.len() - 2].to_string();
        }
    }
    content_type
        .strip_suffix('s')
        .unwrap_or(content_type)
        .to_string()
}

/// Load every record of `content_type` from the archive
pub fn load_records(archive: &CompendiumArchive, content_root: &str, content_type: &str) -> ContentLoad {
    let file_path = join_path(content_root, &format!("{}.json", content_type));
    let dir_path = join_path(content_root, content_type);

    let mut files: Vec<String> = Vec::new();
    if archive.contains(&file_path) {
        files.push(file_path.clone());
    }
    files.extend(
        archive
            .files_under(&dir_path)
            .into_iter()
            .filter(|path| path.ends_with(".json"))
            .map(str::to_string),
    );

    let mut load = ContentLoad::default();
    if files.is_empty() {
        load.errors.push(ContentError::NotFound {
            content_type: content_type.to_string(),
            expected: format!("{} or {}/*.json", file_path, dir_path),
        });
        return load;
    }

    for path in files {
        let Some(bytes) = archive.read(&path) else {
            continue;
        };
        let value: Value = match serde_json::from_slice(&bytes) {
            Ok(value) => value,
            Err(e) => {
                load.errors.push(ContentError::InvalidJson {
                    path,
                    message: e.to_string(),
                });
                continue;
            }
        };

        match extract_records(value, content_type) {
            Some(records) => {
                load.records.extend(records.into_iter().enumerate().map(|(index, raw)| SourceRecord {
                    location: format!("{}#{}", path, index),
                    content_type: content_type.to_string(),
                    raw,
                }));
            }
            None => load.errors.push(ContentError::UnexpectedShape {
                path,
                content_type: content_type.to_string(),
            }),
        }
    }

    tracing::debug!(
        content_type,
        records = load.records.len(),
        file_errors = load.errors.len(),
        "Loaded content records"
    );
    load
}

fn extract_records(value: Value, content_type: &str) -> Option<Vec<Value>> {
    match value {
        Value::Array(records) => Some(records),
        Value::Object(mut object) => {
            let singular = singular(content_type);
            for key in [content_type, singular.as_str()] {
                if let Some(Value::Array(_)) = object.get(key) {
                    if let Some(Value::Array(records)) = object.remove(key) {
                        return Some(records);
                    }
                }
            }
            if object.contains_key("name") {
                Some(vec![Value::Object(object)])
            } else {
                None
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn archive(files: Vec<(&str, Value)>) -> CompendiumArchive {
        CompendiumArchive::from_entries(
            files
                .into_iter()
                .map(|(path, value)| (path, serde_json::to_vec(&value).unwrap())),
        )
        .unwrap()
    }

    #[test]
    fn test_singular() {
        assert_eq!(singular("classes"), "class");
        assert_eq!(singular("spells"), "spell");
        assert_eq!(singular("deities"), "deity");
        assert_eq!(singular("boxes"), "box");
        assert_eq!(singular("equipment"), "equipment");
    }

    #[test]
    fn test_plain_array_file() {
        let archive = archive(vec![(
            "content/backgrounds.json",
            json!([{"name": "Acolyte"}, {"name": "Sage"}]),
        )]);
        let load = load_records(&archive, "content", "backgrounds");

        assert!(load.errors.is_empty());
        assert_eq!(load.records.len(), 2);
        assert_eq!(load.records[1].location, "content/backgrounds.json#1");
        assert_eq!(load.records[1].display_name(), Some("Sage"));
    }

    #[test]
    fn test_wrapped_singular_key() {
        let archive = archive(vec![(
            "content/backgrounds.json",
            json!({"_meta": {}, "background": [{"name": "Acolyte"}]}),
        )]);
        let load = load_records(&archive, "content", "backgrounds");
        assert_eq!(load.records.len(), 1);
    }

    #[test]
    fn test_directory_of_files_with_one_bad_file() {
        let archive = CompendiumArchive::from_entries(vec![
            ("content/spells/a.json", serde_json::to_vec(&json!({"name": "Fireball"})).unwrap()),
            ("content/spells/b.json", b"{not json".to_vec()),
            ("content/spells/readme.txt", b"ignored".to_vec()),
        ])
        .unwrap();
        let load = load_records(&archive, "content", "spells");

        assert_eq!(load.records.len(), 1);
        assert_eq!(load.errors.len(), 1);
        assert!(matches!(load.errors[0], ContentError::InvalidJson { .. }));
    }

    #[test]
    fn test_missing_content() {
        let archive = archive(vec![("content/items.json", json!([]))]);
        let load = load_records(&archive, "content", "monsters");
        assert!(load.records.is_empty());
        assert!(matches!(load.errors[0], ContentError::NotFound { .. }));
    }

    #[test]
    fn test_unexpected_shape() {
        let archive = archive(vec![("content/items.json", json!({"weird": 1}))]);
        let load = load_records(&archive, "content", "items");
        assert!(matches!(load.errors[0], ContentError::UnexpectedShape { .. }));
    }
}
