//! Reference resolver
//!
//! After every record of a compendium is converted, `{"_ref": "<key>"}`
//! markers in plugin data are rewritten to the canonical id of the
//! document registered under that key. One pass; references to other
//! compendiums are not followed.

use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

use crate::models::{Document, ImportIssue, IssueCode};

/// Minimum Jaro-Winkler similarity for a "did you mean" hint
const SUGGESTION_THRESHOLD: f64 = 0.8;

pub const REF_KEY: &str = "_ref";

#[derive(Debug, Default)]
pub struct ReferenceResolver {
    /// key → (document id, document name)
    keys: BTreeMap<String, (Uuid, String)>,
    /// Keys of records the source filter dropped
    excluded: BTreeSet<String>,
}

#[derive(Debug, Default, PartialEq)]
pub struct ResolutionReport {
    pub resolved: usize,
    pub unresolved: usize,
    pub issues: Vec<ImportIssue>,
}

impl ReferenceResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a document under its keys; the first document to claim a key keeps it
    ///
    /// Returns a warning when any key was already taken.
    pub fn register(&mut self, keys: &[String], id: Uuid, name: &str) -> Option<ImportIssue> {
        let mut taken = Vec::new();
        for key in keys {
            match self.keys.get(key) {
                Some((existing, existing_name)) if *existing != id => {
                    taken.push(format!("'{}' (kept {})", key, existing_name));
                }
                Some(_) => {}
                None => {
                    self.keys.insert(key.clone(), (id, name.to_string()));
                }
            }
        }
        if taken.is_empty() {
            return None;
        }
        Some(ImportIssue::warning(
            IssueCode::DuplicateSourceKey,
            Some(name.to_string()),
            format!("duplicate source key {}", taken.join(", ")),
        ))
    }

    /// Remember keys of a filtered-out record so misses can say why
    pub fn exclude(&mut self, keys: impl IntoIterator<Item = String>) {
        self.excluded.extend(keys);
    }

    pub fn lookup(&self, key: &str) -> Option<Uuid> {
        self.keys.get(key).map(|(id, _)| *id)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Rewrite markers in every document
    pub fn resolve_all(&self, documents: &mut [Document]) -> ResolutionReport {
        let mut report = ResolutionReport::default();
        for document in documents.iter_mut() {
            let mut misses = Vec::new();
            report.resolved += self.resolve_value(&mut document.plugin_data, "$", &mut misses);
            for (path, key) in misses {
                report.unresolved += 1;
                report.issues.push(self.unresolved_issue(&document.name, &path, &key));
            }
        }
        tracing::debug!(
            resolved = report.resolved,
            unresolved = report.unresolved,
            "Reference resolution finished"
        );
        report
    }

    fn resolve_value(&self, value: &mut Value, path: &str, misses: &mut Vec<(String, String)>) -> usize {
        if let Some(key) = marker_key(value) {
            return match self.lookup(&key) {
                Some(id) => {
                    *value = Value::String(id.to_string());
                    1
                }
                None => {
                    misses.push((path.to_string(), key));
                    0
                }
            };
        }

        match value {
            Value::Array(items) => items
                .iter_mut()
                .enumerate()
                .map(|(index, item)| self.resolve_value(item, &format!("{}[{}]", path, index), misses))
                .sum(),
            Value::Object(object) => object
                .iter_mut()
                .map(|(field, item)| self.resolve_value(item, &format!("{}.{}", path, field), misses))
                .sum(),
            _ => 0,
        }
    }

    fn unresolved_issue(&self, document: &str, path: &str, key: &str) -> ImportIssue {
        let mut message = format!("unresolved reference '{}' at {}", key, path);
        if self.excluded.contains(key) {
            message.push_str(" (target excluded by source filter)");
        } else if let Some(suggestion) = self.suggest(key) {
            message.push_str(&format!("; did you mean '{}'?", suggestion));
        }
        ImportIssue::warning(IssueCode::ReferenceResolutionWarning, Some(document.to_string()), message)
    }

    /// Closest registered key, if any is close enough
    fn suggest(&self, key: &str) -> Option<&str> {
        let mut best: Option<(&str, f64)> = None;
        for candidate in self.keys.keys() {
            let score = strsim::jaro_winkler(key, candidate);
            if score >= SUGGESTION_THRESHOLD && best.map_or(true, |(_, s)| score > s) {
                best = Some((candidate.as_str(), score));
            }
        }
        best.map(|(candidate, _)| candidate)
    }
}

/// `{"_ref": "key"}` with no other fields
fn marker_key(value: &Value) -> Option<String> {
    let object = value.as_object()?;
    if object.len() != 1 {
        return None;
    }
    object.get(REF_KEY)?.as_str().map(str::to_string)
}
