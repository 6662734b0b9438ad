//! Field access for converters
//!
//! [`FieldReader`] wraps a raw record and collects every validation
//! problem it meets, so a converter reports all bad fields at once
//! instead of stopping at the first.

use serde_json::{Map, Value};

use super::{ConversionContext, ConversionError};
use crate::archive::{join_path, normalize_path};
use crate::models::{ValidationCode, ValidationResult};

pub struct FieldReader<'a> {
    object: Option<&'a Map<String, Value>>,
    result: ValidationResult,
}

impl<'a> FieldReader<'a> {
    pub fn new(raw: &'a Value) -> Self {
        let mut result = ValidationResult::new();
        let object = raw.as_object();
        if object.is_none() {
            result.error("$", "record must be a JSON object", ValidationCode::InvalidType);
        }
        Self { object, result }
    }

    pub fn get(&self, field: &str) -> Option<&'a Value> {
        self.object
            .and_then(|o| o.get(field))
            .filter(|v| !v.is_null())
    }

    pub fn error(&mut self, path: &str, message: impl Into<String>, code: ValidationCode) {
        self.result.error(path, message, code);
    }

    pub fn warning(&mut self, path: &str, message: impl Into<String>) {
        self.result.warning(path, message);
    }

    /// Finish reading: `Err` when any error was recorded
    pub fn finish(self) -> Result<ValidationResult, ConversionError> {
        if self.result.success {
            Ok(self.result)
        } else {
            Err(ConversionError::Invalid(self.result))
        }
    }

    pub fn required_str(&mut self, field: &str) -> Option<String> {
        match self.get(field) {
            None => {
                if self.object.is_some() {
                    self.error(field, "required field is missing", ValidationCode::Required);
                }
                None
            }
            Some(Value::String(s)) if s.trim().is_empty() => {
                self.error(field, "must not be blank", ValidationCode::Required);
                None
            }
            Some(Value::String(s)) => Some(s.trim().to_string()),
            Some(_) => {
                self.error(field, "must be a string", ValidationCode::InvalidType);
                None
            }
        }
    }

    pub fn optional_str(&mut self, field: &str) -> Option<String> {
        match self.get(field) {
            None => None,
            Some(Value::String(s)) if s.trim().is_empty() => None,
            Some(Value::String(s)) => Some(s.trim().to_string()),
            Some(_) => {
                self.error(field, "must be a string", ValidationCode::InvalidType);
                None
            }
        }
    }

    pub fn optional_bool(&mut self, field: &str) -> Option<bool> {
        match self.get(field) {
            None => None,
            Some(Value::Bool(b)) => Some(*b),
            Some(_) => {
                self.error(field, "must be a boolean", ValidationCode::InvalidType);
                None
            }
        }
    }

    /// Integer in `[min, max]`; a missing field is an error when `required`
    pub fn int_in_range(&mut self, field: &str, min: i64, max: i64, required: bool) -> Option<i64> {
        let value = self.get(field);
        self.check_int(field, value, min, max, required)
    }

    /// Range check for an integer value found somewhere other than a top-level field
    pub fn check_int(&mut self, path: &str, value: Option<&Value>, min: i64, max: i64, required: bool) -> Option<i64> {
        match value {
            None => {
                if required && self.object.is_some() {
                    self.error(path, "required field is missing", ValidationCode::Required);
                }
                None
            }
            Some(v) => match v.as_i64() {
                Some(n) if (min..=max).contains(&n) => Some(n),
                Some(n) => {
                    self.error(
                        path,
                        format!("{} is out of range ({}-{})", n, min, max),
                        ValidationCode::OutOfRange,
                    );
                    None
                }
                None => {
                    self.error(path, "must be an integer", ValidationCode::InvalidType);
                    None
                }
            },
        }
    }

    /// Number in `[min, max]`
    pub fn number_in_range(&mut self, field: &str, min: f64, max: f64) -> Option<f64> {
        match self.get(field) {
            None => None,
            Some(v) => match v.as_f64() {
                Some(n) if n >= min && n <= max => Some(n),
                Some(n) => {
                    self.error(
                        field,
                        format!("{} is out of range ({}-{})", n, min, max),
                        ValidationCode::OutOfRange,
                    );
                    None
                }
                None => {
                    self.error(field, "must be a number", ValidationCode::InvalidType);
                    None
                }
            },
        }
    }

    /// Match `value` case-insensitively against `allowed`, returning the canonical spelling
    pub fn check_enum(&mut self, path: &str, value: &str, allowed: &[&'static str]) -> Option<&'static str> {
        let found = allowed.iter().find(|a| a.eq_ignore_ascii_case(value.trim())).copied();
        if found.is_none() {
            self.error(
                path,
                format!("'{}' is not one of: {}", value, allowed.join(", ")),
                ValidationCode::InvalidEnum,
            );
        }
        found
    }

    /// List of strings; a single string is accepted as a one-element list
    pub fn string_list(&mut self, field: &str) -> Vec<String> {
        match self.get(field) {
            None => Vec::new(),
            Some(Value::String(s)) => vec![strip_tags(s)],
            Some(Value::Array(items)) => {
                let mut out = Vec::with_capacity(items.len());
                for (index, item) in items.iter().enumerate() {
                    match item {
                        Value::String(s) => out.push(strip_tags(s)),
                        _ => self.warning(&format!("{}[{}]", field, index), "ignored non-string entry"),
                    }
                }
                out
            }
            Some(_) => {
                self.error(field, "must be a list of strings", ValidationCode::InvalidType);
                Vec::new()
            }
        }
    }

    /// 5e-tools choice blocks: `[{"insight": true, "choose": {...}}]` → `["insight", ...]`
    pub fn flag_keys(&mut self, field: &str) -> Vec<String> {
        let mut out = Vec::new();
        match self.get(field) {
            None => {}
            Some(Value::Array(blocks)) => {
                for block in blocks {
                    match block {
                        Value::String(s) => out.push(strip_tags(s)),
                        Value::Object(flags) => {
                            for (key, value) in flags {
                                match value {
                                    Value::Bool(true) => out.push(strip_tags(key)),
                                    Value::Number(n) => out.push(format!("{} ({})", strip_tags(key), n)),
                                    _ => {}
                                }
                            }
                        }
                        _ => {}
                    }
                }
            }
            Some(_) => self.warning(field, "expected a list; ignored"),
        }
        out
    }

    /// Flattened prose of a 5e-tools `entries` tree
    pub fn text(&self, field: &str) -> Option<String> {
        let mut lines = Vec::new();
        if let Some(value) = self.get(field) {
            flatten_entries(value, &mut lines);
        }
        if lines.is_empty() {
            None
        } else {
            Some(lines.join("\n\n"))
        }
    }

    /// Archive path of an asset field, resolved against the asset directory
    pub fn asset_path(&mut self, field: &str, context: &ConversionContext) -> Option<String> {
        let raw = match self.get(field) {
            None => return None,
            Some(Value::String(s)) if s.trim().is_empty() => return None,
            Some(Value::String(s)) => s.trim(),
            Some(Value::Object(o)) => match o.get("path").and_then(Value::as_str) {
                Some(path) => path.trim(),
                None => {
                    self.warning(field, "asset object has no 'path'; ignored");
                    return None;
                }
            },
            Some(_) => {
                self.warning(field, "asset reference must be a path string; ignored");
                return None;
            }
        };
        if raw.starts_with("http://") || raw.starts_with("https://") {
            self.warning(field, "remote asset URLs are not imported");
            return None;
        }
        resolve_asset_path(raw, &context.asset_root).or_else(|| {
            self.warning(field, format!("asset path '{}' escapes the archive", raw));
            None
        })
    }

    pub fn is_object(&self) -> bool {
        self.object.is_some()
    }
}

/// Archive path for an asset reference: archive-relative when it already
/// lies in the asset directory, otherwise relative to it
pub fn resolve_asset_path(path: &str, asset_root: &str) -> Option<String> {
    let normalized = normalize_path(path).ok()?;
    if normalized.is_empty() {
        return None;
    }
    if asset_root.is_empty() || normalized.starts_with(&format!("{}/", asset_root)) {
        Some(normalized)
    } else {
        Some(join_path(asset_root, &normalized))
    }
}

fn flatten_entries(value: &Value, lines: &mut Vec<String>) {
    match value {
        Value::String(s) => {
            let text = strip_tags(s);
            if !text.is_empty() {
                lines.push(text);
            }
        }
        Value::Array(items) => {
            for item in items {
                flatten_entries(item, lines);
            }
        }
        Value::Object(object) => {
            if let Some(name) = object.get("name").and_then(Value::as_str) {
                lines.push(strip_tags(name));
            }
            for key in ["entries", "items", "entry"] {
                if let Some(nested) = object.get(key) {
                    flatten_entries(nested, lines);
                }
            }
        }
        _ => {}
    }
}

/// Replace 5e-tools inline tags with their display text
///
/// `{@spell fireball|xphb}` → `fireball`, `{@item longsword|phb|a sword}` → `a sword`
pub fn strip_tags(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find("{@") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };
        let inner = &after[..end];
        let body = inner.split_once(' ').map(|(_, body)| body).unwrap_or("");
        let parts: Vec<&str> = body.split('|').collect();
        let display = if parts.len() >= 3 && !parts[2].is_empty() {
            parts[2]
        } else {
            parts[0]
        };
        out.push_str(display);
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context() -> ConversionContext {
        ConversionContext {
            plugin_id: "dnd-5e-2024".to_string(),
            content_type: "items".to_string(),
            campaign_id: None,
            asset_root: "assets".to_string(),
        }
    }

    #[test]
    fn test_strip_tags() {
        assert_eq!(strip_tags("Cast {@spell fireball|xphb} now"), "Cast fireball now");
        assert_eq!(strip_tags("{@item longsword|phb|a fine sword}"), "a fine sword");
        assert_eq!(strip_tags("{@b bold}"), "bold");
        assert_eq!(strip_tags("plain"), "plain");
        assert_eq!(strip_tags("broken {@tag"), "broken {@tag");
    }

    #[test]
    fn test_reader_collects_all_errors() {
        let raw = json!({"name": 5, "level": 12});
        let mut reader = FieldReader::new(&raw);
        reader.required_str("name");
        reader.int_in_range("level", 0, 9, true);
        reader.required_str("school");

        let err = reader.finish().unwrap_err();
        let codes: Vec<_> = err.validation().errors.iter().map(|e| e.code).collect();
        assert_eq!(
            codes,
            vec![ValidationCode::InvalidType, ValidationCode::OutOfRange, ValidationCode::Required]
        );
    }

    #[test]
    fn test_non_object_record() {
        let raw = json!("just a string");
        let mut reader = FieldReader::new(&raw);
        assert!(reader.required_str("name").is_none());
        let err = reader.finish().unwrap_err();
        assert_eq!(err.validation().errors.len(), 1);
        assert_eq!(err.validation().errors[0].path, "$");
    }

    #[test]
    fn test_flatten_entries() {
        let raw = json!({"entries": [
            "You have spent your life in service.",
            {"type": "list", "items": ["{@skill Insight}", "Religion"]},
            {"type": "entries", "name": "Feature", "entries": ["Shelter of the Faithful"]}
        ]});
        let reader = FieldReader::new(&raw);
        assert_eq!(
            reader.text("entries").unwrap(),
            "You have spent your life in service.\n\nInsight\n\nReligion\n\nFeature\n\nShelter of the Faithful"
        );
    }

    #[test]
    fn test_asset_path_resolution() {
        let raw = json!({
            "a": "assets/items/sword.png",
            "b": "items/sword.png",
            "c": "../../etc/passwd",
            "d": "https://example.com/x.png",
            "e": {"path": "./items/shield.png"}
        });
        let mut reader = FieldReader::new(&raw);
        let ctx = context();
        assert_eq!(reader.asset_path("a", &ctx).as_deref(), Some("assets/items/sword.png"));
        assert_eq!(reader.asset_path("b", &ctx).as_deref(), Some("assets/items/sword.png"));
        assert_eq!(reader.asset_path("c", &ctx), None);
        assert_eq!(reader.asset_path("d", &ctx), None);
        assert_eq!(reader.asset_path("e", &ctx).as_deref(), Some("assets/items/shield.png"));

        let result = reader.finish().unwrap();
        assert_eq!(result.warnings.len(), 2);
    }

    #[test]
    fn test_flag_keys() {
        let raw = json!({"skillProficiencies": [{"insight": true, "religion": true, "choose": {"from": []}}],
                         "languageProficiencies": [{"anyStandard": 2}]});
        let mut reader = FieldReader::new(&raw);
        assert_eq!(reader.flag_keys("skillProficiencies"), vec!["insight", "religion"]);
        assert_eq!(reader.flag_keys("languageProficiencies"), vec!["anyStandard (2)"]);
    }
}
