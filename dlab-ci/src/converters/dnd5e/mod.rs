//! D&D 5th Edition (2024) converters for 5e-tools style records

mod backgrounds;
mod classes;
mod items;
mod monsters;
mod spells;

pub use backgrounds::BackgroundConverter;
pub use classes::ClassConverter;
pub use items::ItemConverter;
pub use monsters::MonsterConverter;
pub use spells::SpellConverter;

use serde_json::Value;
use std::sync::Arc;

use super::record::FieldReader;
use super::ConverterRegistry;

pub const PLUGIN_ID: &str = "dnd-5e-2024";

pub const ABILITIES: [&str; 6] = ["str", "dex", "con", "int", "wis", "cha"];

pub fn register(registry: &mut ConverterRegistry) {
    registry.register(PLUGIN_ID, Arc::new(BackgroundConverter));
    registry.register(PLUGIN_ID, Arc::new(ClassConverter));
    registry.register(PLUGIN_ID, Arc::new(SpellConverter));
    registry.register(PLUGIN_ID, Arc::new(MonsterConverter));
    registry.register(PLUGIN_ID, Arc::new(ItemConverter));
}

/// Ability list from `["str", "con"]` or 5e-tools `[{"str": true}]`, validated
fn abilities(reader: &mut FieldReader<'_>, field: &str) -> Vec<&'static str> {
    let names = reader.flag_keys(field);
    let mut out = Vec::with_capacity(names.len());
    for (index, name) in names.iter().enumerate() {
        let short: String = name.chars().take(3).collect();
        if let Some(ability) = reader.check_enum(&format!("{}[{}]", field, index), &short, &ABILITIES) {
            if !out.contains(&ability) {
                out.push(ability);
            }
        }
    }
    out
}

/// Common header fields every 5e document carries
fn source_fields(reader: &mut FieldReader<'_>) -> (Option<String>, Option<i64>) {
    let source = reader.optional_str("source");
    let page = reader.int_in_range("page", 0, 10_000, false);
    (source, page)
}

/// Strip a 5e-tools `|source` suffix: `"M|XPHB"` → `"M"`
fn without_source(value: &str) -> &str {
    value.split('|').next().unwrap_or(value).trim()
}

fn names_of(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(without_source(s).to_string()),
                Value::Object(o) => o.get("name").and_then(Value::as_str).map(str::to_string),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_abilities_accept_both_shapes() {
        let raw = json!({"a": ["Strength", "con"], "b": [{"wis": true, "cha": true}], "c": ["luck"]});
        let mut reader = FieldReader::new(&raw);
        assert_eq!(abilities(&mut reader, "a"), vec!["str", "con"]);
        assert_eq!(abilities(&mut reader, "b"), vec!["cha", "wis"]);
        assert!(abilities(&mut reader, "c").is_empty());
        assert!(reader.finish().is_err());
    }

    #[test]
    fn test_without_source() {
        assert_eq!(without_source("M|XPHB"), "M");
        assert_eq!(without_source("Wizard"), "Wizard");
    }
}
