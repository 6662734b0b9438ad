use serde_json::{json, Value};

use super::names_of;
use crate::converters::record::{strip_tags, FieldReader};
use crate::converters::{name_key, reference, ConversionContext, ConversionError, ConvertedRecord, Converter};
use crate::models::{DocumentType, ValidationCode};

const SCHOOLS: [&str; 8] = [
    "abjuration",
    "conjuration",
    "divination",
    "enchantment",
    "evocation",
    "illusion",
    "necromancy",
    "transmutation",
];

/// spell → `vtt-document` / `spell`
pub struct SpellConverter;

impl Converter for SpellConverter {
    fn content_type(&self) -> &'static str {
        "spells"
    }

    fn convert(&self, raw: &Value, context: &ConversionContext) -> Result<ConvertedRecord, ConversionError> {
        let mut reader = FieldReader::new(raw);

        let name = reader.required_str("name");
        let (source, page) = super::source_fields(&mut reader);
        let level = reader.int_in_range("level", 0, 9, true);
        let school = school(&mut reader);
        let casting_time = casting_time(reader.get("time"));
        let range = range(reader.get("range"));
        let components = components(reader.get("components"));
        let (duration, timed_concentration) = duration(reader.get("duration"));
        let concentration = reader.optional_bool("concentration").unwrap_or(false) || timed_concentration;
        let ritual = reader.optional_bool("ritual").unwrap_or(false)
            || raw
                .pointer("/meta/ritual")
                .and_then(Value::as_bool)
                .unwrap_or(false);
        let classes = class_references(reader.get("classes"));
        let description = reader.text("entries");
        let higher_levels = reader.text("entriesHigherLevel");
        let image_path = reader.asset_path("image", context);

        if casting_time.is_none() && reader.is_object() {
            reader.warning("time", "casting time missing");
        }

        let validation = reader.finish()?;
        let name = name.unwrap_or_default();

        Ok(ConvertedRecord {
            plugin_data: json!({
                "name": name,
                "source": source,
                "page": page,
                "level": level,
                "school": school,
                "castingTime": casting_time,
                "range": range,
                "components": components,
                "duration": duration,
                "concentration": concentration,
                "ritual": ritual,
                "classes": classes,
                "description": description,
                "higherLevels": higher_levels,
            }),
            name,
            source,
            document_type: DocumentType::VttDocument,
            plugin_document_type: "spell".to_string(),
            image_path,
            thumbnail_path: None,
            validation,
        })
    }
}

/// Full school name or 5e-tools single-letter code
fn school(reader: &mut FieldReader<'_>) -> Option<&'static str> {
    let raw = reader.get("school");
    let value = match raw {
        None => {
            if reader.is_object() {
                reader.error("school", "required field is missing", ValidationCode::Required);
            }
            return None;
        }
        Some(Value::String(s)) => s.trim(),
        Some(_) => {
            reader.error("school", "must be a string", ValidationCode::InvalidType);
            return None;
        }
    };
    let expanded = match value.to_ascii_uppercase().as_str() {
        "A" => "abjuration",
        "C" => "conjuration",
        "D" => "divination",
        "E" => "enchantment",
        "V" => "evocation",
        "I" => "illusion",
        "N" => "necromancy",
        "T" => "transmutation",
        _ => value,
    };
    reader.check_enum("school", expanded, &SCHOOLS)
}

fn casting_time(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(strip_tags(s)),
        Value::Array(times) => {
            let parts: Vec<String> = times
                .iter()
                .filter_map(|t| {
                    let number = t.get("number").and_then(Value::as_i64)?;
                    let unit = t.get("unit").and_then(Value::as_str)?;
                    let unit = if unit == "bonus" { "bonus action" } else { unit };
                    Some(format!("{} {}", number, unit))
                })
                .collect();
            (!parts.is_empty()).then(|| parts.join(" or "))
        }
        _ => None,
    }
}

fn range(value: Option<&Value>) -> Option<String> {
    let value = value?;
    if let Some(s) = value.as_str() {
        return Some(strip_tags(s));
    }
    let distance = value.get("distance");
    let kind = distance.and_then(|d| d.get("type")).and_then(Value::as_str)?;
    match distance.and_then(|d| d.get("amount")).and_then(Value::as_i64) {
        Some(amount) => Some(format!("{} {}", amount, kind)),
        None => Some(kind.to_string()),
    }
}

fn components(value: Option<&Value>) -> Value {
    let flag = |key: &str| value.and_then(|c| c.get(key)).and_then(Value::as_bool).unwrap_or(false);
    let material = value.and_then(|c| c.get("m")).and_then(|m| match m {
        Value::String(s) => Some(strip_tags(s)),
        Value::Object(o) => o.get("text").and_then(Value::as_str).map(strip_tags),
        Value::Bool(true) => Some(String::new()),
        _ => None,
    });
    json!({
        "verbal": flag("v"),
        "somatic": flag("s"),
        "material": material,
    })
}

/// Returns the readable duration and whether any entry requires concentration
fn duration(value: Option<&Value>) -> (Option<String>, bool) {
    let Some(value) = value else {
        return (None, false);
    };
    if let Some(s) = value.as_str() {
        return (Some(strip_tags(s)), false);
    }
    let Some(entries) = value.as_array() else {
        return (None, false);
    };

    let mut concentration = false;
    let parts: Vec<String> = entries
        .iter()
        .filter_map(|entry| {
            concentration |= entry.get("concentration").and_then(Value::as_bool).unwrap_or(false);
            match entry.get("type").and_then(Value::as_str)? {
                "instant" => Some("Instantaneous".to_string()),
                "permanent" => Some("Until dispelled".to_string()),
                "special" => Some("Special".to_string()),
                "timed" => {
                    let amount = entry.pointer("/duration/amount").and_then(Value::as_i64)?;
                    let unit = entry.pointer("/duration/type").and_then(Value::as_str)?;
                    let plural = if amount == 1 { "" } else { "s" };
                    Some(format!("{} {}{}", amount, unit, plural))
                }
                other => Some(other.to_string()),
            }
        })
        .collect();

    ((!parts.is_empty()).then(|| parts.join(" or ")), concentration)
}

/// Class lists become `_ref` markers to the class documents
///
/// Accepts `["Wizard"]`, existing `{"_ref": ...}` markers, and 5e-tools
/// `{"fromClassList": [{"name": "Wizard", "source": "XPHB"}]}`.
fn class_references(value: Option<&Value>) -> Vec<Value> {
    let list = match value {
        Some(Value::Object(o)) => o.get("fromClassList"),
        other => other,
    };
    let Some(Value::Array(items)) = list else {
        return Vec::new();
    };

    let mut refs = Vec::with_capacity(items.len());
    for item in items {
        if item.get("_ref").is_some() {
            refs.push(item.clone());
        } else {
            for name in names_of(Some(&Value::Array(vec![item.clone()]))) {
                refs.push(reference(name_key("classes", &name)));
            }
        }
    }
    refs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converters::dnd5e::test_support::context;

    fn fireball() -> Value {
        json!({
            "name": "Fireball",
            "source": "XPHB",
            "level": 3,
            "school": "V",
            "time": [{"number": 1, "unit": "action"}],
            "range": {"type": "point", "distance": {"type": "feet", "amount": 150}},
            "components": {"v": true, "s": true, "m": "a ball of bat guano and sulfur"},
            "duration": [{"type": "instant"}],
            "classes": {"fromClassList": [{"name": "Wizard", "source": "XPHB"}, {"name": "Sorcerer", "source": "XPHB"}]},
            "entries": ["A bright streak flashes from your pointing finger."]
        })
    }

    #[test]
    fn test_converts_5etools_spell() {
        let record = SpellConverter.convert(&fireball(), &context("spells")).unwrap();
        let data = &record.plugin_data;

        assert_eq!(record.plugin_document_type, "spell");
        assert_eq!(data["level"], 3);
        assert_eq!(data["school"], "evocation");
        assert_eq!(data["castingTime"], "1 action");
        assert_eq!(data["range"], "150 feet");
        assert_eq!(data["components"]["material"], "a ball of bat guano and sulfur");
        assert_eq!(data["duration"], "Instantaneous");
        assert_eq!(
            data["classes"],
            json!([{"_ref": "class:wizard"}, {"_ref": "class:sorcerer"}])
        );
    }

    #[test]
    fn test_concentration_from_duration() {
        let mut raw = fireball();
        raw["duration"] = json!([{"type": "timed", "duration": {"type": "minute", "amount": 10}, "concentration": true}]);
        let record = SpellConverter.convert(&raw, &context("spells")).unwrap();
        assert_eq!(record.plugin_data["duration"], "10 minutes");
        assert_eq!(record.plugin_data["concentration"], true);
    }

    #[test]
    fn test_level_out_of_range_and_bad_school() {
        let mut raw = fireball();
        raw["level"] = json!(10);
        raw["school"] = json!("chronomancy");
        let err = SpellConverter.convert(&raw, &context("spells")).unwrap_err();
        let codes: Vec<_> = err.validation().errors.iter().map(|e| e.code).collect();
        assert_eq!(codes, vec![ValidationCode::OutOfRange, ValidationCode::InvalidEnum]);
    }

    #[test]
    fn test_existing_markers_pass_through() {
        let mut raw = fireball();
        raw["classes"] = json!([{"_ref": "B"}, "Cleric"]);
        let record = SpellConverter.convert(&raw, &context("spells")).unwrap();
        assert_eq!(record.plugin_data["classes"], json!([{"_ref": "B"}, {"_ref": "class:cleric"}]));
    }

    #[test]
    fn test_cantrip_with_ritual_meta() {
        let mut raw = fireball();
        raw["level"] = json!(0);
        raw["meta"] = json!({"ritual": true});
        let record = SpellConverter.convert(&raw, &context("spells")).unwrap();
        assert_eq!(record.plugin_data["level"], 0);
        assert_eq!(record.plugin_data["ritual"], true);
    }
}
