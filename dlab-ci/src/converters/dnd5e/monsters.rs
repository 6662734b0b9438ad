use serde_json::{json, Map, Value};

use super::{source_fields, ABILITIES};
use crate::converters::record::{strip_tags, FieldReader};
use crate::converters::{ConversionContext, ConversionError, ConvertedRecord, Converter};
use crate::models::{DocumentType, ValidationCode};

const SIZES: [&str; 6] = ["tiny", "small", "medium", "large", "huge", "gargantuan"];

const CHALLENGE_RATINGS: [&str; 34] = [
    "0", "1/8", "1/4", "1/2", "1", "2", "3", "4", "5", "6", "7", "8", "9", "10", "11", "12", "13", "14", "15",
    "16", "17", "18", "19", "20", "21", "22", "23", "24", "25", "26", "27", "28", "29", "30",
];

/// monster → `actor` / `monster`
pub struct MonsterConverter;

impl Converter for MonsterConverter {
    fn content_type(&self) -> &'static str {
        "monsters"
    }

    fn convert(&self, raw: &Value, context: &ConversionContext) -> Result<ConvertedRecord, ConversionError> {
        let mut reader = FieldReader::new(raw);

        let name = reader.required_str("name");
        let (source, page) = source_fields(&mut reader);
        let size = size(&mut reader);
        let creature_type = creature_type(&mut reader);
        let armor_class = armor_class(&mut reader);
        let hit_points = hit_points(&mut reader);
        let mut ability_scores = Map::new();
        for ability in ABILITIES {
            if let Some(score) = reader.int_in_range(ability, 1, 30, true) {
                ability_scores.insert(ability.to_string(), json!(score));
            }
        }
        let challenge_rating = challenge_rating(&mut reader);
        let speed = speed(reader.get("speed"));
        let senses = reader.string_list("senses");
        let languages = reader.string_list("languages");
        let traits = named_blocks(reader.get("trait"));
        let actions = named_blocks(reader.get("action"));
        let reactions = named_blocks(reader.get("reaction"));
        let legendary = named_blocks(reader.get("legendary"));
        let token = reader.asset_path("token", context);
        let image_path = reader.asset_path("image", context).or_else(|| token.clone());

        let validation = reader.finish()?;
        let name = name.unwrap_or_default();

        Ok(ConvertedRecord {
            plugin_data: json!({
                "name": name,
                "source": source,
                "page": page,
                "size": size,
                "type": creature_type,
                "armorClass": armor_class,
                "hitPoints": hit_points,
                "abilities": ability_scores,
                "challengeRating": challenge_rating,
                "speed": speed,
                "senses": senses,
                "languages": languages,
                "traits": traits,
                "actions": actions,
                "reactions": reactions,
                "legendaryActions": legendary,
            }),
            name,
            source,
            document_type: DocumentType::Actor,
            plugin_document_type: "monster".to_string(),
            image_path,
            thumbnail_path: token,
            validation,
        })
    }
}

/// `"M"`, `["M"]`, or `"medium"`
fn size(reader: &mut FieldReader<'_>) -> Option<&'static str> {
    let value = match reader.get("size") {
        None => {
            if reader.is_object() {
                reader.error("size", "required field is missing", ValidationCode::Required);
            }
            return None;
        }
        Some(Value::String(s)) => s.as_str(),
        Some(Value::Array(items)) => match items.first().and_then(Value::as_str) {
            Some(s) => s,
            None => {
                reader.error("size", "must contain a size code", ValidationCode::InvalidType);
                return None;
            }
        },
        Some(_) => {
            reader.error("size", "must be a size", ValidationCode::InvalidType);
            return None;
        }
    };
    let expanded = match value.trim().to_ascii_uppercase().as_str() {
        "T" => "tiny",
        "S" => "small",
        "M" => "medium",
        "L" => "large",
        "H" => "huge",
        "G" => "gargantuan",
        _ => value,
    };
    reader.check_enum("size", expanded, &SIZES)
}

/// `"humanoid"` or `{"type": "humanoid", "tags": ["goblinoid"]}`
fn creature_type(reader: &mut FieldReader<'_>) -> Option<Value> {
    match reader.get("type") {
        None => {
            if reader.is_object() {
                reader.error("type", "required field is missing", ValidationCode::Required);
            }
            None
        }
        Some(Value::String(s)) => Some(json!({ "type": s, "tags": [] })),
        Some(Value::Object(o)) => match o.get("type") {
            Some(inner) => {
                let kind = inner
                    .as_str()
                    .map(str::to_string)
                    .or_else(|| inner.get("choose").map(|c| c.to_string()))
                    .unwrap_or_default();
                let tags: Vec<String> = o
                    .get("tags")
                    .and_then(Value::as_array)
                    .map(|tags| tags.iter().filter_map(Value::as_str).map(str::to_string).collect())
                    .unwrap_or_default();
                Some(json!({ "type": kind, "tags": tags }))
            }
            None => {
                reader.error("type.type", "required field is missing", ValidationCode::Required);
                None
            }
        },
        Some(_) => {
            reader.error("type", "must be a string or object", ValidationCode::InvalidType);
            None
        }
    }
}

/// `15`, `[15]`, or `[{"ac": 15, "from": ["natural armor"]}]`
fn armor_class(reader: &mut FieldReader<'_>) -> Option<Value> {
    let first = match reader.get("ac") {
        Some(Value::Array(items)) => items.first(),
        other => other,
    };
    let (score, from) = match first {
        Some(Value::Object(o)) => (
            o.get("ac"),
            o.get("from")
                .and_then(Value::as_array)
                .map(|f| f.iter().filter_map(Value::as_str).map(strip_tags).collect::<Vec<_>>()),
        ),
        other => (other, None),
    };
    let score = reader.check_int("ac", score, 0, 30, true)?;
    Some(json!({ "value": score, "from": from.unwrap_or_default() }))
}

/// `7` or `{"average": 7, "formula": "2d6"}`
fn hit_points(reader: &mut FieldReader<'_>) -> Option<Value> {
    let raw = reader.get("hp");
    let (average, formula) = match raw {
        Some(Value::Object(o)) => (o.get("average"), o.get("formula").and_then(Value::as_str)),
        other => (other, None),
    };
    if let (None, Some(special)) = (average, raw.and_then(|r| r.get("special")).and_then(Value::as_str)) {
        return Some(json!({ "average": null, "formula": null, "special": special }));
    }
    let average = reader.check_int("hp", average, 1, 10_000, true)?;
    Some(json!({ "average": average, "formula": formula }))
}

/// `"1/4"`, `2`, or `{"cr": "1/4", "lair": "1"}`
fn challenge_rating(reader: &mut FieldReader<'_>) -> Option<&'static str> {
    let value = match reader.get("cr") {
        None => {
            if reader.is_object() {
                reader.error("cr", "required field is missing", ValidationCode::Required);
            }
            return None;
        }
        Some(Value::Object(o)) => o.get("cr").cloned(),
        Some(other) => Some(other.clone()),
    };
    let text = match value {
        Some(Value::String(s)) => s,
        Some(Value::Number(n)) => n.to_string(),
        _ => {
            reader.error("cr", "must be a challenge rating", ValidationCode::InvalidType);
            return None;
        }
    };
    reader.check_enum("cr", &text, &CHALLENGE_RATINGS)
}

/// Speeds in feet; `{"number": 30, "condition": "(hover)"}` keeps the number
fn speed(value: Option<&Value>) -> Value {
    let mut speeds = Map::new();
    match value {
        Some(Value::Object(o)) => {
            for (mode, speed) in o {
                let feet = match speed {
                    Value::Number(n) => n.as_i64(),
                    Value::Object(s) => s.get("number").and_then(Value::as_i64),
                    _ => None,
                };
                if let Some(feet) = feet {
                    speeds.insert(mode.clone(), json!(feet));
                }
            }
        }
        Some(Value::Number(n)) => {
            speeds.insert("walk".to_string(), Value::Number(n.clone()));
        }
        _ => {}
    }
    if speeds.is_empty() {
        speeds.insert("walk".to_string(), json!(30));
    }
    Value::Object(speeds)
}

/// `[{"name": "Scimitar", "entries": [...]}]` → `[{"name", "description"}]`
fn named_blocks(value: Option<&Value>) -> Vec<Value> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let name = item.get("name").and_then(Value::as_str)?;
            let reader = FieldReader::new(item);
            Some(json!({
                "name": strip_tags(name),
                "description": reader.text("entries").unwrap_or_default(),
            }))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converters::dnd5e::test_support::context;

    fn goblin() -> Value {
        json!({
            "name": "Goblin Warrior",
            "source": "XMM",
            "size": ["S"],
            "type": {"type": "fey", "tags": ["goblinoid"]},
            "ac": [{"ac": 15, "from": ["{@item leather armor|xphb}", "{@item shield|xphb}"]}],
            "hp": {"average": 10, "formula": "3d6"},
            "speed": {"walk": 30},
            "str": 8, "dex": 15, "con": 10, "int": 10, "wis": 8, "cha": 8,
            "cr": "1/4",
            "senses": ["darkvision 60 ft."],
            "languages": ["Common", "Goblin"],
            "action": [{"name": "Scimitar", "entries": ["{@atkr m} {@hit 4}"]}],
            "token": "tokens/goblin-warrior.webp"
        })
    }

    #[test]
    fn test_converts_goblin() {
        let record = MonsterConverter.convert(&goblin(), &context("monsters")).unwrap();
        let data = &record.plugin_data;

        assert_eq!(record.document_type, DocumentType::Actor);
        assert_eq!(record.plugin_document_type, "monster");
        assert_eq!(data["size"], "small");
        assert_eq!(data["type"], json!({"type": "fey", "tags": ["goblinoid"]}));
        assert_eq!(data["armorClass"], json!({"value": 15, "from": ["leather armor", "shield"]}));
        assert_eq!(data["hitPoints"], json!({"average": 10, "formula": "3d6"}));
        assert_eq!(data["abilities"]["dex"], 15);
        assert_eq!(data["challengeRating"], "1/4");
        assert_eq!(data["senses"], json!(["darkvision 60 ft."]));
        assert_eq!(data["languages"], json!(["Common", "Goblin"]));
        assert_eq!(data["actions"][0]["name"], "Scimitar");
        assert_eq!(record.thumbnail_path.as_deref(), Some("assets/tokens/goblin-warrior.webp"));
        assert_eq!(record.image_path, record.thumbnail_path);
    }

    #[test]
    fn test_ability_out_of_range() {
        let mut raw = goblin();
        raw["str"] = json!(31);
        raw["cha"] = json!(0);
        let err = MonsterConverter.convert(&raw, &context("monsters")).unwrap_err();
        let paths: Vec<_> = err.validation().errors.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["str", "cha"]);
    }

    #[test]
    fn test_illegal_challenge_rating() {
        let mut raw = goblin();
        raw["cr"] = json!("1/3");
        let err = MonsterConverter.convert(&raw, &context("monsters")).unwrap_err();
        assert_eq!(err.validation().errors[0].code, ValidationCode::InvalidEnum);
    }

    #[test]
    fn test_plain_shapes() {
        let mut raw = goblin();
        raw["size"] = json!("Medium");
        raw["type"] = json!("humanoid");
        raw["ac"] = json!(12);
        raw["hp"] = json!(22);
        raw["cr"] = json!(2);
        raw.as_object_mut().unwrap().remove("speed");

        let record = MonsterConverter.convert(&raw, &context("monsters")).unwrap();
        let data = &record.plugin_data;
        assert_eq!(data["size"], "medium");
        assert_eq!(data["armorClass"]["value"], 12);
        assert_eq!(data["hitPoints"]["average"], 22);
        assert_eq!(data["challengeRating"], "2");
        assert_eq!(data["speed"], json!({"walk": 30}));
    }
}
