use serde_json::{json, Value};

use super::{source_fields, without_source};
use crate::converters::record::{strip_tags, FieldReader};
use crate::converters::{ConversionContext, ConversionError, ConvertedRecord, Converter};
use crate::models::DocumentType;

const RARITIES: [&str; 9] = [
    "none",
    "common",
    "uncommon",
    "rare",
    "very rare",
    "legendary",
    "artifact",
    "varies",
    "unknown",
];

const ITEM_KINDS: [&str; 5] = ["weapon", "armor", "tool", "gear", "consumable"];

/// Heaviest item we accept, in pounds
const MAX_WEIGHT_LB: f64 = 10_000.0;
/// Most valuable item we accept, in copper pieces
const MAX_VALUE_CP: f64 = 100_000_000.0;

/// item → `item` / `weapon | armor | tool | gear | consumable`
pub struct ItemConverter;

impl Converter for ItemConverter {
    fn content_type(&self) -> &'static str {
        "items"
    }

    fn convert(&self, raw: &Value, context: &ConversionContext) -> Result<ConvertedRecord, ConversionError> {
        let mut reader = FieldReader::new(raw);

        let name = reader.required_str("name");
        let (source, page) = source_fields(&mut reader);
        let kind = item_kind(&mut reader);
        let rarity = reader
            .optional_str("rarity")
            .and_then(|rarity| reader.check_enum("rarity", &rarity, &RARITIES));
        let weight = reader.number_in_range("weight", 0.0, MAX_WEIGHT_LB);
        let value_cp = reader.number_in_range("value", 0.0, MAX_VALUE_CP);
        let attunement = match reader.get("reqAttune") {
            Some(Value::Bool(b)) => json!(b),
            Some(Value::String(s)) => json!(strip_tags(s)),
            _ => json!(false),
        };
        let description = reader.text("entries");
        let image_path = reader.asset_path("image", context);

        let weapon = (kind == "weapon").then(|| {
            json!({
                "damage": reader.get("dmg1").and_then(Value::as_str),
                "damageType": reader.get("dmgType").and_then(Value::as_str),
                "versatileDamage": reader.get("dmg2").and_then(Value::as_str),
                "properties": reader
                    .get("property")
                    .and_then(Value::as_array)
                    .map(|props| props.iter().filter_map(Value::as_str).map(without_source).collect::<Vec<_>>())
                    .unwrap_or_default(),
            })
        });
        let armor = (kind == "armor").then(|| {
            json!({
                "armorClass": reader.get("ac").and_then(Value::as_i64),
                "strength": reader.get("strength").and_then(Value::as_str),
                "stealthDisadvantage": reader.get("stealth").and_then(Value::as_bool).unwrap_or(false),
            })
        });

        let validation = reader.finish()?;
        let name = name.unwrap_or_default();

        Ok(ConvertedRecord {
            plugin_data: json!({
                "name": name,
                "source": source,
                "page": page,
                "itemType": kind,
                "rarity": rarity.unwrap_or("none"),
                "weight": weight,
                "valueCp": value_cp,
                "attunement": attunement,
                "description": description,
                "weapon": weapon,
                "armor": armor,
            }),
            name,
            source,
            document_type: DocumentType::Item,
            plugin_document_type: kind.to_string(),
            image_path,
            thumbnail_path: None,
            validation,
        })
    }
}

/// Item subtype from an explicit `itemType`, the 5e-tools `type` code, or weapon/armor flags
fn item_kind(reader: &mut FieldReader<'_>) -> &'static str {
    if let Some(explicit) = reader.optional_str("itemType") {
        return reader.check_enum("itemType", &explicit, &ITEM_KINDS).unwrap_or("gear");
    }

    if let Some(code) = reader.get("type").and_then(Value::as_str) {
        let kind = match without_source(code).to_ascii_uppercase().as_str() {
            "M" | "R" => "weapon",
            "LA" | "MA" | "HA" | "S" => "armor",
            "AT" | "T" | "INS" | "GS" => "tool",
            "P" | "SC" | "A" | "AF" | "FD" | "WD" | "RD" => "consumable",
            _ => "gear",
        };
        return kind;
    }

    if reader.get("weapon").and_then(Value::as_bool).unwrap_or(false) || reader.get("weaponCategory").is_some() {
        "weapon"
    } else if reader.get("armor").and_then(Value::as_bool).unwrap_or(false) {
        "armor"
    } else {
        "gear"
    }
}
