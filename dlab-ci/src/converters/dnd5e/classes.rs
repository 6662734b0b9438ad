use serde_json::{json, Value};

use super::{abilities, names_of, source_fields, ABILITIES};
use crate::converters::record::FieldReader;
use crate::converters::{ConversionContext, ConversionError, ConvertedRecord, Converter};
use crate::models::{DocumentType, ValidationCode};

const HIT_DICE: [&str; 4] = ["d6", "d8", "d10", "d12"];

/// class → `vtt-document` / `class`
pub struct ClassConverter;

impl Converter for ClassConverter {
    fn content_type(&self) -> &'static str {
        "classes"
    }

    fn convert(&self, raw: &Value, context: &ConversionContext) -> Result<ConvertedRecord, ConversionError> {
        let mut reader = FieldReader::new(raw);

        let name = reader.required_str("name");
        let (source, page) = source_fields(&mut reader);
        let hit_die = hit_die(&mut reader);
        let primary_abilities = abilities(&mut reader, "primaryAbility");
        let saving_throws = abilities(&mut reader, "proficiency");
        let spellcasting_ability = reader
            .optional_str("spellcastingAbility")
            .and_then(|ability| reader.check_enum("spellcastingAbility", &ability, &ABILITIES));
        let subclasses = names_of(reader.get("subclasses"));
        let description = reader.text("entries");
        let image_path = reader.asset_path("image", context);

        let starting = reader.get("startingProficiencies");
        let proficiencies = json!({
            "armor": list_at(starting, "armor"),
            "weapons": list_at(starting, "weapons"),
            "tools": list_at(starting, "tools"),
            "skills": starting.and_then(|s| s.get("skills")).cloned(),
        });

        let validation = reader.finish()?;
        let name = name.unwrap_or_default();

        Ok(ConvertedRecord {
            plugin_data: json!({
                "name": name,
                "source": source,
                "page": page,
                "hitDie": hit_die,
                "primaryAbilities": primary_abilities,
                "savingThrows": saving_throws,
                "spellcastingAbility": spellcasting_ability,
                "proficiencies": proficiencies,
                "subclasses": subclasses,
                "description": description,
            }),
            name,
            source,
            document_type: DocumentType::VttDocument,
            plugin_document_type: "class".to_string(),
            image_path,
            thumbnail_path: None,
            validation,
        })
    }
}

/// `"d8"`, `8`, or 5e-tools `{"number": 1, "faces": 8}`
fn hit_die(reader: &mut FieldReader<'_>) -> Option<&'static str> {
    let faces = match reader.get("hd") {
        None => {
            if reader.is_object() {
                reader.error("hd", "required field is missing", ValidationCode::Required);
            }
            return None;
        }
        Some(Value::String(s)) => s.trim().trim_start_matches(['d', 'D']).to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Object(o)) => match o.get("faces") {
            Some(faces) => faces.to_string(),
            None => {
                reader.error("hd.faces", "required field is missing", ValidationCode::Required);
                return None;
            }
        },
        Some(_) => {
            reader.error("hd", "must be a die like 'd8'", ValidationCode::InvalidType);
            return None;
        }
    };
    reader.check_enum("hd", &format!("d{}", faces), &HIT_DICE)
}

fn list_at(parent: Option<&Value>, key: &str) -> Vec<String> {
    match parent.and_then(|p| p.get(key)) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(crate::converters::record::strip_tags(s)),
                Value::Object(o) => o
                    .get("proficiency")
                    .or_else(|| o.get("full"))
                    .and_then(Value::as_str)
                    .map(crate::converters::record::strip_tags),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converters::dnd5e::test_support::context;

    fn wizard() -> Value {
        json!({
            "name": "Wizard",
            "source": "XPHB",
            "hd": {"number": 1, "faces": 6},
            "primaryAbility": [{"int": true}],
            "proficiency": ["int", "wis"],
            "spellcastingAbility": "int",
            "startingProficiencies": {"weapons": ["simple"], "skills": [{"choose": {"count": 2}}]},
            "subclasses": [{"name": "Evoker"}, "Abjurer|XPHB"]
        })
    }

    #[test]
    fn test_converts_wizard() {
        let record = ClassConverter.convert(&wizard(), &context("classes")).unwrap();

        assert_eq!(record.plugin_document_type, "class");
        assert_eq!(record.plugin_data["hitDie"], "d6");
        assert_eq!(record.plugin_data["primaryAbilities"], json!(["int"]));
        assert_eq!(record.plugin_data["savingThrows"], json!(["int", "wis"]));
        assert_eq!(record.plugin_data["proficiencies"]["weapons"], json!(["simple"]));
        assert_eq!(record.plugin_data["subclasses"], json!(["Evoker", "Abjurer"]));
    }

    #[test]
    fn test_hit_die_shapes() {
        for hd in [json!("d10"), json!(10), json!({"faces": 10})] {
            let mut raw = wizard();
            raw["hd"] = hd;
            let record = ClassConverter.convert(&raw, &context("classes")).unwrap();
            assert_eq!(record.plugin_data["hitDie"], "d10");
        }
    }

    #[test]
    fn test_illegal_hit_die() {
        let mut raw = wizard();
        raw["hd"] = json!("d7");
        let err = ClassConverter.convert(&raw, &context("classes")).unwrap_err();
        assert_eq!(err.validation().errors[0].code, ValidationCode::InvalidEnum);
    }

    #[test]
    fn test_missing_hit_die() {
        let mut raw = wizard();
        raw.as_object_mut().unwrap().remove("hd");
        let err = ClassConverter.convert(&raw, &context("classes")).unwrap_err();
        assert_eq!(err.validation().errors[0].path, "hd");
    }
}
