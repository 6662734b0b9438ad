use serde_json::{json, Value};

use super::{source_fields, without_source};
use crate::converters::record::{strip_tags, FieldReader};
use crate::converters::{ConversionContext, ConversionError, ConvertedRecord, Converter};
use crate::models::DocumentType;

/// background → `vtt-document` / `background`
pub struct BackgroundConverter;

impl Converter for BackgroundConverter {
    fn content_type(&self) -> &'static str {
        "backgrounds"
    }

    fn convert(&self, raw: &Value, context: &ConversionContext) -> Result<ConvertedRecord, ConversionError> {
        let mut reader = FieldReader::new(raw);

        let name = reader.required_str("name");
        let (source, page) = source_fields(&mut reader);
        let description = reader.text("entries");
        let skills = reader.flag_keys("skillProficiencies");
        let tools = reader.flag_keys("toolProficiencies");
        let languages = reader.flag_keys("languageProficiencies");
        let feats: Vec<String> = reader
            .flag_keys("feats")
            .iter()
            .map(|feat| strip_tags(without_source(feat)))
            .collect();
        let image_path = reader.asset_path("image", context);

        // Equipment and explicit feat links are kept verbatim so `_ref` markers survive
        let equipment = reader.get("startingEquipment").cloned().unwrap_or(Value::Array(Vec::new()));
        let feat = reader.get("feat").cloned();
        let ability = reader.get("ability").cloned();

        if description.is_none() && reader.is_object() {
            reader.warning("entries", "background has no description");
        }

        let validation = reader.finish()?;
        let name = name.unwrap_or_default();

        Ok(ConvertedRecord {
            plugin_data: json!({
                "name": name,
                "source": source,
                "page": page,
                "description": description,
                "skillProficiencies": skills,
                "toolProficiencies": tools,
                "languages": languages,
                "equipment": equipment,
                "feats": feats,
                "feat": feat,
                "abilityScores": ability,
            }),
            name,
            source,
            document_type: DocumentType::VttDocument,
            plugin_document_type: "background".to_string(),
            image_path,
            thumbnail_path: None,
            validation,
        })
    }
}
