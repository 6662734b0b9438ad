//! Import request options

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Which source records take part in an import
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(try_from = "String", into = "String")]
pub enum SourceFilter {
    /// Every record
    #[default]
    All,
    /// Records flagged `srd` or `basicRules`
    Srd,
    /// Records whose `source` is one of the listed abbreviations (case-insensitive)
    Sources(Vec<String>),
}

impl SourceFilter {
    /// Whether a raw source record passes the filter
    pub fn matches(&self, record: &Value) -> bool {
        match self {
            SourceFilter::All => true,
            SourceFilter::Srd => is_truthy(record.get("srd")) || is_truthy(record.get("basicRules")),
            SourceFilter::Sources(sources) => record
                .get("source")
                .and_then(Value::as_str)
                .map(|source| sources.iter().any(|s| s.eq_ignore_ascii_case(source)))
                .unwrap_or(false),
        }
    }
}

/// 5e-tools marks SRD membership with `true` or with the SRD name of the entry
fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => !s.is_empty(),
        _ => false,
    }
}

impl FromStr for SourceFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("all") {
            return Ok(SourceFilter::All);
        }
        if trimmed.eq_ignore_ascii_case("srd") {
            return Ok(SourceFilter::Srd);
        }
        let sources: Vec<String> = trimmed
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if sources.is_empty() {
            return Err(format!("invalid source filter: {:?}", s));
        }
        Ok(SourceFilter::Sources(sources))
    }
}

impl fmt::Display for SourceFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceFilter::All => write!(f, "all"),
            SourceFilter::Srd => write!(f, "srd"),
            SourceFilter::Sources(sources) => write!(f, "{}", sources.join(",")),
        }
    }
}

impl TryFrom<String> for SourceFilter {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SourceFilter> for String {
    fn from(filter: SourceFilter) -> Self {
        filter.to_string()
    }
}

/// Flags supplied with an import request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ImportOptions {
    /// Replace an existing compendium and conflicting documents
    #[serde(default)]
    pub overwrite_existing: bool,
    /// Run every stage through resolution but persist nothing except the job
    #[serde(default)]
    pub validate_only: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub campaign_id: Option<String>,
    #[serde(default)]
    pub source_filter: SourceFilter,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_filters() {
        assert_eq!("".parse::<SourceFilter>().unwrap(), SourceFilter::All);
        assert_eq!("ALL".parse::<SourceFilter>().unwrap(), SourceFilter::All);
        assert_eq!("srd".parse::<SourceFilter>().unwrap(), SourceFilter::Srd);
        assert_eq!(
            "XPHB, xdmg".parse::<SourceFilter>().unwrap(),
            SourceFilter::Sources(vec!["XPHB".to_string(), "xdmg".to_string()])
        );
        assert!(" , ".parse::<SourceFilter>().is_err());
    }

    #[test]
    fn test_srd_filter_accepts_string_and_bool_flags() {
        let filter = SourceFilter::Srd;
        assert!(filter.matches(&json!({"name": "Acolyte", "srd": true})));
        assert!(filter.matches(&json!({"name": "Acolyte", "basicRules": "Acolyte"})));
        assert!(!filter.matches(&json!({"name": "Haunted One", "srd": false})));
        assert!(!filter.matches(&json!({"name": "Haunted One"})));
    }

    #[test]
    fn test_source_list_is_case_insensitive() {
        let filter: SourceFilter = "xphb".parse().unwrap();
        assert!(filter.matches(&json!({"source": "XPHB"})));
        assert!(!filter.matches(&json!({"source": "PHB"})));
        assert!(!filter.matches(&json!({"name": "no source"})));
    }

    #[test]
    fn test_options_serialize_filter_as_string() {
        let options = ImportOptions {
            source_filter: SourceFilter::Srd,
            ..Default::default()
        };
        let json = serde_json::to_value(&options).unwrap();
        assert_eq!(json["sourceFilter"], "srd");
    }
}
