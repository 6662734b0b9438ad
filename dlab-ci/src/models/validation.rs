//! Per-record validation results
//!
//! Converters never return a bare error for bad data; they accumulate a
//! [`ValidationResult`] that the pipeline turns into ledger entries.

use serde::{Deserialize, Serialize};

/// Machine-readable validation failure kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationCode {
    Required,
    InvalidType,
    InvalidEnum,
    OutOfRange,
    InvalidFormat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub path: String,
    pub message: String,
    pub code: ValidationCode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

/// Outcome of validating one source record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub success: bool,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationWarning>,
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self {
            success: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&mut self, path: impl Into<String>, message: impl Into<String>, code: ValidationCode) {
        self.success = false;
        self.errors.push(ValidationIssue {
            path: path.into(),
            message: message.into(),
            code,
        });
    }

    pub fn warning(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ValidationWarning {
            path: path.into(),
            message: message.into(),
        });
    }

    /// One-line summary of all errors, `path: message; path: message`
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| format!("{}: {}", e.path, e.message))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Validation result attached to the record it was computed for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordValidation {
    /// Record location, `<file>#<index>`
    pub item: String,
    pub content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub result: ValidationResult,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_flips_success() {
        let mut result = ValidationResult::new();
        assert!(result.success);

        result.warning("page", "page number missing");
        assert!(result.success);

        result.error("level", "must be between 0 and 9", ValidationCode::OutOfRange);
        result.error("name", "required field is missing", ValidationCode::Required);
        assert!(!result.success);
        assert_eq!(
            result.error_summary(),
            "level: must be between 0 and 9; name: required field is missing"
        );
    }
}
