//! Import issues and their severity
//!
//! Every non-fatal problem a stage encounters is reported to the job
//! tracker as an [`ImportIssue`]; the tracker renders it into the job's
//! error or warning ledger.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Issue severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ErrorSeverity {
    /// Recorded in the warning ledger; the item still imports
    Warning,
    /// Recorded in the error ledger; the item is skipped, the import continues
    Skip,
    /// The import cannot continue
    Critical,
}

/// Error taxonomy of the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueCode {
    ManifestError,
    ContentError,
    ConversionError,
    AssetMissing,
    AssetUploadError,
    AssetUnbound,
    ReferenceResolutionWarning,
    DuplicateSourceKey,
    PersistenceError,
    CompendiumConflict,
    Cancelled,
}

impl IssueCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueCode::ManifestError => "MANIFEST_ERROR",
            IssueCode::ContentError => "CONTENT_ERROR",
            IssueCode::ConversionError => "CONVERSION_ERROR",
            IssueCode::AssetMissing => "ASSET_MISSING",
            IssueCode::AssetUploadError => "ASSET_UPLOAD_ERROR",
            IssueCode::AssetUnbound => "ASSET_UNBOUND",
            IssueCode::ReferenceResolutionWarning => "REFERENCE_RESOLUTION_WARNING",
            IssueCode::DuplicateSourceKey => "DUPLICATE_SOURCE_KEY",
            IssueCode::PersistenceError => "PERSISTENCE_ERROR",
            IssueCode::CompendiumConflict => "COMPENDIUM_CONFLICT",
            IssueCode::Cancelled => "CANCELLED",
        }
    }
}

/// A single ledger entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportIssue {
    /// Item the issue is about (record location, asset path, document name)
    pub item: Option<String>,
    pub code: IssueCode,
    pub message: String,
    pub severity: ErrorSeverity,
}

impl ImportIssue {
    /// Create new warning
    pub fn warning(code: IssueCode, item: Option<String>, message: impl Into<String>) -> Self {
        Self {
            item,
            code,
            message: message.into(),
            severity: ErrorSeverity::Warning,
        }
    }

    /// Create new skip error
    pub fn skip(code: IssueCode, item: Option<String>, message: impl Into<String>) -> Self {
        Self {
            item,
            code,
            message: message.into(),
            severity: ErrorSeverity::Skip,
        }
    }

    /// Create new critical error
    pub fn critical(code: IssueCode, item: Option<String>, message: impl Into<String>) -> Self {
        Self {
            item,
            code,
            message: message.into(),
            severity: ErrorSeverity::Critical,
        }
    }

    pub fn is_warning(&self) -> bool {
        self.severity == ErrorSeverity::Warning
    }
}

impl fmt::Display for ImportIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.item {
            Some(item) => write!(f, "[{}] {}: {}", self.code.as_str(), item, self.message),
            None => write!(f, "[{}] {}", self.code.as_str(), self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_with_item() {
        let issue = ImportIssue::skip(
            IssueCode::ConversionError,
            Some("backgrounds.json#1".to_string()),
            "name: required field is missing",
        );
        assert_eq!(
            issue.to_string(),
            "[CONVERSION_ERROR] backgrounds.json#1: name: required field is missing"
        );
        assert!(!issue.is_warning());
    }

    #[test]
    fn test_display_without_item() {
        let issue = ImportIssue::critical(IssueCode::Cancelled, None, "Import cancelled");
        assert_eq!(issue.to_string(), "[CANCELLED] Import cancelled");
    }
}
