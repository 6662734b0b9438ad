//! Data models for the import service

pub mod asset;
pub mod document;
pub mod import_issue;
pub mod import_job;
pub mod manifest;
pub mod options;
pub mod validation;

pub use asset::{AssetMapping, AssetMappingEntry, StoredAsset};
pub use document::{count_by_type, Compendium, Document, DocumentType};
pub use import_issue::{ErrorSeverity, ImportIssue, IssueCode};
pub use import_job::{ImportJob, ImportProgress, ImportStage, JobStatus, StageTransition};
pub use manifest::{CompendiumManifest, DEFAULT_ASSET_DIRECTORY, DEFAULT_CONTENT_DIRECTORY};
pub use options::{ImportOptions, SourceFilter};
pub use validation::{RecordValidation, ValidationCode, ValidationIssue, ValidationResult, ValidationWarning};
