//! Import job state machine
//!
//! Job status moves forward only: PENDING → PROCESSING → {COMPLETED | FAILED}.
//! While processing, the progress stage walks
//! validating → processing → uploading → resolving-references → complete;
//! `error` can preempt any stage and is terminal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ImportOptions, RecordValidation};

/// Job lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Created, not yet picked up
    Pending,
    /// Pipeline running
    Processing,
    /// Finished; individual records may still have failed
    Completed,
    /// Aborted by a fatal error or cancellation
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Processing)
                | (JobStatus::Pending, JobStatus::Failed)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
        )
    }
}

/// Pipeline stage reported in progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImportStage {
    /// Manifest parsing, converter lookup, record counting
    Validating,
    /// Per-record conversion
    Processing,
    /// Asset hashing and upload
    Uploading,
    /// Cross-reference rewrite and persistence
    ResolvingReferences,
    /// Finished
    Complete,
    /// Fatal error (terminal)
    Error,
}

impl ImportStage {
    /// Position in the fixed stage order; `Error` sits outside it
    fn rank(&self) -> Option<u8> {
        match self {
            ImportStage::Validating => Some(0),
            ImportStage::Processing => Some(1),
            ImportStage::Uploading => Some(2),
            ImportStage::ResolvingReferences => Some(3),
            ImportStage::Complete => Some(4),
            ImportStage::Error => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ImportStage::Validating => "validating",
            ImportStage::Processing => "processing",
            ImportStage::Uploading => "uploading",
            ImportStage::ResolvingReferences => "resolving-references",
            ImportStage::Complete => "complete",
            ImportStage::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ImportStage::Complete | ImportStage::Error)
    }

    /// Whether moving from `self` to `next` respects the stage order
    pub fn can_advance_to(&self, next: ImportStage) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self.rank(), next.rank()) {
            (_, None) => true,
            (Some(current), Some(next)) => next > current,
            (None, Some(_)) => false,
        }
    }
}

/// Progress counters and the error/warning ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportProgress {
    pub stage: ImportStage,
    pub processed_items: usize,
    pub total_items: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_item: Option<String>,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl Default for ImportProgress {
    fn default() -> Self {
        Self {
            stage: ImportStage::Validating,
            processed_items: 0,
            total_items: 0,
            current_item: None,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

impl ImportProgress {
    /// Percentage complete (0.0 - 100.0)
    pub fn percentage(&self) -> f32 {
        if self.stage == ImportStage::Complete {
            return 100.0;
        }
        if self.total_items == 0 {
            return 0.0;
        }
        (self.processed_items as f32 / self.total_items as f32) * 100.0
    }
}

/// Stage change record returned by [`ImportJob::advance_to`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTransition {
    pub job_id: Uuid,
    pub old_stage: ImportStage,
    pub new_stage: ImportStage,
}

/// A compendium import job
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportJob {
    pub id: Uuid,
    pub user_id: String,
    pub status: JobStatus,
    pub progress: ImportProgress,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compendium_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compendium_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub options: ImportOptions,
    /// Per-record validation results; filled for validate-only runs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validation_results: Vec<RecordValidation>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl ImportJob {
    /// Create a new pending job
    pub fn new(user_id: impl Into<String>, options: ImportOptions) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            status: JobStatus::Pending,
            progress: ImportProgress::default(),
            compendium_id: None,
            compendium_name: None,
            error: None,
            options,
            validation_results: Vec::new(),
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    fn set_status(&mut self, next: JobStatus) -> bool {
        if !self.status.can_transition_to(next) {
            tracing::warn!(
                job_id = %self.id,
                from = self.status.as_str(),
                to = next.as_str(),
                "Rejected backward job status transition"
            );
            return false;
        }
        self.status = next;
        self.updated_at = Utc::now();
        if next.is_terminal() {
            self.completed_at = Some(self.updated_at);
        }
        true
    }

    /// PENDING → PROCESSING
    pub fn start(&mut self) -> bool {
        self.set_status(JobStatus::Processing)
    }

    /// Advance the progress stage; backward moves are ignored
    pub fn advance_to(&mut self, stage: ImportStage) -> Option<StageTransition> {
        let old_stage = self.progress.stage;
        if old_stage == stage || !old_stage.can_advance_to(stage) {
            return None;
        }
        self.progress.stage = stage;
        self.updated_at = Utc::now();
        Some(StageTransition {
            job_id: self.id,
            old_stage,
            new_stage: stage,
        })
    }

    /// Fix the total; only allowed before any record is processed
    pub fn set_total(&mut self, total: usize) -> bool {
        if self.progress.processed_items > 0 {
            return false;
        }
        self.progress.total_items = total;
        self.updated_at = Utc::now();
        true
    }

    /// Raise the processed counter; never decreases and never passes the total
    pub fn record_processed(&mut self, processed: usize) {
        let capped = processed.min(self.progress.total_items);
        if capped > self.progress.processed_items {
            self.progress.processed_items = capped;
            self.updated_at = Utc::now();
        }
    }

    pub fn set_current_item(&mut self, item: Option<String>) {
        self.progress.current_item = item;
    }

    pub fn add_error(&mut self, message: String) {
        self.progress.errors.push(message);
        self.updated_at = Utc::now();
    }

    pub fn add_warning(&mut self, message: String) {
        self.progress.warnings.push(message);
        self.updated_at = Utc::now();
    }

    /// PROCESSING → COMPLETED, stage → complete
    pub fn complete(&mut self, compendium_id: Option<Uuid>) -> bool {
        if !self.set_status(JobStatus::Completed) {
            return false;
        }
        self.compendium_id = compendium_id;
        self.progress.stage = ImportStage::Complete;
        self.progress.current_item = None;
        true
    }

    /// → FAILED, stage → error; partial progress is kept for diagnostics
    pub fn fail(&mut self, message: impl Into<String>) -> bool {
        if !self.set_status(JobStatus::Failed) {
            return false;
        }
        let message = message.into();
        self.progress.stage = ImportStage::Error;
        self.progress.errors.push(message.clone());
        self.error = Some(message);
        true
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order() {
        assert!(ImportStage::Validating.can_advance_to(ImportStage::Processing));
        assert!(ImportStage::Validating.can_advance_to(ImportStage::Uploading));
        assert!(!ImportStage::Uploading.can_advance_to(ImportStage::Processing));
        assert!(ImportStage::Uploading.can_advance_to(ImportStage::Error));
        assert!(!ImportStage::Error.can_advance_to(ImportStage::Complete));
        assert!(!ImportStage::Complete.can_advance_to(ImportStage::Error));
    }

    #[test]
    fn test_stage_serializes_kebab_case() {
        let json = serde_json::to_string(&ImportStage::ResolvingReferences).unwrap();
        assert_eq!(json, "\"resolving-references\"");
    }

    #[test]
    fn test_percentage() {
        let mut progress = ImportProgress {
            total_items: 4,
            processed_items: 1,
            ..Default::default()
        };
        assert_eq!(progress.percentage(), 25.0);
        progress.stage = ImportStage::Complete;
        assert_eq!(progress.percentage(), 100.0);
    }
}
