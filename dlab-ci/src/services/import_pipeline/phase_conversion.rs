//! Phase 2: PROCESSING
//!
//! Converts every loaded record. A record that fails validation is recorded
//! in the ledger and skipped; the phase only fails when nothing converted.

use super::{record_label, DocumentArena, ImportError, ImportPipeline, JobRun, LoadedArchive};
use crate::converters::ConversionContext;
use crate::models::{ImportIssue, ImportStage, IssueCode, RecordValidation};
use uuid::Uuid;

impl ImportPipeline {
    pub(super) async fn phase_conversion(&self, run: &JobRun, loaded: &LoadedArchive) -> Result<DocumentArena, ImportError> {
        run.tracker.stage(ImportStage::Processing).await;
        tracing::info!(job_id = %run.job_id, records = loaded.records.len(), "Phase 2: PROCESSING");

        let mut arena = DocumentArena::new(Uuid::new_v4());
        arena.resolver.exclude(loaded.excluded_keys.iter().cloned());

        let mut validations = Vec::with_capacity(loaded.records.len());
        let mut failed = 0usize;

        for (index, pending) in loaded.records.iter().enumerate() {
            self.ensure_not_cancelled(run, index).await?;

            let record = &pending.record;
            let label = record_label(record);
            let context = ConversionContext {
                plugin_id: loaded.manifest.manifest.plugin_id.clone(),
                content_type: record.content_type.clone(),
                campaign_id: run.options.campaign_id.clone(),
                asset_root: loaded.manifest.asset_root.clone(),
            };

            match pending.converter.convert(&record.raw, &context) {
                Ok(converted) => {
                    for warning in &converted.validation.warnings {
                        run.tracker
                            .record(ImportIssue::warning(
                                IssueCode::ConversionError,
                                Some(label.clone()),
                                format!("{}: {}", warning.path, warning.message),
                            ))
                            .await;
                    }
                    validations.push(RecordValidation {
                        item: record.location.clone(),
                        content_type: record.content_type.clone(),
                        name: Some(converted.name.clone()),
                        result: converted.validation.clone(),
                    });
                    if let Some(duplicate) = arena.push(record, converted, &context) {
                        run.tracker.record(duplicate).await;
                    }
                }
                Err(error) => {
                    failed += 1;
                    tracing::debug!(job_id = %run.job_id, item = %label, error = %error, "Record failed conversion");
                    validations.push(RecordValidation {
                        item: record.location.clone(),
                        content_type: record.content_type.clone(),
                        name: record.display_name().map(str::to_string),
                        result: error.validation().clone(),
                    });
                    run.tracker
                        .record(ImportIssue::skip(IssueCode::ConversionError, Some(label.clone()), error.to_string()))
                        .await;
                }
            }

            run.tracker.progress(index + 1, Some(label)).await;
        }

        run.tracker.validation_results(validations).await;
        tracing::info!(
            job_id = %run.job_id,
            converted = arena.documents.len(),
            failed,
            "Conversion finished"
        );

        if arena.is_empty() {
            return Err(ImportError::NoDocuments { failed });
        }
        Ok(arena)
    }
}
