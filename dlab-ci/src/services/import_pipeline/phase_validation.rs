//! Phase 1: VALIDATING
//!
//! Opens the archive, validates the manifest, resolves every declared
//! content type to its converter, loads the records and applies the
//! source filter. The job total is fixed here, before any record is
//! converted. A plain import of a compendium that already exists fails
//! here, before any asset is uploaded.

use super::{ImportError, ImportPipeline, JobRun, LoadedArchive, PendingRecord};
use crate::archive::{load_records, read_manifest, CompendiumArchive};
use crate::converters::{explicit_id, source_keys};
use crate::models::{ImportIssue, ImportStage, IssueCode};

impl ImportPipeline {
    pub(super) async fn phase_validation(&self, run: &JobRun, bytes: Vec<u8>) -> Result<LoadedArchive, ImportError> {
        run.tracker.stage(ImportStage::Validating).await;
        tracing::info!(job_id = %run.job_id, "Phase 1: VALIDATING");

        let archive = CompendiumArchive::open_zip(bytes, self.config.max_archive_bytes).await?;
        let manifest = read_manifest(&archive, &self.registry)?;
        let converters = self.registry.resolve(&manifest.manifest)?;
        run.tracker.set_compendium_name(manifest.manifest.name.clone()).await;

        let filter = &run.options.source_filter;
        let mut records = Vec::new();
        let mut excluded_keys = Vec::new();

        for (content_type, converter) in converters {
            let load = load_records(&archive, &manifest.content_root, &content_type);
            for error in &load.errors {
                run.tracker
                    .record(ImportIssue::skip(IssueCode::ContentError, Some(content_type.clone()), error.to_string()))
                    .await;
            }

            let mut accepted = 0usize;
            let mut filtered = 0usize;
            for record in load.records {
                if filter.matches(&record.raw) {
                    accepted += 1;
                    records.push(PendingRecord {
                        record,
                        converter: converter.clone(),
                    });
                } else {
                    filtered += 1;
                    let explicit = explicit_id(&record.raw);
                    excluded_keys.extend(source_keys(&content_type, explicit.as_deref(), record.display_name()));
                }
            }

            tracing::debug!(
                job_id = %run.job_id,
                content_type = %content_type,
                accepted,
                filtered,
                file_errors = load.errors.len(),
                "Content type loaded"
            );
        }

        run.tracker.set_total(records.len()).await;
        tracing::info!(
            job_id = %run.job_id,
            compendium = %manifest.manifest.name,
            plugin_id = %manifest.manifest.plugin_id,
            records = records.len(),
            excluded = excluded_keys.len(),
            "Archive validated"
        );

        self.ensure_not_cancelled(run, 0).await?;
        if !run.options.validate_only && !run.options.overwrite_existing {
            self.ensure_no_conflict(&manifest.manifest).await?;
        }

        Ok(LoadedArchive {
            archive,
            manifest,
            records,
            excluded_keys,
        })
    }
}
