//! Phase 3: UPLOADING
//!
//! Maps every asset path the converted documents reference, then binds the
//! image/thumbnail slots. A slot whose asset could not be mapped stays
//! unset and the document gets a warning.

use std::collections::HashMap;

use super::{DocumentArena, ImportError, ImportPipeline, JobRun};
use crate::archive::CompendiumArchive;
use crate::models::{AssetMapping, ImportIssue, ImportStage, IssueCode};
use crate::services::asset_pipeline::{AssetFailure, AssetPipeline, AssetPipelineConfig};

impl ImportPipeline {
    pub(super) async fn phase_assets(
        &self,
        run: &JobRun,
        archive: &CompendiumArchive,
        arena: &mut DocumentArena,
    ) -> Result<(), ImportError> {
        self.ensure_not_cancelled(run, 0).await?;
        run.tracker.stage(ImportStage::Uploading).await;

        let paths = arena.asset_paths();
        tracing::info!(
            job_id = %run.job_id,
            assets = paths.len(),
            validate_only = run.options.validate_only,
            "Phase 3: UPLOADING"
        );
        if paths.is_empty() {
            return Ok(());
        }

        let config = AssetPipelineConfig {
            upload: !run.options.validate_only,
            ..self.config.assets
        };
        let pipeline = AssetPipeline::new(self.store.clone(), self.db.clone(), config);
        let tracker = &run.tracker;
        let outcome = pipeline
            .process(archive, paths, &run.cancel, |path| tracker.try_current_item(Some(path.to_string())))
            .await?;

        for failure in &outcome.failures {
            run.tracker.record(failure.to_issue()).await;
        }

        let failures: HashMap<&str, &AssetFailure> =
            outcome.failures.iter().map(|f| (f.path.as_str(), f)).collect();
        let mut unbound = Vec::new();

        for (document, slots) in arena.documents.iter_mut().zip(arena.slots.iter()) {
            if let Some(path) = &slots.image {
                document.image_id = bind(&outcome.mapping, path);
                if document.image_id.is_none() {
                    unbound.push(unbound_issue(&document.name, "image", path, &failures));
                }
            }
            if let Some(path) = &slots.thumbnail {
                document.thumbnail_id = bind(&outcome.mapping, path);
                if document.thumbnail_id.is_none() {
                    unbound.push(unbound_issue(&document.name, "thumbnail", path, &failures));
                }
            }
        }

        for issue in unbound {
            run.tracker.record(issue).await;
        }
        run.tracker.current_item(None).await;

        tracing::info!(
            job_id = %run.job_id,
            mapped_paths = outcome.mapping.len(),
            unique_assets = outcome.mapping.unique_assets(),
            uploaded = outcome.uploaded,
            reused = outcome.reused,
            failed = outcome.failures.len(),
            "Assets processed"
        );
        Ok(())
    }
}

fn bind(mapping: &AssetMapping, path: &str) -> Option<uuid::Uuid> {
    mapping.get(path).map(|entry| entry.asset_id)
}

fn unbound_issue(document: &str, slot: &str, path: &str, failures: &HashMap<&str, &AssetFailure>) -> ImportIssue {
    let reason = failures
        .get(path)
        .map(|failure| failure.code.as_str())
        .unwrap_or("unmapped");
    ImportIssue::warning(
        IssueCode::AssetUnbound,
        Some(document.to_string()),
        format!("{} '{}' unavailable ({}); field left unset", slot, path, reason),
    )
}
