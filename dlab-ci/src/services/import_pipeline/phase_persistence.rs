//! Phase 4b: persistence (still reported as RESOLVING-REFERENCES)
//!
//! Validate-only runs stop here without writing. They report the same
//! slug clashes the writer would, and warn when a real import would collide
//! with an existing compendium.

use chrono::Utc;
use std::collections::BTreeMap;
use uuid::Uuid;

use super::{DocumentArena, ImportError, ImportPipeline, ImportSummary, JobRun};
use crate::archive::ResolvedManifest;
use crate::db;
use crate::models::{count_by_type, Compendium, CompendiumManifest, ImportIssue, IssueCode};
use crate::services::compendium_writer::{dedupe_slugs, slug_taken, write_compendium, WriteError};
use crate::utils::slugify;

impl ImportPipeline {
    pub(super) async fn phase_persistence(
        &self,
        run: &JobRun,
        manifest: &ResolvedManifest,
        arena: DocumentArena,
    ) -> Result<ImportSummary, ImportError> {
        self.ensure_not_cancelled(run, 0).await?;
        let manifest = &manifest.manifest;
        let slug = slugify(&manifest.name);

        if run.options.validate_only {
            let (candidates, issues) = dedupe_slugs(&arena.documents);
            for issue in issues {
                run.tracker.record(issue).await;
            }

            if !run.options.overwrite_existing {
                let slugs: Vec<&str> = candidates.iter().map(|d| d.slug.as_str()).collect();
                let taken = db::documents::existing_slugs(&self.db, &slugs).await?;
                for document in candidates.iter().filter(|d| taken.contains(&d.slug)) {
                    run.tracker.record(slug_taken(document)).await;
                }

                if !self.existing_compendiums(manifest).await?.is_empty() {
                    run.tracker
                        .record(ImportIssue::warning(
                            IssueCode::CompendiumConflict,
                            Some(manifest.name.clone()),
                            "a compendium with this name or slug already exists; a real import needs overwriteExisting",
                        ))
                        .await;
                }
            }
            tracing::info!(
                job_id = %run.job_id,
                documents = arena.documents.len(),
                by_type = ?count_by_type(&arena.documents),
                "Validate-only import finished; nothing persisted"
            );
            return Ok(ImportSummary {
                compendium_id: None,
                documents: arena.documents.len(),
            });
        }

        let compendium = Compendium {
            id: arena.compendium_id,
            name: manifest.name.clone(),
            slug,
            plugin_id: manifest.plugin_id.clone(),
            version: manifest.version.clone(),
            description: manifest.description.clone(),
            entries_by_type: BTreeMap::new(),
            total_entries: 0,
            imported_by: run.user_id.clone(),
            imported_at: Utc::now(),
        };

        let outcome = write_compendium(
            &self.db,
            compendium,
            &arena.documents,
            run.options.overwrite_existing,
            self.config.tracker.max_lock_wait_ms,
        )
        .await?;
        for issue in outcome.issues {
            run.tracker.record(issue).await;
        }

        tracing::info!(
            job_id = %run.job_id,
            compendium_id = %outcome.compendium.id,
            persisted = outcome.persisted.len(),
            replaced_compendiums = outcome.replaced_compendiums,
            replaced_documents = outcome.replaced_documents,
            "Compendium written"
        );

        Ok(ImportSummary {
            compendium_id: Some(outcome.compendium.id),
            documents: outcome.persisted.len(),
        })
    }

    /// Compendiums a write of `manifest` would collide with
    pub(super) async fn existing_compendiums(&self, manifest: &CompendiumManifest) -> Result<Vec<Uuid>, ImportError> {
        let mut conn = self.db.acquire().await.map_err(dlab_common::Error::from)?;
        let slug = slugify(&manifest.name);
        Ok(db::compendiums::find_conflicting(&mut conn, &slug, &manifest.name, &manifest.plugin_id).await?)
    }

    /// Fail before any asset is uploaded when a plain import would be refused
    pub(super) async fn ensure_no_conflict(&self, manifest: &CompendiumManifest) -> Result<(), ImportError> {
        let existing = self.existing_compendiums(manifest).await?;
        if existing.is_empty() {
            return Ok(());
        }
        Err(WriteError::Conflict {
            name: manifest.name.clone(),
            slug: slugify(&manifest.name),
            plugin_id: manifest.plugin_id.clone(),
            existing,
        }
        .into())
    }
}
