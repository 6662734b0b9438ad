//! Phase 4a: RESOLVING-REFERENCES

use super::{DocumentArena, ImportError, ImportPipeline, JobRun};
use crate::models::ImportStage;

impl ImportPipeline {
    pub(super) async fn phase_resolution(&self, run: &JobRun, arena: &mut DocumentArena) -> Result<(), ImportError> {
        self.ensure_not_cancelled(run, 0).await?;
        run.tracker.stage(ImportStage::ResolvingReferences).await;
        tracing::info!(
            job_id = %run.job_id,
            documents = arena.documents.len(),
            keys = arena.resolver.len(),
            "Phase 4: RESOLVING-REFERENCES"
        );

        let report = arena.resolver.resolve_all(&mut arena.documents);
        for issue in report.issues {
            run.tracker.record(issue).await;
        }

        tracing::info!(
            job_id = %run.job_id,
            resolved = report.resolved,
            unresolved = report.unresolved,
            "References resolved"
        );
        Ok(())
    }
}
