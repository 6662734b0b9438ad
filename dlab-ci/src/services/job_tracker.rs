//! Import job tracker
//!
//! The tracker task is the only writer of a job's progress. Pipeline stages
//! send [`TrackerCommand`]s over a bounded channel; the tracker applies
//! them, persists the job, and broadcasts progress on the event bus.

use chrono::Utc;
use dlab_common::events::{DlabEvent, EventBus};
use sqlx::SqlitePool;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::db;
use crate::models::{ImportIssue, ImportJob, ImportStage, RecordValidation};

/// Command sent from pipeline stages to the tracker task
#[derive(Debug)]
pub enum TrackerCommand {
    /// Advance the progress stage
    TransitionTo(ImportStage),
    SetCompendiumName(String),
    /// Fix the record total (before the first record is processed)
    SetTotal(usize),
    UpdateProgress {
        processed: usize,
        current_item: Option<String>,
    },
    SetCurrentItem(Option<String>),
    /// Add an entry to the error or warning ledger
    Record(ImportIssue),
    SetValidationResults(Vec<RecordValidation>),
    Complete {
        compendium_id: Option<Uuid>,
        documents: usize,
        reply: oneshot::Sender<ImportJob>,
    },
    Fail {
        message: String,
        reply: oneshot::Sender<ImportJob>,
    },
}

#[derive(Debug, Error)]
#[error("job tracker for {0} is no longer running")]
pub struct TrackerClosed(pub Uuid);

#[derive(Debug, Clone, Copy)]
pub struct TrackerConfig {
    pub channel_capacity: usize,
    /// Persist after this many progress updates even without a stage change
    pub persist_interval: usize,
    pub max_lock_wait_ms: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 64,
            persist_interval: 25,
            max_lock_wait_ms: 5000,
        }
    }
}

/// Sending side used by the pipeline
#[derive(Debug, Clone)]
pub struct TrackerHandle {
    job_id: Uuid,
    tx: mpsc::Sender<TrackerCommand>,
}

impl TrackerHandle {
    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    async fn send(&self, command: TrackerCommand) {
        if self.tx.send(command).await.is_err() {
            tracing::debug!(job_id = %self.job_id, "Tracker closed; dropping update");
        }
    }

    pub async fn stage(&self, stage: ImportStage) {
        self.send(TrackerCommand::TransitionTo(stage)).await;
    }

    pub async fn set_compendium_name(&self, name: impl Into<String>) {
        self.send(TrackerCommand::SetCompendiumName(name.into())).await;
    }

    pub async fn set_total(&self, total: usize) {
        self.send(TrackerCommand::SetTotal(total)).await;
    }

    pub async fn progress(&self, processed: usize, current_item: Option<String>) {
        self.send(TrackerCommand::UpdateProgress {
            processed,
            current_item,
        })
        .await;
    }

    pub async fn current_item(&self, item: Option<String>) {
        self.send(TrackerCommand::SetCurrentItem(item)).await;
    }

    /// Non-blocking variant for synchronous callbacks; dropped when the channel is full
    pub fn try_current_item(&self, item: Option<String>) {
        let _ = self.tx.try_send(TrackerCommand::SetCurrentItem(item));
    }

    pub async fn record(&self, issue: ImportIssue) {
        self.send(TrackerCommand::Record(issue)).await;
    }

    pub async fn validation_results(&self, results: Vec<RecordValidation>) {
        self.send(TrackerCommand::SetValidationResults(results)).await;
    }

    /// Finish successfully; returns the terminal job
    pub async fn complete(&self, compendium_id: Option<Uuid>, documents: usize) -> Result<ImportJob, TrackerClosed> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(TrackerCommand::Complete {
                compendium_id,
                documents,
                reply,
            })
            .await
            .map_err(|_| TrackerClosed(self.job_id))?;
        rx.await.map_err(|_| TrackerClosed(self.job_id))
    }

    /// Finish with a fatal error; returns the terminal job
    pub async fn fail(&self, message: impl Into<String>) -> Result<ImportJob, TrackerClosed> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(TrackerCommand::Fail {
                message: message.into(),
                reply,
            })
            .await
            .map_err(|_| TrackerClosed(self.job_id))?;
        rx.await.map_err(|_| TrackerClosed(self.job_id))
    }
}

pub struct JobTracker {
    job: ImportJob,
    db: SqlitePool,
    event_bus: EventBus,
    config: TrackerConfig,
    rx: mpsc::Receiver<TrackerCommand>,
    updates_since_persist: usize,
    /// `ImportJobStarted` has been broadcast
    announced: bool,
}

impl JobTracker {
    /// Start the tracker task for `job`
    ///
    /// The join handle yields the terminal job once the tracker stops.
    pub fn spawn(
        job: ImportJob,
        db: SqlitePool,
        event_bus: EventBus,
        config: TrackerConfig,
    ) -> (TrackerHandle, JoinHandle<ImportJob>) {
        let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
        let handle = TrackerHandle { job_id: job.id, tx };
        let tracker = Self {
            job,
            db,
            event_bus,
            config,
            rx,
            updates_since_persist: 0,
            announced: false,
        };
        (handle, tokio::spawn(tracker.run()))
    }

    async fn run(mut self) -> ImportJob {
        self.job.start();
        self.persist().await;
        tracing::info!(job_id = %self.job.id, user_id = %self.job.user_id, "Import job started");

        while let Some(command) = self.rx.recv().await {
            match command {
                TrackerCommand::TransitionTo(stage) => {
                    if let Some(transition) = self.job.advance_to(stage) {
                        tracing::info!(
                            job_id = %transition.job_id,
                            from = transition.old_stage.as_str(),
                            to = transition.new_stage.as_str(),
                            "Import stage changed"
                        );
                        self.persist().await;
                        self.broadcast_progress();
                    } else if stage != self.job.progress.stage {
                        tracing::warn!(
                            job_id = %self.job.id,
                            current = self.job.progress.stage.as_str(),
                            requested = stage.as_str(),
                            "Ignored out-of-order stage transition"
                        );
                    }
                }
                TrackerCommand::SetCompendiumName(name) => {
                    self.job.compendium_name = Some(name);
                    self.announce_started();
                }
                TrackerCommand::SetTotal(total) => {
                    if self.job.set_total(total) {
                        self.persist().await;
                        self.broadcast_progress();
                    } else {
                        tracing::warn!(job_id = %self.job.id, total, "Total already fixed; ignoring");
                    }
                }
                TrackerCommand::UpdateProgress {
                    processed,
                    current_item,
                } => {
                    self.job.record_processed(processed);
                    self.job.set_current_item(current_item);
                    self.broadcast_progress();
                    self.persist_periodically().await;
                }
                TrackerCommand::SetCurrentItem(item) => {
                    self.job.set_current_item(item);
                    self.broadcast_progress();
                }
                TrackerCommand::Record(issue) => {
                    if issue.is_warning() {
                        tracing::warn!(job_id = %self.job.id, "{}", issue);
                        self.job.add_warning(issue.to_string());
                    } else {
                        tracing::error!(job_id = %self.job.id, "{}", issue);
                        self.job.add_error(issue.to_string());
                    }
                    self.persist_periodically().await;
                }
                TrackerCommand::SetValidationResults(results) => {
                    self.job.validation_results = results;
                }
                TrackerCommand::Complete {
                    compendium_id,
                    documents,
                    reply,
                } => {
                    self.job.complete(compendium_id);
                    self.persist().await;
                    self.announce_started();
                    let duration = self.duration_seconds();
                    tracing::info!(
                        job_id = %self.job.id,
                        documents,
                        errors = self.job.progress.errors.len(),
                        warnings = self.job.progress.warnings.len(),
                        duration_seconds = duration,
                        "Import job completed"
                    );
                    self.event_bus.emit_lossy(DlabEvent::ImportJobCompleted {
                        job_id: self.job.id,
                        compendium_id,
                        documents,
                        error_count: self.job.progress.errors.len(),
                        warning_count: self.job.progress.warnings.len(),
                        duration_seconds: duration,
                        timestamp: Utc::now(),
                    });
                    let _ = reply.send(self.job.clone());
                    return self.job;
                }
                TrackerCommand::Fail { message, reply } => {
                    self.finish_failed(message).await;
                    let _ = reply.send(self.job.clone());
                    return self.job;
                }
            }
        }

        // Every sender dropped without a terminal command
        if !self.job.is_terminal() {
            self.finish_failed("Import pipeline stopped unexpectedly".to_string()).await;
        }
        self.job
    }

    async fn finish_failed(&mut self, message: String) {
        self.job.fail(message.clone());
        self.persist().await;
        self.announce_started();
        tracing::error!(job_id = %self.job.id, error = %message, "Import job failed");
        self.event_bus.emit_lossy(DlabEvent::ImportJobFailed {
            job_id: self.job.id,
            error_message: message,
            processed_items: self.job.progress.processed_items,
            timestamp: Utc::now(),
        });
    }

    fn duration_seconds(&self) -> u64 {
        let end = self.job.completed_at.unwrap_or_else(Utc::now);
        (end - self.job.created_at).num_seconds().max(0) as u64
    }

    /// Broadcast `ImportJobStarted` once, ahead of any other event
    ///
    /// Sent as soon as the compendium name is known; a job that never gets
    /// that far announces itself with an empty name.
    fn announce_started(&mut self) {
        if self.announced {
            return;
        }
        self.announced = true;
        self.event_bus.emit_lossy(DlabEvent::ImportJobStarted {
            job_id: self.job.id,
            user_id: self.job.user_id.clone(),
            compendium_name: self.job.compendium_name.clone().unwrap_or_default(),
            timestamp: Utc::now(),
        });
    }

    fn broadcast_progress(&mut self) {
        self.announce_started();
        let progress = &self.job.progress;
        self.event_bus.emit_lossy(DlabEvent::ImportProgressUpdate {
            job_id: self.job.id,
            stage: progress.stage.as_str().to_string(),
            processed_items: progress.processed_items,
            total_items: progress.total_items,
            percentage: progress.percentage(),
            current_item: progress.current_item.clone(),
            error_count: progress.errors.len(),
            warning_count: progress.warnings.len(),
            timestamp: Utc::now(),
        });
    }

    async fn persist_periodically(&mut self) {
        self.updates_since_persist += 1;
        if self.updates_since_persist >= self.config.persist_interval.max(1) {
            self.persist().await;
        }
    }

    async fn persist(&mut self) {
        self.updates_since_persist = 0;
        if let Err(e) = db::jobs::save_job(&self.db, &self.job, self.config.max_lock_wait_ms).await {
            tracing::error!(job_id = %self.job.id, error = %e, "Failed to persist import job");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory_pool;
    use crate::models::{ImportOptions, IssueCode, JobStatus};

    async fn spawn_tracker() -> (TrackerHandle, JoinHandle<ImportJob>, SqlitePool, EventBus) {
        let pool = init_memory_pool().await.unwrap();
        let bus = EventBus::new(100);
        let job = ImportJob::new("user-1", ImportOptions::default());
        let (handle, join) = JobTracker::spawn(job, pool.clone(), bus.clone(), TrackerConfig::default());
        (handle, join, pool, bus)
    }

    #[tokio::test]
    async fn test_tracker_applies_updates_and_completes() {
        let (handle, join, pool, _bus) = spawn_tracker().await;

        handle.set_total(2).await;
        handle.stage(ImportStage::Processing).await;
        handle.progress(1, Some("Acolyte".to_string())).await;
        handle
            .record(ImportIssue::skip(IssueCode::ConversionError, Some("x#1".to_string()), "bad"))
            .await;
        handle.progress(2, None).await;

        let job = handle.complete(Some(Uuid::new_v4()), 1).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress.stage, ImportStage::Complete);
        assert_eq!(job.progress.processed_items, 2);
        assert_eq!(job.progress.errors.len(), 1);

        let persisted = db::jobs::load_job(&pool, job.id).await.unwrap().unwrap();
        assert_eq!(persisted.status, JobStatus::Completed);
        assert_eq!(persisted.progress.errors, job.progress.errors);
        assert_eq!(join.await.unwrap().id, job.id);
    }

    #[tokio::test]
    async fn test_processed_never_decreases_and_stage_never_regresses() {
        let (handle, _join, _pool, _bus) = spawn_tracker().await;

        handle.set_total(5).await;
        handle.stage(ImportStage::Uploading).await;
        handle.progress(4, None).await;
        handle.progress(2, None).await;
        handle.stage(ImportStage::Processing).await;
        handle.set_total(9).await;

        let job = handle.fail("stop").await.unwrap();
        assert_eq!(job.progress.processed_items, 4);
        assert_eq!(job.progress.total_items, 5);
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.progress.stage, ImportStage::Error);
        assert_eq!(job.error.as_deref(), Some("stop"));
    }

    #[tokio::test]
    async fn test_tracker_broadcasts_lifecycle_events() {
        let pool = init_memory_pool().await.unwrap();
        let bus = EventBus::new(100);
        let mut rx = bus.subscribe();
        let job = ImportJob::new("user-1", ImportOptions::default());
        let (handle, _join) = JobTracker::spawn(job, pool, bus.clone(), TrackerConfig::default());

        handle.set_compendium_name("Player's Handbook").await;
        handle.set_total(1).await;
        handle.complete(None, 0).await.unwrap();

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        let types: Vec<&str> = events.iter().map(|e| e.event_type()).collect();
        assert_eq!(types.first(), Some(&"ImportJobStarted"));
        assert_eq!(types.iter().filter(|t| **t == "ImportJobStarted").count(), 1);
        assert!(types.contains(&"ImportProgressUpdate"));
        assert_eq!(types.last(), Some(&"ImportJobCompleted"));
        match &events[0] {
            DlabEvent::ImportJobStarted { compendium_name, .. } => assert_eq!(compendium_name, "Player's Handbook"),
            other => panic!("unexpected first event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_job_failing_before_name_still_announces_start() {
        let pool = init_memory_pool().await.unwrap();
        let bus = EventBus::new(100);
        let mut rx = bus.subscribe();
        let job = ImportJob::new("user-1", ImportOptions::default());
        let (handle, _join) = JobTracker::spawn(job, pool, bus.clone(), TrackerConfig::default());

        handle.fail("not a zip").await.unwrap();

        let mut types = Vec::new();
        while let Ok(event) = rx.try_recv() {
            types.push(event.event_type());
        }
        assert_eq!(types, vec!["ImportJobStarted", "ImportJobFailed"]);
    }

    #[tokio::test]
    async fn test_dropped_handle_fails_job() {
        let (handle, join, _pool, _bus) = spawn_tracker().await;
        drop(handle);
        let job = join.await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
    }
}
