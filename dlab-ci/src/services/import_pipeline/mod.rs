//! Compendium import pipeline
//!
//! Drives one import job through every stage:
//!
//! VALIDATING → PROCESSING → UPLOADING → RESOLVING-REFERENCES → COMPLETE
//!
//! - **VALIDATING** (`phase_validation`): open the archive, read the
//!   manifest, load records, apply the source filter, fix the total
//! - **PROCESSING** (`phase_conversion`): run each record through its
//!   converter and build the in-memory document arena
//! - **UPLOADING** (`phase_assets`): hash, deduplicate and upload assets,
//!   then bind image/thumbnail slots
//! - **RESOLVING-REFERENCES** (`phase_resolution`, `phase_persistence`):
//!   rewrite `_ref` markers, then write the compendium in one transaction
//!
//! Progress goes through the job tracker; this module never touches the
//! job record directly.

use chrono::Utc;
use dlab_common::events::EventBus;
use sqlx::SqlitePool;
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::asset_pipeline::{AssetPipelineConfig, AssetPipelineError};
use super::asset_store::AssetStore;
use super::compendium_writer::WriteError;
use super::job_tracker::{JobTracker, TrackerConfig, TrackerHandle};
use super::reference_resolver::ReferenceResolver;
use crate::archive::{ArchiveError, CompendiumArchive, ManifestError, ResolvedManifest, SourceRecord};
use crate::converters::{explicit_id, name_key, source_keys, ConversionContext, ConvertedRecord, Converter, ConverterRegistry};
use crate::db;
use crate::models::{Document, ImportIssue, ImportJob, ImportOptions, IssueCode};
use crate::utils::slugify;

mod phase_assets;
mod phase_conversion;
mod phase_persistence;
mod phase_resolution;
mod phase_validation;

/// Failures that end a job as `failed`
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("{0}")]
    Archive(#[from] ArchiveError),

    #[error("{0}")]
    Manifest(#[from] ManifestError),

    #[error("no documents were converted ({failed} records failed conversion)")]
    NoDocuments { failed: usize },

    #[error("{0}")]
    Write(#[from] WriteError),

    #[error("Import cancelled")]
    Cancelled,

    #[error("{0}")]
    Database(#[from] dlab_common::Error),

    #[error("Job tracker failed: {0}")]
    Tracker(String),
}

impl From<AssetPipelineError> for ImportError {
    fn from(err: AssetPipelineError) -> Self {
        match err {
            AssetPipelineError::Cancelled => ImportError::Cancelled,
            AssetPipelineError::Database(e) => ImportError::Database(e),
        }
    }
}

impl ImportError {
    pub fn code(&self) -> IssueCode {
        match self {
            ImportError::Archive(_) | ImportError::Manifest(_) => IssueCode::ManifestError,
            ImportError::NoDocuments { .. } => IssueCode::ConversionError,
            ImportError::Write(WriteError::Conflict { .. }) => IssueCode::CompendiumConflict,
            ImportError::Cancelled => IssueCode::Cancelled,
            ImportError::Write(_) | ImportError::Database(_) | ImportError::Tracker(_) => {
                IssueCode::PersistenceError
            }
        }
    }

    /// Message recorded as the job's terminal error
    pub fn ledger_message(&self) -> String {
        ImportIssue::critical(self.code(), None, self.to_string()).to_string()
    }
}

/// Pipeline tunables
#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    pub max_archive_bytes: u64,
    pub assets: AssetPipelineConfig,
    pub tracker: TrackerConfig,
    /// The database cancel flag is polled every this many records
    pub cancel_poll_interval: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_archive_bytes: 256 * 1024 * 1024,
            assets: AssetPipelineConfig::default(),
            tracker: TrackerConfig::default(),
            cancel_poll_interval: 25,
        }
    }
}

/// Per-job facts shared by every phase
struct JobRun {
    job_id: Uuid,
    user_id: String,
    options: ImportOptions,
    tracker: TrackerHandle,
    cancel: CancellationToken,
}

/// A loaded record and the converter that will handle it
struct PendingRecord {
    record: SourceRecord,
    converter: Arc<dyn Converter>,
}

/// Output of the VALIDATING phase
struct LoadedArchive {
    archive: CompendiumArchive,
    manifest: ResolvedManifest,
    records: Vec<PendingRecord>,
    /// Source keys of records the filter dropped
    excluded_keys: Vec<String>,
}

#[derive(Debug, Default)]
struct AssetSlots {
    image: Option<String>,
    thumbnail: Option<String>,
}

/// Converted documents held in memory until resolution and persistence
struct DocumentArena {
    compendium_id: Uuid,
    documents: Vec<Document>,
    /// Parallel to `documents`
    slots: Vec<AssetSlots>,
    resolver: ReferenceResolver,
}

impl DocumentArena {
    fn new(compendium_id: Uuid) -> Self {
        Self {
            compendium_id,
            documents: Vec::new(),
            slots: Vec::new(),
            resolver: ReferenceResolver::new(),
        }
    }

    fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Assign ids and keys; returns a duplicate-key warning if any
    fn push(&mut self, record: &SourceRecord, converted: ConvertedRecord, context: &ConversionContext) -> Option<ImportIssue> {
        let id = Uuid::new_v4();
        let explicit = explicit_id(&record.raw);
        let keys = source_keys(&record.content_type, explicit.as_deref(), Some(&converted.name));
        let source_key = keys
            .first()
            .cloned()
            .unwrap_or_else(|| name_key(&record.content_type, &converted.name));
        let duplicate = self.resolver.register(&keys, id, &converted.name);

        self.documents.push(Document {
            id,
            slug: document_slug(&converted.plugin_document_type, &converted.name, converted.source.as_deref()),
            name: converted.name,
            source_key,
            document_type: converted.document_type,
            plugin_document_type: converted.plugin_document_type,
            plugin_id: context.plugin_id.clone(),
            campaign_id: context.campaign_id.clone(),
            plugin_data: converted.plugin_data,
            compendium_id: Some(self.compendium_id),
            image_id: None,
            thumbnail_id: None,
            created_at: Utc::now(),
        });
        self.slots.push(AssetSlots {
            image: converted.image_path,
            thumbnail: converted.thumbnail_path,
        });
        duplicate
    }

    /// Every distinct archive path any slot refers to
    fn asset_paths(&self) -> BTreeSet<String> {
        self.slots
            .iter()
            .flat_map(|slots| slots.image.iter().chain(slots.thumbnail.iter()))
            .cloned()
            .collect()
    }
}

/// What a successful run hands to the tracker
struct ImportSummary {
    compendium_id: Option<Uuid>,
    documents: usize,
}

/// `{pluginDocumentType}-{slug(name)}`, suffixed with the source slug when known
pub fn document_slug(plugin_document_type: &str, name: &str, source: Option<&str>) -> String {
    let mut slug = format!("{}-{}", slugify(plugin_document_type), slugify(name));
    if let Some(source) = source.map(slugify).filter(|s| !s.is_empty()) {
        slug.push('-');
        slug.push_str(&source);
    }
    slug
}

/// "Name (file#index)" or the bare location
fn record_label(record: &SourceRecord) -> String {
    match record.display_name() {
        Some(name) => format!("{} ({})", name, record.location),
        None => record.location.clone(),
    }
}

/// Import pipeline service
#[derive(Clone)]
pub struct ImportPipeline {
    db: SqlitePool,
    event_bus: EventBus,
    registry: Arc<ConverterRegistry>,
    store: Arc<dyn AssetStore>,
    config: PipelineConfig,
}

impl ImportPipeline {
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        registry: Arc<ConverterRegistry>,
        store: Arc<dyn AssetStore>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            db,
            event_bus,
            registry,
            store,
            config,
        }
    }

    pub fn store(&self) -> &Arc<dyn AssetStore> {
        &self.store
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run `job` to a terminal state
    ///
    /// Stage failures end the job `failed` and still return `Ok`; `Err` only
    /// means the tracker task itself died.
    pub async fn run(&self, job: ImportJob, archive: Vec<u8>, cancel: CancellationToken) -> Result<ImportJob, ImportError> {
        let job_id = job.id;
        let user_id = job.user_id.clone();
        let options = job.options.clone();
        let (tracker, join) = JobTracker::spawn(job, self.db.clone(), self.event_bus.clone(), self.config.tracker);

        tracing::info!(
            job_id = %job_id,
            user_id = %user_id,
            archive_bytes = archive.len(),
            validate_only = options.validate_only,
            overwrite_existing = options.overwrite_existing,
            source_filter = %options.source_filter,
            "Starting compendium import"
        );

        let run = JobRun {
            job_id,
            user_id,
            options,
            tracker,
            cancel,
        };

        let finished = match self.execute(&run, archive).await {
            Ok(summary) => run.tracker.complete(summary.compendium_id, summary.documents).await,
            Err(e) => {
                tracing::warn!(job_id = %job_id, error = %e, "Import failed");
                run.tracker.fail(e.ledger_message()).await
            }
        };
        if let Err(e) = finished {
            tracing::error!(job_id = %job_id, error = %e, "Could not deliver terminal state to tracker");
        }
        drop(run);

        join.await.map_err(|e| ImportError::Tracker(e.to_string()))
    }

    async fn execute(&self, run: &JobRun, archive: Vec<u8>) -> Result<ImportSummary, ImportError> {
        let loaded = self.phase_validation(run, archive).await?;
        let mut arena = self.phase_conversion(run, &loaded).await?;
        self.phase_assets(run, &loaded.archive, &mut arena).await?;
        self.phase_resolution(run, &mut arena).await?;
        self.phase_persistence(run, &loaded.manifest, arena).await
    }

    /// Stop if the token fired, or if the cancel flag is set in the database
    ///
    /// The flag is polled on every `cancel_poll_interval`-th unit.
    async fn ensure_not_cancelled(&self, run: &JobRun, unit: usize) -> Result<(), ImportError> {
        if run.cancel.is_cancelled() {
            return Err(ImportError::Cancelled);
        }
        if unit % self.config.cancel_poll_interval.max(1) == 0
            && db::jobs::is_cancel_requested(&self.db, run.job_id).await?
        {
            run.cancel.cancel();
            return Err(ImportError::Cancelled);
        }
        Ok(())
    }
}
