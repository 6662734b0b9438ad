//! Test Helper Utilities
//!
//! Shared utilities for dlab-ci integration tests

#![allow(dead_code)]

pub mod archive_builder;
pub mod db_utils;
pub mod fixtures;
pub mod memory_store;

pub use archive_builder::{manifest, png, ArchiveBuilder};
pub use db_utils::create_test_db;
pub use memory_store::MemoryAssetStore;

use dlab_ci::converters::ConverterRegistry;
use dlab_ci::models::{ImportJob, ImportOptions};
use dlab_ci::services::{ImportPipeline, PipelineConfig};
use dlab_ci::utils::RetryPolicy;
use dlab_common::events::EventBus;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Pipeline config with millisecond backoff so retry tests stay fast
pub fn test_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.assets.retry = RetryPolicy::new(3, 1);
    config.tracker.persist_interval = 1;
    config
}

pub fn test_pipeline(db: SqlitePool, store: Arc<MemoryAssetStore>, event_bus: EventBus) -> ImportPipeline {
    ImportPipeline::new(
        db,
        event_bus,
        Arc::new(ConverterRegistry::with_builtin()),
        store,
        test_config(),
    )
}

/// Run one import to its terminal state
pub async fn run_import(pipeline: &ImportPipeline, options: ImportOptions, archive: Vec<u8>) -> ImportJob {
    pipeline
        .run(ImportJob::new("user-1", options), archive, CancellationToken::new())
        .await
        .expect("tracker task should not die")
}
