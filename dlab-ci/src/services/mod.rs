//! Import services

pub mod asset_pipeline;
pub mod asset_store;
pub mod compendium_writer;
pub mod import_pipeline;
pub mod job_tracker;
pub mod reference_resolver;

pub use asset_pipeline::{AssetPipeline, AssetPipelineConfig, AssetPipelineOutcome};
pub use asset_store::{AssetStore, HttpAssetStore, LocalAssetStore, StorageError};
pub use compendium_writer::{write_compendium, WriteError, WriteOutcome};
pub use import_pipeline::{ImportError, ImportPipeline, PipelineConfig};
pub use job_tracker::{JobTracker, TrackerConfig, TrackerHandle};
pub use reference_resolver::{ReferenceResolver, ResolutionReport};
