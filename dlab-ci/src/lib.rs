//! dlab-ci library interface
//!
//! Compendium import service: archive reading, type conversion, asset
//! upload, reference resolution and persistence, behind an axum API.

pub mod api;
pub mod archive;
pub mod config;
pub mod converters;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use crate::error::{ApiError, ApiResult};

use axum::extract::DefaultBodyLimit;
use axum::Router;
use chrono::{DateTime, Utc};
use dlab_common::events::EventBus;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::services::ImportPipeline;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    pub pipeline: ImportPipeline,
    /// Cancellation tokens for running import jobs
    pub cancellation_tokens: Arc<RwLock<HashMap<Uuid, CancellationToken>>>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last background failure, reported by /health
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(db: SqlitePool, event_bus: EventBus, pipeline: ImportPipeline) -> Self {
        Self {
            db,
            event_bus,
            pipeline,
            cancellation_tokens: Arc::new(RwLock::new(HashMap::new())),
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    // Archives arrive as the raw body; allow one byte past the limit so the
    // handler can tell "too large" apart from "exactly at the limit"
    let body_limit = usize::try_from(state.pipeline.config().max_archive_bytes)
        .unwrap_or(usize::MAX)
        .saturating_add(1);

    Router::new()
        .merge(api::import_routes().layer(DefaultBodyLimit::max(body_limit)))
        .merge(api::compendium_routes())
        .route("/import/events", get(api::import_event_stream))
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
