//! Import job API handlers
//!
//! POST /compendiums/import, GET /import/jobs/:id, GET /import/jobs,
//! POST /import/jobs/:id/cancel

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::models::{ImportJob, ImportOptions, JobStatus, SourceFilter};
use crate::AppState;

/// Query parameters of POST /compendiums/import
#[derive(Debug, Deserialize)]
pub struct ImportQuery {
    pub user_id: Option<String>,
    #[serde(default)]
    pub overwrite_existing: bool,
    #[serde(default)]
    pub validate_only: bool,
    pub campaign_id: Option<String>,
    pub source_filter: Option<String>,
}

impl ImportQuery {
    fn into_parts(self) -> ApiResult<(String, ImportOptions)> {
        let user_id = self
            .user_id
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .ok_or_else(|| ApiError::BadRequest("user_id is required".to_string()))?;
        let source_filter = match self.source_filter.as_deref() {
            Some(raw) => raw.parse::<SourceFilter>().map_err(ApiError::BadRequest)?,
            None => SourceFilter::All,
        };
        let options = ImportOptions {
            overwrite_existing: self.overwrite_existing,
            validate_only: self.validate_only,
            campaign_id: self.campaign_id.filter(|c| !c.trim().is_empty()),
            source_filter,
        };
        Ok((user_id, options))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartImportResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelImportResponse {
    pub job_id: Uuid,
    pub cancel_requested: bool,
}

/// POST /compendiums/import
///
/// Accepts the zip archive as the raw body; returns 202 with the job id.
pub async fn start_import(
    State(state): State<AppState>,
    Query(query): Query<ImportQuery>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<StartImportResponse>)> {
    let (user_id, options) = query.into_parts()?;

    let limit = state.pipeline.config().max_archive_bytes;
    if body.is_empty() {
        return Err(ApiError::BadRequest("request body must be a zip archive".to_string()));
    }
    if body.len() as u64 > limit {
        return Err(ApiError::PayloadTooLarge(format!(
            "archive is {} bytes; the limit is {} bytes",
            body.len(),
            limit
        )));
    }

    let job = ImportJob::new(user_id, options);
    db::jobs::save_job(&state.db, &job, state.pipeline.config().tracker.max_lock_wait_ms).await?;

    let response = StartImportResponse {
        job_id: job.id,
        status: job.status,
        created_at: job.created_at,
    };

    let cancel_token = CancellationToken::new();
    state
        .cancellation_tokens
        .write()
        .await
        .insert(job.id, cancel_token.clone());

    tracing::info!(
        job_id = %job.id,
        user_id = %job.user_id,
        bytes = body.len(),
        "Import job accepted"
    );

    let task_state = state.clone();
    let archive = body.to_vec();
    tokio::spawn(async move {
        let job_id = job.id;
        match task_state.pipeline.run(job, archive, cancel_token).await {
            Ok(job) => {
                tracing::info!(job_id = %job_id, status = job.status.as_str(), "Background import task finished");
            }
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Background import task failed");
                *task_state.last_error.write().await = Some(format!("import {}: {}", job_id, e));
            }
        }
        task_state.cancellation_tokens.write().await.remove(&job_id);
    });

    Ok((StatusCode::ACCEPTED, Json(response)))
}

/// GET /import/jobs/:id
pub async fn get_job(State(state): State<AppState>, Path(job_id): Path<Uuid>) -> ApiResult<Json<ImportJob>> {
    let job = db::jobs::load_job(&state.db, job_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Import job not found: {}", job_id)))?;
    Ok(Json(job))
}

/// GET /import/jobs?user_id=
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<ListJobsQuery>,
) -> ApiResult<Json<Vec<ImportJob>>> {
    let user_id = query
        .user_id
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("user_id is required".to_string()))?;
    Ok(Json(db::jobs::list_jobs_for_user(&state.db, user_id.trim()).await?))
}

/// POST /import/jobs/:id/cancel
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<CancelImportResponse>)> {
    let job = db::jobs::load_job(&state.db, job_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Import job not found: {}", job_id)))?;

    if job.is_terminal() {
        return Err(ApiError::Conflict(format!(
            "Import job {} already {}",
            job_id,
            job.status.as_str()
        )));
    }

    if !db::jobs::request_cancel(&state.db, job_id).await? {
        return Err(ApiError::Conflict(format!("Import job {} already finished", job_id)));
    }
    if let Some(token) = state.cancellation_tokens.read().await.get(&job_id) {
        token.cancel();
    }

    tracing::info!(job_id = %job_id, "Import cancellation requested");
    Ok((
        StatusCode::ACCEPTED,
        Json(CancelImportResponse {
            job_id,
            cancel_requested: true,
        }),
    ))
}

pub fn import_routes() -> Router<AppState> {
    Router::new()
        .route("/compendiums/import", post(start_import))
        .route("/import/jobs", get(list_jobs))
        .route("/import/jobs/:id", get(get_job))
        .route("/import/jobs/:id/cancel", post(cancel_job))
}
