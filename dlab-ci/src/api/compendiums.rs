//! Compendium lookup
//!
//! GET /compendiums/:id, GET /compendiums/:id/documents

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use uuid::Uuid;

use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::models::{Compendium, Document};
use crate::AppState;

pub async fn get_compendium(
    State(state): State<AppState>,
    Path(compendium_id): Path<Uuid>,
) -> ApiResult<Json<Compendium>> {
    let compendium = db::compendiums::get(&state.db, compendium_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Compendium not found: {}", compendium_id)))?;
    Ok(Json(compendium))
}

pub async fn list_documents(
    State(state): State<AppState>,
    Path(compendium_id): Path<Uuid>,
) -> ApiResult<Json<Vec<Document>>> {
    if db::compendiums::get(&state.db, compendium_id).await?.is_none() {
        return Err(ApiError::NotFound(format!("Compendium not found: {}", compendium_id)));
    }
    Ok(Json(db::documents::list_by_compendium(&state.db, compendium_id).await?))
}

pub fn compendium_routes() -> Router<AppState> {
    Router::new()
        .route("/compendiums/:id", get(get_compendium))
        .route("/compendiums/:id/documents", get(list_documents))
}
