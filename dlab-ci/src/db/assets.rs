//! Content-addressed asset registry

use dlab_common::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::{parse_timestamp, parse_uuid};
use crate::models::StoredAsset;

pub async fn find_by_hash(pool: &SqlitePool, hash: &str) -> Result<Option<StoredAsset>> {
    let row = sqlx::query(
        r#"
        SELECT id, hash, storage_key, public_url, mime_type, size_bytes, created_at
        FROM assets WHERE hash = ?
        "#,
    )
    .bind(hash)
    .fetch_optional(pool)
    .await?;

    row.map(|row| asset_from_row(&row)).transpose()
}

/// Register an asset, or return the row another job registered for the same hash
pub async fn insert_or_get(pool: &SqlitePool, asset: &StoredAsset) -> Result<StoredAsset> {
    sqlx::query(
        r#"
        INSERT OR IGNORE INTO assets (id, hash, storage_key, public_url, mime_type, size_bytes, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(asset.id.to_string())
    .bind(&asset.hash)
    .bind(&asset.storage_key)
    .bind(&asset.public_url)
    .bind(&asset.mime_type)
    .bind(asset.size_bytes as i64)
    .bind(asset.created_at.to_rfc3339())
    .execute(pool)
    .await?;

    find_by_hash(pool, &asset.hash)
        .await?
        .ok_or_else(|| dlab_common::Error::Internal(format!("Asset {} vanished after insert", asset.hash)))
}

pub async fn count(pool: &SqlitePool) -> Result<i64> {
    Ok(sqlx::query_scalar("SELECT COUNT(*) FROM assets").fetch_one(pool).await?)
}

fn asset_from_row(row: &SqliteRow) -> Result<StoredAsset> {
    let id: String = row.get("id");
    let created_at: String = row.get("created_at");
    Ok(StoredAsset {
        id: parse_uuid(&id, "assets.id")?,
        hash: row.get("hash"),
        storage_key: row.get("storage_key"),
        public_url: row.get("public_url"),
        mime_type: row.get("mime_type"),
        size_bytes: row.get::<i64, _>("size_bytes") as u64,
        created_at: parse_timestamp(&created_at, "created_at")?,
    })
}
