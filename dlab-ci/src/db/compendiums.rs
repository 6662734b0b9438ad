//! Compendium records

use dlab_common::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::{parse_timestamp, parse_uuid};
use crate::models::Compendium;

/// Ids of compendiums that collide with `slug` or `(name, plugin_id)`
pub async fn find_conflicting(conn: &mut SqliteConnection, slug: &str, name: &str, plugin_id: &str) -> Result<Vec<Uuid>> {
    let ids: Vec<String> = sqlx::query_scalar(
        "SELECT id FROM compendiums WHERE slug = ? OR (name = ? AND plugin_id = ?)",
    )
    .bind(slug)
    .bind(name)
    .bind(plugin_id)
    .fetch_all(&mut *conn)
    .await?;

    ids.iter().map(|id| parse_uuid(id, "compendiums.id")).collect()
}

pub async fn insert(conn: &mut SqliteConnection, compendium: &Compendium) -> Result<()> {
    let entries_by_type = serde_json::to_string(&compendium.entries_by_type)?;
    sqlx::query(
        r#"
        INSERT INTO compendiums (
            id, name, slug, plugin_id, version, description,
            entries_by_type, total_entries, imported_by, imported_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(compendium.id.to_string())
    .bind(&compendium.name)
    .bind(&compendium.slug)
    .bind(&compendium.plugin_id)
    .bind(&compendium.version)
    .bind(&compendium.description)
    .bind(&entries_by_type)
    .bind(compendium.total_entries as i64)
    .bind(&compendium.imported_by)
    .bind(compendium.imported_at.to_rfc3339())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn update_statistics(
    conn: &mut SqliteConnection,
    compendium_id: Uuid,
    entries_by_type: &BTreeMap<String, usize>,
    total_entries: usize,
) -> Result<()> {
    sqlx::query("UPDATE compendiums SET entries_by_type = ?, total_entries = ? WHERE id = ?")
        .bind(serde_json::to_string(entries_by_type)?)
        .bind(total_entries as i64)
        .bind(compendium_id.to_string())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Delete a compendium and every document in it
pub async fn delete(conn: &mut SqliteConnection, compendium_id: Uuid) -> Result<()> {
    let id = compendium_id.to_string();
    sqlx::query("DELETE FROM documents WHERE compendium_id = ?")
        .bind(&id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM compendiums WHERE id = ?")
        .bind(&id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn get(pool: &SqlitePool, compendium_id: Uuid) -> Result<Option<Compendium>> {
    let row = sqlx::query(
        r#"
        SELECT id, name, slug, plugin_id, version, description,
               entries_by_type, total_entries, imported_by, imported_at
        FROM compendiums WHERE id = ?
        "#,
    )
    .bind(compendium_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.map(|row| compendium_from_row(&row)).transpose()
}

pub async fn count(pool: &SqlitePool) -> Result<i64> {
    Ok(sqlx::query_scalar("SELECT COUNT(*) FROM compendiums").fetch_one(pool).await?)
}

fn compendium_from_row(row: &SqliteRow) -> Result<Compendium> {
    let id: String = row.get("id");
    let entries_by_type: String = row.get("entries_by_type");
    let imported_at: String = row.get("imported_at");

    Ok(Compendium {
        id: parse_uuid(&id, "compendiums.id")?,
        name: row.get("name"),
        slug: row.get("slug"),
        plugin_id: row.get("plugin_id"),
        version: row.get("version"),
        description: row.get("description"),
        entries_by_type: serde_json::from_str(&entries_by_type)?,
        total_entries: row.get::<i64, _>("total_entries") as usize,
        imported_by: row.get("imported_by"),
        imported_at: parse_timestamp(&imported_at, "imported_at")?,
    })
}
