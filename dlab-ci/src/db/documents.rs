//! Document rows

use dlab_common::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};
use std::collections::{BTreeMap, HashSet};
use uuid::Uuid;

use super::{parse_timestamp, parse_uuid};
use crate::models::{Document, DocumentType};

/// Insert one document; unique violations surface as `Error::Database`
pub async fn insert(conn: &mut SqliteConnection, document: &Document) -> Result<()> {
    let plugin_data = serde_json::to_string(&document.plugin_data)?;
    sqlx::query(
        r#"
        INSERT INTO documents (
            id, compendium_id, name, slug, source_key, document_type,
            plugin_document_type, plugin_id, campaign_id, plugin_data,
            image_id, thumbnail_id, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(document.id.to_string())
    .bind(document.compendium_id.map(|id| id.to_string()))
    .bind(&document.name)
    .bind(&document.slug)
    .bind(&document.source_key)
    .bind(document.document_type.as_str())
    .bind(&document.plugin_document_type)
    .bind(&document.plugin_id)
    .bind(&document.campaign_id)
    .bind(&plugin_data)
    .bind(document.image_id.map(|id| id.to_string()))
    .bind(document.thumbnail_id.map(|id| id.to_string()))
    .bind(document.created_at.to_rfc3339())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Remove whichever document currently owns `slug`
pub async fn delete_by_slug(conn: &mut SqliteConnection, slug: &str) -> Result<u64> {
    let result = sqlx::query("DELETE FROM documents WHERE slug = ?")
        .bind(slug)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

/// Compendium that holds the document with `slug`, if any
pub async fn owner_of_slug(conn: &mut SqliteConnection, slug: &str) -> Result<Option<Uuid>> {
    let owner: Option<Option<String>> = sqlx::query_scalar("SELECT compendium_id FROM documents WHERE slug = ?")
        .bind(slug)
        .fetch_optional(&mut *conn)
        .await?;

    owner
        .flatten()
        .map(|id| parse_uuid(&id, "documents.compendium_id"))
        .transpose()
}

/// Document count per plugin document type within one compendium
pub async fn type_counts(conn: &mut SqliteConnection, compendium_id: Uuid) -> Result<BTreeMap<String, usize>> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        "SELECT plugin_document_type, COUNT(*) FROM documents WHERE compendium_id = ? GROUP BY plugin_document_type",
    )
    .bind(compendium_id.to_string())
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows.into_iter().map(|(kind, n)| (kind, n as usize)).collect())
}

/// Which of `slugs` are already taken
pub async fn existing_slugs(pool: &SqlitePool, slugs: &[&str]) -> Result<HashSet<String>> {
    let mut taken = HashSet::new();
    for chunk in slugs.chunks(500) {
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT slug FROM documents WHERE slug IN (");
        let mut separated = query.separated(", ");
        for slug in chunk {
            separated.push_bind(*slug);
        }
        separated.push_unseparated(")");

        let found: Vec<String> = query.build_query_scalar().fetch_all(pool).await?;
        taken.extend(found);
    }
    Ok(taken)
}

pub async fn list_by_compendium(pool: &SqlitePool, compendium_id: Uuid) -> Result<Vec<Document>> {
    let rows = sqlx::query(
        r#"
        SELECT id, compendium_id, name, slug, source_key, document_type,
               plugin_document_type, plugin_id, campaign_id, plugin_data,
               image_id, thumbnail_id, created_at
        FROM documents WHERE compendium_id = ?
        ORDER BY plugin_document_type, name
        "#,
    )
    .bind(compendium_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(document_from_row).collect()
}

pub async fn count(pool: &SqlitePool) -> Result<i64> {
    Ok(sqlx::query_scalar("SELECT COUNT(*) FROM documents").fetch_one(pool).await?)
}

fn document_from_row(row: &SqliteRow) -> Result<Document> {
    let id: String = row.get("id");
    let compendium_id: Option<String> = row.get("compendium_id");
    let document_type: String = row.get("document_type");
    let plugin_data: String = row.get("plugin_data");
    let image_id: Option<String> = row.get("image_id");
    let thumbnail_id: Option<String> = row.get("thumbnail_id");
    let created_at: String = row.get("created_at");

    let optional_uuid = |value: Option<String>, column: &str| -> Result<Option<Uuid>> {
        value.as_deref().map(|v| parse_uuid(v, column)).transpose()
    };

    Ok(Document {
        id: parse_uuid(&id, "documents.id")?,
        name: row.get("name"),
        slug: row.get("slug"),
        source_key: row.get("source_key"),
        document_type: document_type
            .parse::<DocumentType>()
            .map_err(dlab_common::Error::Internal)?,
        plugin_document_type: row.get("plugin_document_type"),
        plugin_id: row.get("plugin_id"),
        campaign_id: row.get("campaign_id"),
        plugin_data: serde_json::from_str(&plugin_data)?,
        compendium_id: optional_uuid(compendium_id, "documents.compendium_id")?,
        image_id: optional_uuid(image_id, "documents.image_id")?,
        thumbnail_id: optional_uuid(thumbnail_id, "documents.thumbnail_id")?,
        created_at: parse_timestamp(&created_at, "created_at")?,
    })
}
