//! Database access for dlab-ci
//!
//! One SQLite database in the root folder holds settings, import jobs,
//! compendiums, documents and the asset registry.

pub mod assets;
pub mod compendiums;
pub mod documents;
pub mod jobs;

use dlab_common::Result;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::path::Path;

/// Open (creating if needed) the service database and its tables
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // mode=rwc: read, write, create
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    init_tables(&pool).await?;
    Ok(pool)
}

/// Single-connection in-memory database, used by tests and validate-only tooling
pub async fn init_memory_pool() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    init_tables(&pool).await?;
    Ok(pool)
}

/// Create every dlab-ci table if missing
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    dlab_common::db::create_settings_table(pool).await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS import_jobs (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            status TEXT NOT NULL,
            stage TEXT NOT NULL,
            processed_items INTEGER NOT NULL DEFAULT 0,
            total_items INTEGER NOT NULL DEFAULT 0,
            current_item TEXT,
            errors TEXT NOT NULL DEFAULT '[]',
            warnings TEXT NOT NULL DEFAULT '[]',
            options TEXT NOT NULL,
            compendium_id TEXT,
            compendium_name TEXT,
            error TEXT,
            validation_results TEXT NOT NULL DEFAULT '[]',
            cancel_requested INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            completed_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_import_jobs_user ON import_jobs(user_id, created_at)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS compendiums (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            slug TEXT NOT NULL UNIQUE,
            plugin_id TEXT NOT NULL,
            version TEXT NOT NULL,
            description TEXT,
            entries_by_type TEXT NOT NULL DEFAULT '{}',
            total_entries INTEGER NOT NULL DEFAULT 0,
            imported_by TEXT NOT NULL,
            imported_at TEXT NOT NULL,
            UNIQUE(name, plugin_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            compendium_id TEXT REFERENCES compendiums(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            slug TEXT NOT NULL UNIQUE,
            source_key TEXT NOT NULL,
            document_type TEXT NOT NULL,
            plugin_document_type TEXT NOT NULL,
            plugin_id TEXT NOT NULL,
            campaign_id TEXT,
            plugin_data TEXT NOT NULL,
            image_id TEXT,
            thumbnail_id TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_compendium ON documents(compendium_id)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS assets (
            id TEXT PRIMARY KEY,
            hash TEXT NOT NULL UNIQUE,
            storage_key TEXT NOT NULL,
            public_url TEXT NOT NULL,
            mime_type TEXT NOT NULL,
            size_bytes INTEGER NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Database tables initialized (settings, import_jobs, compendiums, documents, assets)");
    Ok(())
}

/// Parse a TEXT uuid column
pub(crate) fn parse_uuid(value: &str, column: &str) -> Result<uuid::Uuid> {
    uuid::Uuid::parse_str(value)
        .map_err(|e| dlab_common::Error::Internal(format!("Invalid uuid in {}: {}", column, e)))
}

/// Parse a TEXT rfc3339 column
pub(crate) fn parse_timestamp(value: &str, column: &str) -> Result<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .map_err(|e| dlab_common::Error::Internal(format!("Failed to parse {}: {}", column, e)))
}
