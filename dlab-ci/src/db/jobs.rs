//! Import job persistence

use dlab_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::{parse_timestamp, parse_uuid};
use crate::models::{ImportJob, ImportProgress, ImportStage, JobStatus};
use crate::utils::retry_on_lock;

const JOB_COLUMNS: &str = r#"
    id, user_id, status, stage, processed_items, total_items, current_item,
    errors, warnings, options, compendium_id, compendium_name, error,
    validation_results, created_at, updated_at, completed_at
"#;

/// Insert or update a job
///
/// `cancel_requested` is owned by [`request_cancel`] and never overwritten here.
pub async fn save_job(pool: &SqlitePool, job: &ImportJob, max_wait_ms: u64) -> Result<()> {
    // Serialize before touching the database
    let id = job.id.to_string();
    let status = job.status.as_str();
    let stage = job.progress.stage.as_str();
    let processed = job.progress.processed_items as i64;
    let total = job.progress.total_items as i64;
    let errors = serde_json::to_string(&job.progress.errors)?;
    let warnings = serde_json::to_string(&job.progress.warnings)?;
    let options = serde_json::to_string(&job.options)?;
    let validation_results = serde_json::to_string(&job.validation_results)?;
    let compendium_id = job.compendium_id.map(|id| id.to_string());
    let created_at = job.created_at.to_rfc3339();
    let updated_at = job.updated_at.to_rfc3339();
    let completed_at = job.completed_at.map(|dt| dt.to_rfc3339());

    retry_on_lock("save_job", max_wait_ms, || async {
        sqlx::query(
            r#"
            INSERT INTO import_jobs (
                id, user_id, status, stage, processed_items, total_items, current_item,
                errors, warnings, options, compendium_id, compendium_name, error,
                validation_results, created_at, updated_at, completed_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                stage = excluded.stage,
                processed_items = excluded.processed_items,
                total_items = excluded.total_items,
                current_item = excluded.current_item,
                errors = excluded.errors,
                warnings = excluded.warnings,
                compendium_id = excluded.compendium_id,
                compendium_name = excluded.compendium_name,
                error = excluded.error,
                validation_results = excluded.validation_results,
                updated_at = excluded.updated_at,
                completed_at = excluded.completed_at
            "#,
        )
        .bind(&id)
        .bind(&job.user_id)
        .bind(status)
        .bind(stage)
        .bind(processed)
        .bind(total)
        .bind(&job.progress.current_item)
        .bind(&errors)
        .bind(&warnings)
        .bind(&options)
        .bind(&compendium_id)
        .bind(&job.compendium_name)
        .bind(&job.error)
        .bind(&validation_results)
        .bind(&created_at)
        .bind(&updated_at)
        .bind(&completed_at)
        .execute(pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    })
    .await
}

pub async fn load_job(pool: &SqlitePool, job_id: Uuid) -> Result<Option<ImportJob>> {
    let row = sqlx::query(&format!("SELECT {} FROM import_jobs WHERE id = ?", JOB_COLUMNS))
        .bind(job_id.to_string())
        .fetch_optional(pool)
        .await?;

    row.map(|row| job_from_row(&row)).transpose()
}

/// A user's jobs, newest first
pub async fn list_jobs_for_user(pool: &SqlitePool, user_id: &str) -> Result<Vec<ImportJob>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM import_jobs WHERE user_id = ? ORDER BY created_at DESC",
        JOB_COLUMNS
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(job_from_row).collect()
}

/// Flag a job for cancellation; returns false when the job is unknown or already finished
pub async fn request_cancel(pool: &SqlitePool, job_id: Uuid) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE import_jobs SET cancel_requested = 1
        WHERE id = ? AND status IN ('pending', 'processing')
        "#,
    )
    .bind(job_id.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn is_cancel_requested(pool: &SqlitePool, job_id: Uuid) -> Result<bool> {
    let flag: Option<i64> = sqlx::query_scalar("SELECT cancel_requested FROM import_jobs WHERE id = ?")
        .bind(job_id.to_string())
        .fetch_optional(pool)
        .await?;
    Ok(flag.unwrap_or(0) != 0)
}

/// Fail jobs a previous process left unfinished
pub async fn mark_stale_jobs_failed(pool: &SqlitePool, max_wait_ms: u64) -> Result<u64> {
    let ids: Vec<String> =
        sqlx::query_scalar("SELECT id FROM import_jobs WHERE status IN ('pending', 'processing')")
            .fetch_all(pool)
            .await?;

    let mut marked = 0;
    for id in ids {
        let Some(mut job) = load_job(pool, parse_uuid(&id, "import_jobs.id")?).await? else {
            continue;
        };
        job.fail("Import interrupted: service restarted");
        save_job(pool, &job, max_wait_ms).await?;
        marked += 1;
    }
    Ok(marked)
}

fn job_from_row(row: &SqliteRow) -> Result<ImportJob> {
    let id: String = row.get("id");
    let status: String = row.get("status");
    let stage: String = row.get("stage");
    let errors: String = row.get("errors");
    let warnings: String = row.get("warnings");
    let options: String = row.get("options");
    let validation_results: String = row.get("validation_results");
    let compendium_id: Option<String> = row.get("compendium_id");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");
    let completed_at: Option<String> = row.get("completed_at");

    let status: JobStatus = serde_json::from_value(serde_json::Value::String(status))?;
    let stage: ImportStage = serde_json::from_value(serde_json::Value::String(stage))?;

    Ok(ImportJob {
        id: parse_uuid(&id, "import_jobs.id")?,
        user_id: row.get("user_id"),
        status,
        progress: ImportProgress {
            stage,
            processed_items: row.get::<i64, _>("processed_items") as usize,
            total_items: row.get::<i64, _>("total_items") as usize,
            current_item: row.get("current_item"),
            errors: serde_json::from_str(&errors)?,
            warnings: serde_json::from_str(&warnings)?,
        },
        compendium_id: compendium_id
            .as_deref()
            .map(|id| parse_uuid(id, "import_jobs.compendium_id"))
            .transpose()?,
        compendium_name: row.get("compendium_name"),
        error: row.get("error"),
        options: serde_json::from_str(&options)?,
        validation_results: serde_json::from_str(&validation_results)?,
        created_at: parse_timestamp(&created_at, "created_at")?,
        updated_at: parse_timestamp(&updated_at, "updated_at")?,
        completed_at: completed_at
            .as_deref()
            .map(|ts| parse_timestamp(ts, "completed_at"))
            .transpose()?,
    })
}
