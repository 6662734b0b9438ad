//! Database Test Utilities

use sqlx::SqlitePool;
use tempfile::TempDir;

/// Temp-file database with every dlab-ci table
///
/// Returns (TempDir, SqlitePool); keep the TempDir alive for the test.
pub async fn create_test_db() -> (TempDir, SqlitePool) {
    let temp_dir = TempDir::new().unwrap();
    let pool = dlab_ci::db::init_database_pool(&temp_dir.path().join("dlab.db"))
        .await
        .unwrap();
    (temp_dir, pool)
}

pub async fn table_count(pool: &SqlitePool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await
        .unwrap()
}
