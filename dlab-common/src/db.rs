//! Settings table helpers shared by services
//!
//! Runtime settings are stored as TEXT key/value pairs. A missing row and a
//! NULL value are treated the same way: the caller's default applies.

use crate::Result;
use sqlx::SqlitePool;
use std::str::FromStr;

/// Create the settings table if it does not exist
pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Read a raw setting value
pub async fn get_setting(pool: &SqlitePool, key: &str) -> Result<Option<String>> {
    let value: Option<Option<String>> =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(pool)
            .await?;

    Ok(value.flatten())
}

/// Read a setting and parse it; unparseable values are logged and ignored
pub async fn get_parsed_setting<T: FromStr>(pool: &SqlitePool, key: &str) -> Result<Option<T>> {
    let Some(raw) = get_setting(pool, key).await? else {
        return Ok(None);
    };

    match raw.trim().parse::<T>() {
        Ok(value) => Ok(Some(value)),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Ignoring unparseable setting");
            Ok(None)
        }
    }
}

/// Insert or replace a setting value
pub async fn set_setting(pool: &SqlitePool, key: &str, value: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO settings (key, value, updated_at) VALUES (?, ?, CURRENT_TIMESTAMP)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        create_settings_table(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_setting_roundtrip_and_overwrite() {
        let pool = setup().await;

        assert_eq!(get_setting(&pool, "ci_upload_concurrency").await.unwrap(), None);

        set_setting(&pool, "ci_upload_concurrency", "4").await.unwrap();
        set_setting(&pool, "ci_upload_concurrency", "8").await.unwrap();

        let value: Option<usize> = get_parsed_setting(&pool, "ci_upload_concurrency")
            .await
            .unwrap();
        assert_eq!(value, Some(8));
    }

    #[tokio::test]
    async fn test_unparseable_setting_is_none() {
        let pool = setup().await;
        set_setting(&pool, "ci_upload_max_attempts", "lots").await.unwrap();

        let value: Option<u32> = get_parsed_setting(&pool, "ci_upload_max_attempts")
            .await
            .unwrap();
        assert_eq!(value, None);
    }

    #[tokio::test]
    async fn test_null_value_is_none() {
        let pool = setup().await;
        sqlx::query("INSERT INTO settings (key, value) VALUES ('k', NULL)")
            .execute(&pool)
            .await
            .unwrap();

        assert_eq!(get_setting(&pool, "k").await.unwrap(), None);
    }
}
