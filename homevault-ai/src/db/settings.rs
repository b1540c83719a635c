//! Settings database operations
//!
//! Key-value accessors over the `settings` table.

use homevault_common::{Error, Result};
use sqlx::{Pool, Sqlite};

/// Settings key for the generative model API key
pub const MODEL_API_KEY: &str = "model_api_key";

/// Settings key for the SQLite lock retry budget
pub const MAX_LOCK_WAIT_MS: &str = "max_lock_wait_ms";

/// Default lock retry budget
pub const DEFAULT_MAX_LOCK_WAIT_MS: u64 = 5000;

/// Get the model API key from database
///
/// **Returns:** Some(key) if exists, None if not set
pub async fn get_model_api_key(db: &Pool<Sqlite>) -> Result<Option<String>> {
    get_setting::<String>(db, MODEL_API_KEY).await
}

/// Set the model API key in database
pub async fn set_model_api_key(db: &Pool<Sqlite>, key: String) -> Result<()> {
    set_setting(db, MODEL_API_KEY, key).await
}

/// Lock retry budget for contended writes
///
/// **Default:** 5000 ms
pub async fn get_max_lock_wait_ms(db: &Pool<Sqlite>) -> Result<u64> {
    get_setting(db, MAX_LOCK_WAIT_MS)
        .await
        .map(|opt| opt.unwrap_or(DEFAULT_MAX_LOCK_WAIT_MS))
}

/// Generic setting getter
pub async fn get_setting<T>(db: &Pool<Sqlite>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let row: Option<(Option<String>,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(db)
        .await
        .map_err(Error::Database)?;

    match row {
        Some((Some(value),)) => {
            let parsed = value
                .parse::<T>()
                .map_err(|e| Error::Config(format!("Parse setting '{}' failed: {}", key, e)))?;
            Ok(Some(parsed))
        }
        _ => Ok(None),
    }
}

/// Generic setting setter
pub async fn set_setting<T>(db: &Pool<Sqlite>, key: &str, value: T) -> Result<()>
where
    T: std::fmt::Display,
{
    sqlx::query(
        "INSERT INTO settings (key, value, updated_at) VALUES (?, ?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
    )
    .bind(key)
    .bind(value.to_string())
    .bind(homevault_common::time::to_db_timestamp(homevault_common::time::now()))
    .execute(db)
    .await
    .map_err(Error::Database)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn setup_test_db() -> (TempDir, Pool<Sqlite>) {
        let temp_dir = TempDir::new().unwrap();
        let pool = homevault_common::db::init_database(&temp_dir.path().join("test.db"))
            .await
            .unwrap();
        (temp_dir, pool)
    }

    #[tokio::test]
    async fn test_model_api_key_roundtrip() {
        let (_dir, db) = setup_test_db().await;

        assert_eq!(get_model_api_key(&db).await.unwrap(), None);

        set_model_api_key(&db, "key-1".to_string()).await.unwrap();
        assert_eq!(get_model_api_key(&db).await.unwrap().as_deref(), Some("key-1"));

        set_model_api_key(&db, "key-2".to_string()).await.unwrap();
        assert_eq!(get_model_api_key(&db).await.unwrap().as_deref(), Some("key-2"));
    }

    #[tokio::test]
    async fn test_max_lock_wait_default_and_override() {
        let (_dir, db) = setup_test_db().await;

        assert_eq!(get_max_lock_wait_ms(&db).await.unwrap(), DEFAULT_MAX_LOCK_WAIT_MS);

        set_setting(&db, MAX_LOCK_WAIT_MS, 1200u64).await.unwrap();
        assert_eq!(get_max_lock_wait_ms(&db).await.unwrap(), 1200);
    }

    #[tokio::test]
    async fn test_unparsable_setting_is_config_error() {
        let (_dir, db) = setup_test_db().await;

        set_setting(&db, MAX_LOCK_WAIT_MS, "soon").await.unwrap();
        let err = get_max_lock_wait_ms(&db).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
