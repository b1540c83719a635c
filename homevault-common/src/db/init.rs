//! Database initialization
//!
//! Creates the database file on first run and applies the default schema.
//! Every statement is idempotent, so opening an existing database is safe.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// SQLite busy timeout applied to every pooled connection
const BUSY_TIMEOUT_MS: u64 = 250;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .min_connections(1)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                // PRAGMAs are per connection
                sqlx::query("PRAGMA foreign_keys = ON").execute(&mut *conn).await?;
                sqlx::query(&format!("PRAGMA busy_timeout = {}", BUSY_TIMEOUT_MS))
                    .execute(&mut *conn)
                    .await?;
                Ok(())
            })
        })
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // WAL persists in the database file, one statement is enough
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;

    create_settings_table(&pool).await?;
    create_assets_table(&pool).await?;
    create_batches_table(&pool).await?;

    Ok(pool)
}

async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_assets_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS assets (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            name TEXT NOT NULL,
            category TEXT NOT NULL DEFAULT 'other',
            brand TEXT,
            model TEXT,
            serial TEXT,
            condition TEXT NOT NULL DEFAULT 'good',
            value_amount REAL NOT NULL DEFAULT 0 CHECK (value_amount >= 0),
            value_currency TEXT NOT NULL DEFAULT 'USD',
            description TEXT NOT NULL DEFAULT '',
            confidence REAL NOT NULL DEFAULT 0.5 CHECK (confidence >= 0 AND confidence <= 1),
            room TEXT,
            image_url TEXT NOT NULL DEFAULT '',
            image_path TEXT,
            content_key TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_assets_user_created ON assets(user_id, created_at)",
    )
    .execute(pool)
    .await?;

    // NULL content keys never collide, so records without one are unaffected
    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_assets_user_content_key ON assets(user_id, content_key)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_batches_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS batches (
            batch_id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            state TEXT NOT NULL CHECK (state IN ('IDLE', 'RUNNING', 'COMPLETED', 'FAILED')),
            total_files INTEGER NOT NULL DEFAULT 0,
            files_completed INTEGER NOT NULL DEFAULT 0,
            results TEXT NOT NULL DEFAULT '[]',
            error_message TEXT,
            started_at TEXT NOT NULL,
            ended_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_batches_user_state ON batches(user_id, state)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn table_exists(pool: &SqlitePool, name: &str) -> bool {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?)",
        )
        .bind(name)
        .fetch_one(pool)
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_init_creates_all_tables() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("homevault.db");

        let pool = init_database(&db_path).await.unwrap();

        assert!(db_path.exists());
        for table in ["settings", "assets", "batches"] {
            assert!(table_exists(&pool, table).await, "missing table {}", table);
        }
    }

    #[tokio::test]
    async fn test_init_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("homevault.db");

        let pool = init_database(&db_path).await.unwrap();
        sqlx::query("INSERT INTO settings (key, value) VALUES ('k', 'v')")
            .execute(&pool)
            .await
            .unwrap();
        pool.close().await;

        let pool = init_database(&db_path).await.unwrap();
        let value: String = sqlx::query_scalar("SELECT value FROM settings WHERE key = 'k'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(value, "v");
    }

    #[tokio::test]
    async fn test_content_key_unique_per_user() {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_database(&temp_dir.path().join("homevault.db"))
            .await
            .unwrap();

        let insert = |id: &'static str, user: &'static str| {
            sqlx::query(
                "INSERT INTO assets (id, user_id, name, content_key, created_at, updated_at)
                 VALUES (?, ?, 'Lamp', 'abc', '2024-01-01T00:00:00.000000Z', '2024-01-01T00:00:00.000000Z')",
            )
            .bind(id)
            .bind(user)
        };

        insert("a1", "u1").execute(&pool).await.unwrap();
        insert("a2", "u2").execute(&pool).await.unwrap();
        assert!(insert("a3", "u1").execute(&pool).await.is_err());
    }
}
