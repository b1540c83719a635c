//! Batch session database operations
//!
//! Sessions are upserted after every processed file so status outlives the
//! in-memory handle.

use homevault_common::time::{parse_db_timestamp, to_db_timestamp};
use homevault_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::warn;
use uuid::Uuid;

use crate::models::{BatchSession, BatchState, FileOutcome};
use crate::utils::retry_on_lock;

const BATCH_COLUMNS: &str = "batch_id, user_id, state, total_files, files_completed, results, \
     error_message, started_at, ended_at";

/// Save batch session to database
///
/// Uses retry_on_lock to ride out transient lock contention.
pub async fn save_batch(pool: &SqlitePool, session: &BatchSession, max_wait_ms: u64) -> Result<()> {
    // Prepare all data before touching the database
    let batch_id = session.batch_id.to_string();
    let state = session.state.as_str();
    let results = serde_json::to_string(&session.results)
        .map_err(|e| Error::Internal(format!("Failed to serialize results: {}", e)))?;
    let started_at = to_db_timestamp(session.started_at);
    let ended_at = session.ended_at.map(to_db_timestamp);
    let total_files = session.total_files as i64;
    let files_completed = session.files_completed as i64;

    retry_on_lock("save_batch", max_wait_ms, || async {
        sqlx::query(
            r#"
            INSERT INTO batches (
                batch_id, user_id, state, total_files, files_completed,
                results, error_message, started_at, ended_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(batch_id) DO UPDATE SET
                state = excluded.state,
                files_completed = excluded.files_completed,
                results = excluded.results,
                error_message = excluded.error_message,
                ended_at = excluded.ended_at
            "#,
        )
        .bind(&batch_id)
        .bind(&session.user_id)
        .bind(state)
        .bind(total_files)
        .bind(files_completed)
        .bind(&results)
        .bind(&session.error_message)
        .bind(&started_at)
        .bind(&ended_at)
        .execute(pool)
        .await
        .map_err(Error::Database)?;

        Ok(())
    })
    .await
}

/// Load batch session from database
pub async fn load_batch(pool: &SqlitePool, batch_id: Uuid) -> Result<Option<BatchSession>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM batches WHERE batch_id = ?",
        BATCH_COLUMNS
    ))
    .bind(batch_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(batch_from_row).transpose()
}

/// Most recently started non-terminal batch of a user
///
/// Used to restore the progress indicator after a page reload.
pub async fn get_active_batch(pool: &SqlitePool, user_id: &str) -> Result<Option<BatchSession>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM batches
         WHERE user_id = ? AND state IN ('IDLE', 'RUNNING')
         ORDER BY started_at DESC
         LIMIT 1",
        BATCH_COLUMNS
    ))
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(batch_from_row).transpose()
}

/// Mark batches left running by a previous process as failed
///
/// Returns the number of batches cleaned up.
pub async fn cleanup_stale_batches(pool: &SqlitePool) -> Result<u64> {
    let now = to_db_timestamp(homevault_common::time::now());
    let result = sqlx::query(
        r#"
        UPDATE batches
        SET state = 'FAILED',
            error_message = 'Service restarted while batch was running',
            ended_at = ?
        WHERE state IN ('IDLE', 'RUNNING')
        "#,
    )
    .bind(&now)
    .execute(pool)
    .await?;

    let cleaned = result.rows_affected();
    if cleaned > 0 {
        warn!("Marked {} stale batch(es) as FAILED", cleaned);
    }
    Ok(cleaned)
}

fn batch_from_row(row: &SqliteRow) -> Result<BatchSession> {
    let batch_id: String = row.try_get("batch_id")?;
    let batch_id = Uuid::parse_str(&batch_id)
        .map_err(|e| Error::Internal(format!("Failed to parse batch_id: {}", e)))?;

    let state: String = row.try_get("state")?;
    let state = BatchState::parse(&state)
        .ok_or_else(|| Error::Internal(format!("Unknown batch state: {}", state)))?;

    let results: String = row.try_get("results")?;
    let results: Vec<FileOutcome> = serde_json::from_str(&results)
        .map_err(|e| Error::Internal(format!("Failed to deserialize results: {}", e)))?;

    let started_at: String = row.try_get("started_at")?;
    let ended_at: Option<String> = row.try_get("ended_at")?;

    Ok(BatchSession {
        batch_id,
        user_id: row.try_get("user_id")?,
        state,
        total_files: row.try_get::<i64, _>("total_files")?.max(0) as usize,
        files_completed: row.try_get::<i64, _>("files_completed")?.max(0) as usize,
        results,
        error_message: row.try_get("error_message")?,
        started_at: parse_db_timestamp(&started_at)?,
        ended_at: ended_at.as_deref().map(parse_db_timestamp).transpose()?,
    })
}
