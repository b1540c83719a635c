//! Database access for homevault-ai
//!
//! Schema creation lives in `homevault_common::db`; this module holds the
//! service's queries.

pub mod assets;
pub mod batches;
pub mod settings;

use homevault_common::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Open the database and recover from an unclean shutdown
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    let pool = homevault_common::db::init_database(db_path).await?;
    batches::cleanup_stale_batches(&pool).await?;
    Ok(pool)
}
