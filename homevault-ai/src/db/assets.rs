//! Asset record database operations
//!
//! Every query is scoped by `user_id`; a lookup with the wrong user behaves
//! exactly like a missing record.

use chrono::{DateTime, Duration, Utc};
use homevault_common::time::{now, parse_db_timestamp, to_db_timestamp};
use homevault_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqliteConnection, SqlitePool, Transaction};
use tracing::debug;
use uuid::Uuid;

use crate::models::{Asset, AssetUpdate, Category, Condition, EstimatedValue};

const ASSET_COLUMNS: &str = "id, user_id, name, category, brand, model, serial, condition, \
     value_amount, value_currency, description, confidence, room, image_url, image_path, \
     content_key, created_at, updated_at";

/// Near-duplicate suppression rule
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DuplicateWindow {
    /// How far back a previous record counts
    pub window: Duration,
    /// Maximum absolute value difference (inclusive)
    pub value_tolerance: f64,
}

impl Default for DuplicateWindow {
    fn default() -> Self {
        Self {
            window: Duration::minutes(5),
            value_tolerance: 10.0,
        }
    }
}

/// Result of a save
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveOutcome {
    pub asset_id: Uuid,
    /// True when an existing record was matched instead of inserting
    pub duplicate: bool,
}

/// Next `updated_at`: now, but strictly after the previous value
pub fn next_updated_at(previous: DateTime<Utc>) -> DateTime<Utc> {
    now().max(previous + Duration::microseconds(1))
}

/// Insert a new record unless it duplicates an existing one
///
/// The content-key lookup, the near-duplicate probe and the insert run in a
/// single `BEGIN IMMEDIATE` transaction, so two concurrent saves of the same
/// item cannot both insert.
pub async fn insert_unless_duplicate(
    pool: &SqlitePool,
    asset: &Asset,
    rule: &DuplicateWindow,
) -> Result<SaveOutcome> {
    let mut tx = begin_immediate(pool).await?;
    let outcome = insert_in_transaction(&mut tx, asset, rule).await?;
    tx.commit().await?;
    Ok(outcome)
}

async fn insert_in_transaction(
    conn: &mut SqliteConnection,
    asset: &Asset,
    rule: &DuplicateWindow,
) -> Result<SaveOutcome> {
    if let Some(key) = &asset.content_key {
        let existing: Option<String> =
            sqlx::query_scalar("SELECT id FROM assets WHERE user_id = ? AND content_key = ?")
                .bind(&asset.user_id)
                .bind(key)
                .fetch_optional(&mut *conn)
                .await?;

        if let Some(id) = existing {
            debug!(user_id = %asset.user_id, asset_id = %id, "Duplicate image content");
            return Ok(SaveOutcome {
                asset_id: parse_uuid(&id)?,
                duplicate: true,
            });
        }
    }

    let cutoff = to_db_timestamp(asset.created_at - rule.window);
    let near: Option<String> = sqlx::query_scalar(
        r#"
        SELECT id FROM assets
        WHERE user_id = ? AND name = ? AND category = ?
          AND created_at >= ?
          AND ABS(value_amount - ?) <= ?
        ORDER BY created_at DESC
        LIMIT 1
        "#,
    )
    .bind(&asset.user_id)
    .bind(&asset.name)
    .bind(asset.category.as_str())
    .bind(&cutoff)
    .bind(asset.estimated_value.amount)
    .bind(rule.value_tolerance + f64::EPSILON)
    .fetch_optional(&mut *conn)
    .await?;

    if let Some(id) = near {
        debug!(
            user_id = %asset.user_id,
            asset_id = %id,
            name = %asset.name,
            "Near-duplicate within window"
        );
        return Ok(SaveOutcome {
            asset_id: parse_uuid(&id)?,
            duplicate: true,
        });
    }

    write_asset(conn, asset).await?;

    Ok(SaveOutcome {
        asset_id: asset.id,
        duplicate: false,
    })
}

async fn write_asset(conn: &mut SqliteConnection, asset: &Asset) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO assets (
            id, user_id, name, category, brand, model, serial, condition,
            value_amount, value_currency, description, confidence, room,
            image_url, image_path, content_key, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            category = excluded.category,
            brand = excluded.brand,
            model = excluded.model,
            serial = excluded.serial,
            condition = excluded.condition,
            value_amount = excluded.value_amount,
            value_currency = excluded.value_currency,
            description = excluded.description,
            room = excluded.room,
            image_url = excluded.image_url,
            image_path = excluded.image_path,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(asset.id.to_string())
    .bind(&asset.user_id)
    .bind(&asset.name)
    .bind(asset.category.as_str())
    .bind(&asset.brand)
    .bind(&asset.model)
    .bind(&asset.serial)
    .bind(asset.condition.as_str())
    .bind(asset.estimated_value.amount)
    .bind(&asset.estimated_value.currency)
    .bind(&asset.description)
    .bind(asset.confidence)
    .bind(&asset.room)
    .bind(&asset.image_url)
    .bind(&asset.image_path)
    .bind(&asset.content_key)
    .bind(to_db_timestamp(asset.created_at))
    .bind(to_db_timestamp(asset.updated_at))
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Load one record
pub async fn get_asset(pool: &SqlitePool, user_id: &str, asset_id: Uuid) -> Result<Option<Asset>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM assets WHERE id = ? AND user_id = ?",
        ASSET_COLUMNS
    ))
    .bind(asset_id.to_string())
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(asset_from_row).transpose()
}

/// All records of a user, newest first
pub async fn list_assets(pool: &SqlitePool, user_id: &str) -> Result<Vec<Asset>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM assets WHERE user_id = ? ORDER BY created_at DESC, id DESC",
        ASSET_COLUMNS
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(asset_from_row).collect()
}

/// Record count and summed value
pub async fn inventory_totals(pool: &SqlitePool, user_id: &str) -> Result<(usize, f64)> {
    let (count, total): (i64, f64) = sqlx::query_as(
        "SELECT COUNT(*), COALESCE(SUM(value_amount), 0.0) FROM assets WHERE user_id = ?",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    Ok((count.max(0) as usize, total))
}

/// Merge a partial edit, returning the updated record
pub async fn update_asset(
    pool: &SqlitePool,
    user_id: &str,
    asset_id: Uuid,
    update: &AssetUpdate,
) -> Result<Asset> {
    let mut tx = begin_immediate(pool).await?;
    let mut asset = load_for_write(&mut tx, user_id, asset_id).await?;
    asset.apply(update);
    asset.updated_at = next_updated_at(asset.updated_at);
    write_asset(&mut tx, &asset).await?;
    tx.commit().await?;
    Ok(asset)
}

/// Set the stored image of a record, returning the updated record and the
/// blob path it replaced (if any)
pub async fn set_image(
    pool: &SqlitePool,
    user_id: &str,
    asset_id: Uuid,
    image_url: &str,
    image_path: &str,
) -> Result<(Asset, Option<String>)> {
    let mut tx = begin_immediate(pool).await?;
    let mut asset = load_for_write(&mut tx, user_id, asset_id).await?;
    let previous = asset
        .image_path
        .replace(image_path.to_string())
        .filter(|p| p != image_path);
    asset.image_url = image_url.to_string();
    asset.updated_at = next_updated_at(asset.updated_at);
    write_asset(&mut tx, &asset).await?;
    tx.commit().await?;
    Ok((asset, previous))
}

/// Delete a record, returning what was deleted
pub async fn delete_asset(pool: &SqlitePool, user_id: &str, asset_id: Uuid) -> Result<Asset> {
    let mut tx = begin_immediate(pool).await?;
    let asset = load_for_write(&mut tx, user_id, asset_id).await?;
    sqlx::query("DELETE FROM assets WHERE id = ? AND user_id = ?")
        .bind(asset_id.to_string())
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(asset)
}

async fn load_for_write(
    conn: &mut SqliteConnection,
    user_id: &str,
    asset_id: Uuid,
) -> Result<Asset> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM assets WHERE id = ? AND user_id = ?",
        ASSET_COLUMNS
    ))
    .bind(asset_id.to_string())
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await?;

    match row {
        Some(row) => asset_from_row(&row),
        None => Err(Error::NotFound(format!("Asset not found: {}", asset_id))),
    }
}

/// Write transaction holding the database write lock from the start
///
/// Dropping it without `commit` (an error path or a cancelled future) rolls
/// back before the connection is reused.
async fn begin_immediate(pool: &SqlitePool) -> Result<Transaction<'static, Sqlite>> {
    Ok(pool.begin_with("BEGIN IMMEDIATE").await?)
}

fn parse_uuid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value)
        .map_err(|e| Error::Internal(format!("Failed to parse asset id '{}': {}", value, e)))
}

fn asset_from_row(row: &SqliteRow) -> Result<Asset> {
    let id: String = row.try_get("id")?;
    let category: String = row.try_get("category")?;
    let condition: String = row.try_get("condition")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(Asset {
        id: parse_uuid(&id)?,
        user_id: row.try_get("user_id")?,
        name: row.try_get("name")?,
        category: Category::from(category),
        brand: row.try_get("brand")?,
        model: row.try_get("model")?,
        serial: row.try_get("serial")?,
        condition: Condition::from(condition),
        estimated_value: EstimatedValue::new(
            row.try_get("value_amount")?,
            row.try_get::<String, _>("value_currency")?,
        ),
        description: row.try_get("description")?,
        confidence: row.try_get("confidence")?,
        room: row.try_get("room")?,
        image_url: row.try_get("image_url")?,
        image_path: row.try_get("image_path")?,
        content_key: row.try_get("content_key")?,
        created_at: parse_db_timestamp(&created_at)?,
        updated_at: parse_db_timestamp(&updated_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ItemAnalysis;
    use tempfile::TempDir;

    async fn setup() -> (TempDir, SqlitePool) {
        let temp_dir = TempDir::new().unwrap();
        let pool = homevault_common::db::init_database(&temp_dir.path().join("test.db"))
            .await
            .unwrap();
        (temp_dir, pool)
    }

    fn asset(user: &str, name: &str, amount: f64, key: Option<&str>) -> Asset {
        let analysis = ItemAnalysis {
            name: name.to_string(),
            category: Category::Electronics,
            estimated_value: EstimatedValue::usd(amount),
            ..Default::default()
        };
        Asset::from_analysis(Uuid::new_v4(), user, &analysis, key.map(String::from), now())
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let (_dir, pool) = setup().await;
        let record = asset("u1", "Laptop", 900.0, None);

        let outcome = insert_unless_duplicate(&pool, &record, &DuplicateWindow::default())
            .await
            .unwrap();
        assert!(!outcome.duplicate);

        let loaded = get_asset(&pool, "u1", outcome.asset_id).await.unwrap().unwrap();
        assert_eq!(loaded, record);
    }

    #[tokio::test]
    async fn test_wrong_user_is_not_found() {
        let (_dir, pool) = setup().await;
        let record = asset("u1", "Laptop", 900.0, None);
        insert_unless_duplicate(&pool, &record, &DuplicateWindow::default())
            .await
            .unwrap();

        assert!(get_asset(&pool, "u2", record.id).await.unwrap().is_none());
        let err = delete_asset(&pool, "u2", record.id).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_value_tolerance_is_inclusive() {
        let (_dir, pool) = setup().await;
        let rule = DuplicateWindow::default();

        let first = asset("u1", "Camera", 500.0, None);
        insert_unless_duplicate(&pool, &first, &rule).await.unwrap();

        let second = asset("u1", "Camera", 510.0, None);
        let outcome = insert_unless_duplicate(&pool, &second, &rule).await.unwrap();
        assert!(outcome.duplicate);
        assert_eq!(outcome.asset_id, first.id);

        let third = asset("u1", "Camera", 510.01, None);
        let outcome = insert_unless_duplicate(&pool, &third, &rule).await.unwrap();
        assert!(!outcome.duplicate);
    }

    #[tokio::test]
    async fn test_records_outside_window_are_not_duplicates() {
        let (_dir, pool) = setup().await;
        let rule = DuplicateWindow::default();

        let mut old = asset("u1", "Camera", 500.0, None);
        old.created_at = now() - Duration::minutes(6);
        old.updated_at = old.created_at;
        insert_unless_duplicate(&pool, &old, &rule).await.unwrap();

        let fresh = asset("u1", "Camera", 500.0, None);
        let outcome = insert_unless_duplicate(&pool, &fresh, &rule).await.unwrap();
        assert!(!outcome.duplicate);
    }

    #[tokio::test]
    async fn test_content_key_matches_regardless_of_fields() {
        let (_dir, pool) = setup().await;
        let rule = DuplicateWindow::default();

        let first = asset("u1", "Camera", 500.0, Some("k1"));
        insert_unless_duplicate(&pool, &first, &rule).await.unwrap();

        let renamed = asset("u1", "Different name", 5000.0, Some("k1"));
        let outcome = insert_unless_duplicate(&pool, &renamed, &rule).await.unwrap();
        assert!(outcome.duplicate);
        assert_eq!(outcome.asset_id, first.id);
    }

    #[tokio::test]
    async fn test_update_advances_updated_at_only() {
        let (_dir, pool) = setup().await;
        let record = asset("u1", "Desk", 200.0, None);
        insert_unless_duplicate(&pool, &record, &DuplicateWindow::default())
            .await
            .unwrap();

        let update = AssetUpdate {
            description: Some("Standing desk".to_string()),
            ..Default::default()
        };
        let updated = update_asset(&pool, "u1", record.id, &update).await.unwrap();

        assert_eq!(updated.created_at, record.created_at);
        assert!(updated.updated_at > record.updated_at);
        assert_eq!(updated.description, "Standing desk");
    }

    #[tokio::test]
    async fn test_set_image_reports_replaced_path() {
        let (_dir, pool) = setup().await;
        let record = asset("u1", "Vase", 80.0, None);
        insert_unless_duplicate(&pool, &record, &DuplicateWindow::default())
            .await
            .unwrap();

        let (_, replaced) = set_image(&pool, "u1", record.id, "http://x/a", "a").await.unwrap();
        assert!(replaced.is_none());

        let (updated, replaced) =
            set_image(&pool, "u1", record.id, "http://x/b", "b").await.unwrap();
        assert_eq!(replaced.as_deref(), Some("a"));
        assert_eq!(updated.image_url, "http://x/b");
    }

    #[tokio::test]
    async fn test_list_newest_first_and_totals() {
        let (_dir, pool) = setup().await;
        let rule = DuplicateWindow::default();

        let mut older = asset("u1", "Chair", 100.0, None);
        older.created_at = now() - Duration::hours(1);
        older.updated_at = older.created_at;
        let newer = asset("u1", "Table", 250.5, None);
        insert_unless_duplicate(&pool, &older, &rule).await.unwrap();
        insert_unless_duplicate(&pool, &newer, &rule).await.unwrap();
        insert_unless_duplicate(&pool, &asset("u2", "Sofa", 999.0, None), &rule)
            .await
            .unwrap();

        let listed = list_assets(&pool, "u1").await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, newer.id);

        let (count, total) = inventory_totals(&pool, "u1").await.unwrap();
        assert_eq!(count, 2);
        assert!((total - 350.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_abandoned_transaction_rolls_back() {
        let (_dir, pool) = setup().await;
        let rule = DuplicateWindow::default();

        let mut tx = begin_immediate(&pool).await.unwrap();
        let abandoned = asset("u1", "Ghost", 10.0, None);
        write_asset(&mut tx, &abandoned).await.unwrap();
        drop(tx);

        let record = asset("u1", "Lamp", 40.0, None);
        let outcome = insert_unless_duplicate(&pool, &record, &rule).await.unwrap();
        assert!(!outcome.duplicate);
        assert!(get_asset(&pool, "u1", abandoned.id).await.unwrap().is_none());
        assert_eq!(list_assets(&pool, "u1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_writes_leave_database_writable() {
        let (_dir, pool) = setup().await;
        let rule = DuplicateWindow::default();
        let record = asset("u1", "Desk", 200.0, None);
        insert_unless_duplicate(&pool, &record, &rule).await.unwrap();

        let update = AssetUpdate {
            description: Some("Oak".to_string()),
            ..Default::default()
        };

        // Cancel updates at varying points, some between BEGIN and COMMIT
        for micros in (0..400).step_by(20) {
            let _ = tokio::time::timeout(
                std::time::Duration::from_micros(micros),
                update_asset(&pool, "u1", record.id, &update),
            )
            .await;

            let other = asset("u1", &format!("Item {}", micros), 1.0, None);
            insert_unless_duplicate(&pool, &other, &rule).await.unwrap();
        }

        let updated = update_asset(&pool, "u1", record.id, &update).await.unwrap();
        assert_eq!(updated.description, "Oak");
        assert_eq!(list_assets(&pool, "u1").await.unwrap().len(), 21);
    }

    #[test]
    fn test_next_updated_at_strictly_advances() {
        let future = now() + Duration::seconds(30);
        assert_eq!(next_updated_at(future), future + Duration::microseconds(1));

        let past = now() - Duration::seconds(30);
        assert!(next_updated_at(past) > past + Duration::seconds(29));
    }
}
