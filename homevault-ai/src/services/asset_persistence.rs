//! Asset persistence
//!
//! Owns the asset records and their stored images. Record writes go through
//! the database layer (wrapped in lock retry); image bytes go to the blob
//! store. Every mutation is announced on the event bus.

use homevault_common::events::{EventBus, VaultEvent};
use homevault_common::time::{now, unix_millis};
use homevault_common::Result;
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::db::assets::{self, DuplicateWindow, SaveOutcome};
use crate::models::{Asset, AssetUpdate, ItemAnalysis};
use crate::services::blob_store::{BlobStore, StorageResult, StoredImage};
use crate::utils::retry_on_lock;

/// Outcome of a delete
///
/// The record is deleted first; a failed blob delete is reported here
/// instead of failing the whole operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteOutcome {
    pub asset_id: Uuid,
    pub image_deleted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_error: Option<String>,
}

/// Idempotency key for one user's image: hex SHA-256 of user id and bytes
pub fn content_key(user_id: &str, bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(bytes);
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

#[derive(Clone)]
pub struct AssetStore {
    db: SqlitePool,
    blobs: BlobStore,
    event_bus: EventBus,
    duplicate_window: DuplicateWindow,
    max_lock_wait_ms: u64,
}

impl AssetStore {
    pub fn new(
        db: SqlitePool,
        blobs: BlobStore,
        event_bus: EventBus,
        duplicate_window: DuplicateWindow,
        max_lock_wait_ms: u64,
    ) -> Self {
        Self {
            db,
            blobs,
            event_bus,
            duplicate_window,
            max_lock_wait_ms,
        }
    }

    pub fn blobs(&self) -> &BlobStore {
        &self.blobs
    }

    /// Record an analysis unless it duplicates an existing asset
    pub async fn save(
        &self,
        user_id: &str,
        analysis: &ItemAnalysis,
        content_key: Option<String>,
    ) -> Result<SaveOutcome> {
        let asset = Asset::from_analysis(Uuid::new_v4(), user_id, analysis, content_key, now());

        let outcome = retry_on_lock("save_asset", self.max_lock_wait_ms, || {
            assets::insert_unless_duplicate(&self.db, &asset, &self.duplicate_window)
        })
        .await?;

        if outcome.duplicate {
            info!(
                user_id,
                asset_id = %outcome.asset_id,
                name = %asset.name,
                "Duplicate asset suppressed"
            );
        } else {
            info!(user_id, asset_id = %outcome.asset_id, name = %asset.name, "Asset created");
            self.event_bus.emit_lossy(VaultEvent::AssetCreated {
                user_id: user_id.to_string(),
                asset_id: outcome.asset_id,
                timestamp: now(),
            });
        }

        Ok(outcome)
    }

    /// Store image bytes for an asset; the record is not touched
    pub async fn upload_image(
        &self,
        user_id: &str,
        asset_id: Uuid,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> StorageResult<StoredImage> {
        let path = BlobStore::image_path(user_id, asset_id, unix_millis(now()));
        debug!(user_id, asset_id = %asset_id, content_type, "Uploading asset image");
        self.blobs.write(&path, bytes).await
    }

    /// Point a record at a stored image
    ///
    /// A blob the record previously referenced is removed best-effort.
    pub async fn attach_image(
        &self,
        user_id: &str,
        asset_id: Uuid,
        image: &StoredImage,
    ) -> Result<Asset> {
        let (asset, replaced) = retry_on_lock("attach_image", self.max_lock_wait_ms, || {
            assets::set_image(&self.db, user_id, asset_id, &image.url, &image.path)
        })
        .await?;

        if let Some(old_path) = replaced {
            if let Err(e) = self.blobs.delete(&old_path).await {
                warn!(asset_id = %asset_id, path = %old_path, "Failed to delete replaced image: {}", e);
            }
        }

        self.emit_updated(user_id, asset_id);
        Ok(asset)
    }

    /// Merge a manual edit
    pub async fn update(
        &self,
        user_id: &str,
        asset_id: Uuid,
        update: &AssetUpdate,
    ) -> Result<Asset> {
        let asset = retry_on_lock("update_asset", self.max_lock_wait_ms, || {
            assets::update_asset(&self.db, user_id, asset_id, update)
        })
        .await?;

        info!(user_id, asset_id = %asset_id, "Asset updated");
        self.emit_updated(user_id, asset_id);
        Ok(asset)
    }

    /// Delete the record, then its image
    pub async fn delete(&self, user_id: &str, asset_id: Uuid) -> Result<DeleteOutcome> {
        let deleted = retry_on_lock("delete_asset", self.max_lock_wait_ms, || {
            assets::delete_asset(&self.db, user_id, asset_id)
        })
        .await?;

        let (image_deleted, image_error) = match &deleted.image_path {
            Some(path) => match self.blobs.delete(path).await {
                Ok(()) => (true, None),
                Err(e) => {
                    warn!(asset_id = %asset_id, path = %path, "Record deleted but image delete failed: {}", e);
                    (false, Some(e.to_string()))
                }
            },
            None => (false, None),
        };

        info!(user_id, asset_id = %asset_id, image_deleted, "Asset deleted");
        self.event_bus.emit_lossy(VaultEvent::AssetDeleted {
            user_id: user_id.to_string(),
            asset_id,
            image_deleted,
            timestamp: now(),
        });

        Ok(DeleteOutcome {
            asset_id,
            image_deleted,
            image_error,
        })
    }

    /// Newest first
    pub async fn list(&self, user_id: &str) -> Result<Vec<Asset>> {
        assets::list_assets(&self.db, user_id).await
    }

    pub async fn get(&self, user_id: &str, asset_id: Uuid) -> Result<Option<Asset>> {
        assets::get_asset(&self.db, user_id, asset_id).await
    }

    /// (record count, summed value)
    pub async fn inventory_totals(&self, user_id: &str) -> Result<(usize, f64)> {
        assets::inventory_totals(&self.db, user_id).await
    }

    fn emit_updated(&self, user_id: &str, asset_id: Uuid) {
        self.event_bus.emit_lossy(VaultEvent::AssetUpdated {
            user_id: user_id.to_string(),
            asset_id,
            timestamp: now(),
        });
    }
}
