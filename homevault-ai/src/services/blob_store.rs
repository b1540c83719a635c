//! Image blob storage backed by OpenDAL
//!
//! Filesystem backend under `{root_folder}/blobs` in production, in-memory
//! backend in tests.

use opendal::{services, Operator};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage operation failed: {0}")]
    OpenDal(#[from] opendal::Error),

    #[error("Blob not found: {0}")]
    NotFound(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),
}

impl StorageError {
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Everything but unreserved characters; `.` is encoded too so a segment can
/// never be `.` or `..`
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'~');

/// A stored image: blob key plus the public URL it is served under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    pub path: String,
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct BlobStore {
    operator: Operator,
    public_base_url: String,
}

impl BlobStore {
    /// Filesystem-backed store rooted at `root`
    pub fn fs(root: &Path, public_base_url: &str) -> StorageResult<Self> {
        std::fs::create_dir_all(root)?;
        let root = root.to_string_lossy();
        debug!("Creating filesystem blob store with root: {}", root);

        let builder = services::Fs::default().root(&root);
        Ok(Self::with_operator(Operator::new(builder)?.finish(), public_base_url))
    }

    /// Volatile store, for tests
    pub fn memory(public_base_url: &str) -> StorageResult<Self> {
        let builder = services::Memory::default();
        Ok(Self::with_operator(Operator::new(builder)?.finish(), public_base_url))
    }

    fn with_operator(operator: Operator, public_base_url: &str) -> Self {
        Self {
            operator,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    /// `users/{user_id}/assets/images/{asset_id}-{timestamp_millis}`
    ///
    /// The user id is percent-encoded into a single segment.
    pub fn image_path(user_id: &str, asset_id: Uuid, timestamp_millis: i64) -> String {
        format!(
            "users/{}/assets/images/{}-{}",
            utf8_percent_encode(user_id, SEGMENT),
            asset_id,
            timestamp_millis
        )
    }

    /// URL served by `GET /blobs/*path`; the route decodes it back to `path`
    pub fn public_url(&self, path: &str) -> String {
        let encoded: Vec<String> = path
            .split('/')
            .map(|segment| utf8_percent_encode(segment, SEGMENT).to_string())
            .collect();
        format!("{}/blobs/{}", self.public_base_url, encoded.join("/"))
    }

    /// Write an image blob, returning its path and public URL
    pub async fn write(&self, path: &str, content: Vec<u8>) -> StorageResult<StoredImage> {
        validate_path(path)?;
        debug!("Writing blob {} ({} bytes)", path, content.len());

        self.operator.write(path, content).await?;

        info!("Stored blob {}", path);
        Ok(StoredImage {
            path: path.to_string(),
            url: self.public_url(path),
        })
    }

    pub async fn read(&self, path: &str) -> StorageResult<Vec<u8>> {
        validate_path(path)?;

        let content = self.operator.read(path).await.map_err(|e| {
            if e.kind() == opendal::ErrorKind::NotFound {
                StorageError::not_found(path)
            } else {
                StorageError::from(e)
            }
        })?;

        Ok(content.to_vec())
    }

    /// Delete a blob; deleting a missing blob is not an error
    pub async fn delete(&self, path: &str) -> StorageResult<()> {
        validate_path(path)?;
        debug!("Deleting blob {}", path);

        self.operator.delete(path).await?;

        info!("Deleted blob {}", path);
        Ok(())
    }

    pub async fn exists(&self, path: &str) -> StorageResult<bool> {
        validate_path(path)?;
        match self.operator.stat(path).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == opendal::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Reject keys that could escape the store root or name a directory
fn validate_path(path: &str) -> StorageResult<()> {
    if path.is_empty()
        || path.starts_with('/')
        || path.ends_with('/')
        || path.contains('\\')
        || path.split('/').any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(StorageError::InvalidPath(path.to_string()));
    }
    Ok(())
}
