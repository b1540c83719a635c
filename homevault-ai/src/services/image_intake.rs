//! Image intake
//!
//! Validates user-selected photos before any analysis happens: count limit,
//! per-file size ceiling and an allow-list of image types. Files stay in
//! memory; nothing is uploaded here.

use axum::body::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::FileMeta;

/// Default maximum number of files per selection
pub const DEFAULT_MAX_FILES: usize = 5;

/// Default per-file size ceiling (10 MiB)
pub const DEFAULT_MAX_FILE_BYTES: usize = 10 * 1024 * 1024;

/// Declared types treated as "unknown, sniff the bytes"
const GENERIC_TYPES: [&str; 2] = ["application/octet-stream", "binary/octet-stream"];

/// Intake limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntakeLimits {
    pub max_files: usize,
    pub max_file_bytes: usize,
}

impl Default for IntakeLimits {
    fn default() -> Self {
        Self {
            max_files: DEFAULT_MAX_FILES,
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
        }
    }
}

/// Intake rejection, with a message fit for the user
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntakeError {
    #[error("{name} is empty")]
    EmptyFile { name: String },

    #[error("{name} is too large ({size} bytes, limit {limit} bytes)")]
    TooLarge {
        name: String,
        size: usize,
        limit: usize,
    },

    #[error("{name} has unsupported format {content_type}. Please use JPG, PNG, WEBP, or HEIC.")]
    UnsupportedType { name: String, content_type: String },

    #[error("You can upload at most {limit} photos at a time")]
    TooManyFiles { limit: usize },
}

/// Accepted image type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcceptedType {
    /// Canonical MIME type forwarded to the model
    pub mime_type: &'static str,
    /// HEIC/HEIF cannot be previewed by most browsers; bytes are passed through untouched
    pub requires_server_decoding: bool,
}

impl AcceptedType {
    /// Look up an accepted type by (lower-case) MIME string
    pub fn from_mime(mime: &str) -> Option<Self> {
        let (mime_type, requires_server_decoding) = match mime {
            "image/jpeg" | "image/jpg" | "image/pjpeg" => ("image/jpeg", false),
            "image/png" => ("image/png", false),
            "image/webp" => ("image/webp", false),
            "image/heic" => ("image/heic", true),
            "image/heif" => ("image/heif", true),
            _ => return None,
        };
        Some(Self {
            mime_type,
            requires_server_decoding,
        })
    }
}

/// One selected file, held in memory
#[derive(Debug, Clone)]
pub struct IntakeFile {
    pub name: String,
    /// Declared content type (may be empty)
    pub content_type: String,
    pub bytes: Bytes,
}

impl IntakeFile {
    pub fn new(
        name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: impl Into<Bytes>,
    ) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            bytes: bytes.into(),
        }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// Declared type, or the sniffed one when the declaration is missing or generic
    pub fn effective_mime(&self) -> String {
        let declared = self
            .content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        if declared.is_empty() || GENERIC_TYPES.contains(&declared.as_str()) {
            if let Some(kind) = infer::get(&self.bytes) {
                return kind.mime_type().to_string();
            }
        }
        declared
    }

    pub fn meta(&self) -> FileMeta {
        FileMeta {
            name: self.name.clone(),
            size: self.size(),
            content_type: self.effective_mime(),
        }
    }
}

/// Check a single file against the limits and the type allow-list
pub fn validate_file(
    file: &IntakeFile,
    limits: &IntakeLimits,
) -> Result<AcceptedType, IntakeError> {
    if file.bytes.is_empty() {
        return Err(IntakeError::EmptyFile {
            name: file.name.clone(),
        });
    }

    if file.size() > limits.max_file_bytes {
        return Err(IntakeError::TooLarge {
            name: file.name.clone(),
            size: file.size(),
            limit: limits.max_file_bytes,
        });
    }

    let mime = file.effective_mime();
    AcceptedType::from_mime(&mime).ok_or_else(|| IntakeError::UnsupportedType {
        name: file.name.clone(),
        content_type: if mime.is_empty() {
            "unknown".to_string()
        } else {
            mime
        },
    })
}

/// Files selected for one upload action
#[derive(Debug, Clone, Default)]
pub struct IntakeSelection {
    limits: IntakeLimits,
    files: Vec<IntakeFile>,
}

impl IntakeSelection {
    pub fn new(limits: IntakeLimits) -> Self {
        Self {
            limits,
            files: Vec::new(),
        }
    }

    /// Add one file; on rejection the selection is unchanged
    pub fn add(&mut self, file: IntakeFile) -> Result<AcceptedType, IntakeError> {
        if self.files.len() >= self.limits.max_files {
            return Err(IntakeError::TooManyFiles {
                limit: self.limits.max_files,
            });
        }
        let accepted = validate_file(&file, &self.limits)?;
        if accepted.requires_server_decoding {
            tracing::debug!(file = %file.name, mime = accepted.mime_type, "HEIC/HEIF accepted as-is");
        }
        self.files.push(file);
        Ok(accepted)
    }

    /// Add every valid file, returning the rejections
    pub fn add_all(&mut self, files: impl IntoIterator<Item = IntakeFile>) -> Vec<IntakeError> {
        files
            .into_iter()
            .filter_map(|file| self.add(file).err())
            .collect()
    }

    pub fn remove(&mut self, index: usize) -> Option<IntakeFile> {
        (index < self.files.len()).then(|| self.files.remove(index))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn files(&self) -> &[IntakeFile] {
        &self.files
    }

    pub fn into_files(self) -> Vec<IntakeFile> {
        self.files
    }
}
