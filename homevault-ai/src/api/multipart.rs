//! Multipart form reading

use axum::extract::Multipart;
use std::collections::HashMap;

use crate::services::IntakeFile;
use crate::ApiError;

/// A fully buffered multipart form
#[derive(Debug, Default)]
pub struct UploadForm {
    /// File parts in submission order, with their field name
    files: Vec<(String, IntakeFile)>,
    fields: HashMap<String, String>,
}

impl UploadForm {
    /// Buffer every part; parts with a filename are files, the rest text
    pub async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = Self::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Invalid multipart body: {}", e)))?
        {
            let name = field.name().unwrap_or_default().to_string();

            match field.file_name().map(str::to_string) {
                Some(file_name) => {
                    let content_type = field.content_type().unwrap_or_default().to_string();
                    let bytes = field
                        .bytes()
                        .await
                        .map_err(|e| {
                            ApiError::BadRequest(format!("Failed to read {}: {}", file_name, e))
                        })?;
                    form.files
                        .push((name, IntakeFile::new(file_name, content_type, bytes)));
                }
                None => {
                    let value = field
                        .text()
                        .await
                        .map_err(|e| {
                            ApiError::BadRequest(format!("Failed to read field {}: {}", name, e))
                        })?;
                    form.fields.insert(name, value);
                }
            }
        }

        Ok(form)
    }

    /// First file submitted under `field`
    pub fn take_file(&mut self, field: &str) -> Option<IntakeFile> {
        let index = self.files.iter().position(|(name, _)| name == field)?;
        Some(self.files.remove(index).1)
    }

    /// Every file submitted under `field`, in order
    pub fn take_files(&mut self, field: &str) -> Vec<IntakeFile> {
        let (matching, rest): (Vec<_>, Vec<_>) =
            self.files.drain(..).partition(|(name, _)| name == field);
        self.files = rest;
        matching.into_iter().map(|(_, file)| file).collect()
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}
