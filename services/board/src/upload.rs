//! Multipart file uploads
//!
//! A form is read field by field. The single file field is checked for its
//! MIME type as soon as its headers arrive and then buffered in memory up to
//! the configured limit; nothing touches the disk until [`ReceivedFile::store`]
//! is called, so a rejected form leaves no file behind.

use std::{
    collections::HashMap,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use axum::{
    extract::{
        Multipart,
        multipart::{Field, MultipartError},
    },
    http::StatusCode,
};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Largest accepted résumé, in bytes
pub const RESUME_MAX_BYTES: usize = 400_000;

/// Largest accepted profile image, in bytes
pub const PROFILE_IMAGE_MAX_BYTES: usize = 100_000;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("The file is too large: maximum {}kb", .limit / 1000)]
    TooLarge { limit: usize },

    #[error("Invalid file format")]
    InvalidFormat,

    #[error("Only one file can be uploaded")]
    TooManyFiles,

    #[error("Select a file to upload")]
    MissingFile,

    #[error("The form could not be read: {0}")]
    Malformed(String),

    #[error("File storage error: {0}")]
    Storage(#[from] std::io::Error),
}

impl UploadError {
    /// Whether the message can be shown as-is to whoever sent the form
    pub fn is_user_facing(&self) -> bool {
        !matches!(self, UploadError::Storage(_))
    }
}

/// How stored files are named
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilenameStrategy {
    /// `<random id>.<mime subtype>`, e.g. `0f3c...9a.pdf`
    #[default]
    RandomId,
}

impl FilenameStrategy {
    pub fn file_name(&self, content_type: &str) -> String {
        let extension = content_type
            .rsplit('/')
            .next()
            .filter(|subtype| !subtype.is_empty())
            .unwrap_or("bin");
        match self {
            FilenameStrategy::RandomId => format!("{}.{}", Uuid::new_v4().simple(), extension),
        }
    }
}

/// Constraints and destination for one kind of upload
#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub max_bytes: usize,
    pub allowed_mime_types: Vec<String>,
    pub destination_path: PathBuf,
    pub filename_strategy: FilenameStrategy,
}

impl UploadConfig {
    /// Candidate résumés: a single PDF of at most 400kb
    pub fn resume(destination_path: impl Into<PathBuf>) -> Self {
        Self {
            max_bytes: RESUME_MAX_BYTES,
            allowed_mime_types: vec!["application/pdf".to_string()],
            destination_path: destination_path.into(),
            filename_strategy: FilenameStrategy::RandomId,
        }
    }

    /// Profile pictures: JPEG or PNG of at most 100kb
    pub fn profile_image(destination_path: impl Into<PathBuf>) -> Self {
        Self {
            max_bytes: PROFILE_IMAGE_MAX_BYTES,
            allowed_mime_types: vec!["image/jpeg".to_string(), "image/png".to_string()],
            destination_path: destination_path.into(),
            filename_strategy: FilenameStrategy::RandomId,
        }
    }

    pub fn check_format(&self, content_type: &str) -> Result<(), UploadError> {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        if self.allowed_mime_types.iter().any(|allowed| *allowed == essence) {
            Ok(())
        } else {
            Err(UploadError::InvalidFormat)
        }
    }

    pub fn check_size(&self, size: usize) -> Result<(), UploadError> {
        if size > self.max_bytes {
            Err(UploadError::TooLarge {
                limit: self.max_bytes,
            })
        } else {
            Ok(())
        }
    }

    /// Format is checked before size
    pub fn check(&self, content_type: &str, size: usize) -> Result<(), UploadError> {
        self.check_format(content_type)?;
        self.check_size(size)
    }
}

/// An accepted file held in memory
#[derive(Debug, Clone)]
pub struct ReceivedFile {
    pub original_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl ReceivedFile {
    /// Write the file under the configured destination, returning its stored name
    pub async fn store(&self, config: &UploadConfig) -> Result<String, UploadError> {
        tokio::fs::create_dir_all(&config.destination_path).await?;

        let file_name = config.filename_strategy.file_name(&self.content_type);
        tokio::fs::write(config.destination_path.join(&file_name), &self.bytes).await?;

        info!(
            "Stored upload {} ({} bytes) as {}",
            self.original_name,
            self.bytes.len(),
            file_name
        );
        Ok(file_name)
    }
}

/// Delete a previously stored file; a file that is already gone is not an error
pub async fn remove(config: &UploadConfig, file_name: &str) -> Result<(), UploadError> {
    // Stored names never contain separators; refuse anything that would escape the directory.
    if Path::new(file_name).file_name().and_then(|n| n.to_str()) != Some(file_name) {
        warn!("Refusing to remove suspicious upload path {}", file_name);
        return Ok(());
    }

    match tokio::fs::remove_file(config.destination_path.join(file_name)).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Text fields and the optional file of a multipart form
#[derive(Debug, Default)]
pub struct UploadForm {
    pub fields: HashMap<String, String>,
    pub file: Option<ReceivedFile>,
}

impl UploadForm {
    pub fn field(&self, name: &str) -> &str {
        self.fields.get(name).map(String::as_str).unwrap_or_default()
    }
}

/// Read a multipart form, accepting at most one file in `file_field`
pub async fn receive(
    mut multipart: Multipart,
    file_field: &str,
    config: &UploadConfig,
) -> Result<UploadForm, UploadError> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| read_error(e, config))?
    {
        let name = field.name().unwrap_or_default().to_string();

        if name != file_field {
            let value = field
                .text()
                .await
                .map_err(|e| read_error(e, config))?;
            form.fields.insert(name, value);
            continue;
        }

        // Browsers send an empty part when no file was chosen.
        let original_name = field.file_name().unwrap_or_default().to_string();
        if original_name.is_empty() {
            debug!("Skipping empty file field {}", name);
            continue;
        }

        if form.file.is_some() {
            return Err(UploadError::TooManyFiles);
        }

        let content_type = field.content_type().unwrap_or_default().to_string();
        config.check_format(&content_type)?;
        let bytes = read_limited(field, config).await?;

        form.file = Some(ReceivedFile {
            original_name,
            content_type,
            bytes,
        });
    }

    Ok(form)
}

async fn read_limited(mut field: Field<'_>, config: &UploadConfig) -> Result<Vec<u8>, UploadError> {
    let mut bytes = Vec::new();
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| read_error(e, config))?
    {
        config.check_size(bytes.len() + chunk.len())?;
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}

// A body cut off by the request size limit is reported as an oversized file.
fn read_error(err: MultipartError, config: &UploadConfig) -> UploadError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        debug!("Multipart body exceeded the request limit");
        UploadError::TooLarge {
            limit: config.max_bytes,
        }
    } else {
        UploadError::Malformed(err.body_text())
    }
}
