//! Upload validation and the in-memory library of source documents.

use chrono::Utc;
use log::{debug, info};
use parking_lot::RwLock;
use studyos_rs_config::UploadsConfig;
use studyos_rs_protocol::{FileDocument, FileKind, FileStatus};
use thiserror::Error;
use uuid::Uuid;

/// Reasons an upload is refused.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UploadError {
    /// The file is larger than the configured limit.
    #[error("File size exceeds {limit_mb}MB limit")]
    TooLarge { limit_mb: u64 },
    /// The extension is not on the allow-list.
    #[error("File type not supported: {extension}")]
    UnsupportedType { extension: String },
    /// The declared MIME type does not match the extension.
    #[error("File type mismatch: {extension} declared as {mime_type}")]
    MimeMismatch {
        extension: String,
        mime_type: String,
    },
}

/// MIME types accepted for a known extension. Unknown extensions accept any.
fn expected_mime_types(extension: &str) -> Option<&'static [&'static str]> {
    match extension {
        ".pdf" => Some(&["application/pdf"]),
        ".txt" => Some(&["text/plain"]),
        ".md" => Some(&["text/markdown", "text/x-markdown", "text/plain"]),
        ".csv" => Some(&["text/csv", "application/vnd.ms-excel", "text/plain"]),
        ".json" => Some(&["application/json", "text/plain"]),
        ".docx" => Some(&[
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        ]),
        _ => None,
    }
}

/// Lowercased extension including the dot, or the whole name when it has none.
fn extension_of(name: &str) -> String {
    match name.rfind('.') {
        Some(idx) => name[idx..].to_ascii_lowercase(),
        None => name.to_string(),
    }
}

/// Check an upload against the allow-list, its declared MIME type, and the size limit.
///
/// An empty MIME type is accepted; browsers omit it for some extensions.
pub fn validate_file(
    name: &str,
    size_bytes: u64,
    mime_type: &str,
    config: &UploadsConfig,
) -> Result<(), UploadError> {
    let extension = extension_of(name);
    let allowed = config
        .allowed_extensions
        .iter()
        .any(|candidate| candidate.eq_ignore_ascii_case(&extension));
    if !allowed {
        return Err(UploadError::UnsupportedType { extension });
    }

    let mime_type = mime_type.trim().to_ascii_lowercase();
    if !mime_type.is_empty()
        && let Some(expected) = expected_mime_types(&extension)
        && !expected.contains(&mime_type.as_str())
    {
        return Err(UploadError::MimeMismatch {
            extension,
            mime_type,
        });
    }

    if size_bytes > config.max_bytes {
        return Err(UploadError::TooLarge {
            limit_mb: config.max_bytes / (1024 * 1024),
        });
    }
    Ok(())
}

fn kind_for(extension: &str) -> FileKind {
    match extension {
        ".pdf" => FileKind::Pdf,
        ".docx" => FileKind::Docx,
        _ => FileKind::Txt,
    }
}

/// Uploaded documents available as grounding context.
#[derive(Debug, Default)]
pub struct FileLibrary {
    files: RwLock<Vec<FileDocument>>,
}

impl FileLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and store a document whose text has already been extracted.
    pub fn add(
        &self,
        name: &str,
        mime_type: &str,
        content: String,
        config: &UploadsConfig,
    ) -> Result<FileDocument, UploadError> {
        validate_file(name, content.len() as u64, mime_type, config)?;
        let document = FileDocument {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            kind: kind_for(&extension_of(name)),
            content,
            upload_date: Utc::now().timestamp_millis(),
            status: FileStatus::Ready,
            error_message: None,
        };
        info!(
            "added source document (id={}, name={}, len={})",
            document.id,
            document.name,
            document.content.len()
        );
        self.files.write().push(document.clone());
        Ok(document)
    }

    /// Remove a document; returns whether it existed.
    pub fn remove(&self, id: &str) -> bool {
        let mut files = self.files.write();
        let before = files.len();
        files.retain(|file| file.id != id);
        let removed = files.len() != before;
        debug!("remove source document (id={}, removed={})", id, removed);
        removed
    }

    pub fn list(&self) -> Vec<FileDocument> {
        self.files.read().clone()
    }

    /// Documents that finished processing.
    pub fn ready(&self) -> Vec<FileDocument> {
        self.files
            .read()
            .iter()
            .filter(|file| file.is_ready())
            .cloned()
            .collect()
    }
}
