//! File attachments carried by messages

use crate::error::{ParleyError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

/// A file attached to a message
///
/// Immutable once created. `url` is a content locator: either a remote URL
/// or a `file://` reference to a local blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Unique identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Content locator
    pub url: String,
    /// MIME type
    #[serde(rename = "type")]
    pub mime_type: String,
    /// Size in bytes
    pub size: u64,
}

impl Attachment {
    /// Creates an attachment with a fresh identifier
    ///
    /// # Examples
    ///
    /// ```
    /// use parley::conversation::Attachment;
    ///
    /// let a = Attachment::new("notes.txt", "https://files.example.com/1", "text/plain", 12);
    /// assert_eq!(a.name, "notes.txt");
    /// assert!(!a.id.is_empty());
    /// ```
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        mime_type: impl Into<String>,
        size: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            url: url.into(),
            mime_type: mime_type.into(),
            size,
        }
    }

    /// Builds an attachment from a local file
    ///
    /// The name comes from the file name, the locator is a `file://` URL of
    /// the canonical path and the MIME type is guessed from the extension.
    ///
    /// # Errors
    ///
    /// Returns `ParleyError::AttachmentTooLarge` if the file is larger than
    /// `max_bytes`, or an IO error if the file cannot be inspected.
    pub fn from_path(path: impl AsRef<Path>, max_bytes: u64) -> Result<Self> {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path).map_err(ParleyError::from)?;
        if !metadata.is_file() {
            return Err(ParleyError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} is not a file", path.display()),
            ))
            .into());
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());

        let size = metadata.len();
        if size > max_bytes {
            return Err(ParleyError::AttachmentTooLarge {
                name,
                size,
                limit: max_bytes,
            }
            .into());
        }

        let canonical = std::fs::canonicalize(path).map_err(ParleyError::from)?;
        let url = url::Url::from_file_path(&canonical)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| format!("file://{}", canonical.display()));

        Ok(Self::new(name, url, mime_type_for(path), size))
    }
}

/// Guesses a MIME type from a file extension
pub fn mime_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
        Some("txt") | Some("log") => "text/plain",
        Some("md") => "text/markdown",
        Some("csv") => "text/csv",
        Some("html") | Some("htm") => "text/html",
        Some("json") => "application/json",
        Some("yaml") | Some("yml") => "application/yaml",
        Some("pdf") => "application/pdf",
        Some("zip") => "application/zip",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("mp4") => "video/mp4",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_from_path_reads_metadata() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notes.md");
        std::fs::write(&path, "# hello").unwrap();

        let attachment = Attachment::from_path(&path, 1024).unwrap();
        assert_eq!(attachment.name, "notes.md");
        assert_eq!(attachment.mime_type, "text/markdown");
        assert_eq!(attachment.size, 7);
        assert!(attachment.url.starts_with("file://"));
    }

    #[test]
    fn test_from_path_rejects_oversized_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("big.bin");
        std::fs::write(&path, vec![0u8; 64]).unwrap();

        let err = Attachment::from_path(&path, 32).unwrap_err();
        match err.downcast_ref::<ParleyError>() {
            Some(ParleyError::AttachmentTooLarge { size, limit, .. }) => {
                assert_eq!(*size, 64);
                assert_eq!(*limit, 32);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_from_path_rejects_directory() {
        let dir = tempdir().unwrap();
        assert!(Attachment::from_path(dir.path(), 1024).is_err());
    }

    #[test]
    fn test_mime_type_for_unknown_extension() {
        assert_eq!(mime_type_for(Path::new("a.weird")), "application/octet-stream");
        assert_eq!(mime_type_for(Path::new("PHOTO.JPG")), "image/jpeg");
        assert_eq!(mime_type_for(Path::new("Makefile")), "application/octet-stream");
    }

    #[test]
    fn test_serialized_field_names() {
        let a = Attachment::new("a.png", "https://x/a.png", "image/png", 3);
        let json = serde_json::to_value(&a).unwrap();
        assert_eq!(json["type"], "image/png");
        assert_eq!(json["size"], 3);
    }
}
