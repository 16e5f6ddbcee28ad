//! Remote media uploader interface

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;

/// Image bytes handed to the remote media service.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadSource {
    /// A multipart attachment spooled to local disk.
    File { path: PathBuf, file_name: String },
    /// A base64 string, data URL, or remote URL sent in the request body.
    Inline(String),
}

impl fmt::Display for UploadSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadSource::File { file_name, .. } => write!(f, "{}", file_name),
            UploadSource::Inline(data) => write!(f, "inline image ({} chars)", data.len()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UploadedMedia {
    pub secure_url: String,
    pub public_id: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Media API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to read upload source: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid inline image: {0}")]
    InvalidInline(String),
}

#[async_trait]
pub trait MediaUploader: Send + Sync {
    async fn upload(&self, source: &UploadSource) -> Result<UploadedMedia, UploadError>;
}
