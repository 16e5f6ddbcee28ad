//! Upload source resolution for capture submissions.
//!
//! Multipart attachments are streamed to the spool directory and owned by a
//! [`SpooledFile`] guard for the rest of the request. The guard removes the
//! file when released or dropped, so every exit path cleans up after itself
//! and removal failures never reach the caller.

use std::path::{Path, PathBuf};

use axum::extract::Multipart;
use axum::extract::multipart::Field;
use chrono::Utc;
use rand::Rng;
use serde_json::{Map, Value};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::constants::UPLOADS_FIELD;
use crate::services::error::CaptureError;

pub fn get_extension(content_type: &str) -> &'static str {
    match content_type {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "image/heic" => "heic",
        _ => "bin",
    }
}

/// Reduce a client-supplied file name to a safe single path component.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .take(100)
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

fn spool_path(upload_dir: &Path, file_name: &str) -> PathBuf {
    let suffix: u64 = rand::rng().random();
    upload_dir.join(format!(
        "{}-{:016x}-{}",
        Utc::now().timestamp_millis(),
        suffix,
        sanitize_file_name(file_name)
    ))
}

/// A temporary file that is removed when released or dropped.
#[derive(Debug)]
pub struct SpooledFile {
    path: PathBuf,
    released: bool,
}

impl SpooledFile {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            released: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the file now. Errors are logged and swallowed.
    pub async fn release(mut self) {
        self.released = true;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => debug!(path = %self.path.display(), "Removed spooled upload"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => debug!(path = %self.path.display(), error = %e, "Failed to remove spooled upload"),
        }
    }
}

impl Drop for SpooledFile {
    fn drop(&mut self) {
        if !self.released {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// A multipart attachment. `spooled` is `None` when the part could not be
/// written to disk, leaving nothing to upload.
#[derive(Debug)]
pub struct Attachment {
    pub original_name: String,
    pub spooled: Option<SpooledFile>,
}

/// Everything a client sent with one capture.
#[derive(Debug, Default)]
pub struct CaptureSubmission {
    pub attachments: Vec<Attachment>,
    pub image: Option<String>,
    pub location: Option<Value>,
    pub device_info: Option<Value>,
    pub ip_address: Option<Value>,
}

impl CaptureSubmission {
    pub fn from_json(body: Value) -> Self {
        let Value::Object(mut fields) = body else {
            return Self::default();
        };
        let present = |v: Value| if v.is_null() { None } else { Some(v) };

        Self {
            attachments: Vec::new(),
            image: fields.remove("image").and_then(|v| match v {
                Value::String(s) => Some(s),
                _ => None,
            }),
            location: fields.remove("location").and_then(present),
            device_info: fields.remove("deviceInfo").and_then(present),
            ip_address: fields.remove("ipAddress").and_then(present),
        }
    }

    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let mut submission = Self::default();
        for (name, value) in pairs {
            submission.apply_text_field(&name, value);
        }
        submission
    }

    /// Apply a form text field, including bracketed `location[...]` keys.
    pub fn apply_text_field(&mut self, name: &str, value: String) {
        match name {
            "image" => self.image = Some(value),
            "location" => self.location = Some(Value::String(value)),
            "location[latitude]" => self.set_location_part("latitude", value),
            "location[longitude]" => self.set_location_part("longitude", value),
            "deviceInfo" => self.device_info = Some(Value::String(value)),
            "ipAddress" => self.ip_address = Some(Value::String(value)),
            other => debug!(field = other, "Ignoring unknown capture field"),
        }
    }

    fn set_location_part(&mut self, key: &str, value: String) {
        let mut location = match self.location.take() {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };
        location.insert(key.to_string(), Value::String(value));
        self.location = Some(Value::Object(location));
    }
}

async fn spool_field(
    upload_dir: &Path,
    field: &mut Field<'_>,
    file_name: &str,
) -> Result<SpooledFile, CaptureError> {
    tokio::fs::create_dir_all(upload_dir)
        .await
        .map_err(|e| CaptureError::Spool(e.to_string()))?;

    let path = spool_path(upload_dir, file_name);
    let mut file = tokio::fs::File::create(&path)
        .await
        .map_err(|e| CaptureError::Spool(e.to_string()))?;
    let spooled = SpooledFile::new(path);

    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| CaptureError::Malformed(e.body_text()))?
    {
        file.write_all(&chunk)
            .await
            .map_err(|e| CaptureError::Spool(e.to_string()))?;
    }
    file.flush()
        .await
        .map_err(|e| CaptureError::Spool(e.to_string()))?;

    Ok(spooled)
}

/// Read a multipart capture, spooling every `uploads` file part to `upload_dir`.
pub async fn read_multipart(
    mut multipart: Multipart,
    upload_dir: &Path,
) -> Result<CaptureSubmission, CaptureError> {
    let mut submission = CaptureSubmission::default();

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| CaptureError::Malformed(e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();

        // Only parts carrying a filename are files; a bare `uploads` text part is a field.
        if name == UPLOADS_FIELD && field.file_name().is_some() {
            let original_name = match field.file_name() {
                Some(file_name) if !file_name.trim().is_empty() => file_name.to_string(),
                _ => format!(
                    "upload.{}",
                    get_extension(field.content_type().unwrap_or_default())
                ),
            };

            let spooled = match spool_field(upload_dir, &mut field, &original_name).await {
                Ok(file) => Some(file),
                Err(CaptureError::Spool(reason)) => {
                    warn!(file = %original_name, error = %reason, "Failed to spool attachment");
                    None
                }
                Err(e) => return Err(e),
            };
            submission.attachments.push(Attachment {
                original_name,
                spooled,
            });
        } else {
            let value = field
                .text()
                .await
                .map_err(|e| CaptureError::Malformed(e.body_text()))?;
            submission.apply_text_field(&name, value);
        }
    }

    Ok(submission)
}

/// One step of the upload batch, in submission order.
#[derive(Debug)]
pub enum PlannedUpload {
    Spooled { name: String, file: SpooledFile },
    Inline(String),
    Unresolvable { name: String },
}

/// Attachments take priority; the inline image is only used when none were sent.
pub fn plan_uploads(attachments: Vec<Attachment>, inline_image: Option<String>) -> Vec<PlannedUpload> {
    let inline_image = inline_image.filter(|s| !s.trim().is_empty());

    if attachments.is_empty() {
        return inline_image.map(PlannedUpload::Inline).into_iter().collect();
    }
    if inline_image.is_some() {
        debug!("Ignoring inline image, attachments were sent");
    }

    attachments
        .into_iter()
        .map(|attachment| match attachment.spooled {
            Some(file) => PlannedUpload::Spooled {
                name: attachment.original_name,
                file,
            },
            None => PlannedUpload::Unresolvable {
                name: attachment.original_name,
            },
        })
        .collect()
}
