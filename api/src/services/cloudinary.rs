//! Cloudinary upload client
//!
//! Built once at startup from [`CloudinaryConfig`] and shared read-only by all
//! requests. Uploads are signed: the signed parameters are sorted by name,
//! joined as `key=value` pairs with `&`, suffixed with the API secret and
//! hashed with SHA-256.

use std::collections::BTreeMap;

use async_trait::async_trait;
use base64::Engine;
use chrono::Utc;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::config::CloudinaryConfig;
use crate::services::media::{MediaUploader, UploadError, UploadSource, UploadedMedia};

#[derive(Clone)]
pub struct CloudinaryClient {
    cloud_name: String,
    api_key: String,
    api_secret: String,
    api_base: String,
    http: Client,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: String,
    public_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorMessage,
}

#[derive(Debug, Deserialize)]
struct ApiErrorMessage {
    message: String,
}

impl CloudinaryClient {
    pub fn new(config: &CloudinaryConfig) -> Self {
        Self {
            cloud_name: config.cloud_name.clone(),
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            http: Client::new(),
        }
    }

    fn upload_url(&self) -> String {
        format!("{}/v1_1/{}/image/upload", self.api_base, self.cloud_name)
    }
}

/// Options sent with every upload: keep the original file name, never overwrite.
pub fn upload_params(timestamp: i64) -> BTreeMap<&'static str, String> {
    BTreeMap::from([
        ("overwrite", "false".to_string()),
        ("timestamp", timestamp.to_string()),
        ("unique_filename", "false".to_string()),
        ("use_filename", "true".to_string()),
    ])
}

pub fn sign_params(params: &BTreeMap<&str, String>, api_secret: &str) -> String {
    let to_sign = params
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha256::new();
    hasher.update(to_sign.as_bytes());
    hasher.update(api_secret.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Data URLs and remote URLs pass through untouched. A bare base64 payload is
/// sniffed for its image format and wrapped as a data URL.
pub fn normalize_inline_image(raw: &str) -> Result<String, UploadError> {
    let trimmed = raw.trim();
    if trimmed.starts_with("data:")
        || trimmed.starts_with("https://")
        || trimmed.starts_with("http://")
    {
        return Ok(trimmed.to_string());
    }

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(trimmed)
        .map_err(|e| UploadError::InvalidInline(e.to_string()))?;
    let format =
        image::guess_format(&bytes).map_err(|e| UploadError::InvalidInline(e.to_string()))?;

    Ok(format!(
        "data:{};base64,{}",
        format.to_mime_type(),
        trimmed
    ))
}

fn api_error_message(body: &str) -> String {
    serde_json::from_str::<ApiErrorBody>(body)
        .map(|b| b.error.message)
        .unwrap_or_else(|_| body.to_string())
}

#[async_trait]
impl MediaUploader for CloudinaryClient {
    async fn upload(&self, source: &UploadSource) -> Result<UploadedMedia, UploadError> {
        let file_part = match source {
            UploadSource::File { path, file_name } => {
                let bytes = tokio::fs::read(path).await?;
                Part::bytes(bytes).file_name(file_name.clone())
            }
            UploadSource::Inline(data) => Part::text(normalize_inline_image(data)?),
        };

        let params = upload_params(Utc::now().timestamp());
        let signature = sign_params(&params, &self.api_secret);

        let mut form = Form::new()
            .part("file", file_part)
            .text("api_key", self.api_key.clone())
            .text("signature", signature)
            .text("signature_algorithm", "sha256");
        for (key, value) in params {
            form = form.text(key, value);
        }

        let resp = self
            .http
            .post(self.upload_url())
            .multipart(form)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await?;
            return Err(UploadError::Api {
                status: status.as_u16(),
                message: api_error_message(&text),
            });
        }

        let body: UploadResponse = resp.json().await?;
        Ok(UploadedMedia {
            secure_url: body.secure_url,
            public_id: body.public_id,
        })
    }
}
