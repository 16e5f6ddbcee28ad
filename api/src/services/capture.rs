//! Capture ingestion: upload every source, keep the first URL, store one
//! record per client address.

use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::models::{Location, NewCapture, device_info_text, ip_address_text};
use crate::services::db::{CaptureStore, InsertOutcome};
use crate::services::error::{CaptureError, LogErr};
use crate::services::media::{MediaUploader, UploadSource};
use crate::services::uploads::{CaptureSubmission, PlannedUpload, plan_uploads};

/// Echo of a stored capture. `location` and `device_info` are returned as the
/// client sent them.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureReceipt {
    pub image_url: String,
    pub location: Option<Value>,
    pub device_info: Option<Value>,
    pub ip_address: Option<Value>,
}

#[derive(Debug, PartialEq)]
pub enum CaptureOutcome {
    Captured(CaptureReceipt),
    /// A capture already exists for this address; nothing was written.
    Duplicate,
}

/// Upload each planned source in order and collect the URLs that succeeded.
///
/// Spooled files are released after their attempt whatever the outcome.
async fn upload_all(uploader: &dyn MediaUploader, plan: Vec<PlannedUpload>) -> Vec<String> {
    let mut uploaded_urls = Vec::new();

    for planned in plan {
        let uploaded = match planned {
            PlannedUpload::Unresolvable { name } => {
                warn!(file = %name, "Skipping attachment with no local path");
                continue;
            }
            PlannedUpload::Inline(data) => {
                let source = UploadSource::Inline(data);
                uploader
                    .upload(&source)
                    .await
                    .warn_ok(&format!("Error uploading {}", source))
            }
            PlannedUpload::Spooled { name, file } => {
                let source = UploadSource::File {
                    path: file.path().to_path_buf(),
                    file_name: name,
                };
                let result = uploader.upload(&source).await;
                file.release().await;
                result.warn_ok(&format!("Error uploading {}", source))
            }
        };

        if let Some(media) = uploaded {
            info!(
                url = %media.secure_url,
                public_id = media.public_id.as_deref().unwrap_or_default(),
                "Uploaded capture image"
            );
            uploaded_urls.push(media.secure_url);
        }
    }

    uploaded_urls
}

pub async fn ingest_capture(
    store: &dyn CaptureStore,
    uploader: &dyn MediaUploader,
    submission: CaptureSubmission,
) -> Result<CaptureOutcome, CaptureError> {
    let CaptureSubmission {
        attachments,
        image,
        location,
        device_info,
        ip_address,
    } = submission;

    let plan = plan_uploads(attachments, image);
    let uploaded_urls = upload_all(uploader, plan).await;

    let Some(image_url) = uploaded_urls.into_iter().next() else {
        return Err(CaptureError::NoImageUploaded);
    };

    let ip_text = ip_address_text(ip_address.as_ref());
    if !ip_text.is_empty() {
        if let Some(existing) = store.find_by_ip(&ip_text).await? {
            info!(ip_address = %ip_text, capture_id = existing.id, "Capture already exists for address");
            return Ok(CaptureOutcome::Duplicate);
        }
    }

    let new_capture = NewCapture {
        image_url,
        location: Location::from_value(location.as_ref()),
        device_info: device_info_text(device_info.as_ref()),
        ip_address: ip_text,
    };

    let record = match store.insert(&new_capture).await? {
        InsertOutcome::Inserted(record) => record,
        InsertOutcome::Duplicate => {
            info!(ip_address = %new_capture.ip_address, "Capture already exists for address (insert conflict)");
            return Ok(CaptureOutcome::Duplicate);
        }
    };

    let stored_location = record.location();
    info!(
        capture_id = record.id,
        image_url = %record.image_url,
        latitude = stored_location.latitude,
        longitude = stored_location.longitude,
        device_info = record.device_info.as_deref().unwrap_or_default(),
        ip_address = %record.ip_address,
        "Capture stored"
    );

    Ok(CaptureOutcome::Captured(CaptureReceipt {
        image_url: record.image_url,
        location,
        device_info,
        ip_address,
    }))
}
