//! Capture domain - DB queries for captures
//!
//! All functions use the generic Executor pattern, allowing them to work with
//! both `&PgPool` (for standalone queries) and `&mut PgConnection` (for transactions).

use sqlx::{Executor, Postgres};

use crate::models::{CaptureRecord, NewCapture};

/// Find the capture stored for a client address
pub async fn find_capture_by_ip<'e, E>(
    executor: E,
    ip_address: &str,
) -> Result<Option<CaptureRecord>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as(
        r#"
        SELECT id, image_url, latitude, longitude, device_info, ip_address, created_at, updated_at
        FROM captures
        WHERE ip_address = $1
        ORDER BY id
        LIMIT 1
        "#,
    )
    .bind(ip_address)
    .fetch_optional(executor)
    .await
}

/// Insert a new capture record.
///
/// Returns `None` when another capture already holds the same non-empty
/// address (the partial unique index rejected the row).
pub async fn insert_capture<'e, E>(
    executor: E,
    capture: &NewCapture,
) -> Result<Option<CaptureRecord>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as(
        r#"
        INSERT INTO captures (image_url, latitude, longitude, device_info, ip_address)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (ip_address) WHERE ip_address <> '' DO NOTHING
        RETURNING id, image_url, latitude, longitude, device_info, ip_address, created_at, updated_at
        "#,
    )
    .bind(&capture.image_url)
    .bind(capture.location.latitude)
    .bind(capture.location.longitude)
    .bind(capture.device_info.as_deref())
    .bind(&capture.ip_address)
    .fetch_optional(executor)
    .await
}
