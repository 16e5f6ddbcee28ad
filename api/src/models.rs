//! Capture data models and the coercion rules applied to inbound fields

use chrono::{DateTime, Utc};
use serde_json::Value;

/// Geolocation attached to a capture. Missing or malformed coordinates are 0.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    /// Accepts an object, or a JSON-encoded object as sent in multipart text fields.
    pub fn from_value(value: Option<&Value>) -> Self {
        match value {
            Some(Value::Object(map)) => Self {
                latitude: coerce_coordinate(map.get("latitude")),
                longitude: coerce_coordinate(map.get("longitude")),
            },
            Some(Value::String(raw)) => match serde_json::from_str::<Value>(raw) {
                Ok(parsed @ Value::Object(_)) => Self::from_value(Some(&parsed)),
                _ => Self::default(),
            },
            _ => Self::default(),
        }
    }
}

fn coerce_coordinate(value: Option<&Value>) -> f64 {
    let parsed = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite()).unwrap_or(0.0)
}

/// Device fingerprints are opaque; structured values are stored as compact JSON.
pub fn device_info_text(value: Option<&Value>) -> Option<String> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => Some(other.to_string()),
    }
}

pub fn ip_address_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

/// A capture record from the database
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CaptureRecord {
    pub id: i64,
    pub image_url: String,
    pub latitude: f64,
    pub longitude: f64,
    pub device_info: Option<String>,
    pub ip_address: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CaptureRecord {
    pub fn location(&self) -> Location {
        Location {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }
}

/// A capture ready to be written
#[derive(Debug, Clone, PartialEq)]
pub struct NewCapture {
    pub image_url: String,
    pub location: Location,
    pub device_info: Option<String>,
    pub ip_address: String,
}
