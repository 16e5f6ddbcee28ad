//! Process configuration loaded from the environment (and `.env` via dotenvy).

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use axum::http::HeaderValue;
use tracing::info;

use crate::constants::{
    DEFAULT_ALLOWED_ORIGINS, DEFAULT_CLOUDINARY_API_BASE, DEFAULT_DB_MAX_CONNECTIONS,
    DEFAULT_PORT, DEFAULT_UPLOAD_SUBDIR, MAX_CAPTURE_UPLOAD_SIZE,
};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("please provide {0} in the environment or .env file")]
    Missing(&'static str),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Credentials for the hosted media service.
#[derive(Clone)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    pub api_base: String,
}

impl fmt::Debug for CloudinaryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudinaryConfig")
            .field("cloud_name", &self.cloud_name)
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .field("api_base", &self.api_base)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub db_max_connections: u32,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub cloudinary: CloudinaryConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let require = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let database_url = require("DATABASE_URL")?;

        let cloudinary = CloudinaryConfig {
            cloud_name: require("CLOUDINARY_CLOUD_NAME")?,
            api_key: require("CLOUDINARY_API_KEY")?,
            api_secret: require("CLOUDINARY_API_SECRET")?,
            api_base: get("CLOUDINARY_API_BASE")
                .unwrap_or_else(|| DEFAULT_CLOUDINARY_API_BASE.to_string()),
        };

        let allowed_origins: Vec<String> = match get("ALLOWED_ORIGINS") {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(str::to_string)
                .collect(),
            None => DEFAULT_ALLOWED_ORIGINS
                .iter()
                .map(|o| o.to_string())
                .collect(),
        };
        for origin in &allowed_origins {
            if origin == "*" {
                return Err(ConfigError::Invalid {
                    key: "ALLOWED_ORIGINS",
                    reason: "wildcard origin cannot be combined with credentials".to_string(),
                });
            }
            origin
                .parse::<HeaderValue>()
                .map_err(|e| ConfigError::Invalid {
                    key: "ALLOWED_ORIGINS",
                    reason: format!("{origin}: {e}"),
                })?;
        }

        let upload_dir = get("UPLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| std::env::temp_dir().join(DEFAULT_UPLOAD_SUBDIR));

        Ok(Self {
            database_url,
            db_max_connections: parse_or(
                "DB_MAX_CONNECTIONS",
                get("DB_MAX_CONNECTIONS"),
                DEFAULT_DB_MAX_CONNECTIONS,
            )?,
            port: parse_or("PORT", get("PORT"), DEFAULT_PORT)?,
            allowed_origins,
            upload_dir,
            max_upload_bytes: parse_or(
                "MAX_UPLOAD_BYTES",
                get("MAX_UPLOAD_BYTES"),
                MAX_CAPTURE_UPLOAD_SIZE,
            )?,
            cloudinary,
        })
    }
}

fn parse_or<T>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr + fmt::Display,
    T::Err: fmt::Display,
{
    match raw {
        Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
        }),
        None => {
            info!("{key} not set, using default: {default}");
            Ok(default)
        }
    }
}
