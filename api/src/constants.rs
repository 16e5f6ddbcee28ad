//! Application constants

/// Maximum request body size for captures (10 MB)
pub const MAX_CAPTURE_UPLOAD_SIZE: usize = 10 * 1024 * 1024;

/// Port used when `PORT` is not set
pub const DEFAULT_PORT: u16 = 5000;

/// Pool size used when `DB_MAX_CONNECTIONS` is not set
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;

/// Origins allowed when `ALLOWED_ORIGINS` is not set
pub const DEFAULT_ALLOWED_ORIGINS: &[&str] = &[
    "http://localhost:5173",
    "https://capture-frontend-ten.vercel.app",
    "https://q0xtw0c9-5173.inc1.devtunnels.ms",
];

/// Cloudinary API host used when `CLOUDINARY_API_BASE` is not set
pub const DEFAULT_CLOUDINARY_API_BASE: &str = "https://api.cloudinary.com";

/// Subdirectory of the system temp dir used to spool multipart uploads
pub const DEFAULT_UPLOAD_SUBDIR: &str = "capture-uploads";

/// Multipart field carrying file attachments
pub const UPLOADS_FIELD: &str = "uploads";

/// Body returned by `GET /`
pub const LIVENESS_MESSAGE: &str = "Backend is running successfully!";
