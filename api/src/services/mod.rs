pub mod capture;
pub mod cloudinary;
pub mod db;
pub mod error;
pub mod media;
pub mod uploads;
