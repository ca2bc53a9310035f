use thiserror::Error;

use crate::records::ImageId;

#[derive(Error, Debug)]
pub enum UtsuruError {
    #[error("Image has no usable pixel data")]
    EmptyImage,

    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid similarity threshold: {0} (must be >= 0)")]
    InvalidThreshold(i64),

    #[error("Invalid fingerprint: {0}")]
    InvalidFingerprint(String),

    #[error("Image record already exists: owner={owner_id}, filename={filename}")]
    DuplicateRecord { owner_id: String, filename: String },

    #[error("Image record not found: {0}")]
    RecordNotFound(ImageId),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Blob store error: {0}")]
    BlobStore(String),
}

impl UtsuruError {
    /// Errors caused by the submitted image itself.
    ///
    /// Callers surface these to end users as "unsupported or corrupt image".
    pub fn is_user_input(&self) -> bool {
        matches!(self, Self::EmptyImage | Self::Decode(_))
    }

    /// Operator-facing misconfiguration, logged separately from per-request errors.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

impl From<image::ImageError> for UtsuruError {
    fn from(e: image::ImageError) -> Self {
        Self::Decode(e.to_string())
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for UtsuruError {
    fn from(e: sqlx::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::migrate::MigrateError> for UtsuruError {
    fn from(e: sqlx::migrate::MigrateError) -> Self {
        Self::Storage(format!("migration failed: {}", e))
    }
}

pub type Result<T> = std::result::Result<T, UtsuruError>;
