//! Error types for the sync pipeline

use thiserror::Error;

/// Errors that end a pipeline run.
///
/// Per-record problems found while transforming are not represented here; they
/// are [`crate::transform::SkipReason`] values and never abort a batch.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Missing or invalid configuration options
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Source or target system unreachable
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Login exchange with the target was rejected
    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    /// Import endpoint reported an error or an unusable result
    #[error("Upload error: {0}")]
    UploadError(String),

    /// An intermediate artifact the next stage depends on is absent
    #[error("Missing expected output: {0}")]
    MissingOutput(String),

    /// Checkpoint could not be read or written
    #[error("Checkpoint error: {0}")]
    CheckpointError(String),

    /// Notification channel errors
    #[error("Notification error: {0}")]
    NotificationError(String),

    /// Embedded storage errors
    #[error("Storage error: {0}")]
    StorageError(#[from] sled::Error),

    /// Filesystem errors
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON parsing errors
    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// HTTP request errors
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
}

impl SyncError {
    /// Create a new configuration error
    pub fn configuration_error(msg: impl Into<String>) -> Self {
        Self::ConfigurationError(msg.into())
    }

    /// Create a new connection error
    pub fn connection_error(msg: impl Into<String>) -> Self {
        Self::ConnectionError(msg.into())
    }

    /// Create a new authentication error
    pub fn authentication_error(msg: impl Into<String>) -> Self {
        Self::AuthenticationError(msg.into())
    }

    /// Create a new upload error
    pub fn upload_error(msg: impl Into<String>) -> Self {
        Self::UploadError(msg.into())
    }

    /// Create a new missing output error
    pub fn missing_output(msg: impl Into<String>) -> Self {
        Self::MissingOutput(msg.into())
    }

    /// Create a new checkpoint error
    pub fn checkpoint_error(msg: impl Into<String>) -> Self {
        Self::CheckpointError(msg.into())
    }

    /// Create a new notification error
    pub fn notification_error(msg: impl Into<String>) -> Self {
        Self::NotificationError(msg.into())
    }

    /// Process exit code for a run that ended with this error.
    pub fn exit_code(&self) -> u8 {
        1
    }
}

/// Result type for sync operations
pub type SyncResult<T> = std::result::Result<T, SyncError>;
