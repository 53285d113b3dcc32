//! Error types for upload operations.

use thiserror::Error;

/// Errors that can occur while uploading, aborting or deleting files.
#[derive(Error, Debug, Clone)]
pub enum StorageError {
    /// Connection failure or an unexpected status that may succeed on retry.
    #[error("Transport error: {message}")]
    Transport { message: String, retryable: bool },

    /// The backend never acknowledged the multipart session.
    #[error("Can't find multipart upload with upload id {upload_id} after {attempts} attempts")]
    NotYetMaterialized { upload_id: String, attempts: u32 },

    /// 403 or 400 from the backend; never retried.
    #[error("Request rejected with status {status}: {message}")]
    PermissionOrBadRequest { status: u16, message: String },

    /// Listed part count does not match the planned part count.
    #[error(
        "Multipart upload failed for file {file_id}: completed parts: {completed}, \
         total parts: {expected}, please try to resume"
    )]
    IncompleteUpload {
        file_id: String,
        completed: usize,
        expected: usize,
    },

    /// Initiating a multipart session failed.
    #[error("Fail to initiate multipart upload (status {status}): {message}")]
    InitiateFailed { status: u16, message: String },

    /// Simple PUT returned a non-200 status.
    #[error("Upload failed for file {file_id} (status {status}): {message}")]
    PutFailed {
        file_id: String,
        status: u16,
        message: String,
    },

    /// The complete-upload call kept failing.
    #[error("Multipart upload complete failed (status {status}): {message}")]
    CompleteFailed { status: u16, message: String },

    /// Abort returned something other than 204 or 404.
    #[error("Fail to abort multipart upload {upload_id} (status {status}): {message}")]
    AbortFailed {
        upload_id: String,
        status: u16,
        message: String,
    },

    /// Delete returned something other than 204.
    #[error("Fail to delete file {file_id} (status {status}): {message}")]
    DeleteFailed {
        file_id: String,
        status: u16,
        message: String,
    },

    /// The repository has no file with this id.
    #[error("File with id {file_id} not found")]
    MetadataNotFound { file_id: String },

    /// Submission metadata lookup was refused.
    #[error("Fail to get metadata for file {file_id} (status {status}): {message}")]
    MetadataLookupFailed {
        file_id: String,
        status: u16,
        message: String,
    },

    /// Backend response could not be decoded.
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    /// Local I/O error.
    #[error("I/O error for {path}: {message}")]
    Io { path: String, message: String },

    /// Manifest or checkpoint file is invalid.
    #[error("Manifest error: {message}")]
    Manifest { message: String },

    /// Invalid configuration or descriptor.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Operation cancelled by user.
    #[error("Process canceled by user")]
    Cancelled,
}

impl StorageError {
    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            StorageError::Transport { retryable, .. } => *retryable,
            StorageError::NotYetMaterialized { .. } => true,
            StorageError::PermissionOrBadRequest { .. } => false,
            StorageError::IncompleteUpload { .. } => false,
            StorageError::InitiateFailed { .. } => false,
            StorageError::PutFailed { .. } => false,
            StorageError::CompleteFailed { .. } => false,
            StorageError::AbortFailed { .. } => false,
            StorageError::DeleteFailed { .. } => false,
            StorageError::MetadataNotFound { .. } => false,
            StorageError::MetadataLookupFailed { .. } => false,
            StorageError::Protocol { .. } => false,
            StorageError::Io { .. } => false,
            StorageError::Manifest { .. } => false,
            StorageError::InvalidConfig { .. } => false,
            StorageError::Cancelled => false,
        }
    }

    /// Create an I/O error tagged with the path it happened on.
    ///
    /// # Arguments
    /// * `path` - Path where the error occurred
    /// * `err` - The underlying I/O error
    pub fn io(path: impl Into<String>, err: std::io::Error) -> Self {
        StorageError::Io {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io {
            path: String::new(),
            message: err.to_string(),
        }
    }
}
