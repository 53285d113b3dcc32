//! Error types for HTTP storage operations.

use biotransfer_storage::StorageError;
use thiserror::Error;

/// Errors specific to the HTTP storage client.
#[derive(Error, Debug)]
pub enum HttpClientError {
    /// Request failed before a response was read.
    #[error("HTTP request failed: {message}")]
    Request { message: String, retryable: bool },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for HttpClientError {
    fn from(err: reqwest::Error) -> Self {
        let retryable: bool = err.is_connect() || err.is_timeout() || err.is_request() || err.is_body();
        HttpClientError::Request {
            message: err.to_string(),
            retryable,
        }
    }
}

impl From<HttpClientError> for StorageError {
    fn from(err: HttpClientError) -> Self {
        match err {
            HttpClientError::Request { message, retryable } => {
                StorageError::Transport { message, retryable }
            }
            HttpClientError::Config(message) => StorageError::InvalidConfig { message },
        }
    }
}
