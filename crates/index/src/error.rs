//! Error types for metadata queries.

use thiserror::Error;

/// Errors raised by an [`IndexSource`](crate::IndexSource).
///
/// None of these are fatal to planning; the cache logs them and carries on.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Request could not be sent or its body not read.
    #[error("Request to {url} failed: {message}")]
    Http { url: String, message: String },

    /// Endpoint answered with a non-200 status.
    #[error("Request to {url} returned status {status}")]
    Status { url: String, status: u16 },

    /// Client could not be configured.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },
}
