//! HTTP backend for the biotransfer upload engine.
//!
//! This crate provides a `StorageClient` implementation over `reqwest`,
//! speaking the S3-compatible multipart dialect of the submission API, and
//! an `HttpSubmissionLookup` that completes manifest entries through the
//! submission GraphQL endpoint.
//!
//! # Example
//!
//! ```ignore
//! use biotransfer_storage_http::{HttpClientSettings, HttpStorageClient};
//! use biotransfer_storage::{ApiLocation, UploadOrchestrator};
//!
//! let settings = HttpClientSettings::new().with_token(token);
//! let client = HttpStorageClient::new(settings)?;
//!
//! let orchestrator = UploadOrchestrator::new(&client, ApiLocation::new(server));
//! ```

mod client;
mod error;
mod lookup;
#[cfg(test)]
mod test_server;

pub use client::{HttpClientSettings, HttpStorageClient};
pub use error::HttpClientError;
pub use lookup::HttpSubmissionLookup;
