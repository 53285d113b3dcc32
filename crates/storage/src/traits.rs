//! Storage client interface for the backend's upload protocol.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs::File;

use crate::error::StorageError;
use crate::stream::ProgressReader;

/// Status and body of a backend response.
///
/// Status interpretation is left to the caller: the same status means
/// different things for different calls (404 is fine for abort, fatal for
/// a simple PUT).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body as text.
    pub body: String,
}

impl StorageResponse {
    /// Create a response.
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// True for HTTP 200.
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

/// Low-level backend operations - implemented by each transport.
///
/// Implementations attach authentication headers themselves and return
/// `Err` only when no response was received at all.
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Upload a whole file with a single streamed PUT.
    ///
    /// # Arguments
    /// * `url` - Destination URL of the file
    /// * `body` - Progress-reporting reader over the file
    /// * `length` - Number of bytes the reader yields
    async fn put_object(
        &self,
        url: &str,
        body: ProgressReader<File>,
        length: u64,
    ) -> Result<StorageResponse, StorageError>;

    /// `POST {url}?uploads` - start a multipart session.
    async fn initiate_multipart(&self, url: &str) -> Result<StorageResponse, StorageError>;

    /// `GET {url}?uploadId=` - list the parts of a session.
    async fn list_parts(&self, url: &str, upload_id: &str)
        -> Result<StorageResponse, StorageError>;

    /// `PUT {url}?uploadId=&partNumber=` - upload one part.
    async fn upload_part(
        &self,
        url: &str,
        upload_id: &str,
        part_number: u32,
        body: Bytes,
    ) -> Result<StorageResponse, StorageError>;

    /// `POST {url}?uploadId=` - complete a session with a part manifest.
    async fn complete_multipart(
        &self,
        url: &str,
        upload_id: &str,
        manifest_xml: String,
    ) -> Result<StorageResponse, StorageError>;

    /// `DELETE {url}?uploadId=` - cancel a session.
    async fn abort_multipart(
        &self,
        url: &str,
        upload_id: &str,
    ) -> Result<StorageResponse, StorageError>;

    /// `DELETE {url}` - delete an uploaded file.
    async fn delete_object(&self, url: &str) -> Result<StorageResponse, StorageError>;
}
