//! reqwest-based storage client.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_LENGTH};
use reqwest::{Body, Client, ClientBuilder, RequestBuilder};
use tokio::fs::File;
use tokio_util::io::ReaderStream;

use biotransfer_common::AUTH_TOKEN_HEADER;
use biotransfer_storage::{ProgressReader, StorageClient, StorageError, StorageResponse};

use crate::error::HttpClientError;

/// Settings for [`HttpStorageClient`].
#[derive(Debug, Clone)]
pub struct HttpClientSettings {
    /// Auth token sent with every request.
    pub token: Option<String>,
    /// Reject invalid TLS certificates.
    pub verify_tls: bool,
    /// Per-request timeout; part uploads of large files can take long.
    pub timeout: Option<Duration>,
}

impl Default for HttpClientSettings {
    fn default() -> Self {
        Self {
            token: None,
            verify_tls: true,
            timeout: None,
        }
    }
}

impl HttpClientSettings {
    /// Create settings with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the auth token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Enable or disable certificate verification.
    pub fn with_verify_tls(mut self, verify: bool) -> Self {
        self.verify_tls = verify;
        self
    }

    /// Set a per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// StorageClient implementation over HTTP.
///
/// Holds the auth headers; callers only pass URLs and bodies.
#[derive(Debug, Clone)]
pub struct HttpStorageClient {
    client: Client,
}

impl HttpStorageClient {
    /// Create a new HTTP storage client.
    ///
    /// # Arguments
    /// * `settings` - Token, TLS and timeout settings
    ///
    /// # Errors
    /// `HttpClientError::Config` if the token is not a valid header value or
    /// the TLS backend fails to initialize.
    pub fn new(settings: HttpClientSettings) -> Result<Self, HttpClientError> {
        let client: Client = Self::client_builder(&settings)?
            .build()
            .map_err(|e| HttpClientError::Config(e.to_string()))?;
        Ok(Self { client })
    }

    /// reqwest builder carrying the auth header and TLS settings.
    pub(crate) fn client_builder(settings: &HttpClientSettings) -> Result<ClientBuilder, HttpClientError> {
        let mut headers: HeaderMap = HeaderMap::new();
        if let Some(token) = settings.token.as_deref() {
            let mut value: HeaderValue = HeaderValue::from_str(token.trim())
                .map_err(|_| HttpClientError::Config("token is not a valid header value".into()))?;
            value.set_sensitive(true);
            headers.insert(AUTH_TOKEN_HEADER, value);
        }

        if !settings.verify_tls {
            log::warn!("TLS certificate verification is disabled");
        }

        let mut builder: ClientBuilder = Client::builder()
            .default_headers(headers)
            .danger_accept_invalid_certs(!settings.verify_tls);
        if let Some(timeout) = settings.timeout {
            builder = builder.timeout(timeout);
        }
        Ok(builder)
    }

    /// Create a client from an existing reqwest client (for testing).
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    async fn send(request: RequestBuilder) -> Result<StorageResponse, StorageError> {
        let response: reqwest::Response =
            request.send().await.map_err(HttpClientError::from)?;
        let status: u16 = response.status().as_u16();
        let body: String = response.text().await.map_err(HttpClientError::from)?;
        Ok(StorageResponse::new(status, body))
    }
}

#[async_trait]
impl StorageClient for HttpStorageClient {
    async fn put_object(
        &self,
        url: &str,
        body: ProgressReader<File>,
        length: u64,
    ) -> Result<StorageResponse, StorageError> {
        let stream: ReaderStream<ProgressReader<File>> = ReaderStream::new(body);
        let request: RequestBuilder = self
            .client
            .put(url)
            .header(CONTENT_LENGTH, length)
            .body(Body::wrap_stream(stream));
        Self::send(request).await
    }

    async fn initiate_multipart(&self, url: &str) -> Result<StorageResponse, StorageError> {
        Self::send(self.client.post(format!("{}?uploads", url))).await
    }

    async fn list_parts(&self, url: &str, upload_id: &str) -> Result<StorageResponse, StorageError> {
        Self::send(self.client.get(url).query(&[("uploadId", upload_id)])).await
    }

    async fn upload_part(
        &self,
        url: &str,
        upload_id: &str,
        part_number: u32,
        body: Bytes,
    ) -> Result<StorageResponse, StorageError> {
        let part: String = part_number.to_string();
        let request: RequestBuilder = self
            .client
            .put(url)
            .query(&[("uploadId", upload_id), ("partNumber", part.as_str())])
            .body(body);
        Self::send(request).await
    }

    async fn complete_multipart(
        &self,
        url: &str,
        upload_id: &str,
        manifest_xml: String,
    ) -> Result<StorageResponse, StorageError> {
        let request: RequestBuilder = self
            .client
            .post(url)
            .query(&[("uploadId", upload_id)])
            .body(manifest_xml);
        Self::send(request).await
    }

    async fn abort_multipart(
        &self,
        url: &str,
        upload_id: &str,
    ) -> Result<StorageResponse, StorageError> {
        Self::send(self.client.delete(url).query(&[("uploadId", upload_id)])).await
    }

    async fn delete_object(&self, url: &str) -> Result<StorageResponse, StorageError> {
        Self::send(self.client.delete(url)).await
    }
}
