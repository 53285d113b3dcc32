//! Metadata index backends.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::IndexError;
use crate::query::{parse_hits, Hit, MetadataQuery};

/// The two index endpoints a query is sent to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexEndpoint {
    /// Current data release.
    Active,
    /// Legacy archive.
    Legacy,
}

impl IndexEndpoint {
    /// Both endpoints, primary first.
    pub const ALL: [IndexEndpoint; 2] = [IndexEndpoint::Active, IndexEndpoint::Legacy];

    /// Path relative to the API root.
    pub fn path(&self) -> &'static str {
        match self {
            IndexEndpoint::Active => "v0/files",
            IndexEndpoint::Legacy => "v0/legacy/files",
        }
    }
}

impl fmt::Display for IndexEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Pluggable source of file metadata.
#[async_trait]
pub trait IndexSource: Send + Sync {
    /// Run `query` against `endpoint`.
    ///
    /// # Arguments
    /// * `endpoint` - Which index to ask
    /// * `query` - Filter selecting the wanted ids
    ///
    /// # Returns
    /// Decoded hits; a response without hits is an empty vector, not an error.
    async fn query(
        &self,
        endpoint: IndexEndpoint,
        query: &MetadataQuery,
    ) -> Result<Vec<Hit>, IndexError>;
}

/// [`IndexSource`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpIndexSource {
    client: reqwest::Client,
    server: String,
}

impl HttpIndexSource {
    /// Create a source for the API at `server`.
    ///
    /// # Arguments
    /// * `server` - API root, e.g. "https://api.example.org/"
    /// * `verify_tls` - Reject invalid certificates when true
    /// * `timeout` - Per-request timeout
    pub fn new(
        server: impl Into<String>,
        verify_tls: bool,
        timeout: Option<Duration>,
    ) -> Result<Self, IndexError> {
        let mut builder = reqwest::Client::builder().danger_accept_invalid_certs(!verify_tls);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client: reqwest::Client = builder.build().map_err(|e| IndexError::InvalidConfig {
            message: e.to_string(),
        })?;

        Ok(Self {
            client,
            server: server.into(),
        })
    }

    /// Full URL of `endpoint`.
    pub fn endpoint_url(&self, endpoint: IndexEndpoint) -> String {
        format!("{}/{}", self.server.trim_end_matches('/'), endpoint.path())
    }
}

#[async_trait]
impl IndexSource for HttpIndexSource {
    async fn query(
        &self,
        endpoint: IndexEndpoint,
        query: &MetadataQuery,
    ) -> Result<Vec<Hit>, IndexError> {
        let url: String = self.endpoint_url(endpoint);

        // POST keeps long id lists out of the URL.
        let response: reqwest::Response = self
            .client
            .post(&url)
            .json(query)
            .send()
            .await
            .map_err(|e| IndexError::Http {
                url: url.clone(),
                message: e.to_string(),
            })?;

        let status: u16 = response.status().as_u16();
        if status != 200 {
            return Err(IndexError::Status { url, status });
        }

        let body: String = response.text().await.map_err(|e| IndexError::Http {
            url: url.clone(),
            message: e.to_string(),
        })?;
        Ok(parse_hits(&body))
    }
}
