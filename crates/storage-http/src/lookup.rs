//! Submission metadata lookup over the repository's GraphQL endpoint.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use biotransfer_storage::{StorageError, SubmissionLookup, SubmissionMetadata};

use crate::client::{HttpClientSettings, HttpStorageClient};
use crate::error::HttpClientError;

/// Path of the submission GraphQL endpoint below the API root.
const GRAPHQL_PATH: &str = "v0/submission/graphql";

#[derive(Debug, Deserialize)]
struct GraphqlResponse {
    data: Option<GraphqlData>,
}

#[derive(Debug, Deserialize)]
struct GraphqlData {
    node: Option<Nodes>,
}

/// `node` comes back as a list; a bare object is accepted too.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Nodes {
    Many(Vec<NodeFields>),
    One(NodeFields),
}

#[derive(Debug, Deserialize)]
struct NodeFields {
    project_id: Option<String>,
    file_name: Option<String>,
}

/// `SubmissionLookup` that asks the repository's GraphQL endpoint.
///
/// Shares the auth and TLS settings of [`HttpStorageClient`].
#[derive(Debug, Clone)]
pub struct HttpSubmissionLookup {
    client: Client,
    graphql_url: String,
}

impl HttpSubmissionLookup {
    /// Create a lookup against the API root `server`.
    ///
    /// # Errors
    /// `HttpClientError::Config` for an invalid token or TLS setup.
    pub fn new(settings: &HttpClientSettings, server: &str) -> Result<Self, HttpClientError> {
        let client: Client = HttpStorageClient::client_builder(settings)?
            .build()
            .map_err(|e| HttpClientError::Config(e.to_string()))?;
        Ok(Self::from_client(client, server))
    }

    /// Create a lookup from an existing reqwest client (for testing).
    pub fn from_client(client: Client, server: &str) -> Self {
        Self {
            client,
            graphql_url: format!("{}/{}", server.trim_end_matches('/'), GRAPHQL_PATH),
        }
    }

    /// Endpoint the lookup posts to.
    pub fn graphql_url(&self) -> &str {
        &self.graphql_url
    }
}

/// GraphQL request body asking for one node's project id and file name.
fn node_query(file_id: &str) -> Value {
    // A JSON string literal is also a valid GraphQL string literal.
    let literal: String = Value::String(file_id.to_string()).to_string();
    json!({
        "query": format!("query Files {{ node (id: {}) {{ project_id, file_name }} }}", literal)
    })
}

fn parse_node(file_id: &str, body: &str) -> Result<SubmissionMetadata, StorageError> {
    let response: GraphqlResponse =
        serde_json::from_str(body).map_err(|e| StorageError::Protocol {
            message: format!("metadata response for file {}: {}", file_id, e),
        })?;

    let node: Option<NodeFields> = match response.data.and_then(|d| d.node) {
        Some(Nodes::Many(nodes)) => nodes.into_iter().next(),
        Some(Nodes::One(node)) => Some(node),
        None => None,
    };
    let node: NodeFields = node.ok_or_else(|| StorageError::MetadataNotFound {
        file_id: file_id.to_string(),
    })?;

    Ok(SubmissionMetadata {
        project_id: node.project_id,
        file_name: node.file_name,
    })
}

#[async_trait]
impl SubmissionLookup for HttpSubmissionLookup {
    async fn lookup(&self, file_id: &str) -> Result<SubmissionMetadata, StorageError> {
        let response: reqwest::Response = self
            .client
            .post(&self.graphql_url)
            .json(&node_query(file_id))
            .send()
            .await
            .map_err(HttpClientError::from)?;
        let status: u16 = response.status().as_u16();
        let body: String = response.text().await.map_err(HttpClientError::from)?;

        match status {
            200 => parse_node(file_id, &body),
            404 => Err(StorageError::MetadataNotFound {
                file_id: file_id.to_string(),
            }),
            _ => Err(StorageError::MetadataLookupFailed {
                file_id: file_id.to_string(),
                status,
                message: body,
            }),
        }
    }
}
