//! Submission metadata lookup.
//!
//! Manifest entries may leave out the project id or the file name; the
//! repository knows both for every registered file id.

use async_trait::async_trait;

use crate::error::StorageError;

/// Fields the repository records for a registered file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmissionMetadata {
    /// Project id in "PROGRAM-PROJECT" form.
    pub project_id: Option<String>,
    /// Registered file name.
    pub file_name: Option<String>,
}

/// Source of submission metadata - implemented by each transport.
#[async_trait]
pub trait SubmissionLookup: Send + Sync {
    /// Fetch the metadata registered for `file_id`.
    ///
    /// # Errors
    /// `MetadataNotFound` when the repository has no such file,
    /// `MetadataLookupFailed` for any other refusal.
    async fn lookup(&self, file_id: &str) -> Result<SubmissionMetadata, StorageError>;
}
