//! Resolved file metadata.

use biotransfer_common::AccessClass;

/// Remote attributes of one file.
///
/// Every field is optional on the wire; a missing size or access class makes
/// the planner handle the file individually.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataEntry {
    /// Size in bytes.
    pub size: Option<u64>,
    /// Access class, `None` if absent or unrecognized.
    pub access: Option<AccessClass>,
    /// MD5 checksum as reported.
    pub md5sum: Option<String>,
    /// Index and metadata files that travel with this file.
    pub related_files: Vec<String>,
    /// Annotation ids attached to this file.
    pub annotations: Vec<String>,
}

impl MetadataEntry {
    /// True if the file has index or metadata files.
    pub fn has_related_files(&self) -> bool {
        !self.related_files.is_empty()
    }

    /// True if the file has annotations.
    pub fn has_annotations(&self) -> bool {
        !self.annotations.is_empty()
    }
}
