//! Upload manifests: the YAML list of files to upload.
//!
//! Checkpoints use the same format, so a saved checkpoint is loaded back
//! exactly like a manifest.

use std::collections::{BTreeSet, VecDeque};
use std::path::{Path, PathBuf};

use biotransfer_common::AccessClass;
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::submission::{SubmissionLookup, SubmissionMetadata};
use crate::types::FileDescriptor;

/// One file as written in a manifest or checkpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Repository file id.
    pub id: String,
    /// Project id in "PROGRAM-PROJECT" form.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    /// Directory holding the file, or the full path when `file_name` is absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// File name inside `path`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    /// Multipart session to resume.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_id: Option<String>,
    /// Declared access class.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access: Option<AccessClass>,
}

impl ManifestEntry {
    /// Local path of the file this entry names.
    pub fn local_path(&self) -> PathBuf {
        let dir: &str = self.path.as_deref().unwrap_or(".");
        match &self.file_name {
            Some(name) => Path::new(dir).join(name),
            None => PathBuf::from(dir),
        }
    }

    /// True when the file name has to come from the repository: no
    /// `file_name`, and `path` does not name an existing file.
    pub fn needs_file_name(&self) -> bool {
        self.file_name.is_none() && !Path::new(self.path.as_deref().unwrap_or(".")).is_file()
    }

    /// Complete a missing project id (and file name, when `with_file_name`)
    /// from the repository.
    ///
    /// # Arguments
    /// * `lookup` - Submission metadata source
    /// * `with_file_name` - Whether the local file will be read
    ///
    /// # Returns
    /// `true` if a lookup was made.
    ///
    /// # Errors
    /// Lookup errors, or `StorageError::Manifest` if the repository does not
    /// record a needed field either.
    pub async fn fill_missing<L: SubmissionLookup + ?Sized>(
        &mut self,
        lookup: &L,
        with_file_name: bool,
    ) -> Result<bool, StorageError> {
        let need_project: bool = self.project_id.is_none();
        let need_name: bool = with_file_name && self.needs_file_name();
        if !need_project && !need_name {
            return Ok(false);
        }

        log::debug!("Looking up submission metadata for file {}", self.id);
        let metadata: SubmissionMetadata = lookup.lookup(&self.id).await?;
        if need_project {
            self.project_id = Some(required(metadata.project_id, &self.id, "project_id")?);
        }
        if need_name {
            self.file_name = Some(required(metadata.file_name, &self.id, "file_name")?);
        }
        Ok(true)
    }
}

fn required(value: Option<String>, file_id: &str, field: &str) -> Result<String, StorageError> {
    value.ok_or_else(|| StorageError::Manifest {
        message: format!(
            "Please provide {} for file {} from manifest or as an argument",
            field, file_id
        ),
    })
}

/// Ordered list of files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub files: Vec<ManifestEntry>,
}

impl Manifest {
    /// Create a manifest from entries.
    pub fn new(files: Vec<ManifestEntry>) -> Self {
        Self { files }
    }

    /// Parse a manifest from YAML text.
    ///
    /// # Errors
    /// Returns `StorageError::Manifest` if the text is not a valid manifest.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, StorageError> {
        serde_yaml::from_str(yaml).map_err(|e| StorageError::Manifest {
            message: e.to_string(),
        })
    }

    /// Serialize the manifest as block-style YAML.
    pub fn to_yaml_string(&self) -> Result<String, StorageError> {
        serde_yaml::to_string(self).map_err(|e| StorageError::Manifest {
            message: e.to_string(),
        })
    }

    /// Load a manifest file.
    ///
    /// # Arguments
    /// * `path` - Manifest or checkpoint file
    ///
    /// # Errors
    /// Returns `StorageError::Io` if the file cannot be read and
    /// `StorageError::Manifest` if it does not parse.
    pub fn load(path: &Path) -> Result<Self, StorageError> {
        let text: String = std::fs::read_to_string(path)
            .map_err(|e| StorageError::io(path.display().to_string(), e))?;
        Self::from_yaml_str(&text)
    }

    /// Write the manifest to `path`, replacing any existing file.
    pub fn save(&self, path: &Path) -> Result<(), StorageError> {
        let text: String = self.to_yaml_string()?;
        std::fs::write(path, text).map_err(|e| StorageError::io(path.display().to_string(), e))
    }

    /// Complete every entry's missing fields from the repository.
    ///
    /// # Returns
    /// Number of lookups made.
    ///
    /// # Errors
    /// Stops at the first entry that cannot be completed.
    pub async fn fill_missing<L: SubmissionLookup + ?Sized>(
        &mut self,
        lookup: &L,
        with_file_name: bool,
    ) -> Result<usize, StorageError> {
        let mut lookups: usize = 0;
        for entry in &mut self.files {
            if entry.fill_missing(lookup, with_file_name).await? {
                lookups += 1;
            }
        }
        Ok(lookups)
    }

    /// Build the upload queue, reading each file's size from disk.
    ///
    /// # Errors
    /// Fails on the first entry that cannot be turned into a descriptor.
    pub fn descriptors(&self) -> Result<VecDeque<FileDescriptor>, StorageError> {
        self.files.iter().map(FileDescriptor::from_entry).collect()
    }
}

/// Split a project id into upper-cased `(program, project)`.
///
/// The program is the first `-` separated token; the project is the rest.
///
/// # Errors
/// Returns `StorageError::Manifest` if either half is empty.
pub fn parse_project_id(project_id: &str) -> Result<(String, String), StorageError> {
    let (program, project) = project_id.split_once('-').unwrap_or((project_id, ""));
    let program: String = program.trim().to_uppercase();
    let project: String = project.trim().to_uppercase();

    if program.is_empty() || project.is_empty() {
        return Err(StorageError::Manifest {
            message: format!("Unable to parse project id {}", project_id),
        });
    }
    Ok((program, project))
}

impl FileDescriptor {
    /// Build a descriptor from a manifest entry.
    ///
    /// The entry's file is stat-ed for its size. Resume state beyond the
    /// session id is not persisted; it is rebuilt from the backend's listing.
    ///
    /// # Errors
    /// Returns `StorageError::Manifest` for a missing or malformed project id
    /// and `StorageError::Io` if the file cannot be stat-ed.
    pub fn from_entry(entry: &ManifestEntry) -> Result<Self, StorageError> {
        let mut descriptor: FileDescriptor = Self::remote_only(entry)?;
        let metadata = std::fs::metadata(&descriptor.path)
            .map_err(|e| StorageError::io(descriptor.path.display().to_string(), e))?;
        if !metadata.is_file() {
            return Err(StorageError::Manifest {
                message: format!("{} is not a regular file", descriptor.path.display()),
            });
        }
        descriptor.size = metadata.len();
        Ok(descriptor)
    }

    /// Build a descriptor without touching the local file.
    ///
    /// Enough for operations that only address the remote object (abort,
    /// delete); `size` is left at zero.
    ///
    /// # Errors
    /// Returns `StorageError::Manifest` for a missing or malformed project id.
    pub fn remote_only(entry: &ManifestEntry) -> Result<Self, StorageError> {
        let project_id: &str = entry.project_id.as_deref().ok_or_else(|| {
            StorageError::Manifest {
                message: format!("Please provide project_id for file {}", entry.id),
            }
        })?;
        let (program, project) = parse_project_id(project_id)?;

        Ok(Self {
            id: entry.id.clone(),
            program,
            project,
            path: entry.local_path(),
            size: 0,
            access: entry.access,
            upload_id: entry.upload_id.clone(),
            uploaded_parts: BTreeSet::new(),
        })
    }

    /// Manifest entry for this descriptor, carrying its session id.
    pub fn to_entry(&self) -> ManifestEntry {
        ManifestEntry {
            id: self.id.clone(),
            project_id: Some(self.project_id()),
            path: Some(self.path.display().to_string()),
            file_name: None,
            upload_id: self.upload_id.clone(),
            access: self.access,
        }
    }
}
