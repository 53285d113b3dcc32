//! Resume checkpoints written when an upload stops on a fatal error.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use biotransfer_common::CHECKPOINT_PREFIX;

use crate::error::StorageError;
use crate::manifest::{Manifest, ManifestEntry};
use crate::types::FileDescriptor;

/// Checkpoint file path: `<dir>/resume_<manifest name or file id>`.
pub fn checkpoint_path(dir: &Path, manifest_name: Option<&str>, file_id: &str) -> PathBuf {
    dir.join(format!(
        "{}{}",
        CHECKPOINT_PREFIX,
        manifest_name.unwrap_or(file_id)
    ))
}

/// Save every file still queued, head first.
///
/// # Arguments
/// * `path` - Checkpoint file to write
/// * `remaining` - Unfinished files; the failed file must be at the head
///
/// # Returns
/// The path that was written.
pub fn save_checkpoint(
    path: &Path,
    remaining: &VecDeque<FileDescriptor>,
) -> Result<PathBuf, StorageError> {
    let entries: Vec<ManifestEntry> = remaining.iter().map(FileDescriptor::to_entry).collect();
    Manifest::new(entries).save(path)?;
    log::info!("Saved unfinished uploads to {}", path.display());
    Ok(path.to_path_buf())
}

/// Load a checkpoint. Same as [`Manifest::load`].
pub fn load_checkpoint(path: &Path) -> Result<Manifest, StorageError> {
    Manifest::load(path)
}
