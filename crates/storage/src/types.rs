//! Shared data structures for upload operations.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use biotransfer_common::{
    AccessClass, COMPLETE_ATTEMPTS, DEFAULT_PART_SIZE, DEFAULT_UPLOAD_CONCURRENCY,
    LIST_PARTS_ATTEMPTS, PART_RETRY_ATTEMPTS, RETRY_DELAY,
};

use crate::error::StorageError;

/// Submission API location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiLocation {
    /// Base URL of the repository API (e.g., "https://api.example.org/").
    pub server: String,
}

impl ApiLocation {
    /// Create a new API location.
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
        }
    }

    /// Destination URL of a file's object.
    /// Returns: "{server}/v0/submission/{program}/{project}/files/{id}"
    pub fn file_url(&self, file: &FileDescriptor) -> String {
        format!(
            "{}/v0/submission/{}/{}/files/{}",
            self.server.trim_end_matches('/'),
            file.program,
            file.project,
            file.id
        )
    }
}

/// Fixed-delay retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrySettings {
    /// Maximum number of attempts (at least one is always made).
    pub max_attempts: u32,
    /// Delay between attempts.
    pub delay: Duration,
}

impl RetrySettings {
    /// Create retry settings.
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// Number of attempts to make, never zero.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Options for upload operations.
#[derive(Debug, Clone)]
pub struct UploadOptions {
    /// Part size for multipart uploads; smaller files use a single PUT.
    pub part_size: u64,
    /// Number of concurrent part workers.
    pub concurrency: usize,
    /// If false every file is sent with a single PUT.
    pub multipart: bool,
    /// Return the original error of a failed file instead of a halted report.
    pub debug: bool,
    /// Per-part retry budget.
    pub part_retry: RetrySettings,
    /// Polling budget while waiting for a session to appear in listings.
    pub list_retry: RetrySettings,
    /// Retry budget of the complete-upload call.
    pub complete_retry: RetrySettings,
    /// Directory checkpoint files are written to.
    pub checkpoint_dir: PathBuf,
    /// Manifest name used for the checkpoint file name.
    pub manifest_name: Option<String>,
    /// How often the progress reporter samples the counter.
    pub progress_interval: Duration,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            part_size: DEFAULT_PART_SIZE,
            concurrency: DEFAULT_UPLOAD_CONCURRENCY,
            multipart: true,
            debug: false,
            part_retry: RetrySettings::new(PART_RETRY_ATTEMPTS, RETRY_DELAY),
            list_retry: RetrySettings::new(LIST_PARTS_ATTEMPTS, RETRY_DELAY),
            complete_retry: RetrySettings::new(COMPLETE_ATTEMPTS, RETRY_DELAY),
            checkpoint_dir: PathBuf::from("."),
            manifest_name: None,
            progress_interval: Duration::from_millis(200),
        }
    }
}

impl UploadOptions {
    /// Create options with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the multipart part size.
    pub fn with_part_size(mut self, part_size: u64) -> Self {
        self.part_size = part_size;
        self
    }

    /// Set the number of concurrent part workers.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Enable or disable multipart uploads.
    pub fn with_multipart(mut self, multipart: bool) -> Self {
        self.multipart = multipart;
        self
    }

    /// Enable debug mode (errors are returned instead of reported).
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Set the same retry delay on every retry tier.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.part_retry.delay = delay;
        self.list_retry.delay = delay;
        self.complete_retry.delay = delay;
        self
    }

    /// Set the per-part retry budget.
    pub fn with_part_retry(mut self, retry: RetrySettings) -> Self {
        self.part_retry = retry;
        self
    }

    /// Set the listing poll budget.
    pub fn with_list_retry(mut self, retry: RetrySettings) -> Self {
        self.list_retry = retry;
        self
    }

    /// Set the complete-upload retry budget.
    pub fn with_complete_retry(mut self, retry: RetrySettings) -> Self {
        self.complete_retry = retry;
        self
    }

    /// Set where checkpoint files are written.
    pub fn with_checkpoint_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.checkpoint_dir = dir.into();
        self
    }

    /// Set the manifest name used to name checkpoint files.
    pub fn with_manifest_name(mut self, name: impl Into<String>) -> Self {
        self.manifest_name = Some(name.into());
        self
    }

    /// Set how often progress is sampled.
    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Check the options are usable.
    pub fn validate(&self) -> Result<(), StorageError> {
        if self.part_size == 0 {
            return Err(StorageError::InvalidConfig {
                message: "part size must be greater than zero".into(),
            });
        }
        if self.concurrency == 0 {
            return Err(StorageError::InvalidConfig {
                message: "concurrency must be at least 1".into(),
            });
        }
        Ok(())
    }
}

/// A file queued for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    /// Repository file id.
    pub id: String,
    /// Program name (upper case).
    pub program: String,
    /// Project name within the program (upper case).
    pub project: String,
    /// Local file path.
    pub path: PathBuf,
    /// File size in bytes.
    pub size: u64,
    /// Access class if the manifest declared one.
    pub access: Option<AccessClass>,
    /// Multipart session id when resuming.
    pub upload_id: Option<String>,
    /// Part numbers the backend already holds.
    pub uploaded_parts: BTreeSet<u32>,
}

impl FileDescriptor {
    /// Project id in "PROGRAM-PROJECT" form.
    pub fn project_id(&self) -> String {
        format!("{}-{}", self.program, self.project)
    }
}

/// One byte range of a file under the multipart protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartRecord {
    /// 1-based part number.
    pub part_number: u32,
    /// Byte offset within the file.
    pub offset: u64,
    /// Length of this part in bytes.
    pub length: u64,
}

/// Which counter a progress snapshot measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressUnit {
    Bytes,
    Parts,
}

/// Upload step a progress snapshot belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadPhase {
    SimplePut,
    UploadingParts,
}

/// Progress snapshot for the file currently being uploaded.
#[derive(Debug, Clone)]
pub struct TransferProgress {
    /// File being uploaded.
    pub file_id: String,
    /// Current step.
    pub phase: UploadPhase,
    /// Units completed so far.
    pub completed: u64,
    /// Units expected in this step.
    pub total: u64,
    /// What `completed` and `total` count.
    pub unit: ProgressUnit,
}

/// A file that stopped the run.
#[derive(Debug, Clone)]
pub struct UploadFailure {
    /// The file that failed.
    pub file_id: String,
    /// Why it failed.
    pub error: StorageError,
    /// Checkpoint written for resuming, if saving succeeded.
    pub checkpoint: Option<PathBuf>,
}

/// Outcome of processing a queue.
#[derive(Debug, Clone, Default)]
pub struct UploadReport {
    /// Files uploaded in this run, in order.
    pub uploaded: Vec<String>,
    /// Set when the run halted on a fatal file error.
    pub failure: Option<UploadFailure>,
}

impl UploadReport {
    /// True when every queued file was uploaded.
    pub fn is_complete(&self) -> bool {
        self.failure.is_none()
    }
}
