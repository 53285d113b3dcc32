//! Resumable multipart upload engine.
//!
//! This crate drives a storage backend's multipart protocol through any
//! [`StorageClient`] implementation:
//!
//! - **Codec** - XML messages of the multipart protocol
//! - **Workers** - Part uploads over memory-mapped byte ranges with local retry
//! - **Orchestrator** - Per-file simple/multipart state machine with checkpoints
//!
//! # Manifests and checkpoints
//!
//! Upload queues are read from YAML manifests. When a run stops on a fatal
//! error the unfinished queue is written in the same format, so resuming is
//! just loading the checkpoint as the next manifest. Entries that leave out
//! the project id or file name are completed through a [`SubmissionLookup`].

mod checkpoint;
mod codec;
mod error;
mod manifest;
mod parts;
mod range_view;
mod stream;
mod submission;
mod traits;
mod types;
mod upload;
mod worker;

pub use checkpoint::{checkpoint_path, load_checkpoint, save_checkpoint};
pub use codec::{
    complete_manifest_xml, listed_part_numbers, parse_initiate, parse_list_parts, ListedPart,
};
pub use error::StorageError;
pub use manifest::{parse_project_id, Manifest, ManifestEntry};
pub use parts::{expected_part_count, plan_parts, upload_strategy, UploadStrategy};
pub use range_view::ReadOnlyByteRangeView;
pub use stream::ProgressReader;
pub use submission::{SubmissionLookup, SubmissionMetadata};
pub use traits::{StorageClient, StorageResponse};
pub use types::{
    ApiLocation, FileDescriptor, PartRecord, ProgressUnit, RetrySettings, TransferProgress,
    UploadFailure, UploadOptions, UploadPhase, UploadReport,
};
pub use upload::UploadOrchestrator;
pub use worker::{PartOutcome, PartTask, PartTransferWorker, WorkerPool};

pub use biotransfer_common::{ProgressCallback, ProgressCounter};
