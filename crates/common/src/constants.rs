//! Shared constants used across biotransfer crates.

use std::time::Duration;

/// Default multipart part size (1 GiB).
/// Files smaller than this are sent with a single PUT.
pub const DEFAULT_PART_SIZE: u64 = 1024 * 1024 * 1024;

/// Default number of concurrent part workers.
pub const DEFAULT_UPLOAD_CONCURRENCY: usize = 8;

/// Attempts made for one part before it is reported as failed.
pub const PART_RETRY_ATTEMPTS: u32 = 10;

/// Polls of the part listing before a session counts as never materialized.
pub const LIST_PARTS_ATTEMPTS: u32 = 10;

/// Attempts for the complete-upload call.
pub const COMPLETE_ATTEMPTS: u32 = 3;

/// Fixed delay between retries of any storage call.
pub const RETRY_DELAY: Duration = Duration::from_secs(2);

/// Default aggregate size of a download bundle (1 MiB).
pub const DEFAULT_BUNDLE_SIZE: u64 = 1024 * 1024;

/// Header carrying the repository API token.
pub const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";

/// Prefix of checkpoint files written when an upload run halts.
pub const CHECKPOINT_PREFIX: &str = "resume_";
