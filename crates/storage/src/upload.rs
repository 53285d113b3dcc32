//! Upload orchestration.
//!
//! Files are taken from the head of a queue one at a time. Each file goes
//! through a small state machine:
//!
//! - Files smaller than the part size (or every file when multipart is off)
//!   are sent with a single streamed PUT.
//! - Larger files use the multipart protocol: initiate (skipped when the
//!   descriptor already carries a session), wait for the session to appear
//!   in listings, upload the missing parts on a worker pool, verify against
//!   a fresh listing, re-upload once if parts are missing, then complete.
//!
//! A fatal error on any file stops the run. The unfinished queue, failed file
//! first and carrying its session id, is saved as a checkpoint that can be
//! loaded back as a manifest.
//!
//! # Example
//!
//! ```ignore
//! use biotransfer_storage::{ApiLocation, Manifest, UploadOptions, UploadOrchestrator};
//!
//! let queue = Manifest::load(path)?.descriptors()?;
//! let orchestrator = UploadOrchestrator::new(&client, ApiLocation::new(server))
//!     .with_options(UploadOptions::default().with_concurrency(4));
//! let report = orchestrator.upload_queue(queue, None).await?;
//! ```

use std::collections::{BTreeSet, VecDeque};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use biotransfer_common::{ProgressCallback, ProgressCounter};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::checkpoint::{checkpoint_path, save_checkpoint};
use crate::codec::{
    complete_manifest_xml, listed_part_numbers, parse_initiate, parse_list_parts, ListedPart,
};
use crate::error::StorageError;
use crate::parts::{plan_parts, upload_strategy, UploadStrategy};
use crate::stream::ProgressReader;
use crate::traits::{StorageClient, StorageResponse};
use crate::types::{
    ApiLocation, FileDescriptor, PartRecord, ProgressUnit, TransferProgress, UploadFailure,
    UploadOptions, UploadPhase, UploadReport,
};
use crate::worker::{PartOutcome, PartTask, PartTransferWorker, WorkerPool};

/// Drives uploads, aborts and deletes against any `StorageClient`.
pub struct UploadOrchestrator<'a, C: StorageClient + ?Sized> {
    /// Transport for the storage protocol.
    client: &'a C,
    /// Where file URLs point.
    location: ApiLocation,
    /// Upload options.
    options: UploadOptions,
    /// Fired by the user or by a progress callback returning false.
    cancel: CancellationToken,
}

impl<'a, C: StorageClient + ?Sized> UploadOrchestrator<'a, C> {
    /// Create a new upload orchestrator.
    ///
    /// # Arguments
    /// * `client` - Storage client for the multipart protocol
    /// * `location` - Submission API location
    pub fn new(client: &'a C, location: ApiLocation) -> Self {
        Self {
            client,
            location,
            options: UploadOptions::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Set upload options.
    ///
    /// # Arguments
    /// * `options` - Upload options
    pub fn with_options(mut self, options: UploadOptions) -> Self {
        self.options = options;
        self
    }

    /// Use an externally owned cancellation token (e.g. wired to Ctrl-C).
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that cancels this orchestrator's work.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Upload every file in `queue`, head first.
    ///
    /// # Arguments
    /// * `queue` - Files to upload
    /// * `progress` - Optional callback for the file in flight; returning
    ///   `false` cancels the run
    ///
    /// # Returns
    /// A report of the uploaded files. If a file fails, the run halts and the
    /// report carries the failure and the checkpoint path.
    ///
    /// # Errors
    /// Invalid options. In debug mode, the failing file's original error
    /// (after the checkpoint has been written).
    pub async fn upload_queue(
        &self,
        mut queue: VecDeque<FileDescriptor>,
        progress: Option<&dyn ProgressCallback<TransferProgress>>,
    ) -> Result<UploadReport, StorageError> {
        self.options.validate()?;
        let mut report: UploadReport = UploadReport::default();

        loop {
            let Some(file) = queue.front_mut() else {
                break;
            };
            let result: Result<(), StorageError> = self.upload_file(file, progress).await;
            let file_id: String = file.id.clone();

            match result {
                Ok(()) => {
                    report.uploaded.push(file_id);
                    queue.pop_front();
                }
                Err(error) => {
                    let checkpoint: Option<PathBuf> = self.checkpoint(&queue, &file_id);
                    if self.options.debug {
                        return Err(error);
                    }
                    log::error!("Failure: {}", error);
                    report.failure = Some(UploadFailure {
                        file_id,
                        error,
                        checkpoint,
                    });
                    return Ok(report);
                }
            }
        }

        Ok(report)
    }

    /// Upload one file. On failure `file.upload_id` holds the session to resume.
    ///
    /// # Errors
    /// Any fatal error of the simple or multipart path.
    pub async fn upload_file(
        &self,
        file: &mut FileDescriptor,
        progress: Option<&dyn ProgressCallback<TransferProgress>>,
    ) -> Result<(), StorageError> {
        let url: String = self.location.file_url(file);
        log::info!("Attempting to upload to {}", url);

        match upload_strategy(file.size, self.options.part_size, self.options.multipart) {
            UploadStrategy::SimplePut => {
                if self.options.multipart {
                    log::info!(
                        "File size smaller than part size {}, do simple upload",
                        self.options.part_size
                    );
                }
                self.simple_put(file, &url, progress).await
            }
            UploadStrategy::Multipart => self.multipart_upload(file, &url, progress).await,
        }
    }

    /// Abort the multipart session of `file`.
    ///
    /// # Errors
    /// `InvalidConfig` if the descriptor has no session id; `AbortFailed` for
    /// any status other than 204 or 404.
    pub async fn abort(&self, file: &FileDescriptor) -> Result<(), StorageError> {
        let upload_id: &str = file
            .upload_id
            .as_deref()
            .ok_or_else(|| StorageError::InvalidConfig {
                message: format!("No upload id for file {}", file.id),
            })?;
        let url: String = self.location.file_url(file);

        let response: StorageResponse = self.client.abort_multipart(&url, upload_id).await?;
        match response.status {
            204 | 404 => {
                log::info!("Abort multipart upload {}", upload_id);
                Ok(())
            }
            status => Err(StorageError::AbortFailed {
                upload_id: upload_id.to_string(),
                status,
                message: response.body,
            }),
        }
    }

    /// Abort every file that carries a session id.
    ///
    /// # Returns
    /// Number of sessions aborted.
    pub async fn abort_queue(&self, files: &[FileDescriptor]) -> Result<usize, StorageError> {
        let mut aborted: usize = 0;
        for file in files {
            if file.upload_id.is_none() {
                log::debug!("No multipart session for file {}, skipping", file.id);
                continue;
            }
            self.abort(file).await?;
            aborted += 1;
        }
        Ok(aborted)
    }

    /// Delete the remote object of `file`.
    ///
    /// # Errors
    /// `DeleteFailed` for any status other than 204.
    pub async fn delete(&self, file: &FileDescriptor) -> Result<(), StorageError> {
        let url: String = self.location.file_url(file);
        let response: StorageResponse = self.client.delete_object(&url).await?;
        if response.status == 204 {
            log::info!("Delete file {}", file.id);
            Ok(())
        } else {
            Err(StorageError::DeleteFailed {
                file_id: file.id.clone(),
                status: response.status,
                message: response.body,
            })
        }
    }

    // ---- simple path ----

    async fn simple_put(
        &self,
        file: &FileDescriptor,
        url: &str,
        progress: Option<&dyn ProgressCallback<TransferProgress>>,
    ) -> Result<(), StorageError> {
        let handle: tokio::fs::File = tokio::fs::File::open(&file.path)
            .await
            .map_err(|e| StorageError::io(file.path.display().to_string(), e))?;
        let counter: ProgressCounter = ProgressCounter::new();
        let body: ProgressReader<tokio::fs::File> = ProgressReader::new(handle, counter.clone());

        let request = self.until_cancelled(self.client.put_object(url, body, file.size));
        let file_id: &str = &file.id;
        let total: u64 = file.size;
        let response: StorageResponse = self
            .report_progress(request, &counter, progress, |done| TransferProgress {
                file_id: file_id.to_string(),
                phase: UploadPhase::SimplePut,
                completed: done,
                total,
                unit: ProgressUnit::Bytes,
            })
            .await?;

        if !response.is_ok() {
            return Err(StorageError::PutFailed {
                file_id: file.id.clone(),
                status: response.status,
                message: response.body,
            });
        }
        log::info!("Upload finished for file {}", file.id);
        Ok(())
    }

    // ---- multipart path ----

    async fn multipart_upload(
        &self,
        file: &mut FileDescriptor,
        url: &str,
        progress: Option<&dyn ProgressCallback<TransferProgress>>,
    ) -> Result<(), StorageError> {
        let upload_id: String = match &file.upload_id {
            Some(id) => {
                log::info!("Resume multipart upload {}", id);
                id.clone()
            }
            None => {
                let id: String = self.initiate(url).await?;
                file.upload_id = Some(id.clone());
                id
            }
        };

        let planned: Vec<PartRecord> = plan_parts(file.size, self.options.part_size);

        let listed: Vec<ListedPart> = self.wait_for_session(url, &upload_id).await?;
        file.uploaded_parts = listed_part_numbers(&listed);

        self.upload_missing_parts(file, url, &upload_id, &planned, progress)
            .await?;
        let mut listed: Vec<ListedPart> = self.wait_for_session(url, &upload_id).await?;
        file.uploaded_parts = listed_part_numbers(&listed);

        if completed_parts(&file.uploaded_parts, &planned) != planned.len() {
            log::warn!(
                "Only {} of {} parts listed for file {}, retrying missing parts",
                completed_parts(&file.uploaded_parts, &planned),
                planned.len(),
                file.id
            );
            self.upload_missing_parts(file, url, &upload_id, &planned, progress)
                .await?;
            listed = self.wait_for_session(url, &upload_id).await?;
            file.uploaded_parts = listed_part_numbers(&listed);

            let completed: usize = completed_parts(&file.uploaded_parts, &planned);
            if completed != planned.len() {
                return Err(StorageError::IncompleteUpload {
                    file_id: file.id.clone(),
                    completed,
                    expected: planned.len(),
                });
            }
        }

        // Stray parts beyond the plan (e.g. from a different part size) are left out.
        let last_part: u32 = planned.last().map(|p| p.part_number).unwrap_or(0);
        listed.retain(|p| p.part_number >= 1 && p.part_number <= last_part);
        self.complete(url, &upload_id, &listed).await?;

        log::info!("Multipart upload finished for file {}", file.id);
        file.upload_id = None;
        Ok(())
    }

    async fn initiate(&self, url: &str) -> Result<String, StorageError> {
        let response: StorageResponse = self
            .until_cancelled(self.client.initiate_multipart(url))
            .await?;
        if !response.is_ok() {
            return Err(StorageError::InitiateFailed {
                status: response.status,
                message: response.body,
            });
        }
        let upload_id: String = parse_initiate(&response.body)?;
        log::info!("Start multipart upload: {}", upload_id);
        Ok(upload_id)
    }

    /// Poll the listing until the session shows up, returning its parts.
    async fn wait_for_session(
        &self,
        url: &str,
        upload_id: &str,
    ) -> Result<Vec<ListedPart>, StorageError> {
        let attempts: u32 = self.options.list_retry.attempts();

        for attempt in 1..=attempts {
            match self
                .until_cancelled(self.client.list_parts(url, upload_id))
                .await
            {
                Ok(response) if response.is_ok() => return parse_list_parts(&response.body),
                Ok(response) if response.status == 403 || response.status == 400 => {
                    return Err(StorageError::PermissionOrBadRequest {
                        status: response.status,
                        message: response.body,
                    });
                }
                Ok(response) => log::debug!(
                    "Multipart upload {} not listed yet (status {})",
                    upload_id,
                    response.status
                ),
                Err(e) if e.is_retryable() => {
                    log::debug!("Listing multipart upload {} failed: {}", upload_id, e)
                }
                Err(e) => return Err(e),
            }
            if attempt < attempts {
                self.pause(self.options.list_retry.delay).await?;
            }
        }

        Err(StorageError::NotYetMaterialized {
            upload_id: upload_id.to_string(),
            attempts,
        })
    }

    async fn upload_missing_parts(
        &self,
        file: &FileDescriptor,
        url: &str,
        upload_id: &str,
        planned: &[PartRecord],
        progress: Option<&dyn ProgressCallback<TransferProgress>>,
    ) -> Result<(), StorageError> {
        let missing: Vec<PartRecord> = planned
            .iter()
            .filter(|p| !file.uploaded_parts.contains(&p.part_number))
            .cloned()
            .collect();
        if missing.is_empty() {
            log::debug!("All parts of file {} already uploaded", file.id);
            return Ok(());
        }

        let path: Arc<Path> = Arc::from(file.path.as_path());
        let url: Arc<str> = Arc::from(url);
        let session: Arc<str> = Arc::from(upload_id);
        let tasks = missing.into_iter().map(|part| PartTask {
            path: Arc::clone(&path),
            url: Arc::clone(&url),
            upload_id: Arc::clone(&session),
            part,
        });

        let counter: ProgressCounter = ProgressCounter::new();
        let worker: PartTransferWorker<'_, C> =
            PartTransferWorker::new(self.client, self.options.part_retry, counter.clone());
        let worker: &PartTransferWorker<'_, C> = &worker;
        let pool: WorkerPool = WorkerPool::new(self.options.concurrency, self.cancel.clone());

        let already: u64 = completed_parts(&file.uploaded_parts, planned) as u64;
        let total: u64 = planned.len() as u64;
        let file_id: &str = &file.id;

        let run = pool.run(tasks, move |task| async move { worker.upload(&task).await });
        let outcomes: Vec<PartOutcome> = self
            .report_progress(run, &counter, progress, |done| TransferProgress {
                file_id: file_id.to_string(),
                phase: UploadPhase::UploadingParts,
                completed: already + done,
                total,
                unit: ProgressUnit::Parts,
            })
            .await?;

        let failed: usize = outcomes.iter().filter(|o| !o.is_uploaded()).count();
        if failed > 0 {
            log::warn!("{} parts of file {} failed to upload", failed, file.id);
        }
        Ok(())
    }

    async fn complete(
        &self,
        url: &str,
        upload_id: &str,
        parts: &[ListedPart],
    ) -> Result<(), StorageError> {
        let manifest_xml: String = complete_manifest_xml(parts);
        let attempts: u32 = self.options.complete_retry.attempts();
        let mut last_status: u16 = 0;
        let mut last_message: String = String::new();

        for attempt in 1..=attempts {
            let request = self
                .client
                .complete_multipart(url, upload_id, manifest_xml.clone());
            match self.until_cancelled(request).await {
                Ok(response) if response.is_ok() => return Ok(()),
                Err(StorageError::Cancelled) => return Err(StorageError::Cancelled),
                Ok(response) => {
                    last_status = response.status;
                    last_message = response.body;
                }
                Err(e) => {
                    last_status = 0;
                    last_message = e.to_string();
                }
            }
            log::warn!(
                "Fail to complete multipart upload {} (attempt {}/{}): {}",
                upload_id,
                attempt,
                attempts,
                last_message
            );
            if attempt < attempts {
                self.pause(self.options.complete_retry.delay).await?;
            }
        }

        Err(StorageError::CompleteFailed {
            status: last_status,
            message: last_message,
        })
    }

    // ---- plumbing ----

    /// Save the unfinished queue. Save errors are only logged.
    fn checkpoint(&self, remaining: &VecDeque<FileDescriptor>, file_id: &str) -> Option<PathBuf> {
        let path: PathBuf = checkpoint_path(
            &self.options.checkpoint_dir,
            self.options.manifest_name.as_deref(),
            file_id,
        );
        log::info!("Saving unfinished upload file");
        match save_checkpoint(&path, remaining) {
            Ok(path) => Some(path),
            Err(e) => {
                log::warn!("Failed to save checkpoint {}: {}", path.display(), e);
                None
            }
        }
    }

    async fn pause(&self, delay: Duration) -> Result<(), StorageError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(StorageError::Cancelled),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }

    /// Race a backend call against the cancellation token.
    async fn until_cancelled<T>(
        &self,
        work: impl Future<Output = Result<T, StorageError>>,
    ) -> Result<T, StorageError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(StorageError::Cancelled),
            result = work => result,
        }
    }

    /// Run `work` while sampling `counter` into `progress` on an interval.
    async fn report_progress<T, W, S>(
        &self,
        work: W,
        counter: &ProgressCounter,
        progress: Option<&dyn ProgressCallback<TransferProgress>>,
        snapshot: S,
    ) -> T
    where
        W: Future<Output = T>,
        S: Fn(u64) -> TransferProgress,
    {
        let Some(callback) = progress else {
            return work.await;
        };

        tokio::pin!(work);
        let period: Duration = self.options.progress_interval.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                result = &mut work => {
                    callback.on_progress(&snapshot(counter.get()));
                    return result;
                }
                _ = ticker.tick() => {
                    if !callback.on_progress(&snapshot(counter.get())) {
                        log::debug!("Progress callback requested cancellation");
                        self.cancel.cancel();
                    }
                }
            }
        }
    }
}

/// Planned parts the backend already lists.
fn completed_parts(listed: &BTreeSet<u32>, planned: &[PartRecord]) -> usize {
    planned
        .iter()
        .filter(|p| listed.contains(&p.part_number))
        .count()
}
