//! Part transfer workers and the pool that runs them.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use biotransfer_common::ProgressCounter;
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::error::StorageError;
use crate::range_view::ReadOnlyByteRangeView;
use crate::traits::{StorageClient, StorageResponse};
use crate::types::{PartRecord, RetrySettings};

/// Immutable input of one part upload.
#[derive(Debug, Clone)]
pub struct PartTask {
    /// Local file the part is read from.
    pub path: Arc<Path>,
    /// Destination URL of the file.
    pub url: Arc<str>,
    /// Multipart session id.
    pub upload_id: Arc<str>,
    /// Byte range and part number.
    pub part: PartRecord,
}

/// Result of one part upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartOutcome {
    /// The backend confirmed the part.
    Uploaded { part_number: u32, attempts: u32 },
    /// Every attempt failed.
    Failed {
        part_number: u32,
        attempts: u32,
        last_error: String,
    },
}

impl PartOutcome {
    /// True if the part was uploaded.
    pub fn is_uploaded(&self) -> bool {
        matches!(self, PartOutcome::Uploaded { .. })
    }

    /// Part number this outcome is for.
    pub fn part_number(&self) -> u32 {
        match self {
            PartOutcome::Uploaded { part_number, .. } => *part_number,
            PartOutcome::Failed { part_number, .. } => *part_number,
        }
    }
}

/// Uploads single parts with a fixed-delay local retry.
///
/// Failures stay local: a failed part is reported through [`PartOutcome`],
/// never as an error that would stop the other workers.
pub struct PartTransferWorker<'a, C: StorageClient + ?Sized> {
    client: &'a C,
    retry: RetrySettings,
    completed: ProgressCounter,
}

impl<'a, C: StorageClient + ?Sized> PartTransferWorker<'a, C> {
    /// Create a worker.
    ///
    /// # Arguments
    /// * `client` - Transport used for the part PUTs
    /// * `retry` - Attempts and delay per part
    /// * `completed` - Counter incremented once per uploaded part
    pub fn new(client: &'a C, retry: RetrySettings, completed: ProgressCounter) -> Self {
        Self {
            client,
            retry,
            completed,
        }
    }

    /// Upload exactly the byte range of `task`.
    pub async fn upload(&self, task: &PartTask) -> PartOutcome {
        let part_number: u32 = task.part.part_number;
        let attempts: u32 = self.retry.attempts();
        let mut last_error: String = String::new();

        for attempt in 1..=attempts {
            log::debug!("Start upload part {} (attempt {}/{})", part_number, attempt, attempts);
            match self.try_once(task).await {
                Ok(()) => {
                    self.completed.increment();
                    log::debug!("Finish upload part {}", part_number);
                    return PartOutcome::Uploaded {
                        part_number,
                        attempts: attempt,
                    };
                }
                Err(message) => {
                    log::debug!("Retry upload part {}, {}", part_number, message);
                    last_error = message;
                    if attempt < attempts {
                        tokio::time::sleep(self.retry.delay).await;
                    }
                }
            }
        }

        log::warn!(
            "Part {} failed after {} attempts: {}",
            part_number,
            attempts,
            last_error
        );
        PartOutcome::Failed {
            part_number,
            attempts,
            last_error,
        }
    }

    async fn try_once(&self, task: &PartTask) -> Result<(), String> {
        let view: ReadOnlyByteRangeView =
            ReadOnlyByteRangeView::open(&task.path, task.part.offset, task.part.length)
                .map_err(|e| e.to_string())?;

        let response: StorageResponse = self
            .client
            .upload_part(
                &task.url,
                &task.upload_id,
                task.part.part_number,
                view.into_bytes(),
            )
            .await
            .map_err(|e| e.to_string())?;

        if response.is_ok() {
            Ok(())
        } else {
            Err(format!("status {}: {}", response.status, response.body))
        }
    }
}

/// Fixed-size pool running at most `size` workers at a time.
///
/// Cancelling the token drops every in-flight worker; nothing outlives
/// [`run`](Self::run).
#[derive(Debug, Clone)]
pub struct WorkerPool {
    size: usize,
    cancel: CancellationToken,
}

impl WorkerPool {
    /// Create a pool of `size` workers (at least one).
    pub fn new(size: usize, cancel: CancellationToken) -> Self {
        Self {
            size: size.max(1),
            cancel,
        }
    }

    /// Number of concurrent workers.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Run `work` over every task and collect the results in completion order.
    ///
    /// # Errors
    /// Returns `StorageError::Cancelled` if the token fires before all tasks finish.
    pub async fn run<I, F, Fut, T>(&self, tasks: I, work: F) -> Result<Vec<T>, StorageError>
    where
        I: IntoIterator,
        F: FnMut(I::Item) -> Fut,
        Fut: Future<Output = T>,
    {
        if self.cancel.is_cancelled() {
            return Err(StorageError::Cancelled);
        }

        let all = stream::iter(tasks)
            .map(work)
            .buffer_unordered(self.size)
            .collect::<Vec<T>>();

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                log::warn!("Cancellation requested, terminating workers");
                Err(StorageError::Cancelled)
            }
            results = all => Ok(results),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use bytes::Bytes;
    use std::io::Write;
    use tempfile::NamedTempFile;
    use tokio::fs::File;

    use crate::stream::ProgressReader;

    /// Fails the first `failures` part PUTs, then succeeds.
    struct FlakyClient {
        failures: usize,
        calls: AtomicUsize,
        bodies: Mutex<Vec<Bytes>>,
    }

    impl FlakyClient {
        fn new(failures: usize) -> Self {
            Self {
                failures,
                calls: AtomicUsize::new(0),
                bodies: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl StorageClient for FlakyClient {
        async fn put_object(
            &self,
            _url: &str,
            _body: ProgressReader<File>,
            _length: u64,
        ) -> Result<StorageResponse, StorageError> {
            unreachable!()
        }

        async fn initiate_multipart(&self, _url: &str) -> Result<StorageResponse, StorageError> {
            unreachable!()
        }

        async fn list_parts(
            &self,
            _url: &str,
            _upload_id: &str,
        ) -> Result<StorageResponse, StorageError> {
            unreachable!()
        }

        async fn upload_part(
            &self,
            _url: &str,
            _upload_id: &str,
            _part_number: u32,
            body: Bytes,
        ) -> Result<StorageResponse, StorageError> {
            let call: usize = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                if call % 2 == 0 {
                    return Err(StorageError::Transport {
                        message: "connection reset".into(),
                        retryable: true,
                    });
                }
                return Ok(StorageResponse::new(500, "slow down"));
            }
            self.bodies.lock().unwrap().push(body);
            Ok(StorageResponse::new(200, ""))
        }

        async fn complete_multipart(
            &self,
            _url: &str,
            _upload_id: &str,
            _manifest_xml: String,
        ) -> Result<StorageResponse, StorageError> {
            unreachable!()
        }

        async fn abort_multipart(
            &self,
            _url: &str,
            _upload_id: &str,
        ) -> Result<StorageResponse, StorageError> {
            unreachable!()
        }

        async fn delete_object(&self, _url: &str) -> Result<StorageResponse, StorageError> {
            unreachable!()
        }
    }

    fn task_for(file: &NamedTempFile, offset: u64, length: u64) -> PartTask {
        PartTask {
            path: Arc::from(file.path()),
            url: Arc::from("https://api.example.org/v0/submission/P/Q/files/f"),
            upload_id: Arc::from("upload-1"),
            part: PartRecord {
                part_number: 2,
                offset,
                length,
            },
        }
    }

    fn data_file() -> NamedTempFile {
        let mut file: NamedTempFile = NamedTempFile::new().unwrap();
        file.write_all(b"0123456789abcdefghij").unwrap();
        file.flush().unwrap();
        file
    }

    fn no_delay(attempts: u32) -> RetrySettings {
        RetrySettings::new(attempts, Duration::ZERO)
    }

    #[tokio::test]
    async fn test_worker_uploads_exact_range() {
        let file: NamedTempFile = data_file();
        let client: FlakyClient = FlakyClient::new(0);
        let counter: ProgressCounter = ProgressCounter::new();
        let worker = PartTransferWorker::new(&client, no_delay(10), counter.clone());

        let outcome: PartOutcome = worker.upload(&task_for(&file, 10, 5)).await;

        assert_eq!(
            outcome,
            PartOutcome::Uploaded {
                part_number: 2,
                attempts: 1
            }
        );
        assert_eq!(counter.get(), 1);
        assert_eq!(client.bodies.lock().unwrap()[0].as_ref(), b"abcde");
    }

    #[tokio::test]
    async fn test_worker_retries_until_success() {
        let file: NamedTempFile = data_file();
        let client: FlakyClient = FlakyClient::new(3);
        let counter: ProgressCounter = ProgressCounter::new();
        let worker = PartTransferWorker::new(&client, no_delay(10), counter.clone());

        let outcome: PartOutcome = worker.upload(&task_for(&file, 0, 10)).await;

        assert!(outcome.is_uploaded());
        assert_eq!(client.calls.load(Ordering::SeqCst), 4);
        assert_eq!(counter.get(), 1);
    }

    #[tokio::test]
    async fn test_worker_gives_up_after_budget() {
        let file: NamedTempFile = data_file();
        let client: FlakyClient = FlakyClient::new(100);
        let counter: ProgressCounter = ProgressCounter::new();
        let worker = PartTransferWorker::new(&client, no_delay(10), counter.clone());

        let outcome: PartOutcome = worker.upload(&task_for(&file, 0, 10)).await;

        assert!(matches!(outcome, PartOutcome::Failed { attempts: 10, .. }));
        assert_eq!(client.calls.load(Ordering::SeqCst), 10);
        assert_eq!(counter.get(), 0);
    }

    #[tokio::test]
    async fn test_worker_read_failure_is_retried_locally() {
        let file: NamedTempFile = data_file();
        let client: FlakyClient = FlakyClient::new(0);
        let worker = PartTransferWorker::new(&client, no_delay(3), ProgressCounter::new());

        // Range past the end of the file can never be mapped.
        let outcome: PartOutcome = worker.upload(&task_for(&file, 15, 10)).await;

        assert!(matches!(outcome, PartOutcome::Failed { attempts: 3, .. }));
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_pool_runs_all_tasks_with_bounded_concurrency() {
        let pool: WorkerPool = WorkerPool::new(3, CancellationToken::new());
        let running: Arc<AtomicUsize> = Arc::new(AtomicUsize::new(0));
        let peak: Arc<AtomicUsize> = Arc::new(AtomicUsize::new(0));

        let results: Vec<u32> = pool
            .run(1..=10u32, |n| {
                let running = Arc::clone(&running);
                let peak = Arc::clone(&peak);
                async move {
                    let now: usize = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::task::yield_now().await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    n
                }
            })
            .await
            .unwrap();

        let mut sorted: Vec<u32> = results;
        sorted.sort_unstable();
        assert_eq!(sorted, (1..=10).collect::<Vec<u32>>());
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_pool_cancellation_stops_workers() {
        let cancel: CancellationToken = CancellationToken::new();
        let pool: WorkerPool = WorkerPool::new(2, cancel.clone());
        let finished: Arc<AtomicUsize> = Arc::new(AtomicUsize::new(0));

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let result = pool
            .run(0..4, |_| {
                let finished = Arc::clone(&finished);
                async move {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    finished.fetch_add(1, Ordering::SeqCst);
                }
            })
            .await;

        assert!(matches!(result, Err(StorageError::Cancelled)));
        assert_eq!(finished.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_pool_refuses_when_already_cancelled() {
        let cancel: CancellationToken = CancellationToken::new();
        cancel.cancel();
        let pool: WorkerPool = WorkerPool::new(2, cancel);
        let result = pool.run(0..4, |n| async move { n }).await;
        assert!(matches!(result, Err(StorageError::Cancelled)));
    }
}
