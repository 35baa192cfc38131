//! Download engine for concurrent, resumable batch transfers.
//!
//! The engine drives one [`task`] per target under a semaphore-based
//! concurrency cap, stops dispatching when the [`PauseSignal`] is raised, and
//! writes the progress checkpoint once every dispatched task has settled.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use bulkfetch_core::{Configuration, DownloadTarget, Inventory, ProgressStore};
//! use bulkfetch_core::download::{Admissions, DownloadEngine, HttpClient, PauseSignal};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Configuration::default();
//! let client = HttpClient::new(config.request_timeout)?;
//! let engine = DownloadEngine::new(config, client)?;
//! let output = Path::new("./downloads");
//! let targets = vec![DownloadTarget::from_url("https://example.com/a.zip")?];
//! let report = engine
//!     .run(
//!         targets,
//!         output,
//!         Arc::new(Inventory::scan_or_empty(output, None)),
//!         Admissions::none(),
//!         &ProgressStore::in_dir(output),
//!         &PauseSignal::new(),
//!     )
//!     .await?;
//! println!("completed {}, failed {}", report.stats.completed(), report.stats.failed());
//! # Ok(())
//! # }
//! ```

mod task;

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, info_span, instrument, warn};

use super::admission::Admissions;
use super::constants::PAUSE_POLL_INTERVAL;
use super::observer::{NoopObserver, TransferObserver};
use super::{ErrorKind, HttpClient, RetryPolicy};
use crate::checkpoint::{CheckpointError, ProgressSnapshot, ProgressStore};
use crate::config::Configuration;
use crate::failure::{ErrorAggregator, ErrorRecord};
use crate::inventory::{Inventory, cleanup_partials};
use crate::target::DownloadTarget;

use task::TaskContext;

/// Minimum allowed concurrency value.
const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency value.
const MAX_CONCURRENCY: usize = 100;

/// Error type for download engine setup.
///
/// Individual transfer failures never surface here; they end up in
/// [`BatchReport::errors`].
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Invalid concurrency value provided.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },

    /// `max_retries` must allow at least one attempt.
    #[error("invalid retry count {value}: at least one attempt is required")]
    InvalidRetries { value: u32 },

    /// The output directory could not be created.
    #[error("cannot create output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Semaphore was closed unexpectedly.
    #[error("semaphore closed unexpectedly")]
    SemaphoreClosed,
}

/// Why a target was not transferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Local file has the server's full size.
    SizeMatch,
    /// Local file exists and the policy keeps it.
    Existing,
    /// The user declined to overwrite.
    Declined,
    /// A previous run of this batch already completed it.
    Checkpointed,
}

/// Terminal status of one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferStatus {
    Completed {
        /// Final file size.
        bytes: u64,
        /// Whether the last attempt continued from a partial file.
        resumed: bool,
    },
    Skipped(SkipReason),
    Failed(ErrorKind),
}

/// Result of one transfer task.
#[derive(Debug, Clone)]
pub struct TransferOutcome {
    pub filename: String,
    pub status: TransferStatus,
    /// Attempts made (0 for skipped targets).
    pub attempts: u32,
}

/// Cooperative pause request shared between the caller and the engine.
///
/// Raising it stops new dispatches; in-flight tasks are settled before the
/// engine returns.
#[derive(Debug, Clone, Default)]
pub struct PauseSignal {
    flag: Arc<AtomicBool>,
}

impl PauseSignal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an existing flag, e.g. one set from a Ctrl+C handler.
    #[must_use]
    pub fn from_flag(flag: Arc<AtomicBool>) -> Self {
        Self { flag }
    }

    pub fn request(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    async fn requested(&self) {
        while !self.is_requested() {
            tokio::time::sleep(PAUSE_POLL_INTERVAL).await;
        }
    }
}

/// Statistics from a batch run, updated atomically by concurrent tasks.
#[derive(Debug, Default)]
pub struct DownloadStats {
    completed: AtomicUsize,
    skipped: AtomicUsize,
    failed: AtomicUsize,
    retried: AtomicUsize,
    settled: AtomicUsize,
    active: AtomicUsize,
    peak_active: AtomicUsize,
}

impl DownloadStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn skipped(&self) -> usize {
        self.skipped.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// Number of retry sleeps taken across all tasks.
    #[must_use]
    pub fn retried(&self) -> usize {
        self.retried.load(Ordering::SeqCst)
    }

    /// Tasks that reached a terminal status (completed + skipped + failed).
    #[must_use]
    pub fn settled(&self) -> usize {
        self.settled.load(Ordering::SeqCst)
    }

    /// Tasks currently running; zero once a batch has returned.
    #[must_use]
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Highest number of tasks that were running at the same time.
    #[must_use]
    pub fn peak_active(&self) -> usize {
        self.peak_active.load(Ordering::SeqCst)
    }

    fn increment_completed(&self) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    fn increment_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::SeqCst);
    }

    fn increment_failed(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }

    fn increment_retried(&self) {
        self.retried.fetch_add(1, Ordering::SeqCst);
    }

    /// Returns the settled count including this task.
    fn increment_settled(&self) -> usize {
        self.settled.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn task_started(&self) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_active.fetch_max(now, Ordering::SeqCst);
    }

    fn task_finished(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    fn copy(&self) -> Self {
        let load = |counter: &AtomicUsize| AtomicUsize::new(counter.load(Ordering::SeqCst));
        Self {
            completed: load(&self.completed),
            skipped: load(&self.skipped),
            failed: load(&self.failed),
            retried: load(&self.retried),
            settled: load(&self.settled),
            active: load(&self.active),
            peak_active: load(&self.peak_active),
        }
    }
}

/// What happened to the checkpoint file at the end of the batch.
#[derive(Debug)]
pub enum CheckpointStatus {
    /// Nothing to do (empty batch).
    Untouched,
    /// Written because some targets remain.
    Saved,
    /// Deleted because every target is done.
    Cleared,
    /// Writing or deleting failed; transfers are unaffected.
    Failed(CheckpointError),
}

/// Everything the caller learns from one batch run.
#[derive(Debug)]
pub struct BatchReport {
    /// One entry per settled target, in completion order.
    pub outcomes: Vec<TransferOutcome>,
    /// Terminal failures ordered by first-failure time.
    pub errors: Vec<ErrorRecord>,
    pub stats: DownloadStats,
    /// True when the batch stopped early on a pause request.
    pub paused: bool,
    pub snapshot: ProgressSnapshot,
    pub checkpoint: CheckpointStatus,
}

impl BatchReport {
    fn empty() -> Self {
        Self {
            outcomes: Vec::new(),
            errors: Vec::new(),
            stats: DownloadStats::new(),
            paused: false,
            snapshot: ProgressSnapshot::default(),
            checkpoint: CheckpointStatus::Untouched,
        }
    }

    /// True when every target is done and nothing failed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.paused && self.errors.is_empty() && self.snapshot.remaining().is_empty()
    }
}

/// A batch after deduplication, `max_files` and the checkpoint lookup.
#[derive(Debug, Default)]
pub struct BatchPlan {
    /// Unique targets in batch order.
    pub targets: Vec<DownloadTarget>,
    /// Checkpoint left by a previous run, empty if none.
    pub previous: ProgressSnapshot,
}

impl BatchPlan {
    /// Targets still to be transferred, in batch order.
    #[must_use]
    pub fn pending(&self) -> Vec<DownloadTarget> {
        self.targets
            .iter()
            .filter(|target| !self.previous.is_downloaded(&target.filename))
            .cloned()
            .collect()
    }
}

/// Concurrent batch downloader.
///
/// # Concurrency Model
///
/// - Each target runs in its own Tokio task
/// - A semaphore permit is acquired before spawning, in batch order
/// - Permits are released when the task finishes (RAII)
/// - The pause flag is checked before each dispatch and while waiting for a permit
pub struct DownloadEngine {
    semaphore: Arc<Semaphore>,
    config: Arc<Configuration>,
    retry_policy: RetryPolicy,
    client: HttpClient,
    observer: Arc<dyn TransferObserver>,
}

impl std::fmt::Debug for DownloadEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadEngine")
            .field("config", &self.config)
            .field("retry_policy", &self.retry_policy)
            .finish_non_exhaustive()
    }
}

impl DownloadEngine {
    /// Creates an engine for `config`, sharing `client` across all tasks.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConcurrency`] if `config.concurrency` is outside
    /// 1..=100, or [`EngineError::InvalidRetries`] if `config.max_retries` is 0.
    #[instrument(level = "debug", skip_all, fields(concurrency = config.concurrency))]
    pub fn new(config: Configuration, client: HttpClient) -> Result<Self, EngineError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&config.concurrency) {
            return Err(EngineError::InvalidConcurrency {
                value: config.concurrency,
            });
        }
        if config.max_retries == 0 {
            return Err(EngineError::InvalidRetries {
                value: config.max_retries,
            });
        }

        debug!(
            max_retries = config.max_retries,
            throttle_bytes_per_sec = config.throttle_bytes_per_sec,
            policy = ?config.overwrite_policy,
            "creating download engine"
        );

        Ok(Self {
            semaphore: Arc::new(Semaphore::new(config.concurrency)),
            retry_policy: config.retry_policy(),
            config: Arc::new(config),
            client,
            observer: Arc::new(NoopObserver),
        })
    }

    /// Sends per-transfer progress to `observer`.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn TransferObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Replaces the retry policy derived from the configuration.
    #[must_use]
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    #[must_use]
    pub fn config(&self) -> &Configuration {
        &self.config
    }

    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.config.concurrency
    }

    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Runs one batch to completion or until paused.
    ///
    /// 1. Plans the batch with [`DownloadEngine::plan`]
    /// 2. Skips targets the saved checkpoint lists as downloaded
    /// 3. Dispatches the rest in order, at most `concurrency` at a time
    /// 4. On pause, stops dispatching and settles in-flight tasks
    /// 5. Saves the checkpoint if anything remains, otherwise clears it
    ///
    /// An empty target list returns immediately without touching disk.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::OutputDir`] if the output directory cannot be created
    /// and [`EngineError::SemaphoreClosed`] if the semaphore is closed. Transfer
    /// failures and checkpoint problems are reported in the [`BatchReport`].
    #[instrument(
        name = "batch",
        skip_all,
        fields(output_dir = %output_dir.display(), targets = targets.len())
    )]
    pub async fn run(
        &self,
        targets: Vec<DownloadTarget>,
        output_dir: &Path,
        inventory: Arc<Inventory>,
        admissions: Admissions,
        store: &ProgressStore,
        pause: &PauseSignal,
    ) -> Result<BatchReport, EngineError> {
        let BatchPlan { targets, previous } = self.plan(targets, store).await;
        if targets.is_empty() {
            info!("no targets, nothing to do");
            return Ok(BatchReport::empty());
        }

        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|source| EngineError::OutputDir {
                path: output_dir.to_path_buf(),
                source,
            })?;

        let batch_names: Vec<String> = targets.iter().map(|t| t.filename.clone()).collect();
        let stats = Arc::new(DownloadStats::new());
        let errors = Arc::new(ErrorAggregator::new());
        let mut outcomes = Vec::with_capacity(targets.len());

        let (done_before, pending): (Vec<_>, Vec<_>) = targets
            .into_iter()
            .partition(|t| previous.is_downloaded(&t.filename));
        for target in done_before {
            debug!(filename = %target.filename, "already downloaded in a previous run");
            stats.increment_skipped();
            outcomes.push(TransferOutcome {
                filename: target.filename,
                status: TransferStatus::Skipped(SkipReason::Checkpointed),
                attempts: 0,
            });
        }

        info!(
            pending = pending.len(),
            resumed_from_checkpoint = outcomes.len(),
            concurrency = self.config.concurrency,
            "starting batch"
        );

        let ctx = Arc::new(TaskContext {
            client: self.client.clone(),
            output_dir: output_dir.to_path_buf(),
            inventory,
            admissions: Arc::new(admissions),
            config: Arc::clone(&self.config),
            retry_policy: self.retry_policy.clone(),
            stats: Arc::clone(&stats),
            errors: Arc::clone(&errors),
            observer: Arc::clone(&self.observer),
            pause: pause.clone(),
        });

        let mut handles: Vec<(String, JoinHandle<TransferOutcome>)> = Vec::new();

        for target in pending {
            if pause.is_requested() {
                break;
            }
            drain_finished_tasks(&mut handles, &mut outcomes, &stats, self.observer.as_ref()).await;

            // Race the permit against the pause flag so a pause during a
            // full-concurrency wait stops dispatch right away.
            let permit = tokio::select! {
                biased;
                () = pause.requested() => None,
                result = self.semaphore.clone().acquire_owned() => {
                    Some(result.map_err(|_| EngineError::SemaphoreClosed)?)
                }
            };
            let Some(permit) = permit else {
                break;
            };
            // A task may raise the flag as it releases the permit we just got.
            if pause.is_requested() {
                break;
            }

            let filename = target.filename.clone();
            let span = info_span!("transfer", filename = %filename);
            let ctx = Arc::clone(&ctx);
            handles.push((
                filename,
                tokio::spawn(
                    async move {
                        let _permit = permit;
                        task::run_task(&ctx, target).await
                    }
                    .instrument(span),
                ),
            ));
        }
        drain_finished_tasks(&mut handles, &mut outcomes, &stats, self.observer.as_ref()).await;

        let paused = pause.is_requested();
        if paused {
            info!(in_flight = handles.len(), "pause requested, settling in-flight transfers");
        } else {
            debug!(task_count = handles.len(), "waiting for transfers to complete");
        }
        settle_tasks(
            handles,
            &mut outcomes,
            paused.then_some(self.config.pause_grace).flatten(),
            &stats,
            self.observer.as_ref(),
        )
        .await;

        // Every handle is joined; nothing below can still be in flight.
        let snapshot = build_snapshot(&batch_names, &previous, &outcomes);
        let checkpoint = if snapshot.remaining().is_empty() {
            match store.clear().await {
                Ok(()) => CheckpointStatus::Cleared,
                Err(error) => CheckpointStatus::Failed(error),
            }
        } else {
            match store.save(&snapshot).await {
                Ok(()) => {
                    info!(
                        remaining = snapshot.remaining().len(),
                        path = %store.path().display(),
                        "progress saved"
                    );
                    CheckpointStatus::Saved
                }
                Err(error) => CheckpointStatus::Failed(error),
            }
        };
        if let CheckpointStatus::Failed(error) = &checkpoint {
            warn!(error = %error, "checkpoint could not be updated");
        }

        if self.config.cleanup_partials {
            if let Err(error) = cleanup_partials(output_dir) {
                warn!(error = %error, "partial file cleanup failed");
            }
        }

        let stats = stats.copy();
        info!(
            completed = stats.completed(),
            skipped = stats.skipped(),
            failed = stats.failed(),
            retried = stats.retried(),
            paused,
            "batch finished"
        );

        Ok(BatchReport {
            outcomes,
            errors: errors.report(),
            stats,
            paused,
            snapshot,
            checkpoint,
        })
    }

    /// Drops duplicate filenames (first wins), applies `max_files` and loads the
    /// saved checkpoint.
    ///
    /// `run` plans its input the same way, so a planned target list passed to
    /// `run` is dispatched unchanged. Callers that decide anything per target
    /// before the run (the overwrite prompt) should work from
    /// [`BatchPlan::pending`].
    pub async fn plan(&self, targets: Vec<DownloadTarget>, store: &ProgressStore) -> BatchPlan {
        let targets = self.prepare_targets(targets);
        if targets.is_empty() {
            return BatchPlan::default();
        }
        let previous = store.load().await.unwrap_or_else(|error| {
            warn!(error = %error, "ignoring unreadable checkpoint");
            ProgressSnapshot::default()
        });
        BatchPlan { targets, previous }
    }

    fn prepare_targets(&self, targets: Vec<DownloadTarget>) -> Vec<DownloadTarget> {
        let mut seen = HashSet::new();
        let mut unique: Vec<DownloadTarget> = targets
            .into_iter()
            .filter(|target| {
                let fresh = seen.insert(target.filename.clone());
                if !fresh {
                    warn!(filename = %target.filename, url = %target.source_url, "duplicate filename in batch, ignoring");
                }
                fresh
            })
            .collect();
        if let Some(limit) = self.config.max_files {
            unique.truncate(limit);
        }
        unique
    }
}

async fn drain_finished_tasks(
    handles: &mut Vec<(String, JoinHandle<TransferOutcome>)>,
    outcomes: &mut Vec<TransferOutcome>,
    stats: &DownloadStats,
    observer: &dyn TransferObserver,
) {
    let mut idx = 0;
    while idx < handles.len() {
        if handles[idx].1.is_finished() {
            let (filename, handle) = handles.swap_remove(idx);
            collect_joined(&filename, handle.await, outcomes, stats, observer);
        } else {
            idx += 1;
        }
    }
}

/// Waits for every handle. With a grace period, tasks still running at the
/// deadline are aborted and then awaited so their files are closed.
async fn settle_tasks(
    handles: Vec<(String, JoinHandle<TransferOutcome>)>,
    outcomes: &mut Vec<TransferOutcome>,
    grace: Option<Duration>,
    stats: &DownloadStats,
    observer: &dyn TransferObserver,
) {
    let Some(grace) = grace else {
        for (filename, handle) in handles {
            collect_joined(&filename, handle.await, outcomes, stats, observer);
        }
        return;
    };

    let deadline = tokio::time::Instant::now() + grace;
    for (filename, mut handle) in handles {
        match tokio::time::timeout_at(deadline, &mut handle).await {
            Ok(joined) => collect_joined(&filename, joined, outcomes, stats, observer),
            Err(_) => {
                handle.abort();
                collect_joined(&filename, handle.await, outcomes, stats, observer);
            }
        }
    }
}

fn collect_joined(
    filename: &str,
    joined: Result<TransferOutcome, tokio::task::JoinError>,
    outcomes: &mut Vec<TransferOutcome>,
    stats: &DownloadStats,
    observer: &dyn TransferObserver,
) {
    match joined {
        Ok(outcome) => outcomes.push(outcome),
        Err(error) => {
            // The task never reached its own bookkeeping.
            stats.task_finished();
            observer.on_abort(filename);
            if error.is_cancelled() {
                info!(filename, "transfer aborted, partial file kept for resume");
            } else {
                warn!(filename, error = %error, "transfer task panicked");
            }
        }
    }
}

fn build_snapshot(
    batch: &[String],
    previous: &ProgressSnapshot,
    outcomes: &[TransferOutcome],
) -> ProgressSnapshot {
    let settled: BTreeSet<&str> = outcomes
        .iter()
        .filter(|o| !matches!(o.status, TransferStatus::Failed(_)))
        .map(|o| o.filename.as_str())
        .collect();
    let (downloaded, remaining): (Vec<String>, Vec<String>) = batch
        .iter()
        .cloned()
        .partition(|name| settled.contains(name.as_str()) || previous.is_downloaded(name));
    ProgressSnapshot::new(downloaded, remaining)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn client() -> HttpClient {
        HttpClient::new(Duration::from_secs(1)).unwrap()
    }

    fn config(concurrency: usize) -> Configuration {
        Configuration {
            concurrency,
            ..Configuration::default()
        }
    }

    fn outcome(name: &str, status: TransferStatus) -> TransferOutcome {
        TransferOutcome {
            filename: name.to_string(),
            status,
            attempts: 1,
        }
    }

    #[test]
    fn test_engine_new_valid_concurrency() {
        for value in [1, 5, 100] {
            let engine = DownloadEngine::new(config(value), client()).unwrap();
            assert_eq!(engine.concurrency(), value);
        }
    }

    #[test]
    fn test_engine_new_invalid_concurrency() {
        for value in [0, 101] {
            let result = DownloadEngine::new(config(value), client());
            assert!(matches!(
                result,
                Err(EngineError::InvalidConcurrency { value: v }) if v == value
            ));
        }
    }

    #[test]
    fn test_engine_new_zero_retries_rejected() {
        let config = Configuration {
            max_retries: 0,
            ..Configuration::default()
        };
        assert!(matches!(
            DownloadEngine::new(config, client()),
            Err(EngineError::InvalidRetries { value: 0 })
        ));
    }

    #[test]
    fn test_engine_error_display() {
        let msg = EngineError::InvalidConcurrency { value: 0 }.to_string();
        assert!(msg.contains("invalid concurrency"));
        assert!(msg.contains("100"));
    }

    #[test]
    fn test_prepare_targets_dedupes_and_limits() {
        let engine = DownloadEngine::new(
            Configuration {
                max_files: Some(2),
                ..Configuration::default()
            },
            client(),
        )
        .unwrap();
        let targets = vec![
            DownloadTarget::new("a", "http://h/1").unwrap(),
            DownloadTarget::new("a", "http://h/2").unwrap(),
            DownloadTarget::new("b", "http://h/3").unwrap(),
            DownloadTarget::new("c", "http://h/4").unwrap(),
        ];
        let prepared = engine.prepare_targets(targets);
        let names: Vec<_> = prepared.iter().map(|t| t.filename.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(prepared[0].source_url, "http://h/1");
    }

    #[tokio::test]
    async fn test_plan_matches_run_and_marks_checkpointed() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = ProgressStore::in_dir(dir.path());
        store
            .save(&ProgressSnapshot::new(
                vec!["a".to_string()],
                vec!["b".to_string()],
            ))
            .await
            .unwrap();
        let engine = DownloadEngine::new(
            Configuration {
                max_files: Some(2),
                ..Configuration::default()
            },
            client(),
        )
        .unwrap();
        let targets = vec![
            DownloadTarget::new("a", "http://h/1").unwrap(),
            DownloadTarget::new("a", "http://h/2").unwrap(),
            DownloadTarget::new("b", "http://h/3").unwrap(),
            DownloadTarget::new("c", "http://h/4").unwrap(),
        ];

        let plan = engine.plan(targets, &store).await;
        let names = |targets: &[DownloadTarget]| {
            targets.iter().map(|t| t.filename.clone()).collect::<Vec<_>>()
        };
        assert_eq!(names(&plan.targets), vec!["a", "b"]);
        assert_eq!(names(&plan.pending()), vec!["b"]);

        let replanned = engine.plan(plan.targets.clone(), &store).await;
        assert_eq!(replanned.targets, plan.targets);
    }

    #[tokio::test]
    async fn test_plan_without_checkpoint_keeps_everything_pending() {
        let dir = tempfile::TempDir::new().unwrap();
        let engine = DownloadEngine::new(Configuration::default(), client()).unwrap();
        let plan = engine
            .plan(
                vec![DownloadTarget::new("x", "http://h/x").unwrap()],
                &ProgressStore::in_dir(&dir.path().join("missing")),
            )
            .await;
        assert_eq!(plan.pending().len(), 1);
        assert!(plan.previous.downloaded().is_empty());
    }

    #[test]
    fn test_build_snapshot_partitions_batch() {
        let batch: Vec<String> = ["a", "b", "c", "d"].iter().map(|s| (*s).to_string()).collect();
        let previous = ProgressSnapshot::new(vec!["d".to_string()], Vec::new());
        let outcomes = vec![
            outcome("a", TransferStatus::Completed { bytes: 1, resumed: false }),
            outcome("b", TransferStatus::Failed(ErrorKind::Timeout)),
            outcome("c", TransferStatus::Skipped(SkipReason::Existing)),
        ];

        let snapshot = build_snapshot(&batch, &previous, &outcomes);
        assert_eq!(
            snapshot.downloaded().iter().map(String::as_str).collect::<Vec<_>>(),
            vec!["a", "c", "d"]
        );
        assert_eq!(
            snapshot.remaining().iter().map(String::as_str).collect::<Vec<_>>(),
            vec!["b"]
        );
    }

    #[test]
    fn test_download_stats_peak_active() {
        let stats = DownloadStats::new();
        stats.task_started();
        stats.task_started();
        stats.task_finished();
        stats.task_started();
        assert_eq!(stats.peak_active(), 2);
        assert_eq!(stats.increment_settled(), 1);
        assert_eq!(stats.increment_settled(), 2);
    }

    #[test]
    fn test_download_stats_thread_safe() {
        use std::thread;

        let stats = Arc::new(DownloadStats::new());
        let handles: Vec<_> = (0..10)
            .map(|_| {
                let stats = Arc::clone(&stats);
                thread::spawn(move || {
                    for _ in 0..100 {
                        stats.increment_completed();
                        stats.increment_failed();
                        stats.increment_retried();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let copy = stats.copy();
        assert_eq!(copy.completed(), 1000);
        assert_eq!(copy.failed(), 1000);
        assert_eq!(copy.retried(), 1000);
    }

    #[tokio::test]
    async fn test_pause_signal_shared_flag() {
        let flag = Arc::new(AtomicBool::new(false));
        let signal = PauseSignal::from_flag(Arc::clone(&flag));
        assert!(!signal.is_requested());
        flag.store(true, Ordering::SeqCst);
        assert!(signal.clone().is_requested());
        tokio::time::timeout(Duration::from_secs(1), signal.requested())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_run_empty_batch_is_noop() {
        let dir = tempfile::TempDir::new().unwrap();
        let output = dir.path().join("never-created");
        let engine = DownloadEngine::new(Configuration::default(), client()).unwrap();

        let report = engine
            .run(
                Vec::new(),
                &output,
                Arc::new(Inventory::empty()),
                Admissions::none(),
                &ProgressStore::in_dir(&output),
                &PauseSignal::new(),
            )
            .await
            .unwrap();

        assert!(report.outcomes.is_empty());
        assert!(matches!(report.checkpoint, CheckpointStatus::Untouched));
        assert!(!output.exists());
    }
}
