//! Per-target transfer state machine.
//!
//! CheckExisting → ResumeOrStart → Streaming (throttled) → Finalize, with
//! Retrying looping back to ResumeOrStart until the policy gives up.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use futures_util::StreamExt;
use reqwest::StatusCode;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, warn};

use super::{DownloadStats, PauseSignal, SkipReason, TransferOutcome, TransferStatus};
use crate::config::{Configuration, OverwritePolicy};
use crate::download::admission::{Admission, Admissions};
use crate::download::client::expected_total;
use crate::download::constants::{CHUNK_SIZE, PART_SUFFIX};
use crate::download::observer::TransferObserver;
use crate::download::retry::{
    FailureType, RetryDecision, RetryPolicy, classify_error, retry_after_delay,
};
use crate::download::throttle::Throttle;
use crate::download::{DownloadError, HttpClient};
use crate::failure::ErrorAggregator;
use crate::inventory::Inventory;
use crate::target::DownloadTarget;

/// Shared, read-only state handed to every task of a batch.
pub(super) struct TaskContext {
    pub(super) client: HttpClient,
    pub(super) output_dir: PathBuf,
    pub(super) inventory: Arc<Inventory>,
    pub(super) admissions: Arc<Admissions>,
    pub(super) config: Arc<Configuration>,
    pub(super) retry_policy: RetryPolicy,
    pub(super) stats: Arc<DownloadStats>,
    pub(super) errors: Arc<ErrorAggregator>,
    pub(super) observer: Arc<dyn TransferObserver>,
    pub(super) pause: PauseSignal,
}

/// Runs one target to a terminal status and folds it into the batch stats.
pub(super) async fn run_task(ctx: &TaskContext, target: DownloadTarget) -> TransferOutcome {
    ctx.stats.task_started();
    let outcome = process_target(ctx, &target).await;
    ctx.stats.task_finished();

    match &outcome.status {
        TransferStatus::Completed { .. } => ctx.stats.increment_completed(),
        TransferStatus::Skipped(_) => ctx.stats.increment_skipped(),
        TransferStatus::Failed(_) => ctx.stats.increment_failed(),
    }
    ctx.observer.on_finish(&outcome.filename, &outcome.status);

    let settled = ctx.stats.increment_settled();
    if ctx.config.pause_after.is_some_and(|limit| settled >= limit) && !ctx.pause.is_requested() {
        info!(settled, "pause threshold reached");
        ctx.pause.request();
    }
    outcome
}

async fn process_target(ctx: &TaskContext, target: &DownloadTarget) -> TransferOutcome {
    if let Some(reason) = check_existing(ctx, target).await {
        info!(reason = ?reason, "skipping");
        return TransferOutcome {
            filename: target.filename.clone(),
            status: TransferStatus::Skipped(reason),
            attempts: 0,
        };
    }

    let destination = ctx.output_dir.join(&target.filename);
    let part_path = part_path_for(&destination);
    let mut attempt = 0u32;
    let mut first_failed_at: Option<Instant> = None;

    loop {
        attempt += 1;
        debug!(attempt, "starting attempt");

        let error = match transfer_once(ctx, target, &part_path, &destination).await {
            Ok(status) => {
                info!(attempt, status = ?status, "downloaded");
                return TransferOutcome {
                    filename: target.filename.clone(),
                    status,
                    attempts: attempt,
                };
            }
            Err(error) => error,
        };
        let failed_at = *first_failed_at.get_or_insert_with(Instant::now);

        if discard_partial_after(&error) {
            discard_partial(&part_path).await;
        }

        let failure_type = classify_error(&error);
        match ctx.retry_policy.should_retry(failure_type, attempt) {
            RetryDecision::Retry {
                delay: backoff,
                attempt: next_attempt,
            } => {
                let server_delay = if failure_type == FailureType::RateLimited {
                    retry_after_delay(&error)
                } else {
                    None
                };
                let delay = server_delay.unwrap_or(backoff);
                warn!(
                    attempt,
                    next_attempt,
                    max_attempts = ctx.retry_policy.max_attempts(),
                    delay_ms = delay.as_millis(),
                    using_retry_after = server_delay.is_some(),
                    error = %error,
                    "attempt failed, retrying"
                );
                ctx.stats.increment_retried();
                tokio::time::sleep(delay).await;
            }
            RetryDecision::DoNotRetry { reason } => {
                debug!(%reason, "not retrying");
                ctx.errors
                    .record(&target.filename, attempt, &error, failed_at);
                return TransferOutcome {
                    filename: target.filename.clone(),
                    status: TransferStatus::Failed(error.kind()),
                    attempts: attempt,
                };
            }
        }
    }
}

/// Applies the overwrite policy. `None` means the target must be transferred.
async fn check_existing(ctx: &TaskContext, target: &DownloadTarget) -> Option<SkipReason> {
    match ctx.admissions.get(&target.filename) {
        Some(Admission::Skip(reason)) => return Some(reason),
        Some(Admission::Proceed) => return None,
        None => {}
    }

    let local = ctx.inventory.get(&target.filename)?;
    let config = &ctx.config;
    let would_download = config.overwrite_policy == OverwritePolicy::ForceOverwrite;

    if config.smart_size_check {
        let full_size = match target.expected_size {
            Some(size) => Some(size),
            None if would_download => ctx
                .client
                .probe_content_length(&target.source_url)
                .await
                .unwrap_or_else(|error| {
                    debug!(error = %error, "size probe failed, downloading anyway");
                    None
                }),
            None => None,
        };
        if full_size == Some(local.size_bytes) {
            return Some(SkipReason::SizeMatch);
        }
    }

    match config.overwrite_policy {
        OverwritePolicy::ForceOverwrite => None,
        OverwritePolicy::SkipExisting => Some(SkipReason::Existing),
        OverwritePolicy::PromptUser => {
            debug!("no pre-pass answer, keeping existing file");
            Some(SkipReason::Existing)
        }
    }
}

/// One attempt: resume or start, stream, verify, rename.
async fn transfer_once(
    ctx: &TaskContext,
    target: &DownloadTarget,
    part_path: &Path,
    destination: &Path,
) -> Result<TransferStatus, DownloadError> {
    let offset = tokio::fs::metadata(part_path)
        .await
        .map(|meta| meta.len())
        .unwrap_or(0);
    if offset > 0 {
        debug!(offset, "resuming from partial file");
    }

    let response = ctx.client.get_from(&target.source_url, offset).await?;
    let resumed = offset > 0 && response.status() == StatusCode::PARTIAL_CONTENT;
    let start = if resumed { offset } else { 0 };
    if offset > 0 && !resumed {
        debug!(offset, "server ignored range, restarting from zero");
    }

    let file = open_part(part_path, resumed).await?;
    let expected = expected_total(&response, start);
    ctx.observer.on_start(&target.filename, start, expected);

    let written = stream_to_part(ctx, target, response, file, part_path, start).await?;

    if let Some(expected) = expected {
        if written != expected {
            return Err(DownloadError::integrity(part_path, expected, written));
        }
    }

    tokio::fs::rename(part_path, destination)
        .await
        .map_err(|e| DownloadError::io(destination, e))?;

    Ok(TransferStatus::Completed {
        bytes: written,
        resumed,
    })
}

async fn open_part(part_path: &Path, append: bool) -> Result<File, DownloadError> {
    let result = if append {
        OpenOptions::new().append(true).open(part_path).await
    } else {
        File::create(part_path).await
    };
    result.map_err(|e| DownloadError::io(part_path, e))
}

/// Streams the body in fixed-size slices, pacing after each. Returns the part
/// file's total length.
async fn stream_to_part(
    ctx: &TaskContext,
    target: &DownloadTarget,
    response: reqwest::Response,
    file: File,
    part_path: &Path,
    start: u64,
) -> Result<u64, DownloadError> {
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut throttle = Throttle::new(ctx.config.throttle_bytes_per_sec);
    let mut written = start;

    let result = async {
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| DownloadError::from_reqwest(&target.source_url, e))?;
            for slice in chunk.chunks(CHUNK_SIZE) {
                writer
                    .write_all(slice)
                    .await
                    .map_err(|e| DownloadError::io(part_path, e))?;
                let len = slice.len() as u64;
                written += len;
                ctx.observer.on_bytes(&target.filename, len);
                throttle.pace(len).await;
            }
        }
        Ok::<(), DownloadError>(())
    }
    .await;

    // Keep what was received so the next attempt can resume from it.
    let flushed = writer
        .flush()
        .await
        .map_err(|e| DownloadError::io(part_path, e));
    result?;
    flushed?;
    Ok(written)
}

fn part_path_for(destination: &Path) -> PathBuf {
    let mut name = destination.as_os_str().to_owned();
    name.push(PART_SUFFIX);
    PathBuf::from(name)
}

/// Partial data that can never be extended into a correct file.
fn discard_partial_after(error: &DownloadError) -> bool {
    match error {
        DownloadError::RangeNotSatisfiable { .. } => true,
        DownloadError::Integrity {
            expected_bytes,
            actual_bytes,
            ..
        } => actual_bytes > expected_bytes,
        _ => false,
    }
}

async fn discard_partial(part_path: &Path) {
    match tokio::fs::remove_file(part_path).await {
        Ok(()) => debug!(path = %part_path.display(), "discarded partial file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %part_path.display(), error = %e, "could not discard partial file"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_part_path_appends_suffix() {
        assert_eq!(
            part_path_for(Path::new("/out/a.zip")),
            PathBuf::from("/out/a.zip.part")
        );
    }

    #[test]
    fn test_discard_partial_after() {
        assert!(discard_partial_after(&DownloadError::range_not_satisfiable(
            "u", 10
        )));
        assert!(discard_partial_after(&DownloadError::integrity("p", 10, 12)));
        assert!(!discard_partial_after(&DownloadError::integrity("p", 10, 8)));
        assert!(!discard_partial_after(&DownloadError::timeout("u")));
    }
}
