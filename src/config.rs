//! Batch configuration shared by the engine and every transfer task.

use std::time::Duration;

use crate::download::{DEFAULT_MAX_RETRIES, RetryPolicy};
use crate::download::constants::DEFAULT_REQUEST_TIMEOUT;

/// Default number of transfers running at once.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// What to do when a target's filename already exists locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverwritePolicy {
    /// Download again and replace the local file.
    ForceOverwrite,
    /// Keep the local file and skip the target.
    #[default]
    SkipExisting,
    /// Ask once per conflicting file before the concurrent phase starts.
    PromptUser,
}

/// Settings for one batch run.
#[derive(Debug, Clone)]
pub struct Configuration {
    /// Total attempts per file, the first one included.
    pub max_retries: u32,
    /// Maximum transfers in flight.
    pub concurrency: usize,
    /// Per-transfer rate cap in bytes per second. `0` is unlimited.
    pub throttle_bytes_per_sec: u64,
    pub overwrite_policy: OverwritePolicy,
    /// Skip an existing file whose size equals the server's full size,
    /// regardless of `overwrite_policy`.
    pub smart_size_check: bool,
    /// Only the first `n` targets of the batch are considered.
    pub max_files: Option<usize>,
    /// Connect, first-byte and idle-read timeout per attempt.
    pub request_timeout: Duration,
    /// Backoff after the first failed attempt; doubles on each further failure.
    pub backoff_base: Duration,
    /// Remove stray `.part` files under the output directory when the batch ends.
    pub cleanup_partials: bool,
    /// Raise the pause signal once this many targets have settled.
    pub pause_after: Option<usize>,
    /// On pause, abort tasks still running after this long. `None` waits for all.
    pub pause_grace: Option<Duration>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            concurrency: DEFAULT_CONCURRENCY,
            throttle_bytes_per_sec: 0,
            overwrite_policy: OverwritePolicy::default(),
            smart_size_check: true,
            max_files: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            backoff_base: Duration::from_secs(1),
            cleanup_partials: false,
            pause_after: None,
            pause_grace: None,
        }
    }
}

impl Configuration {
    /// Retry policy derived from `max_retries` and `backoff_base`.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::with_max_attempts(self.max_retries).with_base_delay(self.backoff_base)
    }
}

/// Converts a MB/s figure (as typed on the command line) to bytes per second.
///
/// Non-positive and non-finite values mean unlimited.
#[must_use]
pub fn megabytes_per_sec(mb: f64) -> u64 {
    if !mb.is_finite() || mb <= 0.0 {
        return 0;
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let bytes = (mb * 1024.0 * 1024.0) as u64;
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_defaults() {
        let config = Configuration::default();
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.concurrency, 5);
        assert_eq!(config.throttle_bytes_per_sec, 0);
        assert_eq!(config.overwrite_policy, OverwritePolicy::SkipExisting);
        assert!(config.smart_size_check);
        assert_eq!(config.max_files, None);
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert!(config.pause_after.is_none());
    }

    #[test]
    fn test_retry_policy_follows_configuration() {
        let config = Configuration {
            max_retries: 3,
            backoff_base: Duration::from_millis(5),
            ..Configuration::default()
        };
        let policy = config.retry_policy();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.delay_after(1), Duration::from_millis(5));
        assert_eq!(policy.delay_after(2), Duration::from_millis(10));
    }

    #[test]
    fn test_megabytes_per_sec() {
        assert_eq!(megabytes_per_sec(1.0), 1_048_576);
        assert_eq!(megabytes_per_sec(0.5), 524_288);
        assert_eq!(megabytes_per_sec(0.0), 0);
        assert_eq!(megabytes_per_sec(-3.0), 0);
        assert_eq!(megabytes_per_sec(f64::NAN), 0);
    }
}
