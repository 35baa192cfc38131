//! Per-transfer bandwidth throttle.
//!
//! The throttle paces one transfer session so that the bytes written since the
//! session began never run ahead of `rate × elapsed`. Each retry attempt starts a
//! new session, so a resumed attempt is paced on its own bytes only.

use std::time::Duration;

use tokio::time::Instant;
use tracing::trace;

/// Paces a single transfer session to a fixed byte rate.
///
/// A rate of `0` disables pacing entirely.
#[derive(Debug)]
pub struct Throttle {
    bytes_per_sec: u64,
    started: Instant,
    bytes: u64,
}

impl Throttle {
    /// Starts a new session at `bytes_per_sec`.
    #[must_use]
    pub fn new(bytes_per_sec: u64) -> Self {
        Self {
            bytes_per_sec,
            started: Instant::now(),
            bytes: 0,
        }
    }

    /// Returns true when no pacing is applied.
    #[must_use]
    pub fn is_unlimited(&self) -> bool {
        self.bytes_per_sec == 0
    }

    /// Bytes accounted to this session so far.
    #[must_use]
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// How far this session is ahead of the allowed rate at `now`.
    #[must_use]
    pub fn backlog_at(&self, now: Instant) -> Duration {
        if self.is_unlimited() {
            return Duration::ZERO;
        }
        #[allow(clippy::cast_precision_loss)]
        let allowed_secs = self.bytes as f64 / self.bytes_per_sec as f64;
        let allowed = Duration::from_secs_f64(allowed_secs);
        allowed.saturating_sub(now.saturating_duration_since(self.started))
    }

    /// Accounts `bytes` and sleeps until the session is back under the rate.
    pub async fn pace(&mut self, bytes: u64) {
        self.bytes = self.bytes.saturating_add(bytes);
        let wait = self.backlog_at(Instant::now());
        if !wait.is_zero() {
            trace!(wait_ms = wait.as_millis(), bytes = self.bytes, "throttling");
            tokio::time::sleep(wait).await;
        }
    }
}
