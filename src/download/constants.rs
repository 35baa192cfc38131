//! Constants for the download module (timeouts, chunking, checkpoint name).

use std::time::Duration;

/// Default connect / first-byte / idle-read timeout per attempt.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Size of each slice written to the temp file before the throttle runs.
pub const CHUNK_SIZE: usize = 16 * 1024;

/// Suffix appended to the destination name for in-progress transfers.
pub const PART_SUFFIX: &str = ".part";

/// Interval at which the dispatcher polls the pause flag while waiting for a slot.
pub const PAUSE_POLL_INTERVAL: Duration = Duration::from_millis(50);
