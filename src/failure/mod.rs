//! Terminal failure collection and user-facing descriptors.
//!
//! [`ErrorAggregator`] is shared by every transfer task. A failed file never aborts
//! the batch; it only adds an [`ErrorRecord`] here.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use tracing::error;

use crate::download::{DownloadError, ErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FailureCategory {
    Source,
    Server,
    Network,
    Local,
}

impl FailureCategory {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Source => "Source",
            Self::Server => "Server",
            Self::Network => "Network",
            Self::Local => "Local",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureDescriptor {
    pub category: FailureCategory,
    pub what: &'static str,
    pub fix: &'static str,
}

/// Maps an error kind to a category with a short explanation and a suggested fix.
#[must_use]
pub fn describe(kind: ErrorKind) -> FailureDescriptor {
    match kind {
        ErrorKind::HttpStatus(404 | 410) => FailureDescriptor {
            category: FailureCategory::Source,
            what: "File not found on server",
            fix: "Check the URL; the file may have moved.",
        },
        ErrorKind::HttpStatus(401 | 403 | 407) => FailureDescriptor {
            category: FailureCategory::Source,
            what: "Access denied",
            fix: "The server requires credentials this tool does not send.",
        },
        ErrorKind::HttpStatus(429) => FailureDescriptor {
            category: FailureCategory::Server,
            what: "Rate limited",
            fix: "Lower --workers or add --throttle, then rerun to resume.",
        },
        ErrorKind::HttpStatus(status) if status >= 500 => FailureDescriptor {
            category: FailureCategory::Server,
            what: "Server error",
            fix: "Rerun later; completed files are kept and partial files resume.",
        },
        ErrorKind::HttpStatus(_) | ErrorKind::InvalidUrl => FailureDescriptor {
            category: FailureCategory::Source,
            what: "Request rejected",
            fix: "Verify the URL in the input list.",
        },
        ErrorKind::Network | ErrorKind::Timeout => FailureDescriptor {
            category: FailureCategory::Network,
            what: "Connection failed or stalled",
            fix: "Check connectivity, raise --retry, then rerun to resume.",
        },
        ErrorKind::RangeNotSatisfiable | ErrorKind::Integrity => FailureDescriptor {
            category: FailureCategory::Server,
            what: "Server sent an inconsistent file size",
            fix: "Rerun; if it persists, delete the .part file and use --force.",
        },
        ErrorKind::Io => FailureDescriptor {
            category: FailureCategory::Local,
            what: "Could not write to disk",
            fix: "Check free space and permissions on the output directory.",
        },
    }
}

/// One file that ended in failure after all its attempts.
#[derive(Debug, Clone)]
pub struct ErrorRecord {
    pub filename: String,
    pub attempts_made: u32,
    pub last_error_kind: ErrorKind,
    pub message: String,
    first_failed_at: Instant,
    seq: u64,
}

impl ErrorRecord {
    /// When the first attempt of this file failed.
    #[must_use]
    pub fn first_failed_at(&self) -> Instant {
        self.first_failed_at
    }

    #[must_use]
    pub fn descriptor(&self) -> FailureDescriptor {
        describe(self.last_error_kind)
    }
}

/// Append-only, thread-safe list of terminal failures.
#[derive(Debug, Default)]
pub struct ErrorAggregator {
    records: Mutex<Vec<ErrorRecord>>,
    seq: AtomicU64,
}

impl ErrorAggregator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a terminal failure.
    pub fn record(
        &self,
        filename: &str,
        attempts_made: u32,
        last_error: &DownloadError,
        first_failed_at: Instant,
    ) {
        error!(
            filename,
            attempts = attempts_made,
            kind = %last_error.kind(),
            error = %last_error,
            "download failed"
        );
        let record = ErrorRecord {
            filename: filename.to_string(),
            attempts_made,
            last_error_kind: last_error.kind(),
            message: last_error.to_string(),
            first_failed_at,
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
        };
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
    }

    /// All records ordered by first-failure time.
    #[must_use]
    pub fn report(&self) -> Vec<ErrorRecord> {
        let mut records = self
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        records.sort_by_key(|r| (r.first_failed_at, r.seq));
        records
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
