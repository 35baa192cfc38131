//! Progress observation hooks for transfer tasks.
//!
//! The engine reports through [`TransferObserver`] and never renders anything
//! itself. The CLI plugs in progress bars; tests and library callers can use
//! [`NoopObserver`].

use super::engine::TransferStatus;

/// Receives per-transfer progress events. All methods default to no-ops.
///
/// Calls for different filenames may arrive concurrently from different tasks.
pub trait TransferObserver: Send + Sync {
    /// A transfer attempt is about to stream. `offset` is the resume point.
    fn on_start(&self, filename: &str, offset: u64, total: Option<u64>) {
        let _ = (filename, offset, total);
    }

    /// `bytes` more bytes were written to the temp file.
    fn on_bytes(&self, filename: &str, bytes: u64) {
        let _ = (filename, bytes);
    }

    /// The task reached a terminal status.
    fn on_finish(&self, filename: &str, status: &TransferStatus) {
        let _ = (filename, status);
    }

    /// The task was aborted at the pause deadline; its partial file is kept.
    fn on_abort(&self, filename: &str) {
        let _ = filename;
    }
}

/// Observer that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl TransferObserver for NoopObserver {}
