//! HTTP download engine for resumable, concurrent batch transfers.
//!
//! # Features
//!
//! - Streaming downloads into `<name>.part`, renamed on completion
//! - Ranged resume from an existing partial file
//! - Per-transfer bandwidth throttle
//! - Retry with exponential backoff for transient failures
//! - Bounded concurrency with cooperative pause and a progress checkpoint
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use bulkfetch_core::download::HttpClient;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = HttpClient::new(Duration::from_secs(10))?;
//! let size = client.probe_content_length("https://example.com/a.zip").await?;
//! println!("size: {size:?}");
//! # Ok(())
//! # }
//! ```

pub mod admission;
mod client;
pub mod constants;
mod engine;
mod error;
pub mod observer;
mod retry;
pub mod throttle;

pub use admission::{Admission, Admissions, FixedAnswer, Prompter, resolve_prompts};
pub use client::{HttpClient, expected_total};
pub use engine::{
    BatchPlan, BatchReport, CheckpointStatus, DownloadEngine, DownloadStats, EngineError, PauseSignal,
    SkipReason, TransferOutcome, TransferStatus,
};
pub use error::{DownloadError, ErrorKind};
pub use observer::{NoopObserver, TransferObserver};
pub use retry::{
    DEFAULT_BASE_DELAY, DEFAULT_MAX_RETRIES, FailureType, RetryDecision, RetryPolicy,
    classify_error, parse_retry_after, retry_after_delay,
};
pub use throttle::Throttle;

// No module-local Result alias: signatures spell out `Result<T, DownloadError>`.
