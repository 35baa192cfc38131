//! bulkfetch core library
//!
//! Retrieves a batch of remote files over HTTP concurrently, resuming
//! interrupted transfers, skipping content already present locally, optionally
//! limiting bandwidth, and checkpointing progress so a batch can be paused and
//! resumed later.
//!
//! # Architecture
//!
//! - [`inventory`] - which target filenames already exist under the destination
//! - [`download`] - HTTP client, transfer state machine, retry policy, engine
//! - [`checkpoint`] - `download_progress.json` load/save/clear
//! - [`failure`] - per-file terminal failures collected without aborting the batch
//! - [`config`] / [`target`] - batch settings and the files to fetch

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod checkpoint;
pub mod config;
pub mod download;
pub mod failure;
pub mod inventory;
pub mod target;

// Re-export commonly used types
pub use checkpoint::{CheckpointError, ProgressSnapshot, ProgressStore};
pub use config::{Configuration, DEFAULT_CONCURRENCY, OverwritePolicy};
pub use download::{
    BatchReport, DownloadEngine, DownloadError, DownloadStats, EngineError, HttpClient,
    PauseSignal, TransferObserver, TransferOutcome, TransferStatus,
};
pub use failure::{ErrorAggregator, ErrorRecord};
pub use inventory::{Inventory, InventoryError, LocalFile, cleanup_partials};
pub use target::{DownloadTarget, TargetError};
