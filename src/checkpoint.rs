//! Batch progress checkpoint (`download_progress.json`).
//!
//! The checkpoint records which filenames of a batch are done and which still
//! need work, so a paused or failed batch can be resumed later. It is written by
//! the engine only after every transfer task has settled.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// File name of the checkpoint inside the output directory.
pub const CHECKPOINT_FILE_NAME: &str = "download_progress.json";

/// Errors reading or writing the checkpoint file.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("checkpoint at {path} is not valid JSON: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl CheckpointError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Completed and outstanding filenames of a batch.
///
/// The two sets never overlap: a name listed as downloaded is dropped from
/// `remaining`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    downloaded: BTreeSet<String>,
    remaining: BTreeSet<String>,
}

#[derive(Deserialize)]
struct SnapshotFile {
    #[serde(default)]
    downloaded: BTreeSet<String>,
    #[serde(default)]
    remaining: BTreeSet<String>,
}

impl ProgressSnapshot {
    #[must_use]
    pub fn new(
        downloaded: impl IntoIterator<Item = String>,
        remaining: impl IntoIterator<Item = String>,
    ) -> Self {
        let downloaded: BTreeSet<String> = downloaded.into_iter().collect();
        let remaining = remaining
            .into_iter()
            .filter(|name| !downloaded.contains(name))
            .collect();
        Self {
            downloaded,
            remaining,
        }
    }

    #[must_use]
    pub fn downloaded(&self) -> &BTreeSet<String> {
        &self.downloaded
    }

    #[must_use]
    pub fn remaining(&self) -> &BTreeSet<String> {
        &self.remaining
    }

    #[must_use]
    pub fn is_downloaded(&self, filename: &str) -> bool {
        self.downloaded.contains(filename)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.downloaded.is_empty() && self.remaining.is_empty()
    }
}

/// Reads and writes the checkpoint of one output directory.
#[derive(Debug, Clone)]
pub struct ProgressStore {
    path: PathBuf,
}

impl ProgressStore {
    /// Store for `<output_dir>/download_progress.json`.
    #[must_use]
    pub fn in_dir(output_dir: &Path) -> Self {
        Self::at(output_dir.join(CHECKPOINT_FILE_NAME))
    }

    /// Store at an explicit path.
    #[must_use]
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the snapshot atomically: a sibling `.tmp` file is written then renamed.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError`] if serialization or any file operation fails.
    pub async fn save(&self, snapshot: &ProgressSnapshot) -> Result<(), CheckpointError> {
        let json = serde_json::to_vec_pretty(snapshot).map_err(|source| {
            CheckpointError::Malformed {
                path: self.path.clone(),
                source,
            }
        })?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CheckpointError::io(parent, e))?;
        }

        let mut temp_name = self.path.as_os_str().to_owned();
        temp_name.push(".tmp");
        let temp_path = PathBuf::from(temp_name);

        tokio::fs::write(&temp_path, json)
            .await
            .map_err(|e| CheckpointError::io(&temp_path, e))?;
        tokio::fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| CheckpointError::io(&self.path, e))?;

        debug!(
            path = %self.path.display(),
            downloaded = snapshot.downloaded.len(),
            remaining = snapshot.remaining.len(),
            "checkpoint saved"
        );
        Ok(())
    }

    /// Loads the saved snapshot, or an empty one when no checkpoint exists.
    ///
    /// Unknown fields are ignored and missing sets read as empty.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError`] if the file exists but cannot be read or parsed.
    pub async fn load(&self) -> Result<ProgressSnapshot, CheckpointError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ProgressSnapshot::default());
            }
            Err(e) => return Err(CheckpointError::io(&self.path, e)),
        };
        let file: SnapshotFile =
            serde_json::from_slice(&bytes).map_err(|source| CheckpointError::Malformed {
                path: self.path.clone(),
                source,
            })?;
        Ok(ProgressSnapshot::new(file.downloaded, file.remaining))
    }

    /// Deletes the checkpoint. A missing file is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError::Io`] if the file exists but cannot be removed.
    pub async fn clear(&self) -> Result<(), CheckpointError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                debug!(path = %self.path.display(), "checkpoint cleared");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CheckpointError::io(&self.path, e)),
        }
    }
}
