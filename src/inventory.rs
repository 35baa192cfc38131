//! Local inventory: which target filenames already exist under the destination tree.
//!
//! The inventory is built once before any transfer starts and is read-only
//! afterwards, so every task can consult it without locking.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::download::constants::PART_SUFFIX;

/// Errors raised while walking the destination tree.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// The root itself could not be read.
    #[error("cannot traverse {root}: {source}")]
    Traverse {
        root: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    /// A partial file could not be removed.
    #[error("cannot remove {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A file found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub name: String,
    pub path: PathBuf,
    pub size_bytes: u64,
}

#[derive(Debug, Clone)]
struct Entry {
    file: LocalFile,
    depth: usize,
}

/// Filename → [`LocalFile`] map for one destination tree.
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    files: HashMap<String, Entry>,
}

impl Inventory {
    /// An inventory with no files.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Recursively scans `root`, optionally keeping only files with `extension`
    /// (case-insensitive, leading dot optional).
    ///
    /// `.part` files are never listed. When a name occurs at several depths the
    /// shallowest path wins; ties go to the first in file-name order.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::Traverse`] if `root` cannot be read. Unreadable
    /// entries below the root are skipped.
    pub fn scan(root: &Path, extension: Option<&str>) -> Result<Self, InventoryError> {
        let wanted = extension.map(|ext| ext.trim_start_matches('.').to_ascii_lowercase());
        let mut files: HashMap<String, Entry> = HashMap::new();

        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(source) if source.depth() == 0 => {
                    return Err(InventoryError::Traverse {
                        root: root.to_path_buf(),
                        source,
                    });
                }
                Err(error) => {
                    debug!(error = %error, "skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if name.ends_with(PART_SUFFIX) {
                continue;
            }
            if let Some(wanted) = &wanted {
                let matches = entry
                    .path()
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case(wanted));
                if !matches {
                    continue;
                }
            }
            let size_bytes = match entry.metadata() {
                Ok(meta) => meta.len(),
                Err(error) => {
                    debug!(path = %entry.path().display(), error = %error, "skipping file without metadata");
                    continue;
                }
            };

            let depth = entry.depth();
            let shallower = files.get(&name).is_none_or(|existing| depth < existing.depth);
            if shallower {
                files.insert(
                    name.clone(),
                    Entry {
                        file: LocalFile {
                            name,
                            path: entry.into_path(),
                            size_bytes,
                        },
                        depth,
                    },
                );
            }
        }

        debug!(root = %root.display(), files = files.len(), "inventory scanned");
        Ok(Self { files })
    }

    /// Like [`Inventory::scan`] but treats an unreadable root as empty.
    #[must_use]
    pub fn scan_or_empty(root: &Path, extension: Option<&str>) -> Self {
        Self::scan(root, extension).unwrap_or_else(|error| {
            warn!(error = %error, "inventory unavailable, treating destination as empty");
            Self::empty()
        })
    }

    /// Looks up a filename.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&LocalFile> {
        self.files.get(name).map(|entry| &entry.file)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.files.contains_key(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Removes every `*.part` file below `root`, returning the removed paths.
///
/// # Errors
///
/// Returns [`InventoryError`] if the root cannot be read or a file cannot be removed.
pub fn cleanup_partials(root: &Path) -> Result<Vec<PathBuf>, InventoryError> {
    let mut removed = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(source) if source.depth() == 0 => {
                return Err(InventoryError::Traverse {
                    root: root.to_path_buf(),
                    source,
                });
            }
            Err(_) => continue,
        };
        let is_part = entry.file_type().is_file()
            && entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.ends_with(PART_SUFFIX));
        if !is_part {
            continue;
        }
        let path = entry.into_path();
        std::fs::remove_file(&path).map_err(|source| InventoryError::Remove {
            path: path.clone(),
            source,
        })?;
        removed.push(path);
    }
    if !removed.is_empty() {
        info!(count = removed.len(), "removed partial files");
    }
    Ok(removed)
}
