//! Download targets: what to fetch and the local name to store it under.

use thiserror::Error;
use url::Url;

/// Errors building a [`DownloadTarget`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TargetError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("cannot derive a file name from {0}")]
    NoFilename(String),

    #[error("unsafe file name {0:?}: must be a single path component")]
    UnsafeFilename(String),
}

/// One remote file in a batch. The filename is its identity within the batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTarget {
    pub filename: String,
    pub source_url: String,
    /// Full size already known from discovery, used by the smart size check.
    pub expected_size: Option<u64>,
}

impl DownloadTarget {
    /// Creates a target with an explicit local filename.
    ///
    /// # Errors
    ///
    /// Returns [`TargetError`] when the URL does not parse or the filename is not a
    /// plain file name (empty, `.`/`..`, or containing a path separator).
    pub fn new(
        filename: impl Into<String>,
        source_url: impl Into<String>,
    ) -> Result<Self, TargetError> {
        let filename = filename.into();
        let source_url = source_url.into();
        Url::parse(&source_url).map_err(|_| TargetError::InvalidUrl(source_url.clone()))?;
        if !is_plain_filename(&filename) {
            return Err(TargetError::UnsafeFilename(filename));
        }
        Ok(Self {
            filename,
            source_url,
            expected_size: None,
        })
    }

    /// Creates a target named after the last path segment of `source_url`.
    ///
    /// # Errors
    ///
    /// Returns [`TargetError`] when the URL does not parse or has no usable last segment.
    pub fn from_url(source_url: impl Into<String>) -> Result<Self, TargetError> {
        let source_url = source_url.into();
        let filename = filename_from_url(&source_url)?;
        Self::new(filename, source_url)
    }

    /// Attaches a size already known from discovery.
    #[must_use]
    pub fn with_expected_size(mut self, size: u64) -> Self {
        self.expected_size = Some(size);
        self
    }
}

/// Derives a local filename from the last non-empty path segment of `url`,
/// percent-decoded.
///
/// # Errors
///
/// Returns [`TargetError::InvalidUrl`] or [`TargetError::NoFilename`].
pub fn filename_from_url(url: &str) -> Result<String, TargetError> {
    let parsed = Url::parse(url).map_err(|_| TargetError::InvalidUrl(url.to_string()))?;
    let segment = parsed
        .path_segments()
        .and_then(|mut segments| segments.rfind(|s| !s.is_empty()))
        .ok_or_else(|| TargetError::NoFilename(url.to_string()))?;
    let decoded = urlencoding::decode(segment)
        .map(std::borrow::Cow::into_owned)
        .unwrap_or_else(|_| segment.to_string());
    if is_plain_filename(&decoded) {
        Ok(decoded)
    } else {
        Err(TargetError::NoFilename(url.to_string()))
    }
}

fn is_plain_filename(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
}
