//! HTTP client wrapper for ranged file transfers.
//!
//! [`HttpClient`] owns one pooled `reqwest` client shared by every transfer task.
//! It only knows how to open a (possibly ranged) body stream and how to probe a
//! resource's size; streaming to disk belongs to the transfer task.

use std::time::Duration;

use reqwest::header::{CONTENT_LENGTH, RANGE, RETRY_AFTER};
use reqwest::{Client, Response, StatusCode};
use tracing::{debug, instrument};
use url::Url;

use super::constants::DEFAULT_REQUEST_TIMEOUT;
use super::error::DownloadError;

/// User-Agent sent with every request.
const USER_AGENT: &str = concat!("bulkfetch/", env!("CARGO_PKG_VERSION"));

/// HTTP client for streaming downloads.
///
/// Create once and clone freely; clones share the connection pool.
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use bulkfetch_core::download::HttpClient;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = HttpClient::new(Duration::from_secs(10))?;
/// let response = client.get_from("https://example.com/a.zip", 0).await?;
/// println!("status {}", response.status());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    first_byte_timeout: Duration,
}

impl HttpClient {
    /// Creates a client whose connect, first-byte and idle-read timeouts are all `timeout`.
    ///
    /// # Errors
    ///
    /// Returns the builder error if the TLS backend cannot be initialised.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            first_byte_timeout: timeout,
        })
    }

    /// Creates a client with the default 10 second timeouts.
    ///
    /// # Errors
    ///
    /// See [`HttpClient::new`].
    pub fn with_default_timeouts() -> Result<Self, reqwest::Error> {
        Self::new(DEFAULT_REQUEST_TIMEOUT)
    }

    /// Opens the body of `url` starting at byte `offset`.
    ///
    /// `offset == 0` sends a plain GET; otherwise `Range: bytes=<offset>-` is added.
    /// Any 2xx is returned to the caller, which must check for `206` vs `200` when
    /// resuming. `416` maps to [`DownloadError::RangeNotSatisfiable`]; other
    /// non-success statuses map to [`DownloadError::HttpStatus`] with the
    /// Retry-After value preserved.
    ///
    /// # Errors
    ///
    /// Returns a [`DownloadError`] for invalid URLs, network failures, timeouts
    /// before the response head arrives, and error statuses.
    #[instrument(level = "debug", skip(self), fields(url = %url))]
    pub async fn get_from(&self, url: &str, offset: u64) -> Result<Response, DownloadError> {
        Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;

        let mut request = self.client.get(url);
        if offset > 0 {
            request = request.header(RANGE, format!("bytes={offset}-"));
        }

        let response = tokio::time::timeout(self.first_byte_timeout, request.send())
            .await
            .map_err(|_| DownloadError::timeout(url))?
            .map_err(|e| DownloadError::from_reqwest(url, e))?;

        let status = response.status();
        debug!(status = status.as_u16(), offset, "response received");

        if status == StatusCode::RANGE_NOT_SATISFIABLE && offset > 0 {
            return Err(DownloadError::range_not_satisfiable(url, offset));
        }
        if !status.is_success() {
            return Err(status_error(url, &response));
        }
        Ok(response)
    }

    /// Asks the server for the full size of `url` with a `HEAD` request.
    ///
    /// Returns `Ok(None)` when the server answers but announces no length.
    ///
    /// # Errors
    ///
    /// Same classes as [`HttpClient::get_from`].
    #[instrument(level = "debug", skip(self), fields(url = %url))]
    pub async fn probe_content_length(&self, url: &str) -> Result<Option<u64>, DownloadError> {
        Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;

        let response = tokio::time::timeout(self.first_byte_timeout, self.client.head(url).send())
            .await
            .map_err(|_| DownloadError::timeout(url))?
            .map_err(|e| DownloadError::from_reqwest(url, e))?;

        if !response.status().is_success() {
            return Err(status_error(url, &response));
        }
        Ok(header_content_length(&response))
    }
}

fn status_error(url: &str, response: &Response) -> DownloadError {
    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    DownloadError::http_status_with_retry_after(url, response.status().as_u16(), retry_after)
}

fn header_content_length(response: &Response) -> Option<u64> {
    response
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
}

/// Full size of the resource given a response to a request starting at `offset`.
///
/// For `206` the announced length covers only the remaining bytes, so the offset
/// is added back. For `200` the announced length is already the full size.
#[must_use]
pub fn expected_total(response: &Response, offset: u64) -> Option<u64> {
    let announced = header_content_length(response).or_else(|| response.content_length())?;
    if response.status() == StatusCode::PARTIAL_CONTENT {
        Some(offset.saturating_add(announced))
    } else {
        Some(announced)
    }
}
