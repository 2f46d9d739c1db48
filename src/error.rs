//! Typed errors for fetch, dispatch, and crawl-trigger operations.

use thiserror::Error;

/// Errors raised by a source adapter while fetching candidate articles.
///
/// The transient/format split drives the executor's retry decision: network
/// failures are retried with backoff, format failures mean the source changed
/// shape and a human needs to update the adapter.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Request exceeded the configured timeout
    #[error("timeout fetching {url}")]
    Timeout { url: String },

    /// Connection-level failure (DNS, refused, reset)
    #[error("connection failed for {url}: {message}")]
    Connect { url: String, message: String },

    /// Server returned a 5xx status
    #[error("server error {status} from {url}")]
    ServerError { url: String, status: u16 },

    /// Server returned an unexpected non-5xx status (4xx, redirect loop)
    #[error("unexpected status {status} from {url}")]
    UnexpectedStatus { url: String, status: u16 },

    /// Page or feed no longer matches the parser
    #[error("source format error at {url}: {message}")]
    Format { url: String, message: String },
}

impl FetchError {
    /// Whether a retry can plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FetchError::Timeout { .. } | FetchError::Connect { .. } | FetchError::ServerError { .. }
        )
    }

    /// Classify a reqwest error for a given URL.
    pub fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
            }
        } else {
            FetchError::Connect {
                url: url.to_string(),
                message: err.to_string(),
            }
        }
    }
}

/// Errors raised while enqueueing a translation work item.
///
/// Dispatch failures never fail the owning crawl run; they are retried with
/// bounded backoff and logged on permanent failure.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Queue endpoint unreachable
    #[error("translation queue unavailable: {0}")]
    Unavailable(String),

    /// Queue endpoint rejected the request
    #[error("translation queue rejected article {article_id} with status {status}")]
    Rejected { article_id: String, status: u16 },

    /// Lookup of the article before dispatch failed
    #[error("store lookup failed for article {article_id}: {message}")]
    Lookup { article_id: String, message: String },
}

/// Errors returned when an on-demand crawl cannot be started.
#[derive(Debug, Error)]
pub enum TriggerError {
    /// No source configuration exists for the requested site
    #[error("unknown site: {0}")]
    UnknownSite(String),

    /// A run for this site is already in flight
    #[error("crawl already running for {0}")]
    AlreadyRunning(String),

    /// The persistent store failed while loading the source
    #[error("store error: {0}")]
    Store(#[from] diesel::result::Error),

    /// The run task ended without producing a log
    #[error("crawl task aborted for {0}")]
    Aborted(String),
}
