//! HTTP fetch client shared by all source adapters.

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::{Client, StatusCode};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::FetchError;

const USER_AGENT: &str = "NewsFlow/0.1 (crypto news aggregation; +https://github.com/newsflow)";

/// HTTP client that spaces its requests out by a politeness delay.
///
/// Clones share the pacing state, so every adapter holding a clone counts
/// against the same gap.
#[derive(Clone)]
pub struct FetchClient {
    client: Client,
    request_delay: Duration,
    last_request: Arc<Mutex<Option<Instant>>>,
}

impl FetchClient {
    /// Create a new fetch client.
    pub fn new(timeout: Duration, request_delay: Duration) -> Self {
        Self::with_user_agent(timeout, request_delay, None)
    }

    /// Create a new fetch client with a custom user agent.
    pub fn with_user_agent(
        timeout: Duration,
        request_delay: Duration,
        user_agent: Option<&str>,
    ) -> Self {
        let client = Client::builder()
            .user_agent(user_agent.unwrap_or(USER_AGENT))
            .timeout(timeout)
            .gzip(true)
            .brotli(true)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            request_delay,
            last_request: Arc::new(Mutex::new(None)),
        }
    }

    /// Wait out whatever remains of the politeness gap since the previous
    /// request. The first request goes out immediately, and nothing is paid
    /// after the final fetch of a run.
    async fn pace(&self) {
        if self.request_delay.is_zero() {
            return;
        }
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.request_delay {
                tokio::time::sleep(self.request_delay - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    /// Fetch a URL and return the response body as text.
    pub async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        let response = self.get_checked(url).await?;
        response
            .text()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))
    }

    /// Fetch a URL and return the response body as raw bytes.
    pub async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.get_checked(url).await?;
        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| FetchError::from_reqwest(url, e))
    }

    async fn get_checked(&self, url: &str) -> Result<reqwest::Response, FetchError> {
        self.pace().await;
        debug!(url, "fetching");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(FetchError::ServerError {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        if !status.is_success() && status != StatusCode::NOT_MODIFIED {
            return Err(FetchError::UnexpectedStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }
}
