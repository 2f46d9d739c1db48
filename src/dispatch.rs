//! Downstream translation dispatch.
//!
//! After a run saves new articles, their ids are handed to the translation
//! queue. Dispatch is best-effort: failures are logged and the article stays
//! unprocessed for a later sweep, but a dispatch failure never fails the run
//! that produced the article. The `is_processed` flag is written by the
//! translation consumer, never here; dispatch only reads it to skip articles
//! the consumer has already picked up.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};

use crate::error::DispatchError;
use crate::repository::ArticleRepository;

/// Hand-off point to the downstream translation pipeline.
#[async_trait]
pub trait TranslationQueue: Send + Sync {
    async fn enqueue(&self, article_id: &str) -> Result<(), DispatchError>;
}

/// Queue backed by an HTTP endpoint of the translation service.
pub struct HttpTranslationQueue {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpTranslationQueue {
    pub fn new(endpoint: &str, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");
        Self {
            endpoint: endpoint.to_string(),
            client,
        }
    }
}

#[async_trait]
impl TranslationQueue for HttpTranslationQueue {
    async fn enqueue(&self, article_id: &str) -> Result<(), DispatchError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&json!({ "article_id": article_id }))
            .send()
            .await
            .map_err(|e| DispatchError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DispatchError::Rejected {
                article_id: article_id.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

/// No-op queue used when no translation endpoint is configured.
pub struct NoopTranslationQueue;

#[async_trait]
impl TranslationQueue for NoopTranslationQueue {
    async fn enqueue(&self, article_id: &str) -> Result<(), DispatchError> {
        debug!(article_id, "no translator endpoint configured, dropping");
        Ok(())
    }
}

const SWEEP_BATCH: i64 = 100;

/// Dispatches saved articles to the translation queue with bounded retries.
pub struct DownstreamDispatcher {
    queue: Arc<dyn TranslationQueue>,
    articles: ArticleRepository,
    max_attempts: u32,
    base_delay: Duration,
}

impl DownstreamDispatcher {
    pub fn new(
        queue: Arc<dyn TranslationQueue>,
        articles: ArticleRepository,
        max_attempts: u32,
        base_delay: Duration,
    ) -> Self {
        Self {
            queue,
            articles,
            max_attempts,
            base_delay,
        }
    }

    /// Dispatch one article. Articles the consumer already marked processed
    /// are skipped; the flag itself is never written here.
    pub async fn dispatch(&self, article_id: &str) -> Result<(), DispatchError> {
        let article = self
            .articles
            .get(article_id)
            .await
            .map_err(|e| DispatchError::Lookup {
                article_id: article_id.to_string(),
                message: e.to_string(),
            })?
            .ok_or_else(|| DispatchError::Lookup {
                article_id: article_id.to_string(),
                message: "not found".to_string(),
            })?;
        if article.is_processed {
            debug!(article_id, "already picked up by the consumer, skipping");
            return Ok(());
        }

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.queue.enqueue(article_id).await {
                Ok(()) => return Ok(()),
                // Only an unreachable queue is worth retrying; a rejection is
                // the queue's answer, not a transient fault.
                Err(e @ DispatchError::Unavailable(_)) if attempt < self.max_attempts => {
                    let delay = self.base_delay * 2u32.saturating_pow(attempt - 1);
                    warn!(article_id, attempt, error = %e, "translator unavailable, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Dispatch a batch. Failures are logged per article and never escalate.
    pub async fn dispatch_all(&self, article_ids: &[String]) {
        for article_id in article_ids {
            if let Err(e) = self.dispatch(article_id).await {
                warn!(article_id, error = %e, "dispatch failed, article left unprocessed");
            }
        }
    }

    /// Re-enqueue articles the consumer has not picked up yet, oldest first.
    ///
    /// Recovery path for articles whose enqueue failed or whose run died
    /// after commit. Enqueueing the same article twice is harmless; the
    /// consumer side checks the processed state independently.
    pub async fn dispatch_unprocessed(&self) {
        match self.articles.unprocessed_ids(SWEEP_BATCH).await {
            Ok(ids) if ids.is_empty() => {}
            Ok(ids) => {
                debug!(count = ids.len(), "sweeping unprocessed articles");
                self.dispatch_all(&ids).await;
            }
            Err(e) => warn!(error = %e, "unprocessed article sweep failed"),
        }
    }
}
