//! Crawl run execution.
//!
//! One `CrawlExecutor::run` call is one crawl run: open a `running` log,
//! fetch drafts through the site's adapter with bounded retries, normalize
//! and dedup each draft, finalize the log, stamp the source, then hand new
//! article ids to the downstream dispatcher. Failures are recorded in the
//! log, never propagated to the caller.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::adapters::AdapterFactory;
use crate::dispatch::DownstreamDispatcher;
use crate::error::FetchError;
use crate::models::{ArticleDraft, CrawlLog, SourceConfig};
use crate::normalize::normalize_draft;
use crate::repository::{ArticleRepository, CrawlLogRepository, SourceRepository};

/// Retry schedule for transient fetch failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff with up to 20% jitter, capped at `max_delay`.
    fn delay_for(&self, attempt: u32) -> Duration {
        use rand::Rng;
        let delay = self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1));
        let delay = delay.min(self.max_delay);
        let jitter = rand::thread_rng().gen_range(0.0..0.2);
        delay.mul_f64(1.0 + jitter)
    }
}

/// Runs individual crawls against the persistent store.
pub struct CrawlExecutor {
    adapters: Arc<dyn AdapterFactory>,
    sources: SourceRepository,
    articles: ArticleRepository,
    logs: CrawlLogRepository,
    dispatcher: Arc<DownstreamDispatcher>,
    retry: RetryPolicy,
    deny_lists: HashMap<String, Vec<String>>,
}

impl CrawlExecutor {
    pub fn new(
        adapters: Arc<dyn AdapterFactory>,
        sources: SourceRepository,
        articles: ArticleRepository,
        logs: CrawlLogRepository,
        dispatcher: Arc<DownstreamDispatcher>,
        retry: RetryPolicy,
        deny_lists: HashMap<String, Vec<String>>,
    ) -> Self {
        Self {
            adapters,
            sources,
            articles,
            logs,
            dispatcher,
            retry,
            deny_lists,
        }
    }

    /// Execute one crawl run for `source` and return its finalized log.
    ///
    /// The returned log is also persisted; a failed fetch still stamps the
    /// source's `last_crawl_at` so a broken site cannot wedge the schedule
    /// into hot-looping.
    pub async fn run(&self, source: &SourceConfig, max_items: usize) -> CrawlLog {
        let site = source.site_name.as_str();
        let mut log = CrawlLog::start(site);
        if let Err(e) = self.logs.insert(&log).await {
            error!(site, error = %e, "could not open crawl log");
            log.fail(format!("could not open crawl log: {e}"));
            return log;
        }
        info!(site, run_id = %log.id, "crawl started");

        let drafts = match self.fetch_drafts(source, max_items).await {
            Ok(drafts) => drafts,
            Err(e) => {
                warn!(site, error = %e, "fetch failed");
                log.fail(e.to_string());
                self.finalize(source, &log).await;
                return log;
            }
        };

        let found = drafts.len() as u32;
        let deny_list = self.deny_lists.get(site).cloned().unwrap_or_default();
        let mut saved_ids: Vec<String> = Vec::new();
        let mut skipped: u32 = 0;
        let mut storage_error: Option<String> = None;

        for draft in drafts {
            let article = normalize_draft(draft, &deny_list).into_article(site);
            // The unique constraint is the real dedup guard; this pre-check
            // just skips the insert attempt for known hashes.
            match self.articles.exists_by_hash(&article.url_hash).await {
                Ok(true) => {
                    skipped += 1;
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    error!(site, error = %e, "dedup lookup failed");
                    storage_error = Some(format!("storage error: {e}"));
                    break;
                }
            }
            match self.articles.insert_if_new(&article).await {
                Ok(Some(id)) => saved_ids.push(id),
                Ok(None) => skipped += 1,
                Err(e) => {
                    error!(site, error = %e, "article insert failed");
                    storage_error = Some(format!("storage error: {e}"));
                    break;
                }
            }
        }

        match storage_error {
            Some(message) => log.fail(message),
            None => log.complete(found, saved_ids.clone(), skipped),
        }
        self.finalize(source, &log).await;
        info!(
            site,
            run_id = %log.id,
            status = log.status.as_str(),
            found,
            saved = saved_ids.len(),
            skipped,
            "crawl finished"
        );

        // Best-effort; dispatch failures never fail the run that saved the
        // articles. Articles committed before a mid-run storage failure are
        // dispatched all the same.
        self.dispatcher.dispatch_all(&saved_ids).await;

        log
    }

    async fn fetch_drafts(
        &self,
        source: &SourceConfig,
        max_items: usize,
    ) -> Result<Vec<ArticleDraft>, FetchError> {
        let Some(adapter) = self.adapters.adapter_for(source) else {
            return Err(FetchError::Format {
                url: source.base_url.clone(),
                message: format!("no adapter registered for site '{}'", source.site_name),
            });
        };

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match adapter.fetch(max_items).await {
                Ok(drafts) => return Ok(drafts),
                Err(e) if e.is_transient() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        site = %source.site_name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient fetch failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn finalize(&self, source: &SourceConfig, log: &CrawlLog) {
        if let Err(e) = self.logs.finalize(log).await {
            error!(site = %source.site_name, error = %e, "could not finalize crawl log");
        }
        if let Err(e) = self
            .sources
            .update_last_crawl(&source.site_name, log.start_time)
            .await
        {
            error!(site = %source.site_name, error = %e, "could not stamp last crawl time");
        }
    }
}
