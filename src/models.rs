//! Domain models for sources, articles, and crawl runs.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Configuration for one external news source.
///
/// `site_name` is the unique, immutable key. Scheduling fields are written
/// only by the scheduler/executor path; admin updates touch `base_url`,
/// `is_active`, and `crawl_interval`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub site_name: String,
    pub base_url: String,
    pub is_active: bool,
    /// Minimum wall-clock gap between scheduled runs.
    pub crawl_interval: Duration,
    /// Set after every run, including failed ones.
    pub last_crawl_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SourceConfig {
    pub fn new(site_name: String, base_url: String, crawl_interval: Duration) -> Self {
        let now = Utc::now();
        Self {
            site_name,
            base_url,
            is_active: true,
            crawl_interval,
            last_crawl_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// A source with no recorded crawl is always due.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.last_crawl_at {
            None => true,
            Some(last) => now >= last + chrono::Duration::seconds(self.crawl_interval.as_secs() as i64),
        }
    }

    /// Derived next run time; never stored.
    pub fn next_scheduled_at(&self) -> Option<DateTime<Utc>> {
        self.last_crawl_at
            .map(|last| last + chrono::Duration::seconds(self.crawl_interval.as_secs() as i64))
    }
}

/// An in-memory candidate article produced by a source adapter.
///
/// Drafts are owned by a single crawl run and are consumed by normalization
/// and deduplication; they are never persisted directly.
#[derive(Debug, Clone)]
pub struct ArticleDraft {
    pub title: String,
    pub content: String,
    pub source_url: String,
    /// Best effort; left `None` when the source exposes no date.
    pub published_at: Option<DateTime<Utc>>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl ArticleDraft {
    pub fn new(title: impl Into<String>, content: impl Into<String>, source_url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            source_url: source_url.into(),
            published_at: None,
            metadata: serde_json::Map::new(),
        }
    }
}

/// A persisted, deduplicated article.
///
/// `url_hash`, `source_url`, and `source_site` are immutable once created.
/// `is_processed` is flipped by the downstream translation consumer; the
/// crawler core only reads it to avoid double-dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub id: String,
    /// SHA-256 of the canonicalized source URL; globally unique.
    pub url_hash: String,
    pub title: String,
    pub content: String,
    pub source_site: String,
    pub source_url: String,
    pub metadata: serde_json::Value,
    pub crawl_timestamp: DateTime<Utc>,
    pub is_processed: bool,
}

/// Lifecycle of one crawl run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrawlStatus {
    Running,
    Completed,
    Failed,
}

impl CrawlStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CrawlStatus::Running => "running",
            CrawlStatus::Completed => "completed",
            CrawlStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "running" => Some(CrawlStatus::Running),
            "completed" => Some(CrawlStatus::Completed),
            "failed" => Some(CrawlStatus::Failed),
            _ => None,
        }
    }
}

/// Append-only record of one executor run, finalized exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlLog {
    pub id: String,
    pub site_name: String,
    pub status: CrawlStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub articles_found: u32,
    pub articles_saved: u32,
    /// Drafts discarded as duplicates of already-persisted articles.
    pub articles_skipped: u32,
    /// Ids of articles created by this run, in adapter order.
    pub article_ids: Vec<String>,
    pub error_message: Option<String>,
}

impl CrawlLog {
    /// Open a log in the `running` state.
    pub fn start(site_name: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            site_name: site_name.to_string(),
            status: CrawlStatus::Running,
            start_time: Utc::now(),
            end_time: None,
            duration_ms: None,
            articles_found: 0,
            articles_saved: 0,
            articles_skipped: 0,
            article_ids: Vec::new(),
            error_message: None,
        }
    }

    /// Finalize as completed. Terminal; never reversed.
    pub fn complete(&mut self, found: u32, saved_ids: Vec<String>, skipped: u32) {
        let end = Utc::now();
        self.status = CrawlStatus::Completed;
        self.end_time = Some(end);
        self.duration_ms = Some((end - self.start_time).num_milliseconds().max(0) as u64);
        self.articles_found = found;
        self.articles_saved = saved_ids.len() as u32;
        self.articles_skipped = skipped;
        self.article_ids = saved_ids;
    }

    /// Finalize as failed. Terminal; never reversed.
    pub fn fail(&mut self, error_message: String) {
        let end = Utc::now();
        self.status = CrawlStatus::Failed;
        self.end_time = Some(end);
        self.duration_ms = Some((end - self.start_time).num_milliseconds().max(0) as u64);
        self.error_message = Some(error_message);
    }
}
