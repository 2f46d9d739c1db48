//! SQLite persistence layer.
//!
//! Sync Diesel wrapped in `spawn_blocking`; domain models convert from row
//! records at the repository boundary. The unique constraint on
//! `articles.url_hash` is the only concurrency guard for article creation.

pub mod article;
pub mod crawl_log;
pub mod migrations;
pub mod pool;
pub mod records;
pub mod source;

pub use article::ArticleRepository;
pub use crawl_log::CrawlLogRepository;
pub use pool::{create_pool, create_pool_from_url, SqlitePool};
pub use source::SourceRepository;

use chrono::{DateTime, Utc};

/// Parse an RFC 3339 timestamp column, falling back to now on corrupt data.
pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Parse an optional RFC 3339 timestamp column.
pub(crate) fn parse_datetime_opt(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
    })
}
