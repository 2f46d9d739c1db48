//! Embedded schema setup, applied idempotently on startup.

use super::pool::{run_blocking, DieselError, SqlitePool};
use diesel::prelude::*;

const STATEMENTS: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS sources (
        site_name TEXT PRIMARY KEY,
        base_url TEXT NOT NULL,
        is_active INTEGER NOT NULL DEFAULT 1,
        crawl_interval_secs INTEGER NOT NULL,
        last_crawl_at TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS articles (
        id TEXT PRIMARY KEY,
        url_hash TEXT NOT NULL UNIQUE,
        title TEXT NOT NULL,
        content TEXT NOT NULL,
        source_site TEXT NOT NULL,
        source_url TEXT NOT NULL,
        metadata TEXT NOT NULL DEFAULT '{}',
        crawl_timestamp TEXT NOT NULL,
        is_processed INTEGER NOT NULL DEFAULT 0
    )"#,
    r#"CREATE TABLE IF NOT EXISTS crawl_logs (
        id TEXT PRIMARY KEY,
        site_name TEXT NOT NULL,
        status TEXT NOT NULL,
        start_time TEXT NOT NULL,
        end_time TEXT,
        duration_ms INTEGER,
        articles_found INTEGER NOT NULL DEFAULT 0,
        articles_saved INTEGER NOT NULL DEFAULT 0,
        articles_skipped INTEGER NOT NULL DEFAULT 0,
        article_ids TEXT NOT NULL DEFAULT '[]',
        error_message TEXT
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_articles_source_site ON articles (source_site)",
    "CREATE INDEX IF NOT EXISTS idx_articles_crawl_timestamp ON articles (crawl_timestamp)",
    "CREATE INDEX IF NOT EXISTS idx_crawl_logs_site_name ON crawl_logs (site_name)",
    "CREATE INDEX IF NOT EXISTS idx_crawl_logs_status ON crawl_logs (status)",
    "CREATE INDEX IF NOT EXISTS idx_crawl_logs_start_time ON crawl_logs (start_time)",
];

/// Create all tables and indexes if they do not exist yet.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), DieselError> {
    run_blocking(pool.clone(), |conn| {
        for statement in STATEMENTS {
            diesel::sql_query(*statement).execute(conn)?;
        }
        Ok(())
    })
    .await
}
