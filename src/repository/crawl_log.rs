//! Crawl log repository.
//!
//! Logs are created in `running` state and finalized exactly once by the
//! owning run. Stale `running` rows left behind by a crash are reconciled to
//! `failed` on scheduler startup.

use chrono::{DateTime, Utc};
use diesel::prelude::*;

use super::pool::{run_blocking, SqlitePool};
use super::records::{CrawlLogRecord, NewCrawlLog};
use super::{parse_datetime, parse_datetime_opt};
use crate::models::{CrawlLog, CrawlStatus};
use crate::schema::crawl_logs;

impl From<CrawlLogRecord> for CrawlLog {
    fn from(record: CrawlLogRecord) -> Self {
        CrawlLog {
            id: record.id,
            site_name: record.site_name,
            status: CrawlStatus::from_str(&record.status).unwrap_or(CrawlStatus::Failed),
            start_time: parse_datetime(&record.start_time),
            end_time: parse_datetime_opt(record.end_time),
            duration_ms: record.duration_ms.map(|ms| ms.max(0) as u64),
            articles_found: record.articles_found.max(0) as u32,
            articles_saved: record.articles_saved.max(0) as u32,
            articles_skipped: record.articles_skipped.max(0) as u32,
            article_ids: serde_json::from_str(&record.article_ids).unwrap_or_default(),
            error_message: record.error_message,
        }
    }
}

/// Repository for crawl run history.
#[derive(Clone)]
pub struct CrawlLogRepository {
    pool: SqlitePool,
}

impl CrawlLogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a freshly opened log (status `running`).
    pub async fn insert(&self, log: &CrawlLog) -> Result<(), diesel::result::Error> {
        let id = log.id.clone();
        let site_name = log.site_name.clone();
        let status = log.status.as_str().to_string();
        let start_time = log.start_time.to_rfc3339();
        let end_time = log.end_time.map(|dt| dt.to_rfc3339());
        let article_ids = serde_json::to_string(&log.article_ids).unwrap_or_else(|_| "[]".to_string());
        let error_message = log.error_message.clone();
        let duration_ms = log.duration_ms.map(|ms| ms as i64);
        let articles_found = log.articles_found as i32;
        let articles_saved = log.articles_saved as i32;
        let articles_skipped = log.articles_skipped as i32;
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            let new_log = NewCrawlLog {
                id: &id,
                site_name: &site_name,
                status: &status,
                start_time: &start_time,
                end_time: end_time.as_deref(),
                duration_ms,
                articles_found,
                articles_saved,
                articles_skipped,
                article_ids: &article_ids,
                error_message: error_message.as_deref(),
            };
            diesel::insert_into(crawl_logs::table)
                .values(&new_log)
                .execute(conn)?;
            Ok(())
        })
        .await
    }

    /// Write a log's terminal state. Called once per run.
    pub async fn finalize(&self, log: &CrawlLog) -> Result<(), diesel::result::Error> {
        let id = log.id.clone();
        let status = log.status.as_str().to_string();
        let end_time = log.end_time.map(|dt| dt.to_rfc3339());
        let duration_ms = log.duration_ms.map(|ms| ms as i64);
        let articles_found = log.articles_found as i32;
        let articles_saved = log.articles_saved as i32;
        let articles_skipped = log.articles_skipped as i32;
        let article_ids = serde_json::to_string(&log.article_ids).unwrap_or_else(|_| "[]".to_string());
        let error_message = log.error_message.clone();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            diesel::update(crawl_logs::table.find(&id))
                .set((
                    crawl_logs::status.eq(&status),
                    crawl_logs::end_time.eq(end_time.as_deref()),
                    crawl_logs::duration_ms.eq(duration_ms),
                    crawl_logs::articles_found.eq(articles_found),
                    crawl_logs::articles_saved.eq(articles_saved),
                    crawl_logs::articles_skipped.eq(articles_skipped),
                    crawl_logs::article_ids.eq(&article_ids),
                    crawl_logs::error_message.eq(error_message.as_deref()),
                ))
                .execute(conn)?;
            Ok(())
        })
        .await
    }

    /// Get a log by id.
    pub async fn get(&self, id: &str) -> Result<Option<CrawlLog>, diesel::result::Error> {
        let id = id.to_string();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            crawl_logs::table.find(&id).first::<CrawlLogRecord>(conn).optional()
        })
        .await
        .map(|opt| opt.map(CrawlLog::from))
    }

    /// List logs newest-first with optional site and status filters.
    pub async fn list(
        &self,
        site_name: Option<&str>,
        status: Option<CrawlStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<CrawlLog>, diesel::result::Error> {
        let site_name = site_name.map(|s| s.to_string());
        let status = status.map(|s| s.as_str().to_string());
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            let mut query = crawl_logs::table.into_boxed();
            if let Some(site) = site_name {
                query = query.filter(crawl_logs::site_name.eq(site));
            }
            if let Some(status) = status {
                query = query.filter(crawl_logs::status.eq(status));
            }
            query
                .order(crawl_logs::start_time.desc())
                .limit(limit)
                .offset(offset)
                .load::<CrawlLogRecord>(conn)
        })
        .await
        .map(|records| records.into_iter().map(CrawlLog::from).collect())
    }

    /// Logs still marked `running`.
    pub async fn running(&self) -> Result<Vec<CrawlLog>, diesel::result::Error> {
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            crawl_logs::table
                .filter(crawl_logs::status.eq(CrawlStatus::Running.as_str()))
                .load::<CrawlLogRecord>(conn)
        })
        .await
        .map(|records| records.into_iter().map(CrawlLog::from).collect())
    }

    /// Mark `running` logs older than `cutoff` as failed with an
    /// interruption message. Returns the number of logs reconciled.
    pub async fn reconcile_stale_running(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<usize, diesel::result::Error> {
        let stale: Vec<CrawlLog> = self
            .running()
            .await?
            .into_iter()
            .filter(|log| log.start_time < cutoff)
            .collect();

        for log in &stale {
            let mut failed = log.clone();
            failed.fail("interrupted: run did not complete before shutdown".to_string());
            self.finalize(&failed).await?;
        }
        Ok(stale.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{create_pool, migrations};
    use tempfile::tempdir;

    async fn setup_test_db() -> (CrawlLogRepository, tempfile::TempDir) {
        let dir = tempdir().expect("temp dir");
        let pool = create_pool(&dir.path().join("test.db")).expect("pool");
        migrations::run_migrations(&pool).await.expect("migrations");
        (CrawlLogRepository::new(pool), dir)
    }

    #[tokio::test]
    async fn log_lifecycle_running_to_completed() {
        let (repo, _dir) = setup_test_db().await;

        let mut log = CrawlLog::start("coindesk");
        repo.insert(&log).await.unwrap();

        let stored = repo.get(&log.id).await.unwrap().unwrap();
        assert_eq!(stored.status, CrawlStatus::Running);
        assert!(stored.end_time.is_none());

        log.complete(17, vec!["a1".into(), "a2".into()], 15);
        repo.finalize(&log).await.unwrap();

        let stored = repo.get(&log.id).await.unwrap().unwrap();
        assert_eq!(stored.status, CrawlStatus::Completed);
        assert_eq!(stored.articles_found, 17);
        assert_eq!(stored.articles_saved, 2);
        assert_eq!(stored.articles_skipped, 15);
        assert_eq!(stored.article_ids, vec!["a1".to_string(), "a2".to_string()]);
    }

    #[tokio::test]
    async fn list_filters_by_status() {
        let (repo, _dir) = setup_test_db().await;

        let mut done = CrawlLog::start("coindesk");
        repo.insert(&done).await.unwrap();
        done.complete(3, vec![], 3);
        repo.finalize(&done).await.unwrap();

        let running = CrawlLog::start("coinbase");
        repo.insert(&running).await.unwrap();

        let completed = repo.list(None, Some(CrawlStatus::Completed), 10, 0).await.unwrap();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].site_name, "coindesk");

        let by_site = repo.list(Some("coinbase"), None, 10, 0).await.unwrap();
        assert_eq!(by_site.len(), 1);
        assert_eq!(by_site[0].status, CrawlStatus::Running);
    }

    #[tokio::test]
    async fn stale_running_logs_are_reconciled_to_failed() {
        let (repo, _dir) = setup_test_db().await;

        let mut stale = CrawlLog::start("coindesk");
        stale.start_time = Utc::now() - chrono::Duration::minutes(30);
        repo.insert(&stale).await.unwrap();

        let fresh = CrawlLog::start("coinbase");
        repo.insert(&fresh).await.unwrap();

        let cutoff = Utc::now() - chrono::Duration::minutes(10);
        let reconciled = repo.reconcile_stale_running(cutoff).await.unwrap();
        assert_eq!(reconciled, 1);

        let stale = repo.get(&stale.id).await.unwrap().unwrap();
        assert_eq!(stale.status, CrawlStatus::Failed);
        assert!(stale.error_message.unwrap().contains("interrupted"));

        let fresh = repo.get(&fresh.id).await.unwrap().unwrap();
        assert_eq!(fresh.status, CrawlStatus::Running);
    }
}
