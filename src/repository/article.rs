//! Article repository.
//!
//! Dedup is enforced here: the unique index on `url_hash` turns a
//! check-then-insert race between concurrent runs into a constraint
//! violation, which `insert_if_new` reports as "already exists".

use diesel::prelude::*;
use diesel::result::DatabaseErrorKind;

use super::pool::{run_blocking, SqlitePool};
use super::records::{ArticleRecord, NewArticle};
use super::parse_datetime;
use crate::models::Article;
use crate::schema::articles;

impl From<ArticleRecord> for Article {
    fn from(record: ArticleRecord) -> Self {
        Article {
            id: record.id,
            url_hash: record.url_hash,
            title: record.title,
            content: record.content,
            source_site: record.source_site,
            source_url: record.source_url,
            metadata: serde_json::from_str(&record.metadata)
                .unwrap_or(serde_json::Value::Object(Default::default())),
            crawl_timestamp: parse_datetime(&record.crawl_timestamp),
            is_processed: record.is_processed != 0,
        }
    }
}

/// Repository for persisted articles.
#[derive(Clone)]
pub struct ArticleRepository {
    pool: SqlitePool,
}

impl ArticleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Whether an article with this url hash already exists.
    pub async fn exists_by_hash(&self, url_hash: &str) -> Result<bool, diesel::result::Error> {
        let url_hash = url_hash.to_string();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            use diesel::dsl::count_star;
            let count: i64 = articles::table
                .filter(articles::url_hash.eq(&url_hash))
                .select(count_star())
                .first(conn)?;
            Ok(count > 0)
        })
        .await
    }

    /// Insert an article unless its `url_hash` is already present.
    ///
    /// Returns `Ok(Some(id))` on insert and `Ok(None)` when the unique
    /// constraint reports the hash as taken — the expected steady-state
    /// outcome on every periodic run after the first.
    pub async fn insert_if_new(&self, article: &Article) -> Result<Option<String>, diesel::result::Error> {
        let id = article.id.clone();
        let url_hash = article.url_hash.clone();
        let title = article.title.clone();
        let content = article.content.clone();
        let source_site = article.source_site.clone();
        let source_url = article.source_url.clone();
        let metadata = serde_json::to_string(&article.metadata).unwrap_or_else(|_| "{}".to_string());
        let crawl_timestamp = article.crawl_timestamp.to_rfc3339();
        let is_processed = article.is_processed as i32;
        let pool = self.pool.clone();

        let result = run_blocking(pool, move |conn| {
            let new_article = NewArticle {
                id: &id,
                url_hash: &url_hash,
                title: &title,
                content: &content,
                source_site: &source_site,
                source_url: &source_url,
                metadata: &metadata,
                crawl_timestamp: &crawl_timestamp,
                is_processed,
            };
            diesel::insert_into(articles::table)
                .values(&new_article)
                .execute(conn)?;
            Ok(id)
        })
        .await;

        match result {
            Ok(id) => Ok(Some(id)),
            Err(diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Get an article by id.
    pub async fn get(&self, id: &str) -> Result<Option<Article>, diesel::result::Error> {
        let id = id.to_string();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            articles::table.find(&id).first::<ArticleRecord>(conn).optional()
        })
        .await
        .map(|opt| opt.map(Article::from))
    }

    /// List articles newest-first, optionally filtered by source site.
    pub async fn list(
        &self,
        source_site: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Article>, diesel::result::Error> {
        let source_site = source_site.map(|s| s.to_string());
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            let mut query = articles::table.into_boxed();
            if let Some(site) = source_site {
                query = query.filter(articles::source_site.eq(site));
            }
            query
                .order(articles::crawl_timestamp.desc())
                .limit(limit)
                .offset(offset)
                .load::<ArticleRecord>(conn)
        })
        .await
        .map(|records| records.into_iter().map(Article::from).collect())
    }

    /// Ids of articles the translation consumer has not marked processed,
    /// oldest first. The flag itself is written only by the consumer side;
    /// the crawler reads it to drive the dispatch sweep.
    pub async fn unprocessed_ids(&self, limit: i64) -> Result<Vec<String>, diesel::result::Error> {
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            articles::table
                .filter(articles::is_processed.eq(0))
                .order(articles::crawl_timestamp.asc())
                .select(articles::id)
                .limit(limit)
                .load::<String>(conn)
        })
        .await
    }

    /// Total and processed article counts, optionally per site.
    pub async fn stats(&self, source_site: Option<&str>) -> Result<(u64, u64), diesel::result::Error> {
        let source_site = source_site.map(|s| s.to_string());
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            use diesel::dsl::count_star;
            let (total, processed): (i64, i64) = match source_site {
                Some(site) => {
                    let total = articles::table
                        .filter(articles::source_site.eq(&site))
                        .select(count_star())
                        .first(conn)?;
                    let processed = articles::table
                        .filter(articles::source_site.eq(&site))
                        .filter(articles::is_processed.eq(1))
                        .select(count_star())
                        .first(conn)?;
                    (total, processed)
                }
                None => {
                    let total = articles::table.select(count_star()).first(conn)?;
                    let processed = articles::table
                        .filter(articles::is_processed.eq(1))
                        .select(count_star())
                        .first(conn)?;
                    (total, processed)
                }
            };
            Ok((total as u64, processed as u64))
        })
        .await
    }
}
