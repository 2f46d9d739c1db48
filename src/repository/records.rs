//! Diesel row types for the crawler tables.

use diesel::prelude::*;

use crate::schema;

/// Source row from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::sources)]
#[diesel(primary_key(site_name))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SourceRecord {
    pub site_name: String,
    pub base_url: String,
    pub is_active: i32,
    pub crawl_interval_secs: i32,
    pub last_crawl_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// New source for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::sources)]
pub struct NewSource<'a> {
    pub site_name: &'a str,
    pub base_url: &'a str,
    pub is_active: i32,
    pub crawl_interval_secs: i32,
    pub last_crawl_at: Option<&'a str>,
    pub created_at: &'a str,
    pub updated_at: &'a str,
}

/// Article row from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::articles)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ArticleRecord {
    pub id: String,
    pub url_hash: String,
    pub title: String,
    pub content: String,
    pub source_site: String,
    pub source_url: String,
    pub metadata: String,
    pub crawl_timestamp: String,
    pub is_processed: i32,
}

/// New article for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::articles)]
pub struct NewArticle<'a> {
    pub id: &'a str,
    pub url_hash: &'a str,
    pub title: &'a str,
    pub content: &'a str,
    pub source_site: &'a str,
    pub source_url: &'a str,
    pub metadata: &'a str,
    pub crawl_timestamp: &'a str,
    pub is_processed: i32,
}

/// Crawl log row from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::crawl_logs)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct CrawlLogRecord {
    pub id: String,
    pub site_name: String,
    pub status: String,
    pub start_time: String,
    pub end_time: Option<String>,
    pub duration_ms: Option<i64>,
    pub articles_found: i32,
    pub articles_saved: i32,
    pub articles_skipped: i32,
    pub article_ids: String,
    pub error_message: Option<String>,
}

/// New crawl log for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::crawl_logs)]
pub struct NewCrawlLog<'a> {
    pub id: &'a str,
    pub site_name: &'a str,
    pub status: &'a str,
    pub start_time: &'a str,
    pub end_time: Option<&'a str>,
    pub duration_ms: Option<i64>,
    pub articles_found: i32,
    pub articles_saved: i32,
    pub articles_skipped: i32,
    pub article_ids: &'a str,
    pub error_message: Option<&'a str>,
}
