//! Source configuration repository.

use std::time::Duration;

use chrono::{DateTime, Utc};
use diesel::prelude::*;

use super::pool::{run_blocking, SqlitePool};
use super::records::{NewSource, SourceRecord};
use super::{parse_datetime, parse_datetime_opt};
use crate::models::SourceConfig;
use crate::schema::sources;

impl From<SourceRecord> for SourceConfig {
    fn from(record: SourceRecord) -> Self {
        SourceConfig {
            site_name: record.site_name,
            base_url: record.base_url,
            is_active: record.is_active != 0,
            crawl_interval: Duration::from_secs(record.crawl_interval_secs.max(0) as u64),
            last_crawl_at: parse_datetime_opt(record.last_crawl_at),
            created_at: parse_datetime(&record.created_at),
            updated_at: parse_datetime(&record.updated_at),
        }
    }
}

/// Repository for `SourceConfig` rows.
#[derive(Clone)]
pub struct SourceRepository {
    pool: SqlitePool,
}

impl SourceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get a source by site name.
    pub async fn get(&self, site_name: &str) -> Result<Option<SourceConfig>, diesel::result::Error> {
        let site_name = site_name.to_string();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            sources::table
                .find(&site_name)
                .first::<SourceRecord>(conn)
                .optional()
        })
        .await
        .map(|opt| opt.map(SourceConfig::from))
    }

    /// Get all sources, ordered by site name.
    pub async fn get_all(&self) -> Result<Vec<SourceConfig>, diesel::result::Error> {
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            sources::table
                .order(sources::site_name.asc())
                .load::<SourceRecord>(conn)
        })
        .await
        .map(|records| records.into_iter().map(SourceConfig::from).collect())
    }

    /// Get sources with `is_active = true`.
    pub async fn get_active(&self) -> Result<Vec<SourceConfig>, diesel::result::Error> {
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            sources::table
                .filter(sources::is_active.eq(1))
                .order(sources::site_name.asc())
                .load::<SourceRecord>(conn)
        })
        .await
        .map(|records| records.into_iter().map(SourceConfig::from).collect())
    }

    /// Save a source (insert or update using replace semantics).
    pub async fn save(&self, source: &SourceConfig) -> Result<(), diesel::result::Error> {
        let site_name = source.site_name.clone();
        let base_url = source.base_url.clone();
        let is_active = source.is_active as i32;
        let interval_secs = source.crawl_interval.as_secs() as i32;
        let last_crawl_at = source.last_crawl_at.map(|dt| dt.to_rfc3339());
        let created_at = source.created_at.to_rfc3339();
        let updated_at = source.updated_at.to_rfc3339();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            diesel::replace_into(sources::table)
                .values((
                    sources::site_name.eq(&site_name),
                    sources::base_url.eq(&base_url),
                    sources::is_active.eq(is_active),
                    sources::crawl_interval_secs.eq(interval_secs),
                    sources::last_crawl_at.eq(last_crawl_at.as_deref()),
                    sources::created_at.eq(&created_at),
                    sources::updated_at.eq(&updated_at),
                ))
                .execute(conn)?;
            Ok(())
        })
        .await
    }

    /// Insert a source only if the site name is not taken.
    ///
    /// Returns `false` when a source with this name already exists.
    pub async fn create_if_absent(&self, source: &SourceConfig) -> Result<bool, diesel::result::Error> {
        let site_name = source.site_name.clone();
        let base_url = source.base_url.clone();
        let is_active = source.is_active as i32;
        let interval_secs = source.crawl_interval.as_secs() as i32;
        let last_crawl_at = source.last_crawl_at.map(|dt| dt.to_rfc3339());
        let created_at = source.created_at.to_rfc3339();
        let updated_at = source.updated_at.to_rfc3339();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            let new_source = NewSource {
                site_name: &site_name,
                base_url: &base_url,
                is_active,
                crawl_interval_secs: interval_secs,
                last_crawl_at: last_crawl_at.as_deref(),
                created_at: &created_at,
                updated_at: &updated_at,
            };
            let rows = diesel::insert_into(sources::table)
                .values(&new_source)
                .on_conflict(sources::site_name)
                .do_nothing()
                .execute(conn)?;
            Ok(rows > 0)
        })
        .await
    }

    /// Record the time the last run consumed this source's schedule slot.
    ///
    /// Written only by the executor run that owns the source; the per-source
    /// exclusion in the scheduler makes this a single-writer field.
    pub async fn update_last_crawl(
        &self,
        site_name: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<(), diesel::result::Error> {
        let site_name = site_name.to_string();
        let ts = timestamp.to_rfc3339();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            diesel::update(sources::table.find(&site_name))
                .set(sources::last_crawl_at.eq(Some(ts.as_str())))
                .execute(conn)?;
            Ok(())
        })
        .await
    }

    /// Soft-disable or re-enable a source.
    pub async fn set_active(&self, site_name: &str, active: bool) -> Result<bool, diesel::result::Error> {
        let site_name = site_name.to_string();
        let now = Utc::now().to_rfc3339();
        let pool = self.pool.clone();

        run_blocking(pool, move |conn| {
            let rows = diesel::update(sources::table.find(&site_name))
                .set((
                    sources::is_active.eq(active as i32),
                    sources::updated_at.eq(&now),
                ))
                .execute(conn)?;
            Ok(rows > 0)
        })
        .await
    }
}
