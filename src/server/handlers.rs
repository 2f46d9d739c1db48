//! Request handlers for the control server.

use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use crate::error::TriggerError;
use crate::models::{CrawlStatus, SourceConfig};

use super::AppState;

/// API error carrying a status code and a message.
pub struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "detail": self.1 }));
        (self.0, body).into_response()
    }
}

impl From<diesel::result::Error> for ApiError {
    fn from(e: diesel::result::Error) -> Self {
        ApiError(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    }
}

impl From<TriggerError> for ApiError {
    fn from(e: TriggerError) -> Self {
        let status = match &e {
            TriggerError::UnknownSite(_) => StatusCode::NOT_FOUND,
            TriggerError::AlreadyRunning(_) => StatusCode::CONFLICT,
            TriggerError::Store(_) | TriggerError::Aborted(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        ApiError(status, e.to_string())
    }
}

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "service": "newsflow-crawler" }))
}

#[derive(Debug, Deserialize)]
pub struct TriggerRequest {
    pub site_name: String,
    #[serde(default)]
    pub max_items: Option<usize>,
}

/// POST /api/crawler/crawl: run an on-demand crawl and wait for its log.
pub async fn trigger_crawl(
    State(state): State<AppState>,
    Json(request): Json<TriggerRequest>,
) -> Result<Json<crate::models::CrawlLog>, ApiError> {
    let log = state
        .scheduler
        .trigger(&request.site_name, request.max_items)
        .await?;
    Ok(Json(log))
}

#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    pub site_name: String,
    pub count: usize,
}

/// POST /api/crawler/import: one-shot bulk crawl with a large item bound.
///
/// Same path as a triggered crawl; the dedup gate keeps re-imports harmless.
pub async fn import_articles(
    State(state): State<AppState>,
    Json(request): Json<ImportRequest>,
) -> Result<Json<crate::models::CrawlLog>, ApiError> {
    let count = request.count.clamp(1, 1000);
    let log = state
        .scheduler
        .trigger(&request.site_name, Some(count))
        .await?;
    Ok(Json(log))
}

/// GET /api/crawler/active: per-source flag for runs currently in flight.
pub async fn active_crawls(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let active = state.scheduler.active_sites().await;
    let mut map = serde_json::Map::new();
    for source in state.source_repo.get_all().await? {
        let running = active.contains(&source.site_name);
        map.insert(source.site_name, running.into());
    }
    Ok(Json(serde_json::Value::Object(map)))
}

#[derive(Debug, Serialize)]
pub struct SourceView {
    pub site_name: String,
    pub base_url: String,
    pub is_active: bool,
    pub crawl_interval_secs: u64,
    pub last_crawl_at: Option<DateTime<Utc>>,
    pub next_scheduled_at: Option<DateTime<Utc>>,
}

impl From<SourceConfig> for SourceView {
    fn from(source: SourceConfig) -> Self {
        Self {
            next_scheduled_at: source.next_scheduled_at(),
            site_name: source.site_name,
            base_url: source.base_url,
            is_active: source.is_active,
            crawl_interval_secs: source.crawl_interval.as_secs(),
            last_crawl_at: source.last_crawl_at,
        }
    }
}

/// GET /api/crawler/config: all configured sources.
pub async fn list_sources(
    State(state): State<AppState>,
) -> Result<Json<Vec<SourceView>>, ApiError> {
    let sources = state.source_repo.get_all().await?;
    Ok(Json(sources.into_iter().map(SourceView::from).collect()))
}

#[derive(Debug, Deserialize)]
pub struct CreateSourceRequest {
    pub site_name: String,
    pub base_url: String,
    pub crawl_interval_secs: u64,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

/// POST /api/crawler/config: register a new source.
pub async fn create_source(
    State(state): State<AppState>,
    Json(request): Json<CreateSourceRequest>,
) -> Result<(StatusCode, Json<SourceView>), ApiError> {
    if request.crawl_interval_secs == 0 {
        return Err(ApiError(
            StatusCode::UNPROCESSABLE_ENTITY,
            "crawl_interval_secs must be positive".to_string(),
        ));
    }
    let mut source = SourceConfig::new(
        request.site_name.clone(),
        request.base_url,
        Duration::from_secs(request.crawl_interval_secs),
    );
    source.is_active = request.is_active;
    if !state.source_repo.create_if_absent(&source).await? {
        return Err(ApiError(
            StatusCode::CONFLICT,
            format!("source already exists: {}", request.site_name),
        ));
    }
    Ok((StatusCode::CREATED, Json(source.into())))
}

/// GET /api/crawler/config/:site_name
pub async fn get_source(
    State(state): State<AppState>,
    Path(site_name): Path<String>,
) -> Result<Json<SourceView>, ApiError> {
    let source = state
        .source_repo
        .get(&site_name)
        .await?
        .ok_or_else(|| ApiError(StatusCode::NOT_FOUND, format!("unknown site: {site_name}")))?;
    Ok(Json(source.into()))
}

#[derive(Debug, Deserialize)]
pub struct UpdateSourceRequest {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub crawl_interval_secs: Option<u64>,
}

/// PUT /api/crawler/config/:site_name: update a source's schedule or state.
pub async fn update_source(
    State(state): State<AppState>,
    Path(site_name): Path<String>,
    Json(request): Json<UpdateSourceRequest>,
) -> Result<Json<SourceView>, ApiError> {
    let mut source = state
        .source_repo
        .get(&site_name)
        .await?
        .ok_or_else(|| ApiError(StatusCode::NOT_FOUND, format!("unknown site: {site_name}")))?;

    if let Some(base_url) = request.base_url {
        source.base_url = base_url;
    }
    if let Some(is_active) = request.is_active {
        source.is_active = is_active;
    }
    if let Some(secs) = request.crawl_interval_secs {
        if secs == 0 {
            return Err(ApiError(
                StatusCode::UNPROCESSABLE_ENTITY,
                "crawl_interval_secs must be positive".to_string(),
            ));
        }
        source.crawl_interval = Duration::from_secs(secs);
    }
    source.updated_at = Utc::now();
    state.source_repo.save(&source).await?;
    Ok(Json(source.into()))
}

#[derive(Debug, Deserialize)]
pub struct ArticleListQuery {
    #[serde(default)]
    pub site_name: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
    /// When false, bodies are truncated to a preview.
    #[serde(default)]
    pub full_content: bool,
}

fn default_limit() -> i64 {
    50
}

const CONTENT_PREVIEW_CHARS: usize = 500;

/// GET /api/crawler/results: stored articles, newest first.
pub async fn list_articles(
    State(state): State<AppState>,
    Query(query): Query<ArticleListQuery>,
) -> Result<Json<Vec<crate::models::Article>>, ApiError> {
    let limit = query.limit.clamp(1, 500);
    let mut articles = state
        .article_repo
        .list(query.site_name.as_deref(), limit, query.offset.max(0))
        .await?;
    if !query.full_content {
        for article in &mut articles {
            if article.content.chars().count() > CONTENT_PREVIEW_CHARS {
                article.content = article.content.chars().take(CONTENT_PREVIEW_CHARS).collect();
            }
        }
    }
    Ok(Json(articles))
}

/// GET /api/crawler/article/:id
pub async fn get_article(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<crate::models::Article>, ApiError> {
    let article = state
        .article_repo
        .get(&id)
        .await?
        .ok_or_else(|| ApiError(StatusCode::NOT_FOUND, format!("unknown article: {id}")))?;
    Ok(Json(article))
}

#[derive(Debug, Deserialize)]
pub struct LogListQuery {
    #[serde(default)]
    pub site_name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

/// GET /api/crawler/logs: crawl run history, newest first.
pub async fn list_logs(
    State(state): State<AppState>,
    Query(query): Query<LogListQuery>,
) -> Result<Json<Vec<crate::models::CrawlLog>>, ApiError> {
    let status = match query.status.as_deref() {
        None => None,
        Some(s) => Some(CrawlStatus::from_str(s).ok_or_else(|| {
            ApiError(
                StatusCode::UNPROCESSABLE_ENTITY,
                format!("unknown status: {s}"),
            )
        })?),
    };
    let limit = query.limit.clamp(1, 500);
    let logs = state
        .log_repo
        .list(query.site_name.as_deref(), status, limit, query.offset.max(0))
        .await?;
    Ok(Json(logs))
}

/// GET /api/crawler/logs/:id
pub async fn get_log(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<crate::models::CrawlLog>, ApiError> {
    let log = state
        .log_repo
        .get(&id)
        .await?
        .ok_or_else(|| ApiError(StatusCode::NOT_FOUND, format!("unknown crawl log: {id}")))?;
    Ok(Json(log))
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    #[serde(default)]
    pub site_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SiteStats {
    pub site_name: String,
    pub total: u64,
    pub processed: u64,
    pub unprocessed: u64,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub total_articles: u64,
    pub processed_articles: u64,
    pub unprocessed_articles: u64,
    pub sites: Vec<SiteStats>,
}

/// GET /api/crawler/stats: article counts, overall and per site.
///
/// With `?site_name=` the totals and breakdown narrow to that site.
pub async fn stats(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<StatsResponse>, ApiError> {
    let (total_articles, processed_articles) =
        state.article_repo.stats(query.site_name.as_deref()).await?;

    let mut sites = Vec::new();
    for source in state.source_repo.get_all().await? {
        if let Some(filter) = &query.site_name {
            if filter != &source.site_name {
                continue;
            }
        }
        match state.article_repo.stats(Some(&source.site_name)).await {
            Ok((total, processed)) => sites.push(SiteStats {
                site_name: source.site_name,
                total,
                processed,
                unprocessed: total - processed,
            }),
            Err(e) => warn!(site = %source.site_name, error = %e, "per-site stats failed"),
        }
    }
    Ok(Json(StatsResponse {
        total_articles,
        processed_articles,
        unprocessed_articles: total_articles - processed_articles,
        sites,
    }))
}
