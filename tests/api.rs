//! Control surface endpoints exercised against the in-process router.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::util::ServiceExt;

use newsflow::adapters::{AdapterFactory, SourceAdapter};
use newsflow::dispatch::{DownstreamDispatcher, NoopTranslationQueue};
use newsflow::error::FetchError;
use newsflow::executor::{CrawlExecutor, RetryPolicy};
use newsflow::models::{ArticleDraft, SourceConfig};
use newsflow::repository::{
    create_pool, migrations, ArticleRepository, CrawlLogRepository, SourceRepository,
};
use newsflow::scheduler::{Scheduler, SchedulerConfig};
use newsflow::server::{create_router, AppState};

struct FixedAdapter {
    site: String,
    drafts: Vec<ArticleDraft>,
}

#[async_trait]
impl SourceAdapter for FixedAdapter {
    fn site_name(&self) -> &str {
        &self.site
    }

    async fn fetch(&self, max_items: usize) -> Result<Vec<ArticleDraft>, FetchError> {
        let mut drafts = self.drafts.clone();
        drafts.truncate(max_items);
        Ok(drafts)
    }
}

struct FixedFactory;

impl AdapterFactory for FixedFactory {
    fn adapter_for(&self, source: &SourceConfig) -> Option<Box<dyn SourceAdapter>> {
        Some(Box::new(FixedAdapter {
            site: source.site_name.clone(),
            drafts: vec![
                ArticleDraft::new(
                    "Bitcoin climbs again",
                    "A long enough body about the market moving upward.",
                    format!("https://{}.example.com/news/bitcoin-climbs", source.site_name),
                ),
                ArticleDraft::new(
                    "Regulator speaks",
                    "A long enough body about policy and enforcement.",
                    format!("https://{}.example.com/news/regulator-speaks", source.site_name),
                ),
            ],
        }))
    }
}

struct TestApp {
    _dir: tempfile::TempDir,
    router: axum::Router,
    sources: SourceRepository,
}

async fn test_app() -> TestApp {
    let dir = tempfile::tempdir().expect("temp dir");
    let pool = create_pool(&dir.path().join("test.db")).expect("pool");
    migrations::run_migrations(&pool).await.expect("migrations");

    let sources = SourceRepository::new(pool.clone());
    let articles = ArticleRepository::new(pool.clone());
    let logs = CrawlLogRepository::new(pool);

    let dispatcher = Arc::new(DownstreamDispatcher::new(
        Arc::new(NoopTranslationQueue),
        articles.clone(),
        3,
        Duration::from_millis(1),
    ));
    let executor = Arc::new(CrawlExecutor::new(
        Arc::new(FixedFactory),
        sources.clone(),
        articles.clone(),
        logs.clone(),
        dispatcher.clone(),
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        },
        HashMap::new(),
    ));
    let scheduler = Arc::new(Scheduler::new(
        executor,
        sources.clone(),
        logs.clone(),
        dispatcher,
        SchedulerConfig::default(),
    ));

    let router = create_router(AppState {
        source_repo: sources.clone(),
        article_repo: articles,
        log_repo: logs,
        scheduler,
    });

    TestApp {
        _dir: dir,
        router,
        sources,
    }
}

async fn seed_coindesk(app: &TestApp) {
    let source = SourceConfig::new(
        "coindesk".to_string(),
        "https://coindesk.example.com".to_string(),
        Duration::from_secs(900),
    );
    app.sources.save(&source).await.unwrap();
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn health_reports_ok() {
    let app = test_app().await;
    let response = app.router.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn crawl_endpoint_runs_and_returns_the_log() {
    let app = test_app().await;
    seed_coindesk(&app).await;

    let response = app
        .router
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/crawler/crawl",
            json!({ "site_name": "coindesk" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let log = body_json(response).await;
    assert_eq!(log["status"], "completed");
    assert_eq!(log["articles_saved"], 2);

    // The saved articles are visible through the results endpoint
    let response = app
        .router
        .clone()
        .oneshot(get("/api/crawler/results?site_name=coindesk"))
        .await
        .unwrap();
    let articles = body_json(response).await;
    assert_eq!(articles.as_array().unwrap().len(), 2);

    // And the run shows up in the log history
    let response = app
        .router
        .oneshot(get("/api/crawler/logs?status=completed"))
        .await
        .unwrap();
    let logs = body_json(response).await;
    assert_eq!(logs.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn crawl_for_unknown_site_is_404() {
    let app = test_app().await;
    let response = app
        .router
        .oneshot(json_request(
            "POST",
            "/api/crawler/crawl",
            json!({ "site_name": "mystery_site" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn repeat_imports_only_skip_duplicates() {
    let app = test_app().await;
    seed_coindesk(&app).await;

    let request = json!({ "site_name": "coindesk", "count": 300 });
    let response = app
        .router
        .clone()
        .oneshot(json_request("POST", "/api/crawler/import", request.clone()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let first = body_json(response).await;
    assert_eq!(first["articles_saved"], 2);

    let response = app
        .router
        .oneshot(json_request("POST", "/api/crawler/import", request))
        .await
        .unwrap();
    let second = body_json(response).await;
    assert_eq!(second["articles_saved"], 0);
    assert_eq!(second["articles_skipped"], 2);
}

#[tokio::test]
async fn active_lists_every_source_as_idle_when_nothing_runs() {
    let app = test_app().await;
    seed_coindesk(&app).await;

    let response = app.router.oneshot(get("/api/crawler/active")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["coindesk"], false);
}

#[tokio::test]
async fn sources_can_be_created_once() {
    let app = test_app().await;

    let request = json!({
        "site_name": "crypto_news",
        "base_url": "https://cryptonews.com",
        "crawl_interval_secs": 1800
    });
    let response = app
        .router
        .clone()
        .oneshot(json_request("POST", "/api/crawler/config", request.clone()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .router
        .oneshot(json_request("POST", "/api/crawler/config", request))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn source_config_can_be_updated() {
    let app = test_app().await;
    seed_coindesk(&app).await;

    let response = app
        .router
        .clone()
        .oneshot(json_request(
            "PUT",
            "/api/crawler/config/coindesk",
            json!({ "is_active": false, "crawl_interval_secs": 1800 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["is_active"], false);
    assert_eq!(body["crawl_interval_secs"], 1800);

    let source = app.sources.get("coindesk").await.unwrap().unwrap();
    assert!(!source.is_active);
    assert_eq!(source.crawl_interval.as_secs(), 1800);
}

#[tokio::test]
async fn zero_interval_is_rejected() {
    let app = test_app().await;
    seed_coindesk(&app).await;

    let response = app
        .router
        .oneshot(json_request(
            "PUT",
            "/api/crawler/config/coindesk",
            json!({ "crawl_interval_secs": 0 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn stats_cover_overall_and_per_site_counts() {
    let app = test_app().await;
    seed_coindesk(&app).await;

    app.router
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/crawler/crawl",
            json!({ "site_name": "coindesk" }),
        ))
        .await
        .unwrap();

    let response = app.router.oneshot(get("/api/crawler/stats")).await.unwrap();
    let body = body_json(response).await;
    assert_eq!(body["total_articles"], 2);
    let sites = body["sites"].as_array().unwrap();
    assert_eq!(sites.len(), 1);
    assert_eq!(sites[0]["site_name"], "coindesk");
    assert_eq!(sites[0]["total"], 2);
}
