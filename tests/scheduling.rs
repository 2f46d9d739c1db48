//! Scheduler behavior: due-ness, exclusion, the concurrency budget, and
//! stale run reconciliation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use tokio::sync::watch;

use newsflow::adapters::{AdapterFactory, SourceAdapter};
use newsflow::dispatch::{DownstreamDispatcher, NoopTranslationQueue, TranslationQueue};
use newsflow::error::{DispatchError, FetchError, TriggerError};
use newsflow::executor::{CrawlExecutor, RetryPolicy};
use newsflow::models::{ArticleDraft, CrawlLog, CrawlStatus, SourceConfig};
use newsflow::normalize::normalize_draft;
use newsflow::repository::{
    create_pool, migrations, ArticleRepository, CrawlLogRepository, SourceRepository,
};
use newsflow::scheduler::{Scheduler, SchedulerConfig};

/// Adapter that sleeps, so runs can be observed overlapping.
struct SlowAdapter {
    site: String,
    delay: Duration,
    calls: Arc<AtomicU32>,
}

#[async_trait]
impl SourceAdapter for SlowAdapter {
    fn site_name(&self) -> &str {
        &self.site
    }

    async fn fetch(&self, _max_items: usize) -> Result<Vec<ArticleDraft>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(vec![])
    }
}

struct SlowFactory {
    delay: Duration,
    calls: Arc<AtomicU32>,
}

impl AdapterFactory for SlowFactory {
    fn adapter_for(&self, source: &SourceConfig) -> Option<Box<dyn SourceAdapter>> {
        Some(Box::new(SlowAdapter {
            site: source.site_name.clone(),
            delay: self.delay,
            calls: self.calls.clone(),
        }))
    }
}

struct Harness {
    _dir: tempfile::TempDir,
    sources: SourceRepository,
    logs: CrawlLogRepository,
    scheduler: Arc<Scheduler>,
    calls: Arc<AtomicU32>,
}

async fn harness(delay: Duration, config: SchedulerConfig) -> Harness {
    let dir = tempfile::tempdir().expect("temp dir");
    let pool = create_pool(&dir.path().join("test.db")).expect("pool");
    migrations::run_migrations(&pool).await.expect("migrations");

    let sources = SourceRepository::new(pool.clone());
    let articles = ArticleRepository::new(pool.clone());
    let logs = CrawlLogRepository::new(pool);

    let calls = Arc::new(AtomicU32::new(0));
    let factory = SlowFactory {
        delay,
        calls: calls.clone(),
    };
    let dispatcher = Arc::new(DownstreamDispatcher::new(
        Arc::new(NoopTranslationQueue),
        articles.clone(),
        3,
        Duration::from_millis(1),
    ));
    let executor = Arc::new(CrawlExecutor::new(
        Arc::new(factory),
        sources.clone(),
        articles,
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
        config,
    ));

    Harness {
        _dir: dir,
        sources,
        logs,
        scheduler,
        calls,
    }
}

fn source(site: &str, interval: Duration) -> SourceConfig {
    SourceConfig::new(
        site.to_string(),
        format!("https://{site}.example.com"),
        interval,
    )
}

#[tokio::test]
async fn tick_runs_due_sources_and_skips_fresh_ones() {
    let h = harness(Duration::from_millis(10), SchedulerConfig::default()).await;

    // Due: never crawled
    h.sources
        .save(&source("coindesk", Duration::from_secs(900)))
        .await
        .unwrap();
    // Not due: crawled just now
    let mut fresh = source("coinbase", Duration::from_secs(900));
    fresh.last_crawl_at = Some(Utc::now());
    h.sources.save(&fresh).await.unwrap();
    // Inactive sources never run
    let mut disabled = source("cointelegraph", Duration::from_secs(900));
    disabled.is_active = false;
    h.sources.save(&disabled).await.unwrap();

    h.scheduler.tick_once().await.unwrap();
    // Wait for the spawned run to finish
    for _ in 0..100 {
        if h.scheduler.active_sites().await.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(h.calls.load(Ordering::SeqCst), 1);
    let stamped = h.sources.get("coindesk").await.unwrap().unwrap();
    assert!(stamped.last_crawl_at.is_some());
}

#[tokio::test]
async fn budget_defers_sources_past_the_concurrency_cap() {
    let config = SchedulerConfig {
        max_concurrent: 1,
        ..SchedulerConfig::default()
    };
    let h = harness(Duration::from_millis(200), config).await;

    h.sources
        .save(&source("coindesk", Duration::from_secs(900)))
        .await
        .unwrap();
    h.sources
        .save(&source("coinbase", Duration::from_secs(900)))
        .await
        .unwrap();

    h.scheduler.tick_once().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Only one run started; the other stays due for a later tick
    assert_eq!(h.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.scheduler.active_sites().await.len(), 1);
}

#[tokio::test]
async fn concurrent_triggers_for_one_site_do_not_overlap() {
    let h = harness(Duration::from_millis(200), SchedulerConfig::default()).await;
    h.sources
        .save(&source("coindesk", Duration::from_secs(900)))
        .await
        .unwrap();

    let first = {
        let scheduler = h.scheduler.clone();
        tokio::spawn(async move { scheduler.trigger("coindesk", None).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    let second = h.scheduler.trigger("coindesk", None).await;

    assert!(matches!(second, Err(TriggerError::AlreadyRunning(_))));
    let log: CrawlLog = first.await.unwrap().unwrap();
    assert_eq!(log.status, CrawlStatus::Completed);
    assert_eq!(h.calls.load(Ordering::SeqCst), 1);

    // Once the first run finishes the site can be triggered again
    let third = h.scheduler.trigger("coindesk", None).await.unwrap();
    assert_eq!(third.status, CrawlStatus::Completed);
}

#[tokio::test]
async fn trigger_for_unknown_site_is_rejected() {
    let h = harness(Duration::from_millis(1), SchedulerConfig::default()).await;
    let result = h.scheduler.trigger("mystery_site", None).await;
    assert!(matches!(result, Err(TriggerError::UnknownSite(_))));
}

struct CountingQueue {
    calls: Arc<AtomicU32>,
}

#[async_trait]
impl TranslationQueue for CountingQueue {
    async fn enqueue(&self, _article_id: &str) -> Result<(), DispatchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn run_loop_reenqueues_committed_but_undispatched_articles() {
    let dir = tempfile::tempdir().expect("temp dir");
    let pool = create_pool(&dir.path().join("test.db")).expect("pool");
    migrations::run_migrations(&pool).await.expect("migrations");

    let sources = SourceRepository::new(pool.clone());
    let articles = ArticleRepository::new(pool.clone());
    let logs = CrawlLogRepository::new(pool);

    // Committed by an earlier process, never handed to the queue
    let draft = ArticleDraft::new(
        "Orphaned headline",
        "Body text that was saved but never enqueued.",
        "https://coindesk.example.com/news/orphan",
    );
    let article = normalize_draft(draft, &[]).into_article("coindesk");
    articles.insert_if_new(&article).await.unwrap();

    let enqueued = Arc::new(AtomicU32::new(0));
    let dispatcher = Arc::new(DownstreamDispatcher::new(
        Arc::new(CountingQueue {
            calls: enqueued.clone(),
        }),
        articles.clone(),
        3,
        Duration::from_millis(1),
    ));
    let executor = Arc::new(CrawlExecutor::new(
        Arc::new(SlowFactory {
            delay: Duration::from_millis(1),
            calls: Arc::new(AtomicU32::new(0)),
        }),
        sources.clone(),
        articles,
        logs.clone(),
        dispatcher.clone(),
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        },
        HashMap::new(),
    ));
    let config = SchedulerConfig {
        dispatch_sweep_interval: Duration::from_millis(10),
        ..SchedulerConfig::default()
    };
    let scheduler = Arc::new(Scheduler::new(executor, sources, logs, dispatcher, config));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(scheduler.run(shutdown_rx));
    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown_tx.send(true).unwrap();
    handle.await.unwrap();

    assert!(enqueued.load(Ordering::SeqCst) >= 1);
}

#[tokio::test]
async fn startup_reconciles_logs_abandoned_by_a_crash() {
    let config = SchedulerConfig {
        stale_running_after: Duration::from_secs(0),
        ..SchedulerConfig::default()
    };
    let h = harness(Duration::from_millis(1), config).await;

    // Simulate a run left behind by a crashed process
    let orphan = CrawlLog::start("coindesk");
    h.logs.insert(&orphan).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let reconciled = h.scheduler.reconcile_stale_runs().await.unwrap();
    assert_eq!(reconciled, 1);

    let stored = h.logs.get(&orphan.id).await.unwrap().unwrap();
    assert_eq!(stored.status, CrawlStatus::Failed);
    assert!(stored
        .error_message
        .as_deref()
        .unwrap_or("")
        .contains("interrupted"));
    assert!(h.logs.running().await.unwrap().is_empty());
}
