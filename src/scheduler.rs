//! Interval-based crawl scheduling.
//!
//! A single tick loop polls source schedules, spawns runs subject to a
//! per-site exclusion guard and a global concurrency budget, and reconciles
//! crawl logs left `running` by an earlier process crash. On-demand triggers
//! go through the same exclusion guard but bypass due-ness and the budget.
//! A slower second ticker sweeps articles the translation consumer has not
//! picked up and re-enqueues them.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{watch, Mutex, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, warn};

use crate::dispatch::DownstreamDispatcher;
use crate::error::TriggerError;
use crate::executor::CrawlExecutor;
use crate::models::CrawlLog;
use crate::repository::{CrawlLogRepository, SourceRepository};

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// How often source schedules are polled.
    pub tick_interval: Duration,
    /// Global cap on concurrently running scheduled crawls.
    pub max_concurrent: usize,
    /// Batch size handed to adapters on scheduled runs.
    pub default_max_items: usize,
    /// Age past which a `running` log is treated as interrupted at startup.
    pub stale_running_after: Duration,
    /// How often committed-but-undispatched articles are re-enqueued.
    pub dispatch_sweep_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(5),
            max_concurrent: 4,
            default_max_items: 20,
            stale_running_after: Duration::from_secs(600),
            dispatch_sweep_interval: Duration::from_secs(60),
        }
    }
}

/// Drives scheduled and on-demand crawl runs.
pub struct Scheduler {
    executor: Arc<CrawlExecutor>,
    sources: SourceRepository,
    logs: CrawlLogRepository,
    dispatcher: Arc<DownstreamDispatcher>,
    config: SchedulerConfig,
    in_flight: Arc<Mutex<HashSet<String>>>,
    budget: Arc<Semaphore>,
}

impl Scheduler {
    pub fn new(
        executor: Arc<CrawlExecutor>,
        sources: SourceRepository,
        logs: CrawlLogRepository,
        dispatcher: Arc<DownstreamDispatcher>,
        config: SchedulerConfig,
    ) -> Self {
        let budget = Arc::new(Semaphore::new(config.max_concurrent));
        Self {
            executor,
            sources,
            logs,
            dispatcher,
            config,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            budget,
        }
    }

    /// Run the tick loop until `shutdown` flips to true.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        if let Err(e) = self.reconcile_stale_runs().await {
            error!(error = %e, "stale run reconciliation failed");
        }

        let mut ticker = tokio::time::interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut sweeper = tokio::time::interval(self.config.dispatch_sweep_interval);
        sweeper.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(
            tick_secs = self.config.tick_interval.as_secs(),
            max_concurrent = self.config.max_concurrent,
            "scheduler started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.tick_once().await {
                        error!(error = %e, "scheduler tick failed");
                    }
                }
                _ = sweeper.tick() => {
                    self.dispatcher.dispatch_unprocessed().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("scheduler shutting down");
                        return;
                    }
                }
            }
        }
    }

    /// One scheduling pass: spawn a run for every active, due, idle source
    /// that fits the concurrency budget.
    pub async fn tick_once(&self) -> Result<(), diesel::result::Error> {
        let now = Utc::now();
        let due: Vec<_> = self
            .sources
            .get_active()
            .await?
            .into_iter()
            .filter(|source| source.is_due(now))
            .collect();

        for source in due {
            let site = source.site_name.clone();

            {
                let mut in_flight = self.in_flight.lock().await;
                if !in_flight.insert(site.clone()) {
                    debug!(site, "run already in flight, skipping");
                    continue;
                }
            }

            let Ok(permit) = self.budget.clone().try_acquire_owned() else {
                // Budget exhausted; the source stays due and a later tick
                // picks it up.
                debug!(site, "concurrency budget exhausted, deferring");
                self.in_flight.lock().await.remove(&site);
                continue;
            };

            self.spawn_run(source, permit);
        }
        Ok(())
    }

    fn spawn_run(&self, source: crate::models::SourceConfig, permit: OwnedSemaphorePermit) {
        let executor = self.executor.clone();
        let in_flight = self.in_flight.clone();
        let max_items = self.config.default_max_items;
        tokio::spawn(async move {
            let site = source.site_name.clone();
            let log = executor.run(&source, max_items).await;
            debug!(site, run_id = %log.id, status = log.status.as_str(), "run finished");
            in_flight.lock().await.remove(&site);
            drop(permit);
        });
    }

    /// Start an on-demand crawl for `site_name` and wait for its log.
    ///
    /// Ignores the source's schedule and the global budget, but still
    /// refuses to overlap a run already in flight for the same site.
    pub async fn trigger(
        &self,
        site_name: &str,
        max_items: Option<usize>,
    ) -> Result<CrawlLog, TriggerError> {
        let source = self
            .sources
            .get(site_name)
            .await?
            .ok_or_else(|| TriggerError::UnknownSite(site_name.to_string()))?;

        {
            let mut in_flight = self.in_flight.lock().await;
            if !in_flight.insert(site_name.to_string()) {
                return Err(TriggerError::AlreadyRunning(site_name.to_string()));
            }
        }

        let max_items = max_items.unwrap_or(self.config.default_max_items);
        let executor = self.executor.clone();
        let in_flight = self.in_flight.clone();
        let site = site_name.to_string();
        // Run in a task so the guard is released even if the caller goes away
        let handle = tokio::spawn(async move {
            let log = executor.run(&source, max_items).await;
            in_flight.lock().await.remove(&site);
            log
        });
        handle
            .await
            .map_err(|_| TriggerError::Aborted(site_name.to_string()))
    }

    /// Sites with a run currently in flight.
    pub async fn active_sites(&self) -> Vec<String> {
        let in_flight = self.in_flight.lock().await;
        let mut sites: Vec<String> = in_flight.iter().cloned().collect();
        sites.sort();
        sites
    }

    /// Close out `running` logs abandoned by a previous process.
    pub async fn reconcile_stale_runs(&self) -> Result<usize, diesel::result::Error> {
        let cutoff = Utc::now()
            - chrono::Duration::seconds(self.config.stale_running_after.as_secs() as i64);
        let reconciled = self.logs.reconcile_stale_running(cutoff).await?;
        if reconciled > 0 {
            warn!(reconciled, "closed stale running crawl logs from a previous process");
        }
        Ok(reconciled)
    }
}
