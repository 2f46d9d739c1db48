use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{fmt as tfmt, EnvFilter};

use newsflow::adapters::SiteRegistry;
use newsflow::config::{self, Settings};
use newsflow::dispatch::{
    DownstreamDispatcher, HttpTranslationQueue, NoopTranslationQueue, TranslationQueue,
};
use newsflow::executor::{CrawlExecutor, RetryPolicy};
use newsflow::repository::{
    create_pool, migrations, ArticleRepository, CrawlLogRepository, SourceRepository,
};
use newsflow::scheduler::{Scheduler, SchedulerConfig};
use newsflow::server::{self, AppState};

#[derive(Parser)]
#[command(name = "newsflow", version, about = "Crypto news crawl orchestration engine")]
struct Cli {
    /// Path to a TOML config file.
    #[arg(long, global = true, env = "NEWSFLOW_CONFIG")]
    config: Option<PathBuf>,

    /// Override the data directory.
    #[arg(long, global = true, env = "NEWSFLOW_DATA_DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduler and the HTTP control server.
    Serve {
        /// Bind host override.
        #[arg(long)]
        host: Option<String>,
        /// Bind port override.
        #[arg(long)]
        port: Option<u16>,
    },
    /// Run one crawl for a site and print its log.
    Crawl {
        /// Site to crawl.
        site_name: String,
        /// Maximum articles to fetch.
        #[arg(long)]
        max_items: Option<usize>,
    },
    /// One-shot bulk crawl with a large item bound.
    Import {
        /// Site to import from.
        site_name: String,
        /// Number of articles to fetch.
        #[arg(long, default_value_t = 300)]
        count: usize,
    },
    /// Manage source configurations.
    Sources {
        #[command(subcommand)]
        command: SourcesCommand,
    },
    /// Show recent crawl logs.
    Logs {
        /// Filter by site.
        #[arg(long)]
        site: Option<String>,
        /// Filter by status (running, completed, failed).
        #[arg(long)]
        status: Option<String>,
        /// Number of logs to show.
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
}

#[derive(Subcommand)]
enum SourcesCommand {
    /// List configured sources.
    List,
    /// Seed the default sources, skipping ones that already exist.
    Init,
    /// Enable a source.
    Enable { site_name: String },
    /// Disable a source.
    Disable { site_name: String },
}

struct App {
    settings: Settings,
    sources: SourceRepository,
    articles: ArticleRepository,
    logs: CrawlLogRepository,
    scheduler: Arc<Scheduler>,
}

impl App {
    async fn bootstrap(settings: Settings) -> anyhow::Result<Self> {
        settings
            .ensure_directories()
            .context("creating data directory")?;
        let pool = create_pool(&settings.database_path()).context("opening database")?;
        migrations::run_migrations(&pool)
            .await
            .context("running migrations")?;

        let sources = SourceRepository::new(pool.clone());
        let articles = ArticleRepository::new(pool.clone());
        let logs = CrawlLogRepository::new(pool);

        let registry = Arc::new(SiteRegistry::new(
            settings.request_timeout(),
            settings.request_delay(),
            Some(settings.user_agent.clone()),
        ));

        let queue: Arc<dyn TranslationQueue> = match &settings.translator_endpoint {
            Some(endpoint) => {
                Arc::new(HttpTranslationQueue::new(endpoint, settings.request_timeout()))
            }
            None => Arc::new(NoopTranslationQueue),
        };
        let dispatcher = Arc::new(DownstreamDispatcher::new(
            queue,
            articles.clone(),
            3,
            Duration::from_secs(1),
        ));

        let retry = RetryPolicy {
            max_attempts: settings.fetch_retry_attempts,
            base_delay: Duration::from_millis(settings.fetch_retry_delay_ms),
            max_delay: Duration::from_secs(30),
        };
        let executor = Arc::new(CrawlExecutor::new(
            registry,
            sources.clone(),
            articles.clone(),
            logs.clone(),
            dispatcher.clone(),
            retry,
            settings.deny_lists.clone(),
        ));

        let scheduler_config = SchedulerConfig {
            tick_interval: Duration::from_secs(settings.tick_interval_secs),
            max_concurrent: settings.max_concurrent_crawls,
            default_max_items: settings.scheduled_max_items,
            stale_running_after: Duration::from_secs(settings.stale_running_minutes * 60),
            ..SchedulerConfig::default()
        };
        let scheduler = Arc::new(Scheduler::new(
            executor,
            sources.clone(),
            logs.clone(),
            dispatcher,
            scheduler_config,
        ));

        Ok(Self {
            settings,
            sources,
            articles,
            logs,
            scheduler,
        })
    }

    async fn seed_sources(&self) -> anyhow::Result<usize> {
        let mut created = 0;
        for source in config::default_sources() {
            if self.sources.create_if_absent(&source).await? {
                info!(site = %source.site_name, "seeded source");
                created += 1;
            }
        }
        Ok(created)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .init();

    let cli = Cli::parse();
    let mut settings = config::load_settings(cli.config.as_deref());
    if let Some(data_dir) = cli.data_dir {
        settings.data_dir = data_dir;
    }

    match cli.command {
        Command::Serve { host, port } => {
            let app = App::bootstrap(settings).await?;
            app.seed_sources().await?;

            let host = host.unwrap_or_else(|| app.settings.server_host.clone());
            let port = port.unwrap_or(app.settings.server_port);

            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            let scheduler_handle = tokio::spawn(app.scheduler.clone().run(shutdown_rx));

            let state = AppState {
                source_repo: app.sources.clone(),
                article_repo: app.articles.clone(),
                log_repo: app.logs.clone(),
                scheduler: app.scheduler.clone(),
            };

            tokio::select! {
                result = server::serve(state, &host, port) => {
                    result?;
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("shutdown signal received");
                }
            }

            let _ = shutdown_tx.send(true);
            let _ = scheduler_handle.await;
        }
        Command::Crawl { site_name, max_items } => {
            let app = App::bootstrap(settings).await?;
            app.seed_sources().await?;
            let log = app.scheduler.trigger(&site_name, max_items).await?;
            println!("{}", serde_json::to_string_pretty(&log)?);
        }
        Command::Import { site_name, count } => {
            let app = App::bootstrap(settings).await?;
            app.seed_sources().await?;
            let log = app
                .scheduler
                .trigger(&site_name, Some(count.clamp(1, 1000)))
                .await?;
            println!(
                "imported {} articles from {} ({} skipped as duplicates)",
                log.articles_saved, site_name, log.articles_skipped
            );
        }
        Command::Sources { command } => {
            let app = App::bootstrap(settings).await?;
            match command {
                SourcesCommand::List => {
                    for source in app.sources.get_all().await? {
                        let state = if source.is_active { "active" } else { "disabled" };
                        let last = source
                            .last_crawl_at
                            .map(|t| t.to_rfc3339())
                            .unwrap_or_else(|| "never".to_string());
                        println!(
                            "{:<16} {:<9} every {:>5}s  last: {}",
                            source.site_name,
                            state,
                            source.crawl_interval.as_secs(),
                            last
                        );
                    }
                }
                SourcesCommand::Init => {
                    let created = app.seed_sources().await?;
                    println!("seeded {created} sources");
                }
                SourcesCommand::Enable { site_name } => {
                    if app.sources.set_active(&site_name, true).await? {
                        println!("enabled {site_name}");
                    } else {
                        warn!(site = %site_name, "unknown site");
                    }
                }
                SourcesCommand::Disable { site_name } => {
                    if app.sources.set_active(&site_name, false).await? {
                        println!("disabled {site_name}");
                    } else {
                        warn!(site = %site_name, "unknown site");
                    }
                }
            }
        }
        Command::Logs { site, status, limit } => {
            let app = App::bootstrap(settings).await?;
            let status = match status.as_deref() {
                None => None,
                Some(s) => Some(
                    newsflow::models::CrawlStatus::from_str(s)
                        .ok_or_else(|| anyhow::anyhow!("unknown status: {s}"))?,
                ),
            };
            let logs = app
                .logs
                .list(site.as_deref(), status, limit.clamp(1, 500), 0)
                .await?;
            for log in logs {
                println!(
                    "{} {:<16} {:<9} found={} saved={} skipped={} {}",
                    log.start_time.to_rfc3339(),
                    log.site_name,
                    log.status.as_str(),
                    log.articles_found,
                    log.articles_saved,
                    log.articles_skipped,
                    log.error_message.unwrap_or_default()
                );
            }
        }
    }

    Ok(())
}
