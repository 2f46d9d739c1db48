//! HTTP control surface for the crawler.
//!
//! Exposes crawl triggering, source management, stored results, and run
//! history. The scheduler keeps running regardless of whether anyone calls
//! these endpoints.

mod handlers;
mod routes;

pub use routes::create_router;

use std::net::SocketAddr;
use std::sync::Arc;

use crate::repository::{ArticleRepository, CrawlLogRepository, SourceRepository};
use crate::scheduler::Scheduler;

/// Shared state for the control server.
#[derive(Clone)]
pub struct AppState {
    pub source_repo: SourceRepository,
    pub article_repo: ArticleRepository,
    pub log_repo: CrawlLogRepository,
    pub scheduler: Arc<Scheduler>,
}

/// Start the control server.
pub async fn serve(state: AppState, host: &str, port: u16) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    tracing::info!("Starting control server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
