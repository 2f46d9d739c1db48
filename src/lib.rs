//! NewsFlow: a crawl orchestration and scheduling engine for crypto news.
//!
//! The crate crawls a closed set of news sites on per-source intervals,
//! normalizes and deduplicates what it finds, keeps an append-only log of
//! every run, and hands newly saved articles to a downstream translation
//! queue. A small HTTP control surface exposes triggering, source
//! management, results, and run history.

pub mod adapters;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod executor;
pub mod models;
pub mod normalize;
pub mod repository;
pub mod scheduler;
pub mod schema;
pub mod server;
