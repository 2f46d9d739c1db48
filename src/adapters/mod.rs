//! Source adapters: one per crawled site, behind a common trait.

pub mod feed;
pub mod http;
pub mod scrape;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::FetchError;
use crate::models::{ArticleDraft, SourceConfig};

pub use feed::FeedAdapter;
pub use http::FetchClient;
pub use scrape::{PageScrapeAdapter, ScrapeRules};

/// A crawlable site. Implementations fetch raw article drafts; normalization
/// and persistence happen upstream.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn site_name(&self) -> &str;

    /// Fetch up to `max_items` drafts, newest first where the source allows.
    async fn fetch(&self, max_items: usize) -> Result<Vec<ArticleDraft>, FetchError>;
}

/// Builds the adapter for a configured source, if one is registered.
pub trait AdapterFactory: Send + Sync {
    fn adapter_for(&self, source: &SourceConfig) -> Option<Box<dyn SourceAdapter>>;
}

/// The built-in site registry.
///
/// The set of supported sites is closed: a source row whose `site_name` is
/// not listed here gets no adapter and its runs fail with a clear error.
pub struct SiteRegistry {
    timeout: Duration,
    request_delay: Duration,
    user_agent: Option<String>,
}

impl SiteRegistry {
    pub fn new(timeout: Duration, request_delay: Duration, user_agent: Option<String>) -> Self {
        Self {
            timeout,
            request_delay,
            user_agent,
        }
    }

    fn client(&self) -> FetchClient {
        FetchClient::with_user_agent(self.timeout, self.request_delay, self.user_agent.as_deref())
    }

    /// Site names this registry can build adapters for.
    pub fn supported_sites() -> &'static [&'static str] {
        &["coindesk", "coinbase", "crypto_news", "cointelegraph"]
    }
}

impl AdapterFactory for SiteRegistry {
    fn adapter_for(&self, source: &SourceConfig) -> Option<Box<dyn SourceAdapter>> {
        let base = source.base_url.trim_end_matches('/');
        match source.site_name.as_str() {
            "coindesk" => Some(Box::new(FeedAdapter::new(
                "coindesk",
                &format!("{base}/arc/outboundfeeds/rss/"),
                self.client(),
            ))),
            "crypto_news" => Some(Box::new(FeedAdapter::new(
                "crypto_news",
                &format!("{base}/feed/"),
                self.client(),
            ))),
            "cointelegraph" => Some(Box::new(FeedAdapter::new(
                "cointelegraph",
                &format!("{base}/rss"),
                self.client(),
            ))),
            "coinbase" => Some(Box::new(PageScrapeAdapter::new(
                "coinbase",
                base,
                ScrapeRules {
                    listing_path: "/latest".to_string(),
                    link_selectors: vec![
                        "article a".to_string(),
                        "a.post-link".to_string(),
                        "a[href*=\"/post/\"]".to_string(),
                    ],
                    title_selectors: vec![
                        "h1".to_string(),
                        "article h2".to_string(),
                        ".post-title".to_string(),
                    ],
                    content_selectors: vec![
                        "article".to_string(),
                        ".post-content".to_string(),
                        ".article-body".to_string(),
                        "main".to_string(),
                    ],
                },
                self.client(),
            ))),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> SiteRegistry {
        SiteRegistry::new(Duration::from_secs(30), Duration::from_millis(0), None)
    }

    #[test]
    fn registry_builds_adapters_for_supported_sites() {
        let registry = registry();
        for site in SiteRegistry::supported_sites() {
            let source = SourceConfig::new(
                site.to_string(),
                "https://example.com".to_string(),
                Duration::from_secs(900),
            );
            let adapter = registry.adapter_for(&source);
            assert!(adapter.is_some(), "no adapter for {site}");
            assert_eq!(adapter.unwrap().site_name(), *site);
        }
    }

    #[test]
    fn unknown_site_gets_no_adapter() {
        let registry = registry();
        let source = SourceConfig::new(
            "unknown_site".to_string(),
            "https://example.com".to_string(),
            Duration::from_secs(900),
        );
        assert!(registry.adapter_for(&source).is_none());
    }
}
