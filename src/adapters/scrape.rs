//! HTML listing-page scrape adapter.
//!
//! Serves sources without a usable feed (the Coinbase blog). The adapter
//! fetches a listing page, extracts article links, then fetches each article
//! and pulls the title and body out with CSS selectors. Selector evaluation
//! lives in pure functions so extraction is testable from fixture HTML.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use scraper::{Html, Selector};
use tracing::{debug, warn};
use url::Url;

use super::http::FetchClient;
use super::SourceAdapter;
use crate::error::FetchError;
use crate::models::ArticleDraft;

/// Minimum lengths below which an extraction is treated as a miss.
const MIN_TITLE_LEN: usize = 10;
const MIN_CONTENT_LEN: usize = 100;

/// How many article pages to fetch concurrently per run.
const ARTICLE_FETCH_CONCURRENCY: usize = 4;

/// CSS selectors describing where links, titles, and bodies live on a site.
#[derive(Debug, Clone)]
pub struct ScrapeRules {
    pub listing_path: String,
    pub link_selectors: Vec<String>,
    pub title_selectors: Vec<String>,
    pub content_selectors: Vec<String>,
}

/// Adapter for sources scraped from HTML listing pages.
pub struct PageScrapeAdapter {
    site_name: String,
    base_url: String,
    rules: ScrapeRules,
    client: FetchClient,
}

impl PageScrapeAdapter {
    pub fn new(site_name: &str, base_url: &str, rules: ScrapeRules, client: FetchClient) -> Self {
        Self {
            site_name: site_name.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            rules,
            client,
        }
    }

    async fn fetch_article(&self, url: String) -> Option<ArticleDraft> {
        match self.client.get_text(&url).await {
            Ok(html) => match extract_article(&html, &self.rules, &url) {
                Some(draft) => Some(draft),
                None => {
                    debug!(site = %self.site_name, url, "no extractable article content");
                    None
                }
            },
            Err(e) => {
                warn!(site = %self.site_name, url, error = %e, "article fetch failed, skipping");
                None
            }
        }
    }
}

#[async_trait]
impl SourceAdapter for PageScrapeAdapter {
    fn site_name(&self) -> &str {
        &self.site_name
    }

    async fn fetch(&self, max_items: usize) -> Result<Vec<ArticleDraft>, FetchError> {
        let listing_url = format!("{}{}", self.base_url, self.rules.listing_path);
        // A failed listing fetch fails the whole run; per-article failures do not.
        let listing_html = self.client.get_text(&listing_url).await?;
        let links = extract_links(&listing_html, &self.rules, &self.base_url);
        debug!(site = %self.site_name, links = links.len(), "listing parsed");

        let candidates: Vec<String> = links.into_iter().take(max_items).collect();
        let drafts: Vec<ArticleDraft> = stream::iter(candidates)
            .map(|url| self.fetch_article(url))
            .buffered(ARTICLE_FETCH_CONCURRENCY)
            .filter_map(|draft| async move { draft })
            .collect()
            .await;
        Ok(drafts)
    }
}

/// Extract article links from a listing page, in document order, deduplicated.
pub fn extract_links(html: &str, rules: &ScrapeRules, base_url: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let base = Url::parse(base_url).ok();

    let mut seen = std::collections::HashSet::new();
    let mut links = Vec::new();
    for selector_str in &rules.link_selectors {
        let Ok(selector) = Selector::parse(selector_str) else {
            continue;
        };
        for element in document.select(&selector) {
            let Some(href) = element.value().attr("href") else {
                continue;
            };
            let absolute = match &base {
                Some(base) => match base.join(href) {
                    Ok(url) => url.to_string(),
                    Err(_) => continue,
                },
                None => href.to_string(),
            };
            if seen.insert(absolute.clone()) {
                links.push(absolute);
            }
        }
    }
    links
}

/// Extract title and body from an article page.
///
/// Selectors are tried in order; the first match long enough to be a real
/// title or body wins. Returns `None` when either is missing.
pub fn extract_article(html: &str, rules: &ScrapeRules, url: &str) -> Option<ArticleDraft> {
    let document = Html::parse_document(html);

    let title = first_text_match(&document, &rules.title_selectors, MIN_TITLE_LEN)?;
    let content = first_text_match(&document, &rules.content_selectors, MIN_CONTENT_LEN)?;

    Some(ArticleDraft::new(&title, &content, url))
}

fn first_text_match(document: &Html, selectors: &[String], min_len: usize) -> Option<String> {
    for selector_str in selectors {
        let Ok(selector) = Selector::parse(selector_str) else {
            continue;
        };
        if let Some(element) = document.select(&selector).next() {
            let text = element
                .text()
                .collect::<Vec<_>>()
                .join(" ")
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ");
            if text.len() >= min_len {
                return Some(text);
            }
        }
    }
    None
}
