//! RSS/Atom feed adapter.
//!
//! Serves the sites that publish a machine-readable feed (CoinDesk,
//! Cryptonews, Cointelegraph). Feed parsing is kept in pure functions so the
//! item extraction can be tested without a network.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scraper::Html;
use tracing::debug;

use super::http::FetchClient;
use super::SourceAdapter;
use crate::error::FetchError;
use crate::models::ArticleDraft;

/// Adapter for sources exposing an RSS or Atom feed.
pub struct FeedAdapter {
    site_name: String,
    feed_url: String,
    client: FetchClient,
}

impl FeedAdapter {
    pub fn new(site_name: &str, feed_url: &str, client: FetchClient) -> Self {
        Self {
            site_name: site_name.to_string(),
            feed_url: feed_url.to_string(),
            client,
        }
    }
}

#[async_trait]
impl SourceAdapter for FeedAdapter {
    fn site_name(&self) -> &str {
        &self.site_name
    }

    async fn fetch(&self, max_items: usize) -> Result<Vec<ArticleDraft>, FetchError> {
        let bytes = self.client.get_bytes(&self.feed_url).await?;
        let drafts = drafts_from_feed(&self.feed_url, &bytes, max_items)?;
        debug!(site = %self.site_name, count = drafts.len(), "feed parsed");
        Ok(drafts)
    }
}

/// Parse feed bytes into drafts, newest first, capped at `max_items`.
///
/// Entries without a link or without any body text are skipped rather than
/// failing the whole feed.
pub fn drafts_from_feed(
    feed_url: &str,
    bytes: &[u8],
    max_items: usize,
) -> Result<Vec<ArticleDraft>, FetchError> {
    let feed = feed_rs::parser::parse(bytes).map_err(|e| FetchError::Format {
        url: feed_url.to_string(),
        message: e.to_string(),
    })?;

    let mut drafts: Vec<ArticleDraft> = Vec::new();
    for entry in feed.entries {
        let Some(link) = entry.links.first().map(|l| l.href.clone()) else {
            continue;
        };
        let title = entry
            .title
            .as_ref()
            .map(|t| t.content.clone())
            .unwrap_or_default();

        let body_html = entry
            .content
            .as_ref()
            .and_then(|c| c.body.clone())
            .or_else(|| entry.summary.as_ref().map(|s| s.content.clone()));
        let Some(body_html) = body_html else {
            continue;
        };
        let content = html_to_text(&body_html);
        if title.is_empty() || content.is_empty() {
            continue;
        }

        let published: Option<DateTime<Utc>> = entry.published.or(entry.updated);

        let mut draft = ArticleDraft::new(&title, &content, &link);
        draft.published_at = published;
        if let Some(author) = entry.authors.first() {
            draft
                .metadata
                .insert("author".to_string(), author.name.clone().into());
        }
        if !entry.categories.is_empty() {
            let tags: Vec<serde_json::Value> = entry
                .categories
                .iter()
                .map(|c| c.term.clone().into())
                .collect();
            draft.metadata.insert("tags".to_string(), tags.into());
        }
        drafts.push(draft);
    }

    // Newest first; undated entries sink to the end
    drafts.sort_by(|a, b| b.published_at.cmp(&a.published_at));
    drafts.truncate(max_items);
    Ok(drafts)
}

/// Strip HTML tags from feed entry bodies, keeping visible text.
fn html_to_text(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let text: Vec<&str> = fragment.root_element().text().collect();
    text.join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Sample Crypto Feed</title>
    <item>
      <title>Older news</title>
      <link>https://example.com/news/older</link>
      <description><![CDATA[<p>Older body text.</p>]]></description>
      <pubDate>Mon, 06 May 2024 08:00:00 GMT</pubDate>
    </item>
    <item>
      <title>Newest news</title>
      <link>https://example.com/news/newest</link>
      <description><![CDATA[<p>Newest <b>body</b> text.</p>]]></description>
      <pubDate>Mon, 06 May 2024 12:00:00 GMT</pubDate>
    </item>
    <item>
      <title>No link entry</title>
      <description>Body without a link.</description>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn feed_entries_sorted_newest_first() {
        let drafts =
            drafts_from_feed("https://example.com/rss", SAMPLE_RSS.as_bytes(), 20).unwrap();
        assert_eq!(drafts.len(), 2);
        assert_eq!(drafts[0].title, "Newest news");
        assert_eq!(drafts[0].content, "Newest body text.");
        assert_eq!(drafts[1].title, "Older news");
    }

    #[test]
    fn max_items_caps_the_batch() {
        let drafts =
            drafts_from_feed("https://example.com/rss", SAMPLE_RSS.as_bytes(), 1).unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].title, "Newest news");
    }

    #[test]
    fn malformed_feed_is_a_format_error() {
        let err = drafts_from_feed("https://example.com/rss", b"this is not xml", 20)
            .expect_err("should fail");
        assert!(matches!(err, FetchError::Format { .. }));
        assert!(!err.is_transient());
    }

    #[test]
    fn html_is_stripped_from_bodies() {
        assert_eq!(
            html_to_text("<p>Hello <a href=\"x\">linked</a>   world</p>"),
            "Hello linked world"
        );
    }
}
