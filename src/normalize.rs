//! Content normalization and URL fingerprinting.
//!
//! Pure functions applied to every draft before the dedup check: boilerplate
//! stripping, whitespace collapsing, URL canonicalization, and the stable
//! `url_hash` that serves as the dedup key.

use chrono::{DateTime, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use url::Url;

use crate::models::{Article, ArticleDraft};

/// Query parameters that vary per click but never identify an article.
const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "ref",
    "fbclid",
    "gclid",
    "mc_cid",
    "mc_eid",
];

static DATE_PATH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/((?:19|20)\d{2})/(\d{1,2})/(\d{1,2})(?:/|$)").expect("valid date path regex")
});

/// A draft after normalization, carrying its dedup fingerprint.
#[derive(Debug, Clone)]
pub struct NormalizedDraft {
    pub draft: ArticleDraft,
    pub canonical_url: String,
    pub url_hash: String,
}

/// Canonicalize an article URL so cosmetic variants collide.
///
/// Drops the fragment, tracking query parameters, and the path's trailing
/// slash. Idempotent: `canonicalize_url(canonicalize_url(u)) == canonicalize_url(u)`.
pub fn canonicalize_url(raw: &str) -> String {
    let mut canonical = match Url::parse(raw.trim()) {
        Ok(mut url) => {
            url.set_fragment(None);
            // Strip the path's trailing slash here, not just at string end,
            // so it cannot hide behind a surviving query string.
            if url.path().len() > 1 && url.path().ends_with('/') {
                let trimmed = url.path().trim_end_matches('/').to_string();
                url.set_path(&trimmed);
            }
            let kept: Vec<(String, String)> = url
                .query_pairs()
                .filter(|(key, _)| !TRACKING_PARAMS.contains(&key.as_ref()))
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();
            if kept.is_empty() {
                url.set_query(None);
            } else {
                let mut serializer = url::form_urlencoded::Serializer::new(String::new());
                for (k, v) in &kept {
                    serializer.append_pair(k, v);
                }
                url.set_query(Some(&serializer.finish()));
            }
            url.to_string()
        }
        Err(_) => raw.trim().to_string(),
    };
    while canonical.ends_with('/') {
        canonical.pop();
    }
    canonical
}

/// Stable dedup fingerprint: SHA-256 of the canonical URL, hex-encoded.
pub fn url_hash(source_url: &str) -> String {
    let canonical = canonicalize_url(source_url);
    hex::encode(Sha256::digest(canonical.as_bytes()))
}

/// Derive a publication date from `/YYYY/MM/DD/` path segments.
///
/// Returns `None` when the path carries no plausible date; a date is never
/// fabricated.
pub fn published_at_from_url(source_url: &str) -> Option<DateTime<Utc>> {
    let caps = DATE_PATH_RE.captures(source_url)?;
    let year: i32 = caps.get(1)?.as_str().parse().ok()?;
    let month: u32 = caps.get(2)?.as_str().parse().ok()?;
    let day: u32 = caps.get(3)?.as_str().parse().ok()?;
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    Some(DateTime::from_naive_utc_and_offset(date.and_hms_opt(0, 0, 0)?, Utc))
}

/// Collapse runs of spaces and blank lines while preserving paragraph breaks.
pub fn collapse_whitespace(text: &str) -> String {
    let mut paragraphs: Vec<String> = Vec::new();
    for paragraph in text.split("\n\n") {
        let cleaned = paragraph
            .lines()
            .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        if !cleaned.is_empty() {
            paragraphs.push(cleaned);
        }
    }
    paragraphs.join("\n\n")
}

/// Drop paragraphs matching any deny-list substring (case-insensitive).
///
/// Deny lists carry per-source boilerplate such as legal disclosure blocks
/// and newsletter prompts.
pub fn strip_boilerplate(text: &str, deny_list: &[String]) -> String {
    if deny_list.is_empty() {
        return text.to_string();
    }
    let lowered: Vec<String> = deny_list.iter().map(|s| s.to_lowercase()).collect();
    text.split("\n\n")
        .filter(|paragraph| {
            let lower = paragraph.to_lowercase();
            !lowered.iter().any(|needle| lower.contains(needle))
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

impl NormalizedDraft {
    /// Promote the draft to a persistable article with a fresh id.
    ///
    /// The publication date, when known, rides along in metadata; the
    /// canonical URL becomes the stored `source_url`.
    pub fn into_article(self, source_site: &str) -> Article {
        let mut metadata = self.draft.metadata;
        if let Some(published) = self.draft.published_at {
            metadata.insert("published_at".to_string(), published.to_rfc3339().into());
        }
        Article {
            id: uuid::Uuid::new_v4().to_string(),
            url_hash: self.url_hash,
            title: self.draft.title,
            content: self.draft.content,
            source_site: source_site.to_string(),
            source_url: self.canonical_url,
            metadata: serde_json::Value::Object(metadata),
            crawl_timestamp: Utc::now(),
            is_processed: false,
        }
    }
}

/// Normalize one draft: clean content, fingerprint the URL, and backfill a
/// missing publication date from the URL path when possible.
pub fn normalize_draft(mut draft: ArticleDraft, deny_list: &[String]) -> NormalizedDraft {
    draft.content = collapse_whitespace(&strip_boilerplate(&draft.content, deny_list));
    draft.title = collapse_whitespace(&draft.title);
    if draft.published_at.is_none() {
        draft.published_at = published_at_from_url(&draft.source_url);
    }
    let canonical_url = canonicalize_url(&draft.source_url);
    let url_hash = hex::encode(Sha256::digest(canonical_url.as_bytes()));
    NormalizedDraft {
        draft,
        canonical_url,
        url_hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalize_is_idempotent() {
        let urls = [
            "https://www.coindesk.com/markets/2024/05/06/bitcoin-rises/?utm_source=rss&utm_medium=feed",
            "https://cryptonews.com/news/some-article/",
            "https://example.com/a?b=1&utm_campaign=x#section",
            "https://example.com/a/?id=1",
            "not a url at all/",
        ];
        for url in urls {
            let once = canonicalize_url(url);
            let twice = canonicalize_url(&once);
            assert_eq!(once, twice, "not idempotent for {url}");
        }
    }

    #[test]
    fn tracking_params_do_not_change_the_hash() {
        let plain = "https://www.coindesk.com/markets/2024/05/06/bitcoin-rises";
        let tracked =
            "https://www.coindesk.com/markets/2024/05/06/bitcoin-rises/?utm_source=rss&fbclid=abc123";
        assert_eq!(url_hash(plain), url_hash(tracked));
    }

    #[test]
    fn meaningful_query_params_are_kept() {
        let a = "https://example.com/article?id=1";
        let b = "https://example.com/article?id=2";
        assert_ne!(url_hash(a), url_hash(b));
    }

    #[test]
    fn trailing_slash_is_ignored() {
        assert_eq!(
            url_hash("https://cryptonews.com/news/some-article/"),
            url_hash("https://cryptonews.com/news/some-article")
        );
        // also when a meaningful query parameter follows the slash
        assert_eq!(
            url_hash("https://example.com/article/?id=1"),
            url_hash("https://example.com/article?id=1")
        );
    }

    #[test]
    fn date_derived_from_url_path() {
        let published = published_at_from_url("https://www.coindesk.com/policy/2024/05/06/sec-ruling/")
            .expect("date in path");
        assert_eq!(published.to_rfc3339(), "2024-05-06T00:00:00+00:00");
        assert!(published_at_from_url("https://example.com/article/12345").is_none());
        // month 13 is not a date
        assert!(published_at_from_url("https://example.com/2024/13/06/x").is_none());
    }

    #[test]
    fn whitespace_collapses_but_paragraphs_survive() {
        let raw = "First   line\twith   gaps\n\n\n\nSecond    paragraph  ";
        assert_eq!(collapse_whitespace(raw), "First line with gaps\n\nSecond paragraph");
    }

    #[test]
    fn deny_listed_paragraphs_are_stripped() {
        let deny = vec!["editorial policies".to_string(), "newsletter".to_string()];
        let text = "Real reporting here.\n\nSign up for our Newsletter today!\n\nCoinDesk abides by strict editorial policies.\n\nMore real news.";
        assert_eq!(
            strip_boilerplate(text, &deny),
            "Real reporting here.\n\nMore real news."
        );
    }

    #[test]
    fn normalize_backfills_published_at_from_path() {
        let draft = ArticleDraft::new(
            "Title",
            "Body text.",
            "https://www.coindesk.com/markets/2024/05/06/bitcoin-rises/?utm_source=rss",
        );
        let normalized = normalize_draft(draft, &[]);
        assert!(normalized.draft.published_at.is_some());
        assert_eq!(
            normalized.canonical_url,
            "https://www.coindesk.com/markets/2024/05/06/bitcoin-rises"
        );
        assert_eq!(normalized.url_hash.len(), 64);
    }
}
