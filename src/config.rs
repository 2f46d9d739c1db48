//! Configuration management for NewsFlow.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::models::SourceConfig;

/// Application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base data directory.
    pub data_dir: PathBuf,
    /// Database filename.
    pub database_filename: String,
    /// User agent for HTTP requests.
    pub user_agent: String,
    /// Request timeout in seconds.
    pub request_timeout: u64,
    /// Delay between requests in milliseconds.
    pub request_delay_ms: u64,
    /// Scheduler poll interval in seconds.
    pub tick_interval_secs: u64,
    /// Global cap on concurrently running scheduled crawls.
    pub max_concurrent_crawls: usize,
    /// Articles per source on a scheduled run.
    pub scheduled_max_items: usize,
    /// Minutes before an orphaned `running` log is closed as interrupted.
    pub stale_running_minutes: u64,
    /// Fetch retry attempts for transient failures.
    pub fetch_retry_attempts: u32,
    /// Base delay between fetch retries in milliseconds.
    pub fetch_retry_delay_ms: u64,
    /// Translation service endpoint (None disables dispatch).
    pub translator_endpoint: Option<String>,
    /// Control server bind host.
    pub server_host: String,
    /// Control server bind port.
    pub server_port: u16,
    /// Per-site boilerplate deny lists.
    pub deny_lists: HashMap<String, Vec<String>>,
}

impl Default for Settings {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
            .join("newsflow");

        Self {
            data_dir,
            database_filename: "newsflow.db".to_string(),
            user_agent: "NewsFlow/0.1 (crypto news aggregation)".to_string(),
            request_timeout: 30,
            request_delay_ms: 500,
            tick_interval_secs: 5,
            max_concurrent_crawls: 4,
            scheduled_max_items: 20,
            stale_running_minutes: 10,
            fetch_retry_attempts: 3,
            fetch_retry_delay_ms: 1000,
            translator_endpoint: None,
            server_host: "0.0.0.0".to_string(),
            server_port: 8001,
            deny_lists: default_deny_lists(),
        }
    }
}

impl Settings {
    /// Create settings with a custom data directory.
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            ..Default::default()
        }
    }

    /// Get the full path to the database.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_filename)
    }

    /// Ensure the data directory exists.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.data_dir)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }
}

/// Boilerplate phrases stripped from article bodies, keyed by site.
fn default_deny_lists() -> HashMap<String, Vec<String>> {
    let mut lists = HashMap::new();
    lists.insert(
        "coindesk".to_string(),
        [
            "share this article",
            "copy link",
            "subscribe",
            "newsletter",
            "cookie",
            "privacy policy",
            "disclosure",
            "coindesk is an award-winning",
            "editorial policies",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect(),
    );
    lists.insert(
        "cointelegraph".to_string(),
        ["subscribe", "newsletter", "advertisement"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
    );
    lists
}

/// The sources seeded into a fresh database.
pub fn default_sources() -> Vec<SourceConfig> {
    vec![
        SourceConfig::new(
            "coinbase".to_string(),
            "https://blog.coinbase.com".to_string(),
            Duration::from_secs(15 * 60),
        ),
        SourceConfig::new(
            "coindesk".to_string(),
            "https://www.coindesk.com".to_string(),
            Duration::from_secs(15 * 60),
        ),
        SourceConfig::new(
            "crypto_news".to_string(),
            "https://cryptonews.com".to_string(),
            Duration::from_secs(30 * 60),
        ),
        SourceConfig::new(
            "cointelegraph".to_string(),
            "https://cointelegraph.com".to_string(),
            Duration::from_secs(30 * 60),
        ),
    ]
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Target directory for data.
    #[serde(default)]
    pub target: Option<String>,
    /// Database filename.
    #[serde(default)]
    pub database: Option<String>,
    /// User agent string.
    #[serde(default)]
    pub user_agent: Option<String>,
    /// Request timeout in seconds.
    #[serde(default)]
    pub request_timeout: Option<u64>,
    /// Delay between requests in milliseconds.
    #[serde(default)]
    pub request_delay_ms: Option<u64>,
    /// Scheduler poll interval in seconds.
    #[serde(default)]
    pub tick_interval_secs: Option<u64>,
    /// Global concurrent crawl cap.
    #[serde(default)]
    pub max_concurrent_crawls: Option<usize>,
    /// Articles per source on a scheduled run.
    #[serde(default)]
    pub scheduled_max_items: Option<usize>,
    /// Minutes before an orphaned `running` log is closed as interrupted.
    #[serde(default)]
    pub stale_running_minutes: Option<u64>,
    /// Fetch retry attempts for transient failures.
    #[serde(default)]
    pub fetch_retry_attempts: Option<u32>,
    /// Base delay between fetch retries in milliseconds.
    #[serde(default)]
    pub fetch_retry_delay_ms: Option<u64>,
    /// Translation service endpoint.
    #[serde(default)]
    pub translator_endpoint: Option<String>,
    /// Control server bind host.
    #[serde(default)]
    pub server_host: Option<String>,
    /// Control server bind port.
    #[serde(default)]
    pub server_port: Option<u16>,
    /// Per-site deny-list overrides; replaces the built-in list for that site.
    #[serde(default)]
    pub deny_lists: HashMap<String, Vec<String>>,
}

impl Config {
    /// Load configuration from a TOML file, falling back to defaults when the
    /// file is missing or unreadable.
    pub fn load(path: Option<&Path>) -> Self {
        let candidate = path
            .map(PathBuf::from)
            .or_else(|| dirs::config_dir().map(|d| d.join("newsflow").join("newsflow.toml")));
        let Some(candidate) = candidate else {
            return Self::default();
        };
        match fs::read_to_string(&candidate) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_default(),
            Err(_) => Self::default(),
        }
    }

    /// Apply configuration to settings.
    pub fn apply_to_settings(&self, settings: &mut Settings) {
        if let Some(ref target) = self.target {
            settings.data_dir = PathBuf::from(target);
        }
        if let Some(ref database) = self.database {
            settings.database_filename = database.clone();
        }
        if let Some(ref user_agent) = self.user_agent {
            settings.user_agent = user_agent.clone();
        }
        if let Some(timeout) = self.request_timeout {
            settings.request_timeout = timeout;
        }
        if let Some(delay) = self.request_delay_ms {
            settings.request_delay_ms = delay;
        }
        if let Some(tick) = self.tick_interval_secs {
            settings.tick_interval_secs = tick;
        }
        if let Some(cap) = self.max_concurrent_crawls {
            settings.max_concurrent_crawls = cap;
        }
        if let Some(items) = self.scheduled_max_items {
            settings.scheduled_max_items = items;
        }
        if let Some(minutes) = self.stale_running_minutes {
            settings.stale_running_minutes = minutes;
        }
        if let Some(attempts) = self.fetch_retry_attempts {
            settings.fetch_retry_attempts = attempts;
        }
        if let Some(delay) = self.fetch_retry_delay_ms {
            settings.fetch_retry_delay_ms = delay;
        }
        if let Some(ref endpoint) = self.translator_endpoint {
            settings.translator_endpoint = Some(endpoint.clone());
        }
        if let Some(ref host) = self.server_host {
            settings.server_host = host.clone();
        }
        if let Some(port) = self.server_port {
            settings.server_port = port;
        }
        for (site, list) in &self.deny_lists {
            settings.deny_lists.insert(site.clone(), list.clone());
        }
    }
}

/// Load settings, layering an optional config file over the defaults.
pub fn load_settings(config_path: Option<&Path>) -> Settings {
    let config = Config::load(config_path);
    let mut settings = Settings::default();
    config.apply_to_settings(&mut settings);
    settings
}
