// src/config.rs
//! Environment-provided configuration with lenient parsing: an unparsable
//! value logs a warning and falls back to its default. Feed sources come
//! from `FEED_SOURCES`, then `config/feeds.toml`, then a built-in default.

use anyhow::{Context, Result};
use std::path::Path;
use std::time::Duration;

use crate::refresh::RefreshConfig;

pub const ENV_FEED_SOURCES: &str = "FEED_SOURCES";
pub const DEFAULT_FEEDS_PATH: &str = "config/feeds.toml";

const DEFAULT_FEED_NAME: &str = "AWS What's New";
const DEFAULT_FEED_URL: &str = "https://aws.amazon.com/about-aws/whats-new/recent/feed/";

/// One configured feed: display name + URL.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct FeedSpec {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub feeds: Vec<FeedSpec>,
    pub cache_ttl_secs: u64,
    pub refresh_budget_secs: u64,
    pub max_items_per_refresh: usize,
    pub rate_limit_max: u32,
    pub rate_limit_window_secs: u64,
    pub backfill_window_days: u64,
    pub summary_pacing_ms: u64,
    /// 0 disables the background warm-refresh task.
    pub warm_refresh_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            feeds: vec![FeedSpec {
                name: DEFAULT_FEED_NAME.to_string(),
                url: DEFAULT_FEED_URL.to_string(),
            }],
            cache_ttl_secs: 300,
            refresh_budget_secs: 25,
            max_items_per_refresh: 25,
            rate_limit_max: 10,
            rate_limit_window_secs: 60,
            backfill_window_days: 7,
            summary_pacing_ms: 0,
            warm_refresh_secs: 0,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            feeds: load_feeds_default().unwrap_or(defaults.feeds),
            cache_ttl_secs: env_u64("CACHE_TTL_SECS", defaults.cache_ttl_secs),
            refresh_budget_secs: env_u64("REFRESH_BUDGET_SECS", defaults.refresh_budget_secs),
            max_items_per_refresh: env_u64(
                "MAX_ITEMS_PER_REFRESH",
                defaults.max_items_per_refresh as u64,
            ) as usize,
            rate_limit_max: env_u64("RATE_LIMIT_MAX", defaults.rate_limit_max as u64) as u32,
            rate_limit_window_secs: env_u64(
                "RATE_LIMIT_WINDOW_SECS",
                defaults.rate_limit_window_secs,
            ),
            backfill_window_days: env_u64("BACKFILL_WINDOW_DAYS", defaults.backfill_window_days),
            summary_pacing_ms: env_u64("SUMMARY_PACING_MS", defaults.summary_pacing_ms),
            warm_refresh_secs: env_u64("WARM_REFRESH_SECS", defaults.warm_refresh_secs),
        }
    }

    pub fn refresh_config(&self) -> RefreshConfig {
        RefreshConfig {
            cache_ttl: Duration::from_secs(self.cache_ttl_secs),
            refresh_budget: Duration::from_secs(self.refresh_budget_secs),
            max_items_per_refresh: self.max_items_per_refresh,
            backfill_window_secs: self.backfill_window_days * 86_400,
            summary_pacing: Duration::from_millis(self.summary_pacing_ms),
        }
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    match std::env::var(name) {
        Ok(raw) => match raw.trim().parse::<u64>() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(var = name, value = %raw, "unparsable config value; using default");
                default
            }
        },
        Err(_) => default,
    }
}

/// Feed list resolution:
/// 1) $FEED_SOURCES — comma-separated `name=url` pairs
/// 2) config/feeds.toml — `[[source]]` tables with `name`/`url`
/// 3) built-in default feed
fn load_feeds_default() -> Option<Vec<FeedSpec>> {
    if let Ok(raw) = std::env::var(ENV_FEED_SOURCES) {
        let feeds = parse_feed_sources(&raw);
        if !feeds.is_empty() {
            return Some(feeds);
        }
        tracing::warn!("FEED_SOURCES set but yielded no feeds; falling back");
    }
    let path = Path::new(DEFAULT_FEEDS_PATH);
    if path.exists() {
        match load_feeds_from(path) {
            Ok(feeds) if !feeds.is_empty() => return Some(feeds),
            Ok(_) => tracing::warn!("feeds file is empty; falling back to default feed"),
            Err(e) => tracing::warn!(error = ?e, "failed to load feeds file; falling back"),
        }
    }
    None
}

/// Parse `name=url,name=url`. Entries without a `=` or with an empty side
/// are skipped.
pub fn parse_feed_sources(raw: &str) -> Vec<FeedSpec> {
    raw.split(',')
        .filter_map(|pair| {
            let (name, url) = pair.split_once('=')?;
            let (name, url) = (name.trim(), url.trim());
            if name.is_empty() || url.is_empty() {
                return None;
            }
            Some(FeedSpec {
                name: name.to_string(),
                url: url.to_string(),
            })
        })
        .collect()
}

pub fn load_feeds_from(path: &Path) -> Result<Vec<FeedSpec>> {
    #[derive(serde::Deserialize)]
    struct FeedsFile {
        #[serde(default)]
        source: Vec<FeedSpec>,
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading feeds from {}", path.display()))?;
    let parsed: FeedsFile = toml::from_str(&content)
        .with_context(|| format!("parsing feeds toml {}", path.display()))?;
    Ok(parsed.source)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feed_sources_pairs_parse_and_skip_garbage() {
        let feeds =
            parse_feed_sources("AWS=https://a/feed, Azure = https://b/feed ,broken,=nope,x=");
        assert_eq!(feeds.len(), 2);
        assert_eq!(feeds[0].name, "AWS");
        assert_eq!(feeds[1].name, "Azure");
        assert_eq!(feeds[1].url, "https://b/feed");
    }

    #[test]
    fn feeds_toml_parses_source_tables() {
        let toml = r#"
            [[source]]
            name = "AWS What's New"
            url = "https://aws.amazon.com/about-aws/whats-new/recent/feed/"

            [[source]]
            name = "GCP Release Notes"
            url = "https://cloud.google.com/feeds/gcp-release-notes.xml"
        "#;
        let tmp = std::env::temp_dir().join("cloud_news_digest_feeds_test.toml");
        std::fs::write(&tmp, toml).unwrap();
        let feeds = load_feeds_from(&tmp).unwrap();
        std::fs::remove_file(&tmp).ok();
        assert_eq!(feeds.len(), 2);
        assert_eq!(feeds[1].name, "GCP Release Notes");
    }

    #[serial_test::serial]
    #[test]
    fn env_numbers_fall_back_on_garbage() {
        std::env::set_var("CACHE_TTL_SECS", "not-a-number");
        std::env::remove_var(ENV_FEED_SOURCES);
        let cfg = AppConfig::from_env();
        assert_eq!(cfg.cache_ttl_secs, AppConfig::default().cache_ttl_secs);
        std::env::remove_var("CACHE_TTL_SECS");
    }

    #[serial_test::serial]
    #[test]
    fn env_feed_sources_take_precedence() {
        std::env::set_var(ENV_FEED_SOURCES, "One=https://one/feed");
        let cfg = AppConfig::from_env();
        assert_eq!(cfg.feeds.len(), 1);
        assert_eq!(cfg.feeds[0].name, "One");
        std::env::remove_var(ENV_FEED_SOURCES);
    }
}
