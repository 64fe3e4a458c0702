// src/ingest/mod.rs
pub mod providers;
pub mod types;

use crate::ingest::types::{FeedSource, RawItem};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge};
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("feed_items_total", "Total items parsed from feed sources.");
        describe_counter!(
            "feed_kept_total",
            "Items kept after the backfill-window cut."
        );
        describe_counter!(
            "feed_dropped_old_total",
            "Items dropped for falling outside the backfill window."
        );
        describe_counter!("feed_source_errors_total", "Feed fetch/parse errors.");
        describe_histogram!("feed_parse_ms", "Feed parse time in milliseconds.");
        describe_gauge!(
            "feed_fetch_last_run_ts",
            "Unix ts when the fetch pipeline last ran."
        );
    });
}

/// Normalize text: decode entities, strip tags, collapse whitespace, trim,
/// drop trailing sentence punctuation.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, "").to_string();

    // 3) Normalize curly quotes to ASCII
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").to_string();
    out = out.trim().to_string();

    // 5) Strip trailing sentence punctuation (keep quotes)
    while let Some(last) = out.chars().last() {
        if matches!(last, '!' | '?' | '.' | ',') {
            out.pop();
        } else {
            break;
        }
    }

    // 6) Length cap: 2000 chars
    if out.chars().count() > 2000 {
        out = out.chars().take(2000).collect();
    }

    out
}

/// Fetch every configured source once and concatenate the results in
/// source order, each item paired with its source name. A failing source
/// logs, counts an error, and contributes zero items; it never blocks the
/// rest of the batch. Items older than the backfill window are dropped
/// here, before any expensive work.
pub async fn fetch_all(
    sources: &[Box<dyn FeedSource>],
    backfill_window_secs: u64,
) -> Vec<(String, RawItem)> {
    ensure_metrics_described();

    let mut raw = Vec::new();
    for src in sources {
        match src.fetch_latest().await {
            Ok(v) => raw.extend(v.into_iter().map(|it| (src.name().to_string(), it))),
            Err(e) => {
                tracing::warn!(error = ?e, source = src.name(), "feed source error");
                counter!("feed_source_errors_total").increment(1);
            }
        }
    }

    let now = chrono::Utc::now().timestamp().max(0) as u64;
    let cutoff = now.saturating_sub(backfill_window_secs);
    let before = raw.len();
    raw.retain(|(_, item)| item.published_at >= cutoff);
    let dropped = before - raw.len();

    counter!("feed_kept_total").increment(raw.len() as u64);
    counter!("feed_dropped_old_total").increment(dropped as u64);
    gauge!("feed_fetch_last_run_ts").set(now as f64);

    raw
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;

    #[test]
    fn normalize_text_collapses_ws_and_punct() {
        let s = "  Hello,&nbsp;&nbsp; world!!!  ";
        let out = normalize_text(s);
        assert_eq!(out, "Hello, world");
    }

    #[test]
    fn normalize_text_strips_tags() {
        let s = "<p>EC2 <b>update</b></p>";
        assert_eq!(normalize_text(s), "EC2 update");
    }

    struct StaticSource {
        name: &'static str,
        items: Vec<RawItem>,
    }

    #[async_trait]
    impl FeedSource for StaticSource {
        async fn fetch_latest(&self) -> Result<Vec<RawItem>> {
            Ok(self.items.clone())
        }
        fn name(&self) -> &str {
            self.name
        }
    }

    struct BrokenSource;

    #[async_trait]
    impl FeedSource for BrokenSource {
        async fn fetch_latest(&self) -> Result<Vec<RawItem>> {
            Err(anyhow!("connection refused"))
        }
        fn name(&self) -> &str {
            "Broken"
        }
    }

    fn item(link: &str, published_at: u64) -> RawItem {
        RawItem {
            title: format!("item {link}"),
            link: link.to_string(),
            published_at,
            body: "body".to_string(),
        }
    }

    #[tokio::test]
    async fn one_broken_source_does_not_block_the_batch() {
        let now = chrono::Utc::now().timestamp() as u64;
        let sources: Vec<Box<dyn FeedSource>> = vec![
            Box::new(BrokenSource),
            Box::new(StaticSource {
                name: "Good",
                items: vec![item("https://a/1", now)],
            }),
        ];
        let out = fetch_all(&sources, 7 * 86_400).await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].0, "Good");
        assert_eq!(out[0].1.link, "https://a/1");
    }

    #[tokio::test]
    async fn items_outside_the_backfill_window_are_dropped() {
        let now = chrono::Utc::now().timestamp() as u64;
        let sources: Vec<Box<dyn FeedSource>> = vec![Box::new(StaticSource {
            name: "Good",
            items: vec![
                item("https://a/recent", now - 3600),
                item("https://a/ancient", now - 30 * 86_400),
                item("https://a/undated", 0),
            ],
        })];
        let out = fetch_all(&sources, 7 * 86_400).await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].1.link, "https://a/recent");
    }
}
