// src/announce.rs
//! Announcement entity and normalization: stable ids, categorization,
//! summaries, recency, deduplication, and ordering.

use serde::{Deserialize, Serialize};

use crate::classify::{classify, Category};
use crate::ingest::types::RawItem;
use crate::summarize::{truncate_summary, Summarizer};

/// Items published within this window of "now" are flagged as new.
pub const NEW_WINDOW_SECS: u64 = 3600;

/// One normalized, categorized, summarized feed item. Immutable once
/// constructed; `id` is the deduplication key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Announcement {
    pub id: String,
    pub title: String,
    pub category: Category,
    pub summary: String,
    pub full_text: Option<String>,
    /// Publish time, unix seconds UTC.
    pub timestamp: u64,
    pub link: String,
    pub source: String,
    pub is_new: bool,
}

/// Stable identifier derived from the canonical link: first 8 bytes of
/// SHA-256 as lowercase hex. Collision-resistant enough for feed volumes;
/// not a security boundary.
pub fn announcement_id(link: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(link.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(16);
    for b in digest.iter().take(8) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Turn one raw item into an Announcement. Invokes the classifier and the
/// summarizer; a summarizer miss degrades silently to truncation.
pub async fn normalize(
    raw: &RawItem,
    source: &str,
    summarizer: &dyn Summarizer,
    now: u64,
) -> Announcement {
    let title = if raw.title.is_empty() {
        raw.link.clone()
    } else {
        raw.title.clone()
    };
    let category = classify(&format!("{} {}", title, raw.body));

    let summary = match summarizer.summarize(&title, &raw.body).await {
        Some(s) => s,
        None => {
            tracing::debug!(link = %raw.link, "summarizer unavailable; using truncation");
            truncate_summary(&title, &raw.body)
        }
    };

    Announcement {
        id: announcement_id(&raw.link),
        title,
        category,
        summary,
        full_text: if raw.body.is_empty() {
            None
        } else {
            Some(raw.body.clone())
        },
        timestamp: raw.published_at,
        link: raw.link.clone(),
        source: source.to_string(),
        is_new: now.saturating_sub(raw.published_at) <= NEW_WINDOW_SECS,
    }
}

/// Fold a batch into a result list: drop items whose `id` was already
/// seen (first occurrence wins, in fetch order), then sort by publish
/// time descending. The sort is stable, so equal timestamps keep fold
/// order.
pub fn dedup_and_sort(items: Vec<Announcement>) -> Vec<Announcement> {
    let mut seen = std::collections::HashSet::with_capacity(items.len());
    let mut out: Vec<Announcement> = items
        .into_iter()
        .filter(|a| seen.insert(a.id.clone()))
        .collect();
    out.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    out
}
