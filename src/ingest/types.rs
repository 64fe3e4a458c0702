// src/ingest/types.rs
use anyhow::Result;

/// One raw item as retrieved from an upstream feed, before normalization.
/// Fields are explicit; defaulting happens in the providers, not at call
/// sites.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct RawItem {
    pub title: String,
    pub link: String,
    pub published_at: u64, // unix seconds; 0 when the feed gave no usable date
    pub body: String,      // description/content snippet, HTML already stripped
}

#[async_trait::async_trait]
pub trait FeedSource: Send + Sync {
    /// Fetch the latest items from this source. Errors are per-source and
    /// never abort the batch; the caller degrades a failing source to zero
    /// items.
    async fn fetch_latest(&self) -> Result<Vec<RawItem>>;
    fn name(&self) -> &str;
}
