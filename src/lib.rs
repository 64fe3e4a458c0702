// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod announce;
pub mod api;
pub mod classify;
pub mod config;
pub mod ingest;
pub mod metrics;
pub mod rate_limit;
pub mod refresh;
pub mod summarize;

// ---- Re-exports for stable public API ----
pub use crate::announce::{dedup_and_sort, normalize, Announcement};
pub use crate::api::{create_router, AppState};
pub use crate::classify::{classify, Category};
pub use crate::rate_limit::{FixedWindowLimiter, RateLimitDecision};
pub use crate::refresh::{AnnouncementCache, RefreshConfig, Snapshot};
pub use crate::summarize::{build_summarizer, SharedSummarizer, Summarizer};
