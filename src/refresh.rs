// src/refresh.rs
//! Refresh orchestrator: the in-memory announcement cache and the logic
//! that decides between serving it and refetching upstream.
//!
//! Lifecycle of the cache entry: empty at boot, populated by the first
//! successful refresh, replaced wholesale by each later one. A refresh is
//! attempted only when the entry is older than the TTL, runs under a hard
//! wall-clock budget, and falls back to the stale entry on any failure.
//! Concurrent stale readers share one in-flight refresh (single-flight).

use std::sync::{Arc, RwLock};
use std::time::Duration;

use anyhow::{anyhow, Result};
use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;
use tokio::task::JoinHandle;

use crate::announce::{dedup_and_sort, normalize, Announcement};
use crate::ingest::{self, types::FeedSource};
use crate::summarize::SharedSummarizer;

#[derive(Clone, Copy, Debug)]
pub struct RefreshConfig {
    /// How long a cache entry counts as fresh.
    pub cache_ttl: Duration,
    /// Hard wall-clock budget for one whole fetch+normalize pipeline.
    /// Deliberately shorter than any enclosing request-execution ceiling.
    pub refresh_budget: Duration,
    /// Only the first K fetched items are normalized per cycle; the
    /// summarization call is the expensive step this bounds.
    pub max_items_per_refresh: usize,
    /// Items published further back than this are dropped at ingest.
    pub backfill_window_secs: u64,
    /// Optional delay between summarization calls, to respect third-party
    /// rate limits.
    pub summary_pacing: Duration,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(300),
            refresh_budget: Duration::from_secs(25),
            max_items_per_refresh: 25,
            backfill_window_secs: 7 * 86_400,
            summary_pacing: Duration::ZERO,
        }
    }
}

/// The last successfully computed list and when it was computed.
#[derive(Clone)]
struct CacheEntry {
    announcements: Arc<Vec<Announcement>>,
    refreshed_at: u64,
}

/// What a consumer gets back: the list, its computation time, and whether
/// it came from a previously cached entry (true) or was refreshed by this
/// very call (false).
#[derive(Clone)]
pub struct Snapshot {
    pub announcements: Arc<Vec<Announcement>>,
    pub last_update: u64,
    pub cached: bool,
}

pub struct AnnouncementCache {
    entry: RwLock<Option<CacheEntry>>,
    // Single-flight guard: the task holding this runs the refresh, other
    // stale readers queue behind it and re-check freshness afterwards.
    flight: tokio::sync::Mutex<()>,
    sources: Vec<Box<dyn FeedSource>>,
    summarizer: SharedSummarizer,
    cfg: RefreshConfig,
}

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("refresh_success_total", "Successful cache refreshes.");
        describe_counter!(
            "refresh_failure_total",
            "Refreshes that yielded no items (all sources failed or empty)."
        );
        describe_counter!(
            "refresh_timeout_total",
            "Refreshes aborted for exceeding the wall-clock budget."
        );
        describe_gauge!("announcement_cache_size", "Announcements in the cache entry.");
        describe_gauge!(
            "announcement_cache_refreshed_ts",
            "Unix ts of the last successful refresh."
        );
    });
}

impl AnnouncementCache {
    pub fn new(
        sources: Vec<Box<dyn FeedSource>>,
        summarizer: SharedSummarizer,
        cfg: RefreshConfig,
    ) -> Self {
        ensure_metrics_described();
        Self {
            entry: RwLock::new(None),
            flight: tokio::sync::Mutex::new(()),
            sources,
            summarizer,
            cfg,
        }
    }

    /// Current announcement list. Serves the cache entry while it is
    /// fresh; otherwise refreshes under the budget and falls back to the
    /// stale entry on failure. Errors only when there is no entry at all
    /// and the refresh produced nothing.
    pub async fn current(&self) -> Result<Snapshot> {
        if let Some(snap) = self.fresh_snapshot() {
            return Ok(snap);
        }

        let _flight = self.flight.lock().await;
        // A concurrent refresh may have won while we waited on the guard.
        if let Some(snap) = self.fresh_snapshot() {
            return Ok(snap);
        }

        match tokio::time::timeout(self.cfg.refresh_budget, self.refresh_pipeline()).await {
            Ok(list) if !list.is_empty() => {
                let now = now_unix();
                let list = Arc::new(list);
                self.install(list.clone(), now);
                counter!("refresh_success_total").increment(1);
                Ok(Snapshot {
                    announcements: list,
                    last_update: now,
                    cached: false,
                })
            }
            Ok(_) => {
                counter!("refresh_failure_total").increment(1);
                tracing::warn!("refresh yielded no items; keeping previous cache entry");
                self.stale_or_no_data()
            }
            Err(_) => {
                // The pipeline future is dropped here; a late upstream
                // response can no longer affect this refresh's outcome.
                counter!("refresh_timeout_total").increment(1);
                tracing::warn!(
                    budget_secs = self.cfg.refresh_budget.as_secs(),
                    "refresh exceeded budget; keeping previous cache entry"
                );
                self.stale_or_no_data()
            }
        }
    }

    /// Any entry, fresh or stale. `/stats` reads this without forcing a
    /// refresh of its own.
    pub fn snapshot(&self) -> Option<Snapshot> {
        let guard = self.entry.read().expect("cache lock poisoned");
        guard.as_ref().map(|e| Snapshot {
            announcements: e.announcements.clone(),
            last_update: e.refreshed_at,
            cached: true,
        })
    }

    fn fresh_snapshot(&self) -> Option<Snapshot> {
        let guard = self.entry.read().expect("cache lock poisoned");
        let e = guard.as_ref()?;
        let age = now_unix().saturating_sub(e.refreshed_at);
        if age < self.cfg.cache_ttl.as_secs() {
            Some(Snapshot {
                announcements: e.announcements.clone(),
                last_update: e.refreshed_at,
                cached: true,
            })
        } else {
            None
        }
    }

    fn stale_or_no_data(&self) -> Result<Snapshot> {
        self.snapshot().ok_or_else(|| {
            anyhow!("no announcement data available; upstream feeds may be down or rate limited")
        })
    }

    /// The whole fetch+normalize pipeline. No lock is held across any
    /// await in here; the entry is swapped only by `install`.
    async fn refresh_pipeline(&self) -> Vec<Announcement> {
        let mut raw = ingest::fetch_all(&self.sources, self.cfg.backfill_window_secs).await;
        raw.truncate(self.cfg.max_items_per_refresh);

        let now = now_unix();
        let mut normalized = Vec::with_capacity(raw.len());
        for (i, (source, item)) in raw.iter().enumerate() {
            if i > 0 && !self.cfg.summary_pacing.is_zero() {
                tokio::time::sleep(self.cfg.summary_pacing).await;
            }
            normalized.push(normalize(item, source, self.summarizer.as_ref(), now).await);
        }

        dedup_and_sort(normalized)
    }

    /// Replace the cache entry wholesale. Readers never observe a
    /// partially updated list.
    fn install(&self, announcements: Arc<Vec<Announcement>>, refreshed_at: u64) {
        gauge!("announcement_cache_size").set(announcements.len() as f64);
        gauge!("announcement_cache_refreshed_ts").set(refreshed_at as f64);
        let mut guard = self.entry.write().expect("cache lock poisoned");
        *guard = Some(CacheEntry {
            announcements,
            refreshed_at,
        });
    }
}

/// Background warm-refresh task: drives the same `current()` path on an
/// interval so user requests mostly hit a fresh entry. The first tick
/// fires immediately and warms the cache at boot.
pub fn spawn_warm_refresh(cache: Arc<AnnouncementCache>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match cache.current().await {
                Ok(snap) => tracing::info!(
                    target: "refresh",
                    items = snap.announcements.len(),
                    cached = snap.cached,
                    "warm refresh tick"
                ),
                Err(e) => tracing::warn!(target: "refresh", error = ?e, "warm refresh failed"),
            }
        }
    })
}

fn now_unix() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}
