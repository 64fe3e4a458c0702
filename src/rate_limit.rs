// src/rate_limit.rs
//! Fixed-window rate limiting keyed by client identity. Each identity gets
//! a window of W seconds and at most M requests inside it; the counter
//! resets entirely when the window ends, so bursts at window boundaries
//! are possible (a known approximation vs. a sliding-log limiter).

use std::collections::HashMap;
use std::sync::Mutex;

/// Idle records are swept once the table grows past this many identities.
const PURGE_TABLE_THRESHOLD: usize = 1024;

/// Outcome of one rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Requests left in the current window after this one.
    pub remaining: u32,
    /// Seconds until the window resets; set only on rejection, always >= 1.
    pub retry_after_secs: Option<u64>,
}

#[derive(Debug, Clone, Copy)]
struct WindowRecord {
    count: u32,
    window_reset_at: u64, // unix seconds
}

/// Thread-safe fixed-window counter table.
#[derive(Debug)]
pub struct FixedWindowLimiter {
    table: Mutex<HashMap<String, WindowRecord>>,
    max_requests: u32,
    window_secs: u64,
}

impl FixedWindowLimiter {
    pub fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            table: Mutex::new(HashMap::new()),
            max_requests: max_requests.max(1),
            window_secs: window_secs.max(1),
        }
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// Check and record one request for `identity` at the current time.
    pub fn check(&self, identity: &str) -> RateLimitDecision {
        self.check_at(identity, now_unix())
    }

    /// Same as [`check`], with an injected clock for tests.
    pub fn check_at(&self, identity: &str, now: u64) -> RateLimitDecision {
        let mut table = self.table.lock().expect("rate limit mutex poisoned");

        if table.len() > PURGE_TABLE_THRESHOLD {
            let window = self.window_secs;
            // Drop identities idle for more than one full window past
            // their reset time.
            table.retain(|_, rec| now < rec.window_reset_at.saturating_add(window));
        }

        let rec = table.entry(identity.to_string()).or_insert(WindowRecord {
            count: 0,
            window_reset_at: now + self.window_secs,
        });

        // A fresh window, not a rolling one: reset entirely once passed.
        if now >= rec.window_reset_at {
            rec.count = 0;
            rec.window_reset_at = now + self.window_secs;
        }

        if rec.count >= self.max_requests {
            let retry = rec.window_reset_at.saturating_sub(now).max(1);
            metrics::counter!("rate_limit_denied_total").increment(1);
            return RateLimitDecision {
                allowed: false,
                remaining: 0,
                retry_after_secs: Some(retry),
            };
        }

        rec.count += 1;
        RateLimitDecision {
            allowed: true,
            remaining: self.max_requests - rec.count,
            retry_after_secs: None,
        }
    }

    /// Identities currently tracked; diagnostics only.
    pub fn tracked_identities(&self) -> usize {
        self.table.lock().expect("rate limit mutex poisoned").len()
    }
}

fn now_unix() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_allows_max_then_rejects_with_retry_after() {
        let limiter = FixedWindowLimiter::new(10, 60);
        let now = 1_000u64;

        for i in 0..10 {
            let d = limiter.check_at("client-a", now + i as u64);
            assert!(d.allowed, "request {} should pass", i + 1);
            assert_eq!(d.remaining, 10 - (i as u32 + 1));
        }

        let denied = limiter.check_at("client-a", now + 10);
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
        let retry = denied.retry_after_secs.unwrap();
        assert!((1..=60).contains(&retry), "retry was {retry}");
    }

    #[test]
    fn window_reset_allows_a_fresh_burst() {
        let limiter = FixedWindowLimiter::new(3, 60);
        let now = 5_000u64;
        for _ in 0..3 {
            assert!(limiter.check_at("client-b", now).allowed);
        }
        assert!(!limiter.check_at("client-b", now + 1).allowed);

        // Past the stored reset time the same identity gets a new window.
        let later = now + 61;
        for _ in 0..3 {
            assert!(limiter.check_at("client-b", later).allowed);
        }
        assert!(!limiter.check_at("client-b", later + 1).allowed);
    }

    #[test]
    fn identities_are_independent() {
        let limiter = FixedWindowLimiter::new(1, 60);
        let now = 42u64;
        assert!(limiter.check_at("a", now).allowed);
        assert!(!limiter.check_at("a", now).allowed);
        assert!(limiter.check_at("b", now).allowed);
    }

    #[test]
    fn rejection_near_window_end_reports_at_least_one_second() {
        let limiter = FixedWindowLimiter::new(1, 60);
        let now = 100u64;
        assert!(limiter.check_at("c", now).allowed);
        // One tick before reset: retry-after clamps up to 1.
        let d = limiter.check_at("c", now + 59);
        assert!(!d.allowed);
        assert_eq!(d.retry_after_secs, Some(1));
    }

    #[test]
    fn idle_identities_are_purged_once_the_table_grows() {
        let limiter = FixedWindowLimiter::new(5, 60);
        for i in 0..(PURGE_TABLE_THRESHOLD + 1) {
            limiter.check_at(&format!("burst-{i}"), 1_000);
        }
        assert!(limiter.tracked_identities() > PURGE_TABLE_THRESHOLD);

        // Two windows later, a single check sweeps the dead records.
        limiter.check_at("fresh", 1_000 + 200);
        assert!(limiter.tracked_identities() <= 2);
    }
}
