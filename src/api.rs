use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};

use crate::announce::{Announcement, NEW_WINDOW_SECS};
use crate::classify::Category;
use crate::rate_limit::FixedWindowLimiter;
use crate::refresh::AnnouncementCache;

/// Longest accepted `search` query, in characters.
pub const MAX_SEARCH_LEN: usize = 100;
/// Hard cap on `limit`, regardless of what the caller requests.
pub const MAX_LIMIT: usize = 100;
const DEFAULT_LIMIT: usize = 20;

#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<AnnouncementCache>,
    pub limiter: Arc<FixedWindowLimiter>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/announcements", get(announcements))
        .route("/stats", get(stats))
        .route("/health", get(health))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::OPTIONS])
                .allow_headers([header::CONTENT_TYPE]),
        )
        .with_state(state)
}

struct AnnouncementParams {
    category: Option<Category>,
    search: Option<String>, // pre-lowercased
    limit: usize,
}

impl AnnouncementParams {
    /// Validated before the rate limiter or the cache see the request;
    /// a malformed request never consumes rate-limit budget.
    fn from_query(q: &HashMap<String, String>) -> Result<Self, String> {
        let limit = match q.get("limit") {
            None => DEFAULT_LIMIT,
            Some(raw) => raw
                .trim()
                .parse::<usize>()
                .map_err(|_| format!("limit must be a non-negative integer, got '{raw}'"))?
                .min(MAX_LIMIT),
        };

        let search = match q.get("search") {
            None => None,
            Some(s) if s.chars().count() > MAX_SEARCH_LEN => {
                return Err(format!("search must be at most {MAX_SEARCH_LEN} characters"));
            }
            Some(s) => Some(s.to_lowercase()),
        };

        let category = match q.get("category").map(String::as_str) {
            None | Some("ALL") => None,
            Some(raw) => Some(
                Category::from_wire(raw).ok_or_else(|| format!("unknown category '{raw}'"))?,
            ),
        };

        Ok(Self {
            category,
            search,
            limit,
        })
    }
}

/// Rate-limit identity: first hop of X-Forwarded-For, or a shared bucket.
/// No socket address is visible behind the deployment proxy.
fn client_identity(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "anonymous".to_string())
}

fn bad_request(message: String) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": "invalid_request", "message": message })),
    )
        .into_response()
}

fn rate_headers(headers: &mut HeaderMap, limit: u32, remaining: u32) {
    headers.insert("X-RateLimit-Limit", HeaderValue::from(limit));
    headers.insert("X-RateLimit-Remaining", HeaderValue::from(remaining));
}

async fn announcements(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(q): Query<HashMap<String, String>>,
) -> Response {
    let params = match AnnouncementParams::from_query(&q) {
        Ok(p) => p,
        Err(msg) => return bad_request(msg),
    };

    let identity = client_identity(&headers);
    let decision = state.limiter.check(&identity);
    if !decision.allowed {
        let retry = decision.retry_after_secs.unwrap_or(1);
        let mut resp = (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({
                "error": "rate_limited",
                "message": "Too many requests; please slow down.",
                "retryAfter": retry,
            })),
        )
            .into_response();
        let h = resp.headers_mut();
        h.insert("Retry-After", HeaderValue::from(retry));
        rate_headers(h, state.limiter.max_requests(), 0);
        return resp;
    }

    let snap = match state.cache.current().await {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = ?e, "announcement data unavailable");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": "data_unavailable",
                    "message": "No announcement data is available right now; upstream feeds may be down or rate limiting. Try again shortly.",
                })),
            )
                .into_response();
        }
    };

    let filtered: Vec<&Announcement> = snap
        .announcements
        .iter()
        .filter(|a| params.category.map_or(true, |c| a.category == c))
        .filter(|a| match &params.search {
            None => true,
            Some(needle) => {
                a.title.to_lowercase().contains(needle)
                    || a.summary.to_lowercase().contains(needle)
            }
        })
        .collect();
    let total = filtered.len();
    let page: Vec<&Announcement> = filtered.into_iter().take(params.limit).collect();

    let mut resp = (
        StatusCode::OK,
        Json(json!({
            "announcements": page,
            "total": total,
            "lastUpdate": snap.last_update,
            "cached": snap.cached,
        })),
    )
        .into_response();
    let h = resp.headers_mut();
    rate_headers(h, state.limiter.max_requests(), decision.remaining);
    h.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=60, stale-while-revalidate=300"),
    );
    resp
}

async fn stats(State(state): State<AppState>) -> Response {
    let snap = match state.cache.current().await {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = ?e, "stats unavailable");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": "data_unavailable",
                    "message": "No announcement data is available right now.",
                })),
            )
                .into_response();
        }
    };

    let now = now_unix();
    let mut categories: BTreeMap<&'static str, usize> = BTreeMap::new();
    let mut sources: BTreeMap<String, usize> = BTreeMap::new();
    let mut new_count = 0usize;
    for a in snap.announcements.iter() {
        *categories.entry(a.category.as_str()).or_default() += 1;
        *sources.entry(a.source.clone()).or_default() += 1;
        // Recency is recomputed against the current clock, not the value
        // frozen at normalization time.
        if now.saturating_sub(a.timestamp) <= NEW_WINDOW_SECS {
            new_count += 1;
        }
    }

    Json(json!({
        "total": snap.announcements.len(),
        "lastUpdate": snap.last_update,
        "newCount": new_count,
        "categories": categories,
        "sources": sources,
    }))
    .into_response()
}

/// Liveness only: no dependency on cache or upstream state.
async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": now_unix(),
        "service": "cloud-news-digest",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

fn now_unix() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn limit_defaults_and_clamps() {
        assert_eq!(AnnouncementParams::from_query(&q(&[])).unwrap().limit, 20);
        assert_eq!(
            AnnouncementParams::from_query(&q(&[("limit", "1000")]))
                .unwrap()
                .limit,
            MAX_LIMIT
        );
        assert!(AnnouncementParams::from_query(&q(&[("limit", "abc")])).is_err());
        assert!(AnnouncementParams::from_query(&q(&[("limit", "-3")])).is_err());
    }

    #[test]
    fn search_length_is_enforced() {
        let long = "x".repeat(MAX_SEARCH_LEN + 1);
        assert!(AnnouncementParams::from_query(&q(&[("search", long.as_str())])).is_err());
        let ok = "x".repeat(MAX_SEARCH_LEN);
        assert!(AnnouncementParams::from_query(&q(&[("search", ok.as_str())])).is_ok());
    }

    #[test]
    fn category_all_means_no_filter_and_bogus_is_rejected() {
        let p = AnnouncementParams::from_query(&q(&[("category", "ALL")])).unwrap();
        assert!(p.category.is_none());
        let p = AnnouncementParams::from_query(&q(&[("category", "COMPUTE")])).unwrap();
        assert_eq!(p.category, Some(Category::Compute));
        assert!(AnnouncementParams::from_query(&q(&[("category", "BOGUS")])).is_err());
    }

    #[test]
    fn identity_prefers_first_forwarded_hop() {
        let mut headers = HeaderMap::new();
        assert_eq!(client_identity(&headers), "anonymous");
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.9, 10.0.0.1"),
        );
        assert_eq!(client_identity(&headers), "203.0.113.9");
    }
}
