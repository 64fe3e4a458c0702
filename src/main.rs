//! Cloud News Digest — Binary Entrypoint
//! Boots the Axum HTTP server, wiring feed sources, shared state, and middleware.

use std::sync::Arc;
use std::time::Duration;

use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cloud_news_digest::api::{create_router, AppState};
use cloud_news_digest::config::AppConfig;
use cloud_news_digest::ingest::providers::rss::RssSource;
use cloud_news_digest::ingest::types::FeedSource;
use cloud_news_digest::metrics::init_metrics;
use cloud_news_digest::rate_limit::FixedWindowLimiter;
use cloud_news_digest::refresh::{spawn_warm_refresh, AnnouncementCache};
use cloud_news_digest::summarize::build_summarizer;

/// Enable compact tracing logs in development only.
/// Activation requires BOTH:
///   - dev environment (debug build OR SHUTTLE_ENV in {local, development, dev})
///   - DIGEST_DEV_LOG=1
fn enable_dev_tracing() {
    let dev_flag = std::env::var("DIGEST_DEV_LOG")
        .ok()
        .is_some_and(|v| v == "1");

    let is_dev_env = cfg!(debug_assertions)
        || matches!(
            std::env::var("SHUTTLE_ENV")
                .unwrap_or_default()
                .to_ascii_lowercase()
                .as_str(),
            "local" | "development" | "dev"
        );

    if !(dev_flag && is_dev_env) {
        return;
    }

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("refresh=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments. This enables
    // FEED_SOURCES / CACHE_TTL_SECS / OPENAI_API_KEY from .env.
    let _ = dotenvy::dotenv();

    // Initialize dev tracing early (no-op in production).
    enable_dev_tracing();

    let cfg = AppConfig::from_env();
    let metrics_router = init_metrics(cfg.cache_ttl_secs);

    let sources: Vec<Box<dyn FeedSource>> = cfg
        .feeds
        .iter()
        .map(|f| Box::new(RssSource::from_url(&f.name, &f.url)) as Box<dyn FeedSource>)
        .collect();

    let cache = Arc::new(AnnouncementCache::new(
        sources,
        build_summarizer(),
        cfg.refresh_config(),
    ));
    if cfg.warm_refresh_secs > 0 {
        spawn_warm_refresh(cache.clone(), Duration::from_secs(cfg.warm_refresh_secs));
    }

    let limiter = Arc::new(FixedWindowLimiter::new(
        cfg.rate_limit_max,
        cfg.rate_limit_window_secs,
    ));

    let state = AppState { cache, limiter };
    let router = create_router(state).merge(metrics_router);

    Ok(router.into())
}
