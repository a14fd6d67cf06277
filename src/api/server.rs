//! Axum API server.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::bridge::StreamBridge;
use crate::config::Config;
use crate::store::{ConversationStore, MetricsTracker, RateLimiter, ResponseCache};

/// Shared state for all handlers. The four stores are process-wide,
/// constructed once at startup, and live for the process lifetime.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub rate_limiter: Arc<RateLimiter>,
    pub cache: Arc<ResponseCache>,
    pub conversations: Arc<ConversationStore>,
    pub metrics: Arc<MetricsTracker>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let rate_limiter = Arc::new(RateLimiter::new(config.calls_per_minute));
        let cache = Arc::new(ResponseCache::new(
            config.cache_ttl_seconds,
            config.cache_max_size,
        ));
        let conversations = Arc::new(ConversationStore::new(
            config.session_max_messages,
            config.session_ttl_seconds,
        ));
        Self {
            config: Arc::new(config),
            rate_limiter,
            cache,
            conversations,
            metrics: Arc::new(MetricsTracker::new()),
        }
    }

    /// Bridge wired to this state's conversation store and config.
    pub fn bridge(&self) -> StreamBridge {
        StreamBridge::new(self.conversations.clone(), self.config.clone())
    }
}

/// Build the axum router with all API routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(super::routes::health::get_health))
        .route("/api/dialogue", post(super::routes::dialogue::post_dialogue))
        .route("/api/metrics", get(super::routes::metrics::get_metrics))
        .route(
            "/api/session/{session_id}",
            get(super::routes::sessions::get_history),
        )
        .route("/ws/stream", get(super::routes::ws::ws_stream))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

/// Bind and serve until the process is stopped.
pub async fn serve(state: AppState) -> anyhow::Result<()> {
    let addr = format!("{}:{}", state.config.bind, state.config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "confide listening");

    let router = build_router(state);
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_builds_stores_from_config() {
        let mut config = Config::default();
        config.calls_per_minute = 2;
        let state = AppState::new(config);
        assert!(state.rate_limiter.allow("c"));
        assert!(state.rate_limiter.allow("c"));
        assert!(!state.rate_limiter.allow("c"));
        assert!(state.cache.is_empty());
        assert!(state.conversations.get("any").is_empty());
        assert_eq!(state.metrics.snapshot().total_requests, 0);
    }

    #[test]
    fn test_router_builds() {
        let _router = build_router(AppState::new(Config::default()));
    }
}
