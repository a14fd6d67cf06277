//! Usage metrics route.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;

use crate::api::server::AppState;
use crate::store::MetricsSnapshot;

pub async fn get_metrics(State(state): State<Arc<AppState>>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[tokio::test]
    async fn test_get_metrics_reflects_tracker() {
        let state = AppState::new(Config::default());
        state.metrics.record_request(40, "gemini");
        state.metrics.record_request(20, "fallback");
        state.metrics.record_rate_limit();

        let Json(snap) = get_metrics(State(Arc::new(state))).await;
        assert_eq!(snap.total_requests, 2);
        assert_eq!(snap.gemini_requests, 1);
        assert_eq!(snap.fallback_requests, 1);
        assert_eq!(snap.rate_limited_requests, 1);
        assert_eq!(snap.latency_median_ms, 20);
    }
}
