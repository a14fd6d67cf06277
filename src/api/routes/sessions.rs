//! Session history route.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde_json::{json, Value};

use crate::api::server::AppState;

/// GET /api/session/{session_id} — stored turns, oldest first.
/// Unknown or expired sessions yield an empty array, never an error.
pub async fn get_history(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Json<Value> {
    let history = state.conversations.get(&session_id);
    Json(json!({ "history": history }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::store::Role;

    fn test_state() -> Arc<AppState> {
        Arc::new(AppState::new(Config::default()))
    }

    #[tokio::test]
    async fn test_unknown_session_returns_empty_array() {
        let Json(body) = get_history(State(test_state()), Path("missing".into())).await;
        assert_eq!(body["history"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_history_round_trip() {
        let state = test_state();
        state.conversations.add("s1", Role::User, "hello");
        state.conversations.add("s1", Role::Assistant, "hi, how are you feeling?");

        let Json(body) = get_history(State(state), Path("s1".into())).await;
        let history = body["history"].as_array().unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0]["role"], "user");
        assert_eq!(history[0]["content"], "hello");
        assert_eq!(history[1]["role"], "assistant");
    }
}
