//! Dialogue route — the non-streaming request/response path.
//!
//! Order of operations: validate, rate-limit, cache lookup, provider call
//! (fallback on any provider failure), then cache fill, history append, and
//! metrics recording before responding.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{ConnectInfo, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::api::server::AppState;
use crate::error::{ConfideError, Result};
use crate::providers::{self, fallback_response, ProviderKind, FALLBACK_SOURCE};
use crate::store::Role;

#[derive(Debug, Deserialize)]
pub struct DialogueRequest {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

pub async fn post_dialogue(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(req): Json<DialogueRequest>,
) -> Result<Json<Value>> {
    let client_id = client_identity(&headers, addr);
    handle(&state, &client_id, req).await.map(Json)
}

async fn handle(state: &AppState, client_id: &str, req: DialogueRequest) -> Result<Value> {
    let started = Instant::now();

    let text = req.text.trim().to_string();
    if text.is_empty() {
        return Err(ConfideError::Validation("Text field is required".to_string()));
    }

    if !state.rate_limiter.allow(client_id) {
        state.metrics.record_rate_limit();
        return Err(ConfideError::RateLimited);
    }

    let kind = ProviderKind::resolve(
        req.provider.as_deref().unwrap_or(""),
        &state.config.default_provider,
    );
    let session_id = req
        .session_id
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());

    let (response_text, source) = match state.cache.get(&text, kind.as_str()) {
        Some(cached) => (cached, format!("{}-cache", kind.as_str())),
        None => {
            let provider = providers::build_provider(kind, req.api_key.as_deref(), &state.config);
            let (response, source) = match provider.chat(&text).await {
                Ok(response) => (response, provider.name().to_string()),
                Err(e) => {
                    warn!(error = %e, source = provider.name(), "provider failed, using fallback");
                    (fallback_response(&text), FALLBACK_SOURCE.to_string())
                }
            };
            state.cache.set(&text, &response, kind.as_str());
            (response, source)
        }
    };

    state.conversations.add(&session_id, Role::User, &text);
    state
        .conversations
        .add(&session_id, Role::Assistant, &response_text);

    let latency_ms = started.elapsed().as_millis() as u64;
    state.metrics.record_request(latency_ms, &source);

    info!(latency_ms, source = %source, "dialogue processed");

    Ok(json!({
        "response": response_text,
        "source": source,
        "latency_ms": latency_ms,
        "session_id": session_id,
    }))
}

/// Client identity for rate limiting: first X-Forwarded-For entry when
/// present, else the peer address.
fn client_identity(headers: &HeaderMap, addr: SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| addr.ip().to_string())
}
