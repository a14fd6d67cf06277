//! Gemini provider speaking the v1beta REST API.
//!
//! Key priority: per-request key → GEMINI_API_KEY → GOOGLE_API_KEY (the env
//! keys are resolved once at startup into the config). A missing key is a
//! provider failure, recovered by the caller via the fallback responder.
//!
//! Thinking model support: Gemini 2.5 models return parts tagged
//! `thought: true`. Extraction filters those out and only returns the final
//! non-thought text.

use std::time::Duration;

use async_trait::async_trait;
use futures::{future, stream, StreamExt};
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{ConfideError, Result};

use super::{ChatProvider, TokenStream, SYSTEM_PROMPT};

/// Gemini v1beta REST API base.
const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Upper bound on a single non-streaming completion call.
const CHAT_TIMEOUT: Duration = Duration::from_secs(45);

/// Gemini provider that speaks the REST API directly.
pub struct GeminiProvider {
    api_key: Option<String>,
    model: String,
    base_url: String,
    client: Client,
}

impl std::fmt::Debug for GeminiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiProvider")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("model", &self.model)
            .finish()
    }
}

/// Resolve the API key in priority order: per-request key, then the key
/// loaded from the environment at startup. Empty strings count as absent.
pub(crate) fn resolve_key(request_key: Option<&str>, config_key: Option<&str>) -> Option<String> {
    if let Some(k) = request_key.filter(|k| !k.is_empty()) {
        return Some(k.to_string());
    }
    config_key.filter(|k| !k.is_empty()).map(|k| k.to_string())
}

impl GeminiProvider {
    /// Build a provider. `api_key = None` defers the failure to call time so
    /// the caller's fallback path handles it uniformly.
    pub fn new(api_key: Option<String>, model: &str) -> Self {
        Self {
            api_key,
            model: model.to_string(),
            base_url: GEMINI_API_BASE.to_string(),
            client: build_client(),
        }
    }

    #[cfg(test)]
    fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    /// Build a `generateContent` request body for a single user turn with
    /// the persona lifted to `systemInstruction`.
    fn build_request_body(&self, text: &str) -> Value {
        json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": text }]
            }],
            "systemInstruction": {
                "parts": [{ "text": SYSTEM_PROMPT }]
            },
            "generationConfig": {
                "temperature": 0.7,
                "maxOutputTokens": 1024
            }
        })
    }

    /// Extract final answer text from a Gemini response chunk.
    ///
    /// Parts tagged `"thought": true` are intermediate reasoning and are
    /// filtered out; if nothing else exists the thought text is returned so
    /// the caller always gets *something*.
    fn extract_text(response: &Value) -> Option<String> {
        let parts = response["candidates"][0]["content"]["parts"].as_array()?;

        let final_parts: Vec<&str> = parts
            .iter()
            .filter(|p| !p["thought"].as_bool().unwrap_or(false))
            .filter_map(|p| p["text"].as_str())
            .collect();

        if !final_parts.is_empty() {
            return Some(final_parts.join(""));
        }

        let thought_parts: Vec<&str> = parts.iter().filter_map(|p| p["text"].as_str()).collect();

        if !thought_parts.is_empty() {
            Some(thought_parts.join(""))
        } else {
            None
        }
    }

    fn require_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| ConfideError::Provider("no Gemini API key configured".to_string()))
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/models/{}:{}", self.base_url, self.model, method)
    }
}

#[async_trait]
impl ChatProvider for GeminiProvider {
    async fn chat(&self, text: &str) -> Result<String> {
        let key = self.require_key()?;
        let body = self.build_request_body(text);

        debug!(model = %self.model, "Gemini generateContent request");

        let response = self
            .client
            .post(self.api_url("generateContent"))
            .query(&[("key", key)])
            .header("Content-Type", "application/json")
            .json(&body)
            .timeout(CHAT_TIMEOUT)
            .send()
            .await
            .map_err(|e| ConfideError::Provider(format!("Gemini request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let error_text = response.text().await.unwrap_or_default();
            return Err(provider_error(status, &error_text));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| ConfideError::Provider(format!("failed to parse Gemini response: {e}")))?;

        Self::extract_text(&json)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ConfideError::Provider("Gemini returned empty response".to_string()))
    }

    async fn stream_chat(&self, text: &str) -> Result<TokenStream> {
        let key = self.require_key()?;
        let body = self.build_request_body(text);

        debug!(model = %self.model, "Gemini streamGenerateContent request");

        let response = self
            .client
            .post(self.api_url("streamGenerateContent"))
            .query(&[("alt", "sse"), ("key", key)])
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ConfideError::Provider(format!("Gemini request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let error_text = response.text().await.unwrap_or_default();
            return Err(provider_error(status, &error_text));
        }

        // Reassemble SSE `data:` lines across chunk boundaries; each line
        // carries one response chunk whose text becomes one fragment.
        let stream = response
            .bytes_stream()
            .scan(String::new(), |buf, chunk| {
                let items = match chunk {
                    Ok(bytes) => {
                        buf.push_str(&String::from_utf8_lossy(&bytes));
                        drain_sse_lines(buf)
                    }
                    Err(e) => vec![Err(ConfideError::Provider(format!(
                        "Gemini stream failed: {e}"
                    )))],
                };
                future::ready(Some(stream::iter(items)))
            })
            .flatten()
            .boxed();

        Ok(stream)
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

/// Split complete lines off `buf` and turn each SSE `data:` line into a
/// fragment. Incomplete trailing data stays buffered.
fn drain_sse_lines(buf: &mut String) -> Vec<Result<String>> {
    let mut items = Vec::new();
    while let Some(pos) = buf.find('\n') {
        let line = buf[..pos].trim().to_string();
        buf.drain(..=pos);
        let Some(data) = line.strip_prefix("data:") else {
            continue;
        };
        if let Ok(value) = serde_json::from_str::<Value>(data.trim()) {
            if let Some(text) = GeminiProvider::extract_text(&value) {
                if !text.is_empty() {
                    items.push(Ok(text));
                }
            }
        }
    }
    items
}

/// Map a non-2xx Gemini response to a provider error, pulling the message
/// out of the error body when it parses.
fn provider_error(status: u16, body: &str) -> ConfideError {
    let msg = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(String::from))
        .unwrap_or_else(|| body.to_string());
    ConfideError::Provider(format!("Gemini API error ({status}): {msg}"))
}

fn build_client() -> Client {
    Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()
        .expect("failed to build HTTP client")
}
