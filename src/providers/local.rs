//! Local LLM provider for Ollama-compatible servers.
//!
//! Speaks `/api/chat`: a single JSON response with `stream: false`, or
//! newline-delimited JSON objects with `stream: true` where each line
//! carries a `message.content` fragment and `done: true` ends the stream.

use std::time::Duration;

use async_trait::async_trait;
use futures::{future, stream, StreamExt};
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{ConfideError, Result};

use super::{ChatProvider, TokenStream, SYSTEM_PROMPT};

/// Upper bound on a single non-streaming completion call.
const CHAT_TIMEOUT: Duration = Duration::from_secs(45);

/// Provider backed by a local Ollama-compatible server.
#[derive(Debug)]
pub struct LocalProvider {
    base_url: String,
    model: String,
    num_predict: u32,
    temperature: f64,
    client: Client,
}

impl LocalProvider {
    pub fn new(base_url: &str, model: &str, num_predict: u32, temperature: f64) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            num_predict,
            temperature,
            client: build_client(),
        }
    }

    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.base_url)
    }

    fn build_request_body(&self, text: &str, stream: bool) -> Value {
        json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": text }
            ],
            "stream": stream,
            "options": {
                "num_predict": self.num_predict,
                "temperature": self.temperature
            }
        })
    }

    /// Pull the assistant text out of a chat response object. Servers vary:
    /// Ollama uses `message.content`, older builds `response` or `text`.
    fn extract_content(value: &Value) -> Option<String> {
        value["message"]["content"]
            .as_str()
            .or_else(|| value["response"].as_str())
            .or_else(|| value["text"].as_str())
            .map(String::from)
    }
}

#[async_trait]
impl ChatProvider for LocalProvider {
    async fn chat(&self, text: &str) -> Result<String> {
        let body = self.build_request_body(text, false);

        debug!(model = %self.model, url = %self.chat_url(), "local chat request");

        let response = self
            .client
            .post(self.chat_url())
            .json(&body)
            .timeout(CHAT_TIMEOUT)
            .send()
            .await
            .map_err(|e| ConfideError::Provider(format!("local LLM request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(ConfideError::Provider(format!(
                "local LLM error: HTTP {}",
                response.status().as_u16()
            )));
        }

        let value: Value = response.json().await.map_err(|e| {
            ConfideError::Provider(format!("failed to parse local LLM response: {e}"))
        })?;

        Self::extract_content(&value)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ConfideError::Provider("local model returned empty response".to_string()))
    }

    async fn stream_chat(&self, text: &str) -> Result<TokenStream> {
        let body = self.build_request_body(text, true);

        debug!(model = %self.model, url = %self.chat_url(), "local streaming request");

        let response = self
            .client
            .post(self.chat_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| ConfideError::Provider(format!("local LLM request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(ConfideError::Provider(format!(
                "local LLM error: HTTP {}",
                response.status().as_u16()
            )));
        }

        // NDJSON relay: reassemble lines across chunk boundaries, one
        // fragment per line, stopping at the `done` marker.
        let stream = response
            .bytes_stream()
            .scan((String::new(), false), |(buf, done), chunk| {
                if *done {
                    return future::ready(None);
                }
                let items = match chunk {
                    Ok(bytes) => {
                        buf.push_str(&String::from_utf8_lossy(&bytes));
                        drain_ndjson_lines(buf, done)
                    }
                    Err(e) => vec![Err(ConfideError::Provider(format!(
                        "local LLM stream failed: {e}"
                    )))],
                };
                future::ready(Some(stream::iter(items)))
            })
            .flatten()
            .boxed();

        Ok(stream)
    }

    fn name(&self) -> &str {
        "local"
    }
}

/// Split complete NDJSON lines off `buf` into fragments. Sets `done` and
/// stops consuming once a `done: true` line is seen. Non-JSON lines are
/// skipped silently.
fn drain_ndjson_lines(buf: &mut String, done: &mut bool) -> Vec<Result<String>> {
    let mut items = Vec::new();
    while let Some(pos) = buf.find('\n') {
        let line = buf[..pos].trim().to_string();
        buf.drain(..=pos);
        if line.is_empty() {
            continue;
        }
        let Ok(value) = serde_json::from_str::<Value>(&line) else {
            debug!("skipping non-JSON line from local LLM stream");
            continue;
        };
        if value["done"].as_bool().unwrap_or(false) {
            *done = true;
            break;
        }
        if let Some(token) = LocalProvider::extract_content(&value) {
            if !token.is_empty() {
                items.push(Ok(token));
            }
        }
    }
    items
}

fn build_client() -> Client {
    Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()
        .expect("failed to build HTTP client")
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_provider(url: &str) -> LocalProvider {
        LocalProvider::new(url, "llama3.1:8b-instruct-q4_0", 256, 0.6)
    }

    #[test]
    fn test_request_body_shape() {
        let provider = test_provider("http://localhost:11434");
        let body = provider.build_request_body("hello", true);
        assert_eq!(body["model"], "llama3.1:8b-instruct-q4_0");
        assert_eq!(body["stream"], true);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hello");
        assert_eq!(body["options"]["num_predict"], 256);
    }

    #[test]
    fn test_chat_url_strips_trailing_slash() {
        let provider = test_provider("http://localhost:11434/");
        assert_eq!(provider.chat_url(), "http://localhost:11434/api/chat");
    }

    #[test]
    fn test_extract_content_variants() {
        let ollama = json!({ "message": { "content": "hi" } });
        assert_eq!(LocalProvider::extract_content(&ollama).as_deref(), Some("hi"));
        let legacy = json!({ "response": "hey" });
        assert_eq!(LocalProvider::extract_content(&legacy).as_deref(), Some("hey"));
        let bare = json!({ "text": "yo" });
        assert_eq!(LocalProvider::extract_content(&bare).as_deref(), Some("yo"));
        assert!(LocalProvider::extract_content(&json!({})).is_none());
    }

    #[test]
    fn test_drain_ndjson_stops_at_done() {
        let mut buf = String::from(concat!(
            "{\"message\":{\"content\":\"one \"},\"done\":false}\n",
            "{\"message\":{\"content\":\"two\"},\"done\":false}\n",
            "{\"done\":true}\n",
            "{\"message\":{\"content\":\"ignored\"},\"done\":false}\n",
        ));
        let mut done = false;
        let items = drain_ndjson_lines(&mut buf, &mut done);
        assert!(done);
        let tokens: Vec<&str> = items.iter().map(|i| i.as_ref().unwrap().as_str()).collect();
        assert_eq!(tokens, vec!["one ", "two"]);
    }

    #[test]
    fn test_drain_ndjson_skips_garbage_lines() {
        let mut buf = String::from("not json\n{\"message\":{\"content\":\"ok\"}}\n");
        let mut done = false;
        let items = drain_ndjson_lines(&mut buf, &mut done);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].as_ref().unwrap(), "ok");
    }

    #[tokio::test]
    async fn test_chat_against_mock_server() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(json!({ "stream": false })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "message": { "role": "assistant", "content": "I hear you." }
            })))
            .mount(&server)
            .await;

        let provider = test_provider(&server.uri());
        assert_eq!(provider.chat("rough week").await.unwrap(), "I hear you.");
    }

    #[tokio::test]
    async fn test_chat_empty_response_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "message": { "role": "assistant", "content": "" }
            })))
            .mount(&server)
            .await;

        let provider = test_provider(&server.uri());
        let err = provider.chat("hello").await.unwrap_err();
        assert!(err.to_string().contains("empty response"));
    }

    #[tokio::test]
    async fn test_stream_chat_relays_ndjson_in_order() {
        let server = MockServer::start().await;
        let ndjson = concat!(
            "{\"message\":{\"content\":\"Hel\"},\"done\":false}\n",
            "{\"message\":{\"content\":\"lo\"},\"done\":false}\n",
            "{\"message\":{\"content\":\" wor\"},\"done\":false}\n",
            "{\"message\":{\"content\":\"ld\"},\"done\":false}\n",
            "{\"done\":true}\n",
        );
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(ndjson, "application/x-ndjson"))
            .mount(&server)
            .await;

        let provider = test_provider(&server.uri());
        let stream = provider.stream_chat("hi").await.unwrap();
        let fragments: Vec<String> = stream.map(|item| item.unwrap()).collect().await;
        assert_eq!(fragments, vec!["Hel", "lo", " wor", "ld"]);
    }

    #[tokio::test]
    async fn test_unreachable_server_is_provider_error() {
        // Nothing listens on this port; the connection is refused outright.
        let provider = test_provider("http://127.0.0.1:9");
        assert!(provider.chat("hi").await.is_err());
        assert!(provider.stream_chat("hi").await.is_err());
    }

    #[tokio::test]
    async fn test_http_error_status_is_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let provider = test_provider(&server.uri());
        let err = provider.chat("hi").await.unwrap_err();
        assert!(err.to_string().contains("503"));
    }
}
