//! Streaming exchange bridge.
//!
//! Converts a provider's fragment stream into an ordered sequence of
//! protocol events on a single client channel. Fragments are relayed
//! through a bounded FIFO hand-off queue fed by a producer task; a terminal
//! sentinel item ends the consumer loop, so fragments arrive in exactly the
//! order the producer emitted them. On producer failure the bridge replays
//! the canned responder as a simulated token stream. Every request ends in
//! exactly one terminal event (`done` or `error`).

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{ConfideError, Result};
use crate::providers::{self, fallback_response, ChatProvider, ProviderKind, FALLBACK_SOURCE};
use crate::store::{ConversationStore, Role};

/// Client → server streaming request.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamRequest {
    pub text: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Server → client protocol events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    /// Sent once when the connection opens.
    Connected { message: String },
    /// An exchange started; names the responding source.
    Start { source: String },
    /// One ordered response fragment.
    Token { content: String },
    /// Terminal: the exchange completed.
    Done { source: String },
    /// Terminal: validation or internal failure. Provider failures never
    /// surface here — they are recovered via fallback.
    Error { message: String },
}

/// Hand-off items between the producer task and the consumer loop.
enum Fragment {
    Token(String),
    /// Sentinel: the producer exhausted its stream.
    Done,
    /// Sentinel: the producer failed mid-stream.
    Failed(ConfideError),
}

/// How a provider relay ended, short of falling back.
enum RelayOutcome {
    Completed,
    ClientGone,
}

/// Bounded capacity of the producer → consumer hand-off queue.
const HANDOFF_CAPACITY: usize = 32;

/// Pacing delay between consecutive token deliveries. Smooths rendering;
/// correctness never depends on it.
const TOKEN_PACING: Duration = Duration::from_millis(10);

/// Per-word delay when replaying a canned response as a token stream.
const FALLBACK_WORD_PACING: Duration = Duration::from_millis(50);

/// Orchestrates one streaming exchange per call.
pub struct StreamBridge {
    conversations: Arc<ConversationStore>,
    config: Arc<Config>,
}

impl StreamBridge {
    pub fn new(conversations: Arc<ConversationStore>, config: Arc<Config>) -> Self {
        Self {
            conversations,
            config,
        }
    }

    /// Run one exchange, emitting protocol events on `events`.
    ///
    /// A failed send on `events` means the client is gone; the exchange
    /// stops forwarding immediately and emits nothing further.
    pub async fn run(&self, req: StreamRequest, events: &mpsc::Sender<StreamEvent>) {
        let text = req.text.trim().to_string();
        if text.is_empty() {
            let _ = events
                .send(StreamEvent::Error {
                    message: "Text field is required".to_string(),
                })
                .await;
            return;
        }

        let kind = ProviderKind::resolve(
            req.provider.as_deref().unwrap_or(""),
            &self.config.default_provider,
        );
        let session_id = req.session_id.as_deref().filter(|s| !s.trim().is_empty());
        debug!(provider = kind.as_str(), session = ?session_id, "stream exchange");

        let provider = providers::build_provider(kind, req.api_key.as_deref(), &self.config);
        self.run_with_provider(provider.as_ref(), &text, session_id, events)
            .await;
    }

    /// Exchange body, parameterized over the provider for testability.
    async fn run_with_provider(
        &self,
        provider: &dyn ChatProvider,
        text: &str,
        session_id: Option<&str>,
        events: &mpsc::Sender<StreamEvent>,
    ) {
        match self.relay_provider(provider, text, session_id, events).await {
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, source = provider.name(), "provider streaming failed, replaying fallback");
                self.relay_fallback(text, session_id, events).await;
            }
        }
    }

    /// Stream the provider's fragments to the client in order.
    ///
    /// Returns `Err` when the producer failed and the caller should fall
    /// back; `Ok(ClientGone)` when the client disconnected mid-stream.
    async fn relay_provider(
        &self,
        provider: &dyn ChatProvider,
        text: &str,
        session_id: Option<&str>,
        events: &mpsc::Sender<StreamEvent>,
    ) -> Result<RelayOutcome> {
        let source = provider.name().to_string();
        if events
            .send(StreamEvent::Start {
                source: source.clone(),
            })
            .await
            .is_err()
        {
            return Ok(RelayOutcome::ClientGone);
        }

        let stream = provider.stream_chat(text).await?;

        let (tx, mut rx) = mpsc::channel::<Fragment>(HANDOFF_CAPACITY);
        let cancel_on_disconnect = self.config.cancel_on_disconnect;
        tokio::spawn(async move {
            let mut stream = stream;
            let mut delivering = true;
            while let Some(item) = stream.next().await {
                match item {
                    Ok(fragment) => {
                        if delivering && tx.send(Fragment::Token(fragment)).await.is_err() {
                            if cancel_on_disconnect {
                                return;
                            }
                            // Consumer hung up; keep draining the upstream
                            // stream to completion, discarding the output.
                            delivering = false;
                        }
                    }
                    Err(e) => {
                        if delivering {
                            let _ = tx.send(Fragment::Failed(e)).await;
                        }
                        return;
                    }
                }
            }
            if delivering {
                let _ = tx.send(Fragment::Done).await;
            }
        });

        let mut collected = String::new();
        loop {
            match rx.recv().await {
                Some(Fragment::Token(token)) => {
                    collected.push_str(&token);
                    if events
                        .send(StreamEvent::Token { content: token })
                        .await
                        .is_err()
                    {
                        return Ok(RelayOutcome::ClientGone);
                    }
                    sleep(TOKEN_PACING).await;
                }
                Some(Fragment::Done) => break,
                Some(Fragment::Failed(e)) => return Err(e),
                // The producer vanished without a sentinel; treat it like
                // any other producer failure.
                None => {
                    return Err(ConfideError::Internal(
                        "token producer ended without a sentinel".to_string(),
                    ))
                }
            }
        }

        if events
            .send(StreamEvent::Done { source })
            .await
            .is_err()
        {
            return Ok(RelayOutcome::ClientGone);
        }

        if let Some(sid) = session_id {
            self.conversations.add(sid, Role::User, text);
            self.conversations.add(sid, Role::Assistant, &collected);
        }

        Ok(RelayOutcome::Completed)
    }

    /// Replay the canned responder as a simulated token stream: its own
    /// `start`, one word per token with fixed pacing, one `done`.
    async fn relay_fallback(
        &self,
        text: &str,
        session_id: Option<&str>,
        events: &mpsc::Sender<StreamEvent>,
    ) {
        let response = fallback_response(text);

        if events
            .send(StreamEvent::Start {
                source: FALLBACK_SOURCE.to_string(),
            })
            .await
            .is_err()
        {
            return;
        }

        let words: Vec<&str> = response.split(' ').collect();
        for (i, word) in words.iter().enumerate() {
            let token = if i + 1 < words.len() {
                format!("{word} ")
            } else {
                (*word).to_string()
            };
            if events
                .send(StreamEvent::Token { content: token })
                .await
                .is_err()
            {
                return;
            }
            sleep(FALLBACK_WORD_PACING).await;
        }

        if events
            .send(StreamEvent::Done {
                source: FALLBACK_SOURCE.to_string(),
            })
            .await
            .is_err()
        {
            return;
        }

        if let Some(sid) = session_id {
            self.conversations.add(sid, Role::User, text);
            self.conversations.add(sid, Role::Assistant, &response);
        }
    }
}
