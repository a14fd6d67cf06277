//! WebSocket streaming endpoint.
//!
//! One exchange per client JSON message. Bridge events are pumped through a
//! channel and written to the socket by the per-connection task; a failed
//! socket write drops the channel receiver, which tells the bridge the
//! client is gone.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::api::server::AppState;
use crate::bridge::{StreamEvent, StreamRequest};

/// Buffer between the bridge and the socket writer.
const EVENT_BUFFER: usize = 16;

/// GET /ws/stream — upgrades to WebSocket and services exchanges until the
/// client disconnects.
pub async fn ws_stream(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>) {
    info!("websocket connection established");

    let hello = StreamEvent::Connected {
        message: "Connected to confide stream".to_string(),
    };
    if send_event(&mut socket, &hello).await.is_err() {
        return;
    }

    while let Some(Ok(message)) = socket.recv().await {
        match message {
            Message::Text(text) => match serde_json::from_str::<StreamRequest>(text.as_str()) {
                Ok(request) => run_exchange(&mut socket, &state, request).await,
                Err(_) => {
                    let event = StreamEvent::Error {
                        message: "Invalid JSON format".to_string(),
                    };
                    if send_event(&mut socket, &event).await.is_err() {
                        break;
                    }
                }
            },
            Message::Close(_) => break,
            // Ping/pong are answered by axum; binary frames are ignored.
            _ => {}
        }
    }

    debug!("websocket connection closed");
}

/// Service one exchange: run the bridge and forward its events until it
/// finishes or the client goes away.
async fn run_exchange(socket: &mut WebSocket, state: &Arc<AppState>, request: StreamRequest) {
    let (tx, mut rx) = mpsc::channel::<StreamEvent>(EVENT_BUFFER);
    let bridge = state.bridge();
    let exchange = tokio::spawn(async move {
        bridge.run(request, &tx).await;
    });

    while let Some(event) = rx.recv().await {
        if send_event(socket, &event).await.is_err() {
            break;
        }
    }

    // Dropping the receiver unblocks the bridge if the client vanished
    // mid-stream; then wait out the exchange task.
    drop(rx);
    let _ = exchange.await;
}

async fn send_event(socket: &mut WebSocket, event: &StreamEvent) -> Result<(), axum::Error> {
    let json = serde_json::to_string(event).unwrap_or_else(|_| {
        r#"{"type":"error","message":"Internal server error"}"#.to_string()
    });
    socket.send(Message::Text(json.into())).await
}
