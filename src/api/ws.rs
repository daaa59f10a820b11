//! WebSocket feed of pipeline stage events.

use std::sync::Arc;

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use super::AppState;
use crate::pipeline::{EventHub, StageEvent};

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    info!("WebSocket client connecting");
    let events = Arc::clone(state.orchestrator.events());
    ws.on_upgrade(|socket| handle_socket(socket, events))
}

async fn handle_socket(mut socket: WebSocket, events: Arc<EventHub>) {
    info!("WebSocket client connected");

    let mut rx = events.subscribe();

    loop {
        tokio::select! {
            // Forward stage events to this client
            result = rx.recv() => {
                match result {
                    Ok(event) => {
                        if !send_event(&mut socket, &event).await {
                            debug!("Client disconnected during send");
                            break;
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        warn!(missed = n, "WS client lagged behind stage events");
                    }
                    Err(RecvError::Closed) => {
                        debug!("Stage event channel closed");
                        break;
                    }
                }
            }

            // Client keepalives
            result = socket.recv() => {
                match result {
                    Some(Ok(Message::Text(text))) => {
                        if is_ping(&text) && !send_event(&mut socket, &StageEvent::Pong).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("WebSocket client disconnected");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket receive error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }
}

/// `false` if the client is gone.
async fn send_event(socket: &mut WebSocket, event: &StageEvent) -> bool {
    match serde_json::to_string(event) {
        Ok(json) => socket.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            warn!(error = %e, "Failed to serialize stage event");
            true
        }
    }
}

/// Accepts a bare `ping` or `{"type": "ping"}`.
fn is_ping(text: &str) -> bool {
    let text = text.trim();
    if text.eq_ignore_ascii_case("ping") {
        return true;
    }
    serde_json::from_str::<serde_json::Value>(text)
        .ok()
        .and_then(|v| v.get("type").and_then(|t| t.as_str()).map(|t| t == "ping"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_forms() {
        assert!(is_ping("ping"));
        assert!(is_ping(" PING\n"));
        assert!(is_ping(r#"{"type": "ping"}"#));
        assert!(!is_ping(r#"{"type": "subscribe"}"#));
        assert!(!is_ping("hello"));
    }
}
