use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::services::chat::{ChatRelay, ServerEvent};
use crate::AppState;

// GET /chat/ws
pub async fn chat_socket(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let relay = state.chat.clone();
    ws.on_upgrade(move |socket| run_connection(socket, relay))
}

async fn run_connection(socket: WebSocket, relay: ChatRelay) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();
    let mut connection = relay.connect(tx);
    let id = connection.id();
    debug!(connection = %id, "Chat socket opened");

    let writer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    warn!(error = %e, "Failed to encode chat frame");
                    continue;
                }
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => connection.handle_text(&text).await,
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(connection = %id, error = %e, "Chat socket error");
                break;
            }
        }
    }

    connection.disconnect().await;
    // Dropping the connection closes the last sender, which ends the writer.
    drop(connection);
    let _ = writer.await;
    debug!(connection = %id, "Chat socket closed");
}
