use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use bazaar_core::error::CoreError;
use bazaar_events::Frame;
use futures::{SinkExt, StreamExt};

use crate::chat::EventRouter;
use crate::state::AppState;

/// HTTP handler that upgrades the connection to WebSocket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state.chat))
}

/// Manage a single WebSocket connection after upgrade.
///
/// Splits the socket into a sink (outbound) and stream (inbound), then:
///   1. Opens a chat session (attached to the hub, unidentified).
///   2. Spawns a sender task that forwards hub frames to the socket.
///   3. Handles inbound text frames in order on the current task.
///   4. Tears the session down on disconnect.
async fn handle_socket(socket: WebSocket, chat: Arc<EventRouter>) {
    let (mut session, mut rx) = chat.connect().await;
    let conn_id = session.connection_id();

    let (mut sink, mut stream) = socket.split();

    // Sender task: forward hub frames to the WebSocket sink.
    let send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let (msg, closing) = match frame {
                Frame::Event(text) => (Message::Text(text.as_ref().into()), false),
                Frame::Ping => (Message::Ping(Bytes::new()), false),
                Frame::Close => (Message::Close(None), true),
            };
            if sink.send(msg).await.is_err() {
                tracing::debug!(conn_id = %conn_id, "WebSocket sink closed");
                break;
            }
            if closing {
                break;
            }
        }
    });

    // Receiver loop: process inbound messages.
    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Text(text)) => chat.handle_text(&mut session, text.as_str()).await,
            Ok(Message::Binary(_)) => {
                let err = CoreError::Validation("binary frames are not supported".into());
                chat.send_error(&session, &err, None).await;
            }
            Ok(Message::Close(_)) => break,
            Ok(Message::Pong(_)) => {
                tracing::trace!(conn_id = %conn_id, "Pong received");
            }
            Ok(Message::Ping(_)) => {}
            Err(e) => {
                tracing::debug!(conn_id = %conn_id, error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    chat.disconnect(&mut session).await;
    send_task.abort();
}
