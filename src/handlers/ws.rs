use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    user_id: Uuid,
    token: Option<String>,
}

/// WebSocket upgrade handler. Streams the caller's payment events; events
/// for other users are filtered out before sending.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    // Token validation happens at the auth proxy; reject only the obviously
    // malformed case here.
    if let Some(token) = &params.token {
        if token.is_empty() {
            tracing::warn!("Empty WebSocket authentication token");
            return axum::http::StatusCode::UNAUTHORIZED.into_response();
        }
    }

    ws.on_upgrade(move |socket| handle_socket(socket, state, params.user_id))
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState, user_id: Uuid) {
    let (mut sender, mut receiver) = socket.split();

    let mut rx = state.notifier.subscribe();

    // Drain incoming frames so close/ping handling keeps working.
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    tracing::debug!("Received text message: {}", text);
                }
                Message::Ping(_) => {
                    tracing::trace!("Received ping");
                }
                Message::Close(_) => {
                    tracing::info!("Client closed connection");
                    break;
                }
                _ => {}
            }
        }
    });

    // Forward this user's payment events plus heartbeats.
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat_interval = tokio::time::interval(tokio::time::Duration::from_secs(30));

        loop {
            tokio::select! {
                _ = heartbeat_interval.tick() => {
                    if sender.send(Message::Ping(vec![])).await.is_err() {
                        tracing::info!("Client disconnected during heartbeat");
                        break;
                    }
                }
                result = rx.recv() => {
                    match result {
                        Ok(event) => {
                            if event.user_id != user_id {
                                continue;
                            }

                            let json = match serde_json::to_string(&event) {
                                Ok(j) => j,
                                Err(e) => {
                                    tracing::error!("Failed to serialize event: {}", e);
                                    continue;
                                }
                            };

                            if sender.send(Message::Text(json)).await.is_err() {
                                tracing::info!("Client disconnected");
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            tracing::warn!("Client lagged behind by {} messages", n);
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            tracing::info!("Broadcast channel closed");
                            break;
                        }
                    }
                }
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => {
            recv_task.abort();
        }
        _ = (&mut recv_task) => {
            send_task.abort();
        }
    }

    tracing::info!("WebSocket connection closed");
}
