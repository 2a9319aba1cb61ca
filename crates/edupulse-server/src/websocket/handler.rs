//! WebSocket connection handler

use crate::error::ApiError;
use crate::models::WsEvent;
use crate::state::AppState;
use crate::websocket::events::{is_addressed_to, WsConnection};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Access token (browsers cannot set headers on upgrade requests)
    pub token: Option<String>,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<WsQuery>,
) -> Response {
    let Some(token) = query.token.filter(|t| !t.is_empty()) else {
        warn!("WebSocket connection rejected: missing token");
        return ApiError::Unauthorized("Missing token".to_string()).into_response();
    };

    let claims = match state.tokens.verify_access_token(&token) {
        Ok(claims) => claims,
        Err(e) => {
            warn!("WebSocket connection rejected: {}", e);
            return e.into_response();
        }
    };

    let conn_id = Uuid::new_v4();
    let user_id = claims.sub;
    ws.on_upgrade(move |socket| handle_socket(socket, state, conn_id, user_id))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, conn_id: Uuid, user_id: String) {
    let (mut sender, mut receiver) = socket.split();

    state.broadcaster.add_connection(WsConnection {
        id: conn_id,
        user_id: user_id.clone(),
    });
    info!("WebSocket connected: {} (user: {})", conn_id, user_id);

    let mut event_rx = state.broadcaster.subscribe();
    let (pong_tx, mut pong_rx) = tokio::sync::mpsc::channel::<WsEvent>(8);

    let recipient = user_id.clone();
    let send_task = tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                received = event_rx.recv() => match received {
                    Ok(event) if is_addressed_to(&event, &recipient) => event,
                    Ok(_) => continue,
                    Err(RecvError::Lagged(n)) => {
                        warn!("WebSocket {} lagged by {} messages", conn_id, n);
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                },
                Some(reply) = pong_rx.recv() => reply,
            };

            let msg = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(e) => {
                    error!("Failed to serialize event: {}", e);
                    continue;
                }
            };

            if sender.send(Message::Text(msg)).await.is_err() {
                break;
            }
        }
    });

    let recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    if let Some(reply) = handle_client_message(conn_id, &text) {
                        if pong_tx.send(reply).await.is_err() {
                            break;
                        }
                    }
                }
                Ok(Message::Close(_)) => {
                    info!("WebSocket {} closed by client", conn_id);
                    break;
                }
                Err(e) => {
                    error!("WebSocket error for {}: {}", conn_id, e);
                    break;
                }
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    state.broadcaster.remove_connection(&conn_id);
    info!("WebSocket disconnected: {} (user: {})", conn_id, user_id);
}

/// Clients may only send keepalives
fn handle_client_message(conn_id: Uuid, text: &str) -> Option<WsEvent> {
    match serde_json::from_str::<WsEvent>(text) {
        Ok(WsEvent::Ping) => Some(WsEvent::Pong),
        Ok(_) => {
            debug!("Ignoring client event from {}", conn_id);
            None
        }
        Err(e) => {
            warn!("Invalid message from {}: {} - {}", conn_id, text, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ping_gets_pong() {
        let reply = handle_client_message(Uuid::new_v4(), r#"{"type":"ping"}"#);
        assert!(matches!(reply, Some(WsEvent::Pong)));
    }

    #[test]
    fn test_other_messages_are_ignored() {
        assert!(handle_client_message(Uuid::new_v4(), "not json").is_none());
        assert!(handle_client_message(Uuid::new_v4(), r#"{"type":"pong"}"#).is_none());
    }
}
