use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, info};

use super::{ApiError, AppState};
use crate::auth::bearer_token;
use crate::notify::Notifier;

#[derive(Debug, Default, Deserialize)]
pub struct WsParams {
    token: Option<String>,
}

/// Browsers cannot set headers on a WebSocket handshake, so `?token=` is accepted too.
pub async fn ws_handler(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let token = bearer_token(&headers).or(params.token.as_deref());
    let Some(user_id) = token.and_then(|t| state.auth.authenticate(t)) else {
        return ApiError::unauthorized("Access denied. No valid token provided.").into_response();
    };

    let notifier = Arc::clone(state.repo.notifier());
    ws.on_upgrade(move |socket| handle_socket(socket, notifier, user_id))
}

/// Forward the user's events until either side closes. Incoming frames are ignored.
async fn handle_socket(socket: WebSocket, notifier: Arc<Notifier>, user_id: i64) {
    let mut subscription = notifier.subscribe(user_id);
    let connection = subscription.id();
    info!(user_id, connection, "WebSocket connected");

    let (mut sender, mut receiver) = socket.split();
    loop {
        tokio::select! {
            event = subscription.recv() => {
                let Some(text) = event else { break };
                if let Err(e) = sender.send(Message::Text(text)).await {
                    debug!(user_id, connection, "WebSocket send failed: {}", e);
                    break;
                }
            }
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    debug!(user_id, connection, "WebSocket receive failed: {}", e);
                    break;
                }
                Some(Ok(_)) => {}
            }
        }
    }

    // Dropping the subscription deregisters the connection.
    drop(subscription);
    info!(user_id, connection, "WebSocket disconnected");
}
