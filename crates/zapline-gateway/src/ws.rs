// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WebSocket subscription to realtime rooms.
//!
//! Clients connect to `GET /ws?rooms=tenant:acme,conversation:c1` and then
//! receive one JSON frame per event published to any of those rooms:
//!
//! ```json
//! {"room": "tenant:acme", "event": "message:new", "payload": {...}}
//! ```
//!
//! Client messages are ignored apart from close.

use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::{broadcast, mpsc};

use crate::server::GatewayState;

#[derive(Debug, Default, Deserialize)]
pub struct WsParams {
    /// Comma-separated room names.
    #[serde(default)]
    pub rooms: String,
}

/// Distinct, non-empty room names from a `rooms` parameter.
pub fn parse_rooms(raw: &str) -> Vec<String> {
    let mut rooms: Vec<String> = Vec::new();
    for room in raw.split(',').map(str::trim).filter(|r| !r.is_empty()) {
        if !rooms.iter().any(|r| r == room) {
            rooms.push(room.to_string());
        }
    }
    rooms
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(state): State<GatewayState>,
) -> Response {
    let rooms = parse_rooms(&params.rooms);
    if rooms.is_empty() {
        return (StatusCode::BAD_REQUEST, "at least one room is required").into_response();
    }
    ws.on_upgrade(move |socket| handle_socket(socket, state, rooms))
}

async fn handle_socket(socket: WebSocket, state: GatewayState, rooms: Vec<String>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<String>(64);

    let forwarders: Vec<_> = rooms
        .iter()
        .map(|room| {
            let mut subscription = state.hub.subscribe(room);
            let tx = tx.clone();
            let room = room.clone();
            tokio::spawn(async move {
                loop {
                    match subscription.recv().await {
                        Ok(frame) => {
                            let Ok(text) = serde_json::to_string(frame.as_ref()) else {
                                continue;
                            };
                            if tx.send(text).await.is_err() {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(room = %room, skipped, "websocket subscriber lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            })
        })
        .collect();
    drop(tx);
    tracing::debug!(rooms = ?rooms, "websocket subscribed");

    let sender_task = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if ws_sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = ws_receiver.next().await {
        if let Message::Close(_) = msg {
            break;
        }
    }

    for forwarder in forwarders {
        forwarder.abort();
    }
    sender_task.abort();
    tracing::debug!(rooms = ?rooms, "websocket closed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rooms_are_trimmed_and_deduplicated() {
        assert_eq!(
            parse_rooms(" tenant:acme,conversation:c1,,tenant:acme "),
            vec!["tenant:acme", "conversation:c1"]
        );
        assert!(parse_rooms("").is_empty());
    }

    #[test]
    fn params_default_to_no_rooms() {
        let params: WsParams = serde_json::from_str("{}").unwrap();
        assert!(params.rooms.is_empty());
    }
}
