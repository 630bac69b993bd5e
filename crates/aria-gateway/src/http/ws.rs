// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! WebSocket bridge for `/ws/chat/{session_id}` and `/ws/roundtable`.
//!
//! Authentication happens after the upgrade completes (browsers cannot set
//! an `Authorization` header on the upgrade request), via a `token` query
//! parameter validated against the same API key used by HTTP. A missing or
//! wrong token closes the socket immediately with code 4001.

use axum::extract::{
    ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
    Path, Query, State,
};
use axum::response::Response;
use futures::StreamExt;
use tracing::{debug, warn};

use crate::http::auth::verify_ws_token;
use crate::AppState;

#[derive(serde::Deserialize)]
pub struct WsQuery {
    token: Option<String>,
}

pub async fn ws_chat_handler(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_chat_socket(socket, state, session_id, query.token))
}

pub async fn ws_roundtable_handler(ws: WebSocketUpgrade, Query(query): Query<WsQuery>, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_roundtable_socket(socket, state, query.token))
}

async fn unauthorized_close(mut socket: WebSocket) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame { code: close_code::from(4001), reason: "unauthorized".into() })))
        .await;
}

async fn handle_chat_socket(mut socket: WebSocket, state: AppState, session_id: String, token: Option<String>) {
    if !verify_ws_token(&state.auth, token.as_deref()) {
        warn!(session_id, "websocket chat upgrade rejected: bad token");
        return unauthorized_close(socket).await;
    }

    loop {
        let Some(msg) = socket.recv().await else { break };
        match msg {
            Ok(Message::Text(text)) => {
                let (_, mut stream) = match crate::http::chat::start_turn(&state.sessions, &state.model_gateway, &state.config, &session_id, text).await {
                    Ok(pair) => pair,
                    Err(e) => {
                        let _ = send_json(&mut socket, &serde_json::json!({"event": "error", "message": e.to_string()})).await;
                        continue;
                    }
                };
                while let Some(delta) = stream.next().await {
                    match delta {
                        Ok(chunk) => {
                            if send_json(&mut socket, &serde_json::json!({"event": "delta", "text": chunk})).await.is_err() {
                                return;
                            }
                        }
                        Err(e) => {
                            let _ = send_json(&mut socket, &serde_json::json!({"event": "error", "message": e.to_string()})).await;
                            break;
                        }
                    }
                }
                let _ = send_json(&mut socket, &serde_json::json!({"event": "done"})).await;
            }
            Ok(Message::Ping(data)) => {
                if socket.send(Message::Pong(data)).await.is_err() {
                    break;
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!("websocket recv error: {e}");
                break;
            }
        }
    }
}

#[derive(serde::Deserialize)]
struct RoundtableRequest {
    topic: String,
    participants: Vec<aria_team::Participant>,
}

async fn handle_roundtable_socket(mut socket: WebSocket, state: AppState, token: Option<String>) {
    if !verify_ws_token(&state.auth, token.as_deref()) {
        warn!("websocket roundtable upgrade rejected: bad token");
        return unauthorized_close(socket).await;
    }

    let Some(Ok(Message::Text(text))) = socket.recv().await else {
        return;
    };
    let req: RoundtableRequest = match serde_json::from_str(&text) {
        Ok(r) => r,
        Err(e) => {
            let _ = send_json(&mut socket, &serde_json::json!({"event": "error", "message": format!("invalid request: {e}")})).await;
            return;
        }
    };

    let roundtable = aria_team::Roundtable::new(state.agent_pool.clone(), state.sessions.clone(), state.config.orchestrator.clone());
    match roundtable.run(&req.topic, req.participants).await {
        Ok(result) => {
            for turn in &result.transcript {
                let _ = send_json(&mut socket, &serde_json::json!({"event": "turn", "round": turn.round, "participant": turn.participant, "content": turn.content})).await;
            }
            let _ = send_json(&mut socket, &serde_json::json!({"event": "synthesis", "content": result.synthesis, "session_id": result.session_id})).await;
        }
        Err(e) => {
            let _ = send_json(&mut socket, &serde_json::json!({"event": "error", "message": e.to_string()})).await;
        }
    }
    let _ = socket.send(Message::Close(Some(CloseFrame { code: close_code::NORMAL, reason: "done".into() }))).await;
}

async fn send_json(socket: &mut WebSocket, value: &serde_json::Value) -> Result<(), axum::Error> {
    socket.send(Message::Text(value.to_string())).await
}
