// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Shared chat-completion path used by the REST `/chat`/`/chat/stream`
//! endpoints and the `/ws/chat/{session_id}` bridge: append the user
//! message, run the model, stream deltas back to the caller, append the
//! accumulated assistant reply once the stream ends.

use std::sync::Arc;

use aria_core::{CoreError, CorrelationId, SessionManager};
use aria_memory::MessageRole;
use aria_model::{CompletionRequest, Message as ModelMessage, ModelGateway, ResponseEvent};
use futures::{Stream, StreamExt};
use tracing::warn;

pub struct ChatTurn {
    pub model_id: String,
    pub correlation_id: CorrelationId,
}

/// Posts `content` as a user message on `session_id`, selects a model
/// (honoring the session's pinned override), and returns a stream of text
/// deltas. The assistant reply is appended to the session once the stream
/// is fully drained — callers must poll the stream to completion (or drop
/// it, in which case the partial reply is lost, matching cooperative
/// cancellation).
pub async fn start_turn(
    sessions: &Arc<SessionManager>,
    gateway: &Arc<ModelGateway>,
    config: &Arc<aria_config::Config>,
    session_id: &str,
    content: String,
) -> Result<(ChatTurn, impl Stream<Item = Result<String, CoreError>>), CoreError> {
    let correlation_id = CorrelationId::new();
    sessions.append_message(session_id, MessageRole::User, content.clone(), None, None, correlation_id).await?;

    let session = sessions.store().get_session(session_id).await?.ok_or(CoreError::NotFound)?;
    let history = sessions.store().list_messages(session_id).await?;
    let model_id = match &session.model_override {
        Some(m) => m.clone(),
        None => gateway.select(config).ok_or(CoreError::Transient("no model available".into()))?,
    };

    let messages: Vec<ModelMessage> = history
        .iter()
        .map(|m| match m.role {
            aria_memory::MessageRole::User => ModelMessage::user(&m.content),
            aria_memory::MessageRole::Assistant => ModelMessage::assistant(&m.content),
            aria_memory::MessageRole::System => ModelMessage::system(&m.content),
            aria_memory::MessageRole::Tool => ModelMessage::user(&m.content),
        })
        .collect();

    let req = CompletionRequest { messages, tools: vec![], stream: true, system_dynamic_suffix: None };
    let stream = gateway.complete(config, &model_id, req).await.map_err(CoreError::from)?;

    let sessions = sessions.clone();
    let session_id = session_id.to_string();
    let model_id_for_append = model_id.clone();
    let out = async_stream::stream! {
        let mut text = String::new();
        let mut stream = stream;
        while let Some(event) = stream.next().await {
            match event {
                Ok(ResponseEvent::TextDelta(delta)) => {
                    text.push_str(&delta);
                    yield Ok(delta);
                }
                Ok(ResponseEvent::Done) => break,
                Ok(ResponseEvent::Error(e)) => {
                    yield Err(CoreError::Transient(e));
                    return;
                }
                Ok(_) => {}
                Err(e) => {
                    yield Err(CoreError::Transient(e.to_string()));
                    return;
                }
            }
        }
        if !text.is_empty() {
            if let Err(e) = sessions.append_message(&session_id, MessageRole::Assistant, text, None, Some(model_id_for_append), CorrelationId::new()).await {
                warn!(session_id, error = %e, "failed to persist assistant reply");
            }
        }
    };

    Ok((ChatTurn { model_id, correlation_id }, out))
}
