// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! REST handlers for session, agent, model, and cron-job surfaces, plus the
//! non-streaming `/chat` endpoint and the liveness probe.
//!
//! Every handler returns `Result<Json<T>, GatewayError>`; `GatewayError`
//! carries the correlation id through to the uniform `{error, detail,
//! correlation_id}` envelope on failure.

use std::time::Duration;

use aria_core::{CoreError, CorrelationId, ListFilter};
use aria_memory::{SessionKind, SessionOrder};
use aria_team::AgentPoolError;
use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{delete, get, patch, post};
use axum::{Json, Router};
use futures::StreamExt;
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;
use crate::AppState;

fn agent_pool_err(e: AgentPoolError) -> CoreError {
    match e {
        AgentPoolError::UnknownModel(m) => CoreError::Validation { field: "model".into(), message: format!("unknown model {m:?}") },
        AgentPoolError::Core(c) => c,
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/chat", post(chat))
        .route("/chat/stream", post(chat_stream))
        .route("/sessions", get(list_sessions).post(create_session))
        .route("/sessions/archive", get(list_archived_sessions))
        .route("/sessions/ghosts", delete(delete_ghost_sessions))
        .route("/sessions/:id/messages", get(list_messages))
        .route("/sessions/:id/archive", post(archive_session))
        .route("/agents", get(list_agents))
        .route("/agents/spawn", post(spawn_agent))
        .route("/agents/delegate", post(delegate_task))
        .route("/agents/:id", delete(terminate_agent))
        .route("/models", get(list_models))
        .route("/cron", get(list_cron_jobs).post(create_cron_job))
        .route("/cron/:name", patch(patch_cron_job))
}

/// Unauthenticated liveness probe. Body is `{status, database, uptime_s}`
/// regardless of outcome; only the HTTP status code (200 vs 503) and the
/// `database` field change when the persistence gateway's liveness check
/// fails.
async fn health(State(state): State<AppState>) -> (axum::http::StatusCode, Json<serde_json::Value>) {
    let uptime_s = state.started_at.elapsed().as_secs();
    match state.store.ping().await {
        Ok(()) => (
            axum::http::StatusCode::OK,
            Json(serde_json::json!({"status": "ok", "database": "ok", "uptime_s": uptime_s})),
        ),
        Err(e) => (
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({"status": "unavailable", "database": e.to_string(), "uptime_s": uptime_s})),
        ),
    }
}

// ── Chat ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub session_id: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub reply: String,
    pub model: String,
    pub correlation_id: String,
}

/// Non-streaming chat turn: drains the delta stream and returns the full
/// reply in one response. `/ws/chat/{session_id}` and the raw
/// `crate::http::chat::start_turn` stream are the streaming counterparts.
async fn chat(State(state): State<AppState>, Json(req): Json<ChatRequest>) -> Result<Json<ChatResponse>, GatewayError> {
    let (turn, mut stream) = crate::http::chat::start_turn(&state.sessions, &state.model_gateway, &state.config, &req.session_id, req.content)
        .await
        .map_err(|e| GatewayError::new(e, CorrelationId::new()))?;

    let mut reply = String::new();
    while let Some(delta) = stream.next().await {
        match delta {
            Ok(chunk) => reply.push_str(&chunk),
            Err(e) => return Err(GatewayError::new(e, turn.correlation_id)),
        }
    }
    Ok(Json(ChatResponse { reply, model: turn.model_id, correlation_id: turn.correlation_id.to_string() }))
}

/// Server-sent-events counterpart of `/chat`: each `data:` frame carries one
/// text delta; the stream terminates with `event: done` or `event: error`.
async fn chat_stream(State(state): State<AppState>, Json(req): Json<ChatRequest>) -> Result<Sse<impl futures::Stream<Item = Result<Event, std::convert::Infallible>>>, GatewayError> {
    let (_turn, mut stream) = crate::http::chat::start_turn(&state.sessions, &state.model_gateway, &state.config, &req.session_id, req.content)
        .await
        .map_err(|e| GatewayError::new(e, CorrelationId::new()))?;

    let events = async_stream::stream! {
        loop {
            match stream.next().await {
                Some(Ok(chunk)) => yield Ok(Event::default().data(chunk)),
                Some(Err(e)) => {
                    yield Ok(Event::default().event("error").data(e.to_string()));
                    return;
                }
                None => {
                    yield Ok(Event::default().event("done").data(""));
                    return;
                }
            }
        }
    };
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

// ── Sessions ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListSessionsQuery {
    pub kind: Option<SessionKind>,
    #[serde(default)]
    pub include_archived: bool,
    pub min_message_count: Option<u64>,
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: usize,
    pub order: Option<SessionOrder>,
}

async fn list_sessions(State(state): State<AppState>, Query(q): Query<ListSessionsQuery>) -> Result<Json<Vec<aria_memory::SessionRecord>>, GatewayError> {
    let cid = CorrelationId::new();
    let filter = ListFilter {
        kind: q.kind,
        include_archived: q.include_archived,
        min_message_count: q.min_message_count,
        order: q.order.unwrap_or_default(),
        limit: q.limit,
        offset: q.offset,
    };
    let sessions = state.sessions.list_sessions(filter).await.map_err(|e| GatewayError::new(e, cid))?;
    Ok(Json(sessions))
}

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub kind: SessionKind,
    pub agent_id: Option<String>,
    pub model_override: Option<String>,
}

async fn create_session(State(state): State<AppState>, Json(req): Json<CreateSessionRequest>) -> Result<Json<aria_memory::SessionRecord>, GatewayError> {
    let cid = CorrelationId::new();
    let session = state
        .sessions
        .create_session(req.kind, req.agent_id, req.model_override, cid)
        .await
        .map_err(|e| GatewayError::new(e, cid))?;
    Ok(Json(session))
}

async fn list_messages(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Vec<aria_memory::MessageRecord>>, GatewayError> {
    let cid = CorrelationId::new();
    let messages = state.store.list_messages(&id).await.map_err(|e| GatewayError::new(CoreError::from(e), cid))?;
    Ok(Json(messages))
}

async fn archive_session(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<serde_json::Value>, GatewayError> {
    let cid = CorrelationId::new();
    let archived = state.sessions.archive_session(&id).await.map_err(|e| GatewayError::new(e, cid))?;
    Ok(Json(serde_json::json!({"status": if archived { "archived" } else { "noop" }, "session_id": id})))
}

#[derive(Debug, Deserialize)]
pub struct ListArchivedQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    50
}

async fn list_archived_sessions(State(state): State<AppState>, Query(q): Query<ListArchivedQuery>) -> Result<Json<Vec<aria_memory::SessionRecord>>, GatewayError> {
    let cid = CorrelationId::new();
    let sessions = state.sessions.list_archived_sessions(q.limit, q.offset).await.map_err(|e| GatewayError::new(e, cid))?;
    Ok(Json(sessions))
}

#[derive(Debug, Deserialize)]
pub struct DeleteGhostsQuery {
    #[serde(default = "default_ghost_minutes")]
    pub older_than_minutes: i64,
}

fn default_ghost_minutes() -> i64 {
    15
}

async fn delete_ghost_sessions(State(state): State<AppState>, Query(q): Query<DeleteGhostsQuery>) -> Result<Json<serde_json::Value>, GatewayError> {
    let cid = CorrelationId::new();
    let deleted = state
        .sessions
        .delete_ghost_sessions(chrono::Duration::minutes(q.older_than_minutes))
        .await
        .map_err(|e| GatewayError::new(e, cid))?;
    Ok(Json(serde_json::json!({"deleted": deleted})))
}

// ── Agents ────────────────────────────────────────────────────────────────

async fn list_agents(State(state): State<AppState>) -> Result<Json<Vec<aria_memory::AgentRecord>>, GatewayError> {
    let cid = CorrelationId::new();
    let agents = state.agent_pool.list_agents().await.map_err(|e| GatewayError::new(agent_pool_err(e), cid))?;
    Ok(Json(agents))
}

#[derive(Debug, Deserialize)]
pub struct SpawnAgentRequest {
    pub name: String,
    pub role: String,
    pub instructions: String,
    pub model: Option<String>,
}

async fn spawn_agent(State(state): State<AppState>, Json(req): Json<SpawnAgentRequest>) -> Result<Json<aria_memory::AgentRecord>, GatewayError> {
    let cid = CorrelationId::new();
    let agent = state
        .agent_pool
        .spawn_agent(&req.name, &req.role, &req.instructions, req.model)
        .await
        .map_err(|e| GatewayError::new(agent_pool_err(e), cid))?;
    Ok(Json(agent))
}

#[derive(Debug, Deserialize)]
pub struct DelegateTaskRequest {
    pub task: String,
    pub role: String,
    pub model: Option<String>,
    pub context: Option<String>,
    pub timeout_secs: Option<u64>,
    #[serde(default = "default_cleanup")]
    pub cleanup: bool,
}

fn default_cleanup() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub struct DelegateTaskResponse {
    pub agent_id: String,
    pub model: String,
    pub status: String,
    pub result: String,
    pub tokens_used: u64,
    pub duration_ms: u64,
}

async fn delegate_task(State(state): State<AppState>, Json(req): Json<DelegateTaskRequest>) -> Result<Json<DelegateTaskResponse>, GatewayError> {
    let cid = CorrelationId::new();
    let timeout = req.timeout_secs.map(Duration::from_secs);
    let result = state
        .agent_pool
        .delegate_task(&req.task, &req.role, req.model, req.context, timeout, req.cleanup)
        .await
        .map_err(|e| GatewayError::new(agent_pool_err(e), cid))?;
    Ok(Json(DelegateTaskResponse {
        agent_id: result.agent_id,
        model: result.model,
        status: format!("{:?}", result.status),
        result: result.result,
        tokens_used: result.tokens_used,
        duration_ms: result.duration_ms,
    }))
}

#[derive(Debug, Deserialize)]
pub struct TerminateAgentQuery {
    #[serde(default)]
    pub archive: bool,
}

async fn terminate_agent(State(state): State<AppState>, Path(id): Path<String>, Query(q): Query<TerminateAgentQuery>) -> Result<Json<serde_json::Value>, GatewayError> {
    let cid = CorrelationId::new();
    state.agent_pool.terminate(&id, q.archive).await.map_err(|e| GatewayError::new(agent_pool_err(e), cid))?;
    Ok(Json(serde_json::json!({"terminated": true})))
}

// ── Models ────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct ModelSummary {
    pub id: String,
    pub display_name: String,
    pub provider: String,
    pub tier: aria_config::Tier,
    pub circuit_state: String,
}

async fn list_models(State(state): State<AppState>) -> Json<Vec<ModelSummary>> {
    let mut out = Vec::with_capacity(state.config.models.catalog.len());
    for (id, entry) in &state.config.models.catalog {
        let circuit_state = state
            .model_gateway
            .circuit_state(id)
            .map(|s| format!("{s:?}"))
            .unwrap_or_else(|| "unknown".to_string());
        out.push(ModelSummary { id: id.clone(), display_name: entry.display_name.clone(), provider: entry.provider.clone(), tier: entry.tier, circuit_state });
    }
    out.sort_by(|a, b| a.id.cmp(&b.id));
    Json(out)
}

// ── Cron ──────────────────────────────────────────────────────────────────

async fn list_cron_jobs(State(state): State<AppState>) -> Json<Vec<aria_scheduler::JobSummary>> {
    Json(state.scheduler.job_summaries().await)
}

#[derive(Debug, Deserialize)]
pub struct CreateCronJobRequest {
    pub name: String,
    pub schedule: String,
    pub skill: String,
    pub action: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub args: serde_json::Value,
}

async fn create_cron_job(State(state): State<AppState>, Json(req): Json<CreateCronJobRequest>) -> Result<Json<serde_json::Value>, GatewayError> {
    let cid = CorrelationId::new();
    let job_config = aria_config::CronJobConfig {
        name: req.name,
        schedule: req.schedule,
        skill: req.skill,
        action: req.action,
        model: req.model,
        args: req.args,
    };
    state.scheduler.add_job(job_config).await.map_err(|e| GatewayError::new(e, cid))?;
    Ok(Json(serde_json::json!({"created": true})))
}

#[derive(Debug, Deserialize)]
pub struct PatchCronJobRequest {
    pub model: Option<String>,
}

async fn patch_cron_job(State(state): State<AppState>, Path(name): Path<String>, Json(req): Json<PatchCronJobRequest>) -> Result<Json<serde_json::Value>, GatewayError> {
    let cid = CorrelationId::new();
    state.scheduler.patch_job_model(&name, req.model).await.map_err(|e| GatewayError::new(e, cid))?;
    Ok(Json(serde_json::json!({"updated": true})))
}
