// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! GraphQL surface mirroring the REST routes: sessions, agents, models, and
//! cron jobs as queries; chat/spawn/delegate/archive as mutations. Kept
//! separate from `aria-memory`'s entities rather than deriving
//! `SimpleObject` on them directly, so the storage schema can evolve
//! without dragging the GraphQL schema along with it.

use std::time::Duration;

use aria_core::CorrelationId;
use aria_team::AgentPoolError;
use async_graphql::{Context, EmptySubscription, Object, Schema, SimpleObject};
use futures::StreamExt;

use crate::error::GatewayError;
use crate::AppState;

pub type AriaSchema = Schema<QueryRoot, MutationRoot, EmptySubscription>;

pub fn build_schema(state: AppState) -> AriaSchema {
    Schema::build(QueryRoot, MutationRoot, EmptySubscription).data(state).finish()
}

fn agent_pool_err(e: AgentPoolError) -> aria_core::CoreError {
    match e {
        AgentPoolError::UnknownModel(m) => aria_core::CoreError::Validation { field: "model".into(), message: format!("unknown model {m:?}") },
        AgentPoolError::Core(c) => c,
    }
}

#[derive(SimpleObject)]
pub struct SessionNode {
    pub id: String,
    pub kind: String,
    pub title: Option<String>,
    pub status: String,
    pub message_count: i64,
    pub model_override: Option<String>,
}

impl From<aria_memory::SessionRecord> for SessionNode {
    fn from(s: aria_memory::SessionRecord) -> Self {
        Self {
            id: s.id,
            kind: format!("{:?}", s.kind),
            title: s.title,
            status: format!("{:?}", s.status),
            message_count: s.message_count as i64,
            model_override: s.model_override,
        }
    }
}

#[derive(SimpleObject)]
pub struct MessageNode {
    pub id: String,
    pub sequence: i64,
    pub role: String,
    pub content: String,
    pub model_id: Option<String>,
}

impl From<aria_memory::MessageRecord> for MessageNode {
    fn from(m: aria_memory::MessageRecord) -> Self {
        Self { id: m.id, sequence: m.sequence as i64, role: format!("{:?}", m.role), content: m.content, model_id: m.model_id }
    }
}

#[derive(SimpleObject)]
pub struct AgentNode {
    pub id: String,
    pub name: String,
    pub role: String,
    pub state: String,
    pub session_id: String,
    pub pinned_model: Option<String>,
}

impl From<aria_memory::AgentRecord> for AgentNode {
    fn from(a: aria_memory::AgentRecord) -> Self {
        Self { id: a.id, name: a.name, role: a.role, state: format!("{:?}", a.state), session_id: a.session_id, pinned_model: a.pinned_model }
    }
}

#[derive(SimpleObject)]
pub struct ModelNode {
    pub id: String,
    pub display_name: String,
    pub provider: String,
    pub tier: String,
}

#[derive(SimpleObject)]
pub struct CronJobNode {
    pub name: String,
    pub schedule: String,
    pub skill: String,
    pub action: String,
    pub consecutive_failures: i32,
}

#[derive(SimpleObject)]
pub struct DelegationNode {
    pub agent_id: String,
    pub model: String,
    pub status: String,
    pub result: String,
    pub tokens_used: i64,
    pub duration_ms: i64,
}

pub struct QueryRoot;

#[Object]
impl QueryRoot {
    async fn sessions(&self, ctx: &Context<'_>) -> async_graphql::Result<Vec<SessionNode>> {
        let state = ctx.data_unchecked::<AppState>();
        let sessions = state.sessions.list_sessions(aria_core::ListFilter::default()).await.map_err(|e| GatewayError::new(e, CorrelationId::new()))?;
        Ok(sessions.into_iter().map(SessionNode::from).collect())
    }

    async fn session(&self, ctx: &Context<'_>, id: String) -> async_graphql::Result<Option<SessionNode>> {
        let state = ctx.data_unchecked::<AppState>();
        let session = state.store.get_session(&id).await.map_err(|e| GatewayError::new(aria_core::CoreError::from(e), CorrelationId::new()))?;
        Ok(session.map(SessionNode::from))
    }

    async fn messages(&self, ctx: &Context<'_>, session_id: String) -> async_graphql::Result<Vec<MessageNode>> {
        let state = ctx.data_unchecked::<AppState>();
        let messages = state.store.list_messages(&session_id).await.map_err(|e| GatewayError::new(aria_core::CoreError::from(e), CorrelationId::new()))?;
        Ok(messages.into_iter().map(MessageNode::from).collect())
    }

    async fn agents(&self, ctx: &Context<'_>) -> async_graphql::Result<Vec<AgentNode>> {
        let state = ctx.data_unchecked::<AppState>();
        let agents = state.agent_pool.list_agents().await.map_err(|e| GatewayError::new(agent_pool_err(e), CorrelationId::new()))?;
        Ok(agents.into_iter().map(AgentNode::from).collect())
    }

    async fn models(&self, ctx: &Context<'_>) -> Vec<ModelNode> {
        let state = ctx.data_unchecked::<AppState>();
        let mut out: Vec<ModelNode> = state
            .config
            .models
            .catalog
            .iter()
            .map(|(id, entry)| ModelNode { id: id.clone(), display_name: entry.display_name.clone(), provider: entry.provider.clone(), tier: format!("{:?}", entry.tier) })
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    async fn cron_jobs(&self, ctx: &Context<'_>) -> Vec<CronJobNode> {
        let state = ctx.data_unchecked::<AppState>();
        state
            .scheduler
            .job_summaries()
            .await
            .into_iter()
            .map(|j| CronJobNode {
                name: j.name,
                schedule: j.schedule,
                skill: j.skill,
                action: j.action,
                consecutive_failures: j.consecutive_failures as i32,
            })
            .collect()
    }
}

pub struct MutationRoot;

#[Object]
impl MutationRoot {
    /// Sends a chat message and waits for the full (non-streamed) reply.
    /// Streaming consumers should use `/ws/chat/{session_id}` instead.
    async fn send_message(&self, ctx: &Context<'_>, session_id: String, content: String) -> async_graphql::Result<MessageNode> {
        let state = ctx.data_unchecked::<AppState>();
        let (turn, mut stream) = crate::http::chat::start_turn(&state.sessions, &state.model_gateway, &state.config, &session_id, content)
            .await
            .map_err(|e| GatewayError::new(e, CorrelationId::new()))?;

        while let Some(delta) = stream.next().await {
            delta.map_err(|e| GatewayError::new(e, turn.correlation_id))?;
        }

        let message = state
            .store
            .last_assistant_message(&session_id)
            .await
            .map_err(|e| GatewayError::new(aria_core::CoreError::from(e), turn.correlation_id))?
            .ok_or_else(|| GatewayError::new(aria_core::CoreError::NotFound, turn.correlation_id))?;
        Ok(MessageNode::from(message))
    }

    async fn archive_session(&self, ctx: &Context<'_>, session_id: String) -> async_graphql::Result<bool> {
        let state = ctx.data_unchecked::<AppState>();
        let archived = state.sessions.archive_session(&session_id).await.map_err(|e| GatewayError::new(e, CorrelationId::new()))?;
        Ok(archived)
    }

    async fn spawn_agent(&self, ctx: &Context<'_>, name: String, role: String, instructions: String, model: Option<String>) -> async_graphql::Result<AgentNode> {
        let state = ctx.data_unchecked::<AppState>();
        let agent = state
            .agent_pool
            .spawn_agent(&name, &role, &instructions, model)
            .await
            .map_err(|e| GatewayError::new(agent_pool_err(e), CorrelationId::new()))?;
        Ok(AgentNode::from(agent))
    }

    async fn delegate_task(&self, ctx: &Context<'_>, task: String, role: String, model: Option<String>, timeout_secs: Option<u64>) -> async_graphql::Result<DelegationNode> {
        let state = ctx.data_unchecked::<AppState>();
        let result = state
            .agent_pool
            .delegate_task(&task, &role, model, None, timeout_secs.map(Duration::from_secs), true)
            .await
            .map_err(|e| GatewayError::new(agent_pool_err(e), CorrelationId::new()))?;
        Ok(DelegationNode {
            agent_id: result.agent_id,
            model: result.model,
            status: format!("{:?}", result.status),
            result: result.result,
            tokens_used: result.tokens_used as i64,
            duration_ms: result.duration_ms as i64,
        })
    }

    async fn terminate_agent(&self, ctx: &Context<'_>, agent_id: String, archive: bool) -> async_graphql::Result<bool> {
        let state = ctx.data_unchecked::<AppState>();
        state.agent_pool.terminate(&agent_id, archive).await.map_err(|e| GatewayError::new(agent_pool_err(e), CorrelationId::new()))?;
        Ok(true)
    }
}
