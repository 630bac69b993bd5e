// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! HTTP, WebSocket, and GraphQL entry points: the transport boundary that
//! turns a [`aria_bootstrap::CoreContext`] into a servable `axum` app, gated
//! by the API-key, CSRF, security-header, and prompt-injection-scan
//! middleware defined under [`http`].

pub mod error;
pub mod gateway;
pub mod http;

use std::sync::Arc;

use aria_config::Config;
use aria_core::SessionManager;
use aria_memory::Store;
use aria_model::ModelGateway;
use aria_scheduler::Scheduler;
use aria_skills::SkillRegistry;
use aria_team::AgentPool;

pub use error::GatewayError;
pub use gateway::run;
pub use http::auth::AuthState;

/// Axum router state: one instance per process, cloned (cheaply, via `Arc`
/// fields) into every handler.
#[derive(Clone)]
pub struct AppState {
    pub auth: AuthState,
    pub config: Arc<Config>,
    pub store: Arc<dyn Store>,
    pub sessions: Arc<SessionManager>,
    pub model_gateway: Arc<ModelGateway>,
    pub skills: Arc<SkillRegistry>,
    pub agent_pool: Arc<AgentPool>,
    pub scheduler: Arc<Scheduler>,
    pub started_at: std::time::Instant,
}

impl AppState {
    pub fn from_context(ctx: &aria_bootstrap::CoreContext, auth: AuthState) -> Self {
        Self {
            auth,
            config: ctx.config.clone(),
            store: ctx.store.clone(),
            sessions: ctx.sessions.clone(),
            model_gateway: ctx.model_gateway.clone(),
            skills: ctx.skills.clone(),
            agent_pool: ctx.agent_pool.clone(),
            scheduler: ctx.scheduler.clone(),
            started_at: ctx.started_at,
        }
    }
}
