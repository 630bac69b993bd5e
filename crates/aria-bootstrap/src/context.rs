// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! [`CoreContext`]: the single constructed object that owns every
//! component of the cognitive core and is passed by reference to callers
//! instead of reaching for a module-level singleton.

use std::sync::Arc;

use aria_config::Config;
use aria_core::SessionManager;
use aria_memory::Store;
use aria_model::{CompletionRequest, Message, ModelGateway, ResponseEvent};
use aria_scheduler::Scheduler;
use aria_skills::{Skill, SkillError, SkillLayer, SkillRegistry};
use aria_team::{AgentPool, GatewayModelRunner};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;

use crate::title::GatewayTitleSummarizer;

/// Registers the LLM Gateway under the skill framework's uniform
/// `invoke(action, args)` contract (§4.2: "the gateway is a specialized
/// skill"). `action` is interpreted as the model id to use, or the literal
/// string `"auto"` to let the gateway's tier selection choose.
struct LlmGatewaySkill {
    gateway: Arc<ModelGateway>,
    config: Arc<Config>,
}

#[async_trait]
impl Skill for LlmGatewaySkill {
    fn name(&self) -> &str {
        "llm_gateway"
    }

    fn layer(&self) -> SkillLayer {
        SkillLayer::LEAF
    }

    async fn invoke(&self, action: &str, args: Value) -> Result<Value, SkillError> {
        let prompt = args
            .get("prompt")
            .and_then(|v| v.as_str())
            .ok_or_else(|| SkillError::Permanent("missing `prompt` argument".into()))?;

        let model_id = if action == "auto" {
            self.gateway
                .select(&self.config)
                .ok_or_else(|| SkillError::Transient("no model available".into()))?
        } else {
            action.to_string()
        };

        let req = CompletionRequest { messages: vec![Message::user(prompt)], tools: vec![], stream: false, system_dynamic_suffix: None };
        let mut stream = self.gateway.complete(&self.config, &model_id, req).await.map_err(|e| {
            let core_err = aria_core::CoreError::from(e);
            // Validation (e.g. unknown model) is a caller mistake, not worth
            // retrying; everything else (rate limit, circuit open, timeout,
            // transient) is.
            if matches!(core_err, aria_core::CoreError::Validation { .. }) {
                SkillError::Permanent(core_err.to_string())
            } else {
                SkillError::Transient(core_err.to_string())
            }
        })?;

        let mut text = String::new();
        while let Some(event) = stream.next().await {
            match event.map_err(|e| SkillError::Transient(e.to_string()))? {
                ResponseEvent::TextDelta(delta) => text.push_str(&delta),
                ResponseEvent::Done => break,
                ResponseEvent::Error(e) => return Err(SkillError::Transient(e)),
                _ => {}
            }
        }
        Ok(serde_json::json!({ "text": text, "model": model_id }))
    }
}

/// Owns every long-lived component of the cognitive core. Constructed once
/// per process (or once per test) from a [`Config`]; every HTTP handler,
/// WebSocket bridge, GraphQL resolver, and scheduler task receives a
/// reference to the same instance rather than touching global state.
pub struct CoreContext {
    pub config: Arc<Config>,
    pub store: Arc<dyn Store>,
    pub sessions: Arc<SessionManager>,
    pub model_gateway: Arc<ModelGateway>,
    pub skills: Arc<SkillRegistry>,
    pub agent_pool: Arc<AgentPool>,
    pub scheduler: Arc<Scheduler>,
    /// Process start time, for the `/health` endpoint's `uptime_s`.
    pub started_at: std::time::Instant,
}

impl CoreContext {
    /// Construct every component in dependency order (leaves first, per the
    /// data-flow ordering in §2): persistence, then the skill framework and
    /// LLM gateway, then the session manager, then the agent pool, then the
    /// scheduler.
    pub fn build(config: Config) -> anyhow::Result<Self> {
        let config = Arc::new(config);

        let store = aria_memory::build_store(&config)?;
        let model_gateway = ModelGateway::new();

        let summarizer = Arc::new(GatewayTitleSummarizer::new(model_gateway.clone(), config.clone()));
        let sessions = Arc::new(SessionManager::new(store.clone(), config.sessions.clone()).with_summarizer(summarizer));

        let mut skills = SkillRegistry::new();
        skills
            .register(Arc::new(LlmGatewaySkill { gateway: model_gateway.clone(), config: config.clone() }), &[])
            .map_err(|e| anyhow::anyhow!("registering llm_gateway skill: {e}"))?;
        let skills = Arc::new(skills);

        let runner = Arc::new(GatewayModelRunner { gateway: model_gateway.clone(), config: config.clone() });
        let agent_pool = Arc::new(AgentPool::new(store.clone(), sessions.clone(), runner, config.agents.clone()));

        let scheduler = Arc::new(Scheduler::new(config.scheduler.clone(), agent_pool.clone(), skills.clone(), sessions.clone())?);

        Ok(Self { config, store, sessions, model_gateway, skills, agent_pool, scheduler, started_at: std::time::Instant::now() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn context_builds_from_default_config() {
        let ctx = CoreContext::build(Config::default()).unwrap();
        assert!(ctx.store.ping().await.is_ok());
    }

    #[tokio::test]
    async fn llm_gateway_skill_answers_through_safe_execute() {
        let ctx = CoreContext::build(Config::default()).unwrap();
        let outcome = ctx.skills.safe_execute("llm_gateway", "auto", serde_json::json!({"prompt": "hi"})).await.unwrap();
        assert!(outcome.ok);
    }
}
