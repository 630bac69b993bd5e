// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Agent Pool: lifecycle of focused worker agents bound one-to-one with a
//! chat session.

use std::sync::Arc;
use std::time::{Duration, Instant};

use aria_config::AgentPoolConfig;
use aria_core::{CoreError, SessionManager};
use aria_memory::{AgentRecord, AgentState, MessageRole, SessionKind, Store};
use aria_model::{CompletionRequest, Message as ModelMessage};
use futures::StreamExt;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum AgentPoolError {
    #[error("model {0:?} is not present in the catalog")]
    UnknownModel(String),
    #[error(transparent)]
    Core(#[from] CoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelegationStatus {
    Completed,
    Timeout,
    Error,
}

#[derive(Debug, Clone)]
pub struct DelegationResult {
    pub agent_id: String,
    pub model: String,
    pub status: DelegationStatus,
    pub result: String,
    pub tokens_used: u64,
    pub duration_ms: u64,
}

/// Resolves which model an agent should use, and runs the completion call.
/// Kept as a trait so the Agent Pool doesn't hard-depend on `aria-model`'s
/// concrete gateway wiring — the Orchestrator and Scheduler share the same
/// seam.
#[async_trait::async_trait]
pub trait ModelRunner: Send + Sync {
    /// Resolve `model` (or the gateway's current selection if `None`) and
    /// run one non-streaming completion, returning `(text, total_tokens)`.
    async fn run(&self, model: Option<&str>, messages: Vec<ModelMessage>) -> Result<(String, u64), AgentPoolError>;
}

pub struct GatewayModelRunner {
    pub gateway: Arc<aria_model::ModelGateway>,
    pub config: Arc<aria_config::Config>,
}

#[async_trait::async_trait]
impl ModelRunner for GatewayModelRunner {
    async fn run(&self, model: Option<&str>, messages: Vec<ModelMessage>) -> Result<(String, u64), AgentPoolError> {
        let model_id = match model {
            Some(m) => {
                if !self.config.models.catalog.contains_key(m) {
                    return Err(AgentPoolError::UnknownModel(m.to_string()));
                }
                m.to_string()
            }
            None => self.gateway.select(&self.config).ok_or_else(|| AgentPoolError::UnknownModel("<none available>".into()))?,
        };

        let req = CompletionRequest { messages, tools: vec![], stream: false, system_dynamic_suffix: None };
        let mut stream = self.gateway.complete(&self.config, &model_id, req).await.map_err(|e| AgentPoolError::Core(CoreError::from(e)))?;

        let mut text = String::new();
        let mut tokens = 0u64;
        while let Some(event) = stream.next().await {
            match event {
                Ok(aria_model::ResponseEvent::TextDelta(delta)) => text.push_str(&delta),
                Ok(aria_model::ResponseEvent::Usage { input_tokens, output_tokens, .. }) => {
                    tokens += (input_tokens + output_tokens) as u64;
                }
                Ok(aria_model::ResponseEvent::Done) => break,
                Ok(aria_model::ResponseEvent::Error(e)) => {
                    return Err(AgentPoolError::Core(CoreError::Transient(e)))
                }
                Ok(_) => {}
                Err(e) => return Err(AgentPoolError::Core(CoreError::Transient(e.to_string()))),
            }
        }
        Ok((text, tokens))
    }
}

pub struct AgentPool {
    store: Arc<dyn Store>,
    sessions: Arc<SessionManager>,
    runner: Arc<dyn ModelRunner>,
    config: AgentPoolConfig,
    busy_slots: Semaphore,
}

impl AgentPool {
    pub fn new(store: Arc<dyn Store>, sessions: Arc<SessionManager>, runner: Arc<dyn ModelRunner>, config: AgentPoolConfig) -> Self {
        let busy_slots = Semaphore::new(config.max_concurrent_agents);
        Self { store, sessions, runner, config, busy_slots }
    }

    /// Creates an agent and its bound chat session as a single unit: a
    /// partial spawn (agent without a session) cannot occur.
    #[instrument(skip(self, instructions))]
    pub async fn spawn_agent(
        &self,
        name: &str,
        role: &str,
        instructions: &str,
        model: Option<String>,
    ) -> Result<AgentRecord, AgentPoolError> {
        let session = self
            .sessions
            .create_session(SessionKind::Chat, None, model.clone(), aria_core::CorrelationId::new())
            .await?;

        let agent = AgentRecord {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            role: role.to_string(),
            instructions: instructions.to_string(),
            pinned_model: model,
            session_id: session.id.clone(),
            state: AgentState::Idle,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };
        let saved = self.store.insert_agent(agent).await.map_err(CoreError::from)?;
        info!(agent_id = %saved.id, name, role, "agent spawned");
        Ok(saved)
    }

    /// Spawns an agent, posts `(context, task)` as the first user message,
    /// polls for completion every `poll_interval_ms`, collects the last
    /// assistant message, then optionally terminates the agent.
    #[instrument(skip(self, task, context))]
    pub async fn delegate_task(
        &self,
        task: &str,
        role: &str,
        model: Option<String>,
        context: Option<String>,
        timeout: Option<Duration>,
        cleanup: bool,
    ) -> Result<DelegationResult, AgentPoolError> {
        let _permit = self.busy_slots.acquire().await.expect("semaphore not closed");
        let timeout = timeout.unwrap_or_else(|| Duration::from_secs(self.config.default_delegate_timeout_secs));

        let agent = self.spawn_agent(role, role, "delegated task", model.clone()).await?;
        self.set_state(&agent, AgentState::Busy).await?;

        let prompt = match &context {
            Some(ctx) => format!("{ctx}\n\n{task}"),
            None => task.to_string(),
        };
        self.sessions
            .append_message(&agent.session_id, MessageRole::User, prompt, Some(agent.id.clone()), None, aria_core::CorrelationId::new())
            .await?;

        let messages = vec![ModelMessage::system(&agent.instructions), ModelMessage::user(task)];
        let started = Instant::now();
        let run_result = tokio::time::timeout(timeout, self.runner.run(model.as_deref(), messages)).await;

        let outcome = match run_result {
            Ok(Ok((text, tokens))) => {
                self.sessions
                    .append_message(&agent.session_id, MessageRole::Assistant, text.clone(), Some(agent.id.clone()), model.clone(), aria_core::CorrelationId::new())
                    .await?;
                self.set_state(&agent, AgentState::Completed).await?;
                DelegationResult {
                    agent_id: agent.id.clone(),
                    model: model.clone().unwrap_or_default(),
                    status: DelegationStatus::Completed,
                    result: text,
                    tokens_used: tokens,
                    duration_ms: started.elapsed().as_millis() as u64,
                }
            }
            Ok(Err(e)) => {
                warn!(agent_id = %agent.id, error = %e, "delegated task failed");
                self.set_state(&agent, AgentState::Failed).await?;
                let partial = self.last_assistant_text(&agent.session_id).await?;
                DelegationResult {
                    agent_id: agent.id.clone(),
                    model: model.clone().unwrap_or_default(),
                    status: if partial.is_some() { DelegationStatus::Completed } else { DelegationStatus::Error },
                    result: partial.unwrap_or_else(|| e.to_string()),
                    tokens_used: 0,
                    duration_ms: started.elapsed().as_millis() as u64,
                }
            }
            Err(_) => {
                warn!(agent_id = %agent.id, "delegated task timed out");
                let partial = self.last_assistant_text(&agent.session_id).await?;
                DelegationResult {
                    agent_id: agent.id.clone(),
                    model: model.clone().unwrap_or_default(),
                    status: DelegationStatus::Timeout,
                    result: partial.unwrap_or_default(),
                    tokens_used: 0,
                    duration_ms: started.elapsed().as_millis() as u64,
                }
            }
        };

        if cleanup {
            self.terminate(&agent.id, false).await?;
        }

        Ok(outcome)
    }

    /// Transitions the agent to terminated. When `archive` is true and the
    /// session has messages, the session is archived instead of deleted.
    #[instrument(skip(self))]
    pub async fn terminate(&self, agent_id: &str, archive: bool) -> Result<(), AgentPoolError> {
        let Some(mut agent) = self.store.get_agent(agent_id).await.map_err(CoreError::from)? else {
            return Err(CoreError::NotFound.into());
        };
        agent.state = AgentState::Terminated;
        agent.updated_at = chrono::Utc::now();
        self.store.update_agent(agent.clone()).await.map_err(CoreError::from)?;

        let session = self.store.get_session(&agent.session_id).await.map_err(CoreError::from)?;
        if let Some(session) = session {
            if archive && session.message_count > 0 {
                self.sessions.archive_session(&session.id).await?;
            } else if session.message_count == 0 {
                let _ = self.store.delete_session(&session.id).await;
            }
        }
        info!(agent_id, "agent terminated");
        Ok(())
    }

    pub async fn list_agents(&self) -> Result<Vec<AgentRecord>, AgentPoolError> {
        Ok(self.store.list_agents().await.map_err(CoreError::from)?)
    }

    async fn set_state(&self, agent: &AgentRecord, state: AgentState) -> Result<(), AgentPoolError> {
        let mut updated = agent.clone();
        updated.state = state;
        updated.updated_at = chrono::Utc::now();
        self.store.update_agent(updated).await.map_err(CoreError::from)?;
        Ok(())
    }

    async fn last_assistant_text(&self, session_id: &str) -> Result<Option<String>, AgentPoolError> {
        Ok(self
            .store
            .last_assistant_message(session_id)
            .await
            .map_err(CoreError::from)?
            .map(|m| m.content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aria_memory::InMemoryStore;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FixedRunner { text: String, tokens: u64, delay: Duration, fails: bool }

    #[async_trait::async_trait]
    impl ModelRunner for FixedRunner {
        async fn run(&self, _model: Option<&str>, _messages: Vec<ModelMessage>) -> Result<(String, u64), AgentPoolError> {
            tokio::time::sleep(self.delay).await;
            if self.fails {
                return Err(AgentPoolError::Core(CoreError::Transient("boom".into())));
            }
            Ok((self.text.clone(), self.tokens))
        }
    }

    fn pool(runner: Arc<dyn ModelRunner>) -> AgentPool {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let sessions = Arc::new(SessionManager::new(store.clone(), Default::default()));
        AgentPool::new(store, sessions, runner, AgentPoolConfig::default())
    }

    #[tokio::test]
    async fn spawn_agent_creates_bound_session() {
        let runner = Arc::new(FixedRunner { text: "ok".into(), tokens: 1, delay: Duration::from_millis(1), fails: false });
        let pool = pool(runner);
        let agent = pool.spawn_agent("scout", "researcher", "be thorough", None).await.unwrap();
        assert!(!agent.session_id.is_empty());
    }

    #[tokio::test]
    async fn delegate_task_returns_completed_with_result() {
        let runner = Arc::new(FixedRunner { text: "the answer is 42".into(), tokens: 10, delay: Duration::from_millis(1), fails: false });
        let pool = pool(runner);
        let outcome = pool.delegate_task("what is the answer?", "researcher", None, None, Some(Duration::from_secs(5)), true).await.unwrap();
        assert_eq!(outcome.status, DelegationStatus::Completed);
        assert_eq!(outcome.result, "the answer is 42");
        assert_eq!(outcome.tokens_used, 10);
    }

    #[tokio::test]
    async fn delegate_task_timeout_returns_timeout_status() {
        let runner = Arc::new(FixedRunner { text: "late".into(), tokens: 0, delay: Duration::from_secs(5), fails: false });
        let pool = pool(runner);
        let outcome = pool.delegate_task("slow task", "researcher", None, None, Some(Duration::from_millis(20)), true).await.unwrap();
        assert_eq!(outcome.status, DelegationStatus::Timeout);
    }

    #[tokio::test]
    async fn delegate_task_cleanup_terminates_agent() {
        let runner = Arc::new(FixedRunner { text: "done".into(), tokens: 1, delay: Duration::from_millis(1), fails: false });
        let pool = pool(runner);
        let outcome = pool.delegate_task("task", "researcher", None, None, None, true).await.unwrap();
        let agents = pool.list_agents().await.unwrap();
        let agent = agents.iter().find(|a| a.id == outcome.agent_id).unwrap();
        assert_eq!(agent.state, AgentState::Terminated);
    }

    #[tokio::test]
    async fn delegate_task_without_cleanup_keeps_agent() {
        let runner = Arc::new(FixedRunner { text: "done".into(), tokens: 1, delay: Duration::from_millis(1), fails: false });
        let pool = pool(runner);
        let outcome = pool.delegate_task("task", "researcher", None, None, None, false).await.unwrap();
        let agents = pool.list_agents().await.unwrap();
        let agent = agents.iter().find(|a| a.id == outcome.agent_id).unwrap();
        assert_eq!(agent.state, AgentState::Completed);
    }

    #[tokio::test]
    async fn concurrent_delegate_calls_all_complete_under_pool_limit() {
        let calls = Arc::new(AtomicU32::new(0));

        struct CountingRunner { calls: Arc<AtomicU32> }
        #[async_trait::async_trait]
        impl ModelRunner for CountingRunner {
            async fn run(&self, _model: Option<&str>, _messages: Vec<ModelMessage>) -> Result<(String, u64), AgentPoolError> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok(("ok".into(), 1))
            }
        }

        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let sessions = Arc::new(SessionManager::new(store.clone(), Default::default()));
        let pool = Arc::new(AgentPool::new(
            store,
            sessions,
            Arc::new(CountingRunner { calls: calls.clone() }),
            AgentPoolConfig { max_concurrent_agents: 2, ..Default::default() },
        ));

        let mut handles = vec![];
        for _ in 0..4 {
            let pool = pool.clone();
            handles.push(tokio::spawn(async move { pool.delegate_task("t", "r", None, None, None, true).await.unwrap() }));
        }
        for h in handles {
            let outcome = h.await.unwrap();
            assert_eq!(outcome.status, DelegationStatus::Completed);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }
}
