// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Roundtable (sequential turns + synthesis) and Swarm (parallel dispatch +
//! deterministic merge) coordination over N participant agents, sharing one
//! substrate via the pluggable [`policy::TurnOrderPolicy`] seam.

pub mod policy;

use std::sync::Arc;
use std::time::{Duration, Instant};

use aria_config::{OrchestratorConfig, SynthesisMode};
use aria_core::{CoreError, CorrelationId, SessionManager};
use aria_memory::{MessageRole, SessionKind};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::agent::{AgentPool, AgentPoolError, DelegationStatus};
use policy::{DeclaredOrder, TurnOrderPolicy};

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Participant {
    /// Short handle used in slash commands (`@scout`).
    pub alias: String,
    pub agent_name: String,
    pub model: Option<String>,
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("unknown participant alias: {0}")]
    UnknownAlias(String),
    #[error(transparent)]
    Pool(#[from] AgentPoolError),
    #[error(transparent)]
    Core(#[from] CoreError),
}

#[derive(Debug, Clone)]
pub struct Turn {
    pub round: u32,
    pub participant: String,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct RoundtableResult {
    pub session_id: String,
    pub transcript: Vec<Turn>,
    pub synthesis: String,
}

pub struct Roundtable {
    pool: Arc<AgentPool>,
    sessions: Arc<SessionManager>,
    config: OrchestratorConfig,
    policy: Arc<dyn TurnOrderPolicy>,
}

impl Roundtable {
    pub fn new(pool: Arc<AgentPool>, sessions: Arc<SessionManager>, config: OrchestratorConfig) -> Self {
        Self { pool, sessions, config, policy: Arc::new(DeclaredOrder) }
    }

    pub fn with_policy(mut self, policy: Arc<dyn TurnOrderPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Runs `rounds` sequential rounds over `participants`, then a final
    /// synthesis call summarizing consensus/dissent.
    #[instrument(skip(self, participants))]
    pub async fn run(&self, topic: &str, participants: Vec<Participant>) -> Result<RoundtableResult, OrchestratorError> {
        let session = self
            .sessions
            .create_session(SessionKind::Roundtable, None, None, CorrelationId::new())
            .await?;
        self.sessions
            .append_message(&session.id, MessageRole::User, topic.to_string(), None, None, CorrelationId::new())
            .await?;

        let per_agent_timeout = Duration::from_secs(self.config.per_agent_timeout_secs);
        let mut transcript: Vec<Turn> = Vec::new();

        for round in 0..self.config.rounds {
            for idx in self.policy.order(&participants, round) {
                let p = &participants[idx];
                let context = render_transcript(&transcript);
                let prompt = format!(
                    "Topic: {topic}\n\nDiscussion so far:\n{context}\n\nYou are {}. Offer your perspective.",
                    p.agent_name
                );
                let outcome = self
                    .pool
                    .delegate_task(&prompt, &p.agent_name, p.model.clone(), None, Some(per_agent_timeout), true)
                    .await?;
                if outcome.status == DelegationStatus::Error {
                    warn!(participant = %p.agent_name, round, "roundtable participant turn failed");
                }
                transcript.push(Turn { round, participant: p.agent_name.clone(), content: outcome.result });
            }
        }

        let synthesis_prompt = match self.config.synthesis_mode {
            SynthesisMode::Analysis => format!(
                "Summarize the consensus and the points of dissent from this discussion:\n{}",
                render_transcript(&transcript)
            ),
            SynthesisMode::Narrative => format!(
                "Narrate how this discussion unfolded and how it concluded:\n{}",
                render_transcript(&transcript)
            ),
        };
        let synthesis = self.pool.delegate_task(&synthesis_prompt, "synthesizer", None, None, Some(per_agent_timeout), true).await?;

        self.sessions
            .append_message(&session.id, MessageRole::Assistant, synthesis.result.clone(), None, None, CorrelationId::new())
            .await?;

        info!(session_id = %session.id, turns = transcript.len(), "roundtable complete");
        Ok(RoundtableResult { session_id: session.id, transcript, synthesis: synthesis.result })
    }

    /// Resolves a `/rt @a @b …topic` slash command against known aliases.
    /// Unknown aliases are reported back as an error without creating a
    /// roundtable session.
    pub fn parse_slash_command(command: &str, known: &[Participant]) -> Result<(Vec<Participant>, String), OrchestratorError> {
        let rest = command.trim_start().strip_prefix("/rt").unwrap_or(command).trim();
        let mut aliases = Vec::new();
        let mut topic_start = 0;
        for token in rest.split_whitespace() {
            if let Some(alias) = token.strip_prefix('@') {
                let participant = known
                    .iter()
                    .find(|p| p.alias == alias)
                    .cloned()
                    .ok_or_else(|| OrchestratorError::UnknownAlias(alias.to_string()))?;
                aliases.push(participant);
                topic_start += token.len() + 1;
            } else {
                break;
            }
        }
        let topic = rest.get(topic_start.min(rest.len())..).unwrap_or("").trim().to_string();
        Ok((aliases, topic))
    }
}

fn render_transcript(turns: &[Turn]) -> String {
    turns.iter().map(|t| format!("[round {}] {}: {}", t.round, t.participant, t.content)).collect::<Vec<_>>().join("\n")
}

#[derive(Debug, Clone)]
pub struct WorkerRecap {
    pub agent_name: String,
    pub model: String,
    pub tokens_used: u64,
    pub duration_ms: u64,
    pub output: String,
}

#[derive(Debug, Clone)]
pub struct SwarmResult {
    pub session_id: String,
    pub merged_output: String,
    pub total_tokens: u64,
    pub total_duration_ms: u64,
    pub recap: Vec<WorkerRecap>,
}

pub struct Swarm {
    pool: Arc<AgentPool>,
    sessions: Arc<SessionManager>,
}

impl Swarm {
    pub fn new(pool: Arc<AgentPool>, sessions: Arc<SessionManager>) -> Self {
        Self { pool, sessions }
    }

    /// Dispatches `tasks` concurrently, one per worker, waits for all (or
    /// timeout), then merges by sorting worker outputs by participant name
    /// for a deterministic result independent of completion order.
    #[instrument(skip(self, tasks))]
    pub async fn run(&self, tasks: Vec<(Participant, String)>, timeout: Duration) -> Result<SwarmResult, OrchestratorError> {
        let session = self.sessions.create_session(SessionKind::Swarm, None, None, CorrelationId::new()).await?;
        let started = Instant::now();

        let futures = tasks.into_iter().map(|(participant, task)| {
            let pool = self.pool.clone();
            async move {
                let outcome = pool.delegate_task(&task, &participant.agent_name, participant.model.clone(), None, Some(timeout), true).await;
                (participant, outcome)
            }
        });
        let results = futures::future::join_all(futures).await;

        let mut recap: Vec<WorkerRecap> = Vec::new();
        for (participant, outcome) in results {
            match outcome {
                Ok(o) => recap.push(WorkerRecap {
                    agent_name: participant.agent_name,
                    model: o.model,
                    tokens_used: o.tokens_used,
                    duration_ms: o.duration_ms,
                    output: o.result,
                }),
                Err(e) => {
                    warn!(participant = %participant.agent_name, error = %e, "swarm worker failed");
                    recap.push(WorkerRecap {
                        agent_name: participant.agent_name,
                        model: participant.model.unwrap_or_default(),
                        tokens_used: 0,
                        duration_ms: 0,
                        output: format!("error: {e}"),
                    });
                }
            }
        }
        recap.sort_by(|a, b| a.agent_name.cmp(&b.agent_name));

        let merged_output = recap.iter().map(|r| format!("{}: {}", r.agent_name, r.output)).collect::<Vec<_>>().join("\n\n");
        let total_tokens = recap.iter().map(|r| r.tokens_used).sum();
        let total_duration_ms = started.elapsed().as_millis() as u64;

        let recap_json = serde_json::json!({
            "workers": recap.iter().map(|r| serde_json::json!({
                "agent_name": r.agent_name,
                "model": r.model,
                "tokens_used": r.tokens_used,
                "duration_ms": r.duration_ms,
                "output": r.output,
            })).collect::<Vec<_>>(),
            "merged_output": merged_output,
            "total_tokens": total_tokens,
            "total_duration_ms": total_duration_ms,
        });
        self.sessions
            .append_message(&session.id, MessageRole::System, recap_json.to_string(), None, None, CorrelationId::new())
            .await?;

        Ok(SwarmResult { session_id: session.id, merged_output, total_tokens, total_duration_ms, recap })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aria_memory::{InMemoryStore, Store};
    use crate::agent::ModelRunner;
    use aria_model::Message as ModelMessage;
    use std::sync::Arc;

    struct NamedRunner;

    #[async_trait::async_trait]
    impl ModelRunner for NamedRunner {
        async fn run(&self, _model: Option<&str>, messages: Vec<ModelMessage>) -> Result<(String, u64), AgentPoolError> {
            let last = messages.last().and_then(|m| m.as_text()).unwrap_or("").to_string();
            Ok((format!("reply to: {last}"), 5))
        }
    }

    fn harness() -> (Arc<AgentPool>, Arc<SessionManager>) {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let sessions = Arc::new(SessionManager::new(store.clone(), Default::default()));
        let pool = Arc::new(AgentPool::new(store, sessions.clone(), Arc::new(NamedRunner), Default::default()));
        (pool, sessions)
    }

    fn participants() -> Vec<Participant> {
        vec![
            Participant { alias: "a".into(), agent_name: "alice".into(), model: None },
            Participant { alias: "b".into(), agent_name: "bob".into(), model: None },
        ]
    }

    #[tokio::test]
    async fn roundtable_produces_one_turn_per_participant_per_round() {
        let (pool, sessions) = harness();
        let rt = Roundtable::new(pool, sessions, OrchestratorConfig { rounds: 2, ..Default::default() });
        let result = rt.run("should we ship?", participants()).await.unwrap();
        assert_eq!(result.transcript.len(), 4);
        assert!(!result.synthesis.is_empty());
    }

    #[tokio::test]
    async fn roundtable_honors_declared_order_within_a_round() {
        let (pool, sessions) = harness();
        let rt = Roundtable::new(pool, sessions, OrchestratorConfig { rounds: 1, ..Default::default() });
        let result = rt.run("topic", participants()).await.unwrap();
        assert_eq!(result.transcript[0].participant, "alice");
        assert_eq!(result.transcript[1].participant, "bob");
    }

    #[test]
    fn slash_command_resolves_known_aliases() {
        let known = participants();
        let (resolved, topic) = Roundtable::parse_slash_command("/rt @a @b should we ship?", &known).unwrap();
        assert_eq!(resolved.len(), 2);
        assert_eq!(topic, "should we ship?");
    }

    #[test]
    fn slash_command_unknown_alias_errors() {
        let known = participants();
        let err = Roundtable::parse_slash_command("/rt @a @ghost topic", &known).unwrap_err();
        assert!(matches!(err, OrchestratorError::UnknownAlias(a) if a == "ghost"));
    }

    #[tokio::test]
    async fn swarm_merges_outputs_sorted_by_agent_name() {
        let (pool, sessions) = harness();
        let swarm = Swarm::new(pool, sessions);
        let tasks = vec![
            (Participant { alias: "z".into(), agent_name: "zeta".into(), model: None }, "task z".to_string()),
            (Participant { alias: "a".into(), agent_name: "alpha".into(), model: None }, "task a".to_string()),
        ];
        let result = swarm.run(tasks, Duration::from_secs(5)).await.unwrap();
        assert_eq!(result.recap[0].agent_name, "alpha");
        assert_eq!(result.recap[1].agent_name, "zeta");
        assert!(result.merged_output.find("alpha").unwrap() < result.merged_output.find("zeta").unwrap());
    }

    #[tokio::test]
    async fn swarm_total_tokens_sums_workers() {
        let (pool, sessions) = harness();
        let swarm = Swarm::new(pool, sessions);
        let tasks = vec![
            (Participant { alias: "a".into(), agent_name: "alpha".into(), model: None }, "task".to_string()),
            (Participant { alias: "b".into(), agent_name: "beta".into(), model: None }, "task".to_string()),
        ];
        let result = swarm.run(tasks, Duration::from_secs(5)).await.unwrap();
        assert_eq!(result.total_tokens, 10);
    }
}
