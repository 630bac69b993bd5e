// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Typed row shapes for every collection the persistence gateway exposes.
//!
//! These are plain data records, not domain objects: the Session Manager,
//! Agent Pool, and Scheduler each wrap the record shapes they own with their
//! own invariants. Keeping the records here (rather than in each owning
//! crate) is what lets a single `Store` implementation back all of them
//! without a dependency cycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of conversational session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    Chat,
    Roundtable,
    Swarm,
    Cron,
    Internal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Archived,
}

/// A unit of conversation, owned exclusively by the Session Manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub kind: SessionKind,
    pub agent_id: Option<String>,
    pub model_override: Option<String>,
    pub title: Option<String>,
    pub message_count: u64,
    pub status: SessionStatus,
    pub parent_session_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub metadata: serde_json::Value,
}

impl SessionRecord {
    pub fn new(id: String, kind: SessionKind, agent_id: Option<String>, model_override: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            kind,
            agent_id,
            model_override,
            title: None,
            message_count: 0,
            status: SessionStatus::Active,
            parent_session_id: None,
            created_at: now,
            updated_at: now,
            metadata: serde_json::Value::Object(Default::default()),
        }
    }

    /// A session is a ghost iff it has no messages and has aged past `ttl`.
    pub fn is_ghost(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> bool {
        self.message_count == 0 && self.created_at < now - ttl
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
    Tool,
}

/// An ordered entry in a session's transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: String,
    pub session_id: String,
    /// Strictly increasing within a session, assigned by the store.
    pub sequence: u64,
    pub role: MessageRole,
    pub content: String,
    pub agent_id: Option<String>,
    pub model_id: Option<String>,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchivedSessionRecord {
    pub session: SessionRecord,
    pub archived_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchivedMessageRecord {
    pub message: MessageRecord,
    pub archived_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentState {
    Spawning,
    Idle,
    Busy,
    Completed,
    Failed,
    Terminated,
}

/// A runtime worker bound to a session and (optionally) a pinned model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: String,
    pub name: String,
    pub role: String,
    pub instructions: String,
    pub pinned_model: Option<String>,
    pub session_id: String,
    pub state: AgentState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Outcome of a cron job's most recent run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobOutcome {
    Ok,
    Error,
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronJobRecord {
    pub name: String,
    pub schedule: String,
    pub skill: String,
    pub action: String,
    pub model: Option<String>,
    pub args: serde_json::Value,
    pub next_run: Option<DateTime<Utc>>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_run_outcome: Option<JobOutcome>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationOutcome {
    Ok,
    Error,
    CircuitOpen,
    Timeout,
}

/// Telemetry record for one `safe_execute` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillInvocationRecord {
    pub id: String,
    pub skill: String,
    pub action: String,
    pub duration_ms: u64,
    pub outcome: InvocationOutcome,
    pub correlation_id: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_is_active_with_zero_messages() {
        let s = SessionRecord::new("s1".into(), SessionKind::Chat, None, None);
        assert_eq!(s.message_count, 0);
        assert_eq!(s.status, SessionStatus::Active);
    }

    #[test]
    fn ghost_detection_respects_message_count() {
        let mut s = SessionRecord::new("s1".into(), SessionKind::Chat, None, None);
        s.created_at = Utc::now() - chrono::Duration::minutes(30);
        assert!(s.is_ghost(Utc::now(), chrono::Duration::minutes(15)));
        s.message_count = 1;
        assert!(!s.is_ghost(Utc::now(), chrono::Duration::minutes(15)));
    }

    #[test]
    fn ghost_detection_respects_age() {
        let mut s = SessionRecord::new("s1".into(), SessionKind::Chat, None, None);
        s.created_at = Utc::now();
        assert!(!s.is_ghost(Utc::now(), chrono::Duration::minutes(15)));
    }
}
