// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The persistence gateway's typed storage contract.
//!
//! `Store` is the only way any component reads or writes session, message,
//! agent, or cron-job state. It is schema-partitioned by collection method,
//! not by a single opaque query interface, so each owning component (Session
//! Manager, Agent Pool, Scheduler) only ever touches the methods for its own
//! partition.

use async_trait::async_trait;
use thiserror::Error;

use crate::entities::*;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,
    #[error("conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Ordering for `list_sessions`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOrder {
    #[default]
    CreatedDesc,
    CreatedAsc,
    UpdatedDesc,
}

/// Filter applied by [`Store::list_sessions`]. `None` fields are unconstrained.
#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
    pub kind: Option<SessionKind>,
    pub status: Option<SessionStatus>,
    pub min_message_count: Option<u64>,
    pub order: SessionOrder,
    pub limit: Option<usize>,
    pub offset: usize,
}

/// The persistence gateway's typed async storage contract.
///
/// Two implementations ship: [`crate::memory_store::InMemoryStore`] (default,
/// used in tests) and, behind the `sqlite` feature,
/// [`crate::sqlite_store::SqliteStore`]. Callers are agnostic to which
/// backend is active.
#[async_trait]
pub trait Store: Send + Sync {
    // ── Sessions ──────────────────────────────────────────────────────────

    async fn insert_session(&self, session: SessionRecord) -> Result<SessionRecord>;
    async fn get_session(&self, id: &str) -> Result<Option<SessionRecord>>;
    /// Full replace of a session row. Fails with `NotFound` if the row is
    /// gone (e.g. concurrently archived).
    async fn update_session(&self, session: SessionRecord) -> Result<()>;
    async fn list_sessions(&self, filter: &SessionFilter) -> Result<Vec<SessionRecord>>;

    /// Archive is all-or-nothing: insert into the archive tables (idempotent
    /// `ON CONFLICT DO NOTHING` semantics) then delete from the active
    /// tables, both within one transaction. Returns `true` iff an active
    /// row existed to archive.
    async fn archive_session(&self, id: &str) -> Result<bool>;
    async fn list_archived_sessions(&self, limit: usize, offset: usize) -> Result<Vec<ArchivedSessionRecord>>;

    /// Delete active sessions matching `message_count = 0 AND created_at <
    /// cutoff` and return how many were removed. The comparison is
    /// evaluated at the moment the delete executes, not when `cutoff` was
    /// computed, so sessions that receive their first message in between
    /// are preserved.
    async fn delete_ghost_sessions(&self, cutoff: chrono::DateTime<chrono::Utc>) -> Result<u64>;

    /// Hard-delete a session row with no archival. Used by agent cleanup
    /// when `cleanup=true` and the session has zero messages.
    async fn delete_session(&self, id: &str) -> Result<bool>;

    // ── Messages ──────────────────────────────────────────────────────────

    /// Insert a message, assigning the next sequence number for its session
    /// and atomically incrementing the owning session's `message_count`.
    /// Fails with `Conflict` if the session is archived or missing.
    async fn append_message(&self, message: MessageRecord) -> Result<MessageRecord>;
    async fn list_messages(&self, session_id: &str) -> Result<Vec<MessageRecord>>;
    async fn last_assistant_message(&self, session_id: &str) -> Result<Option<MessageRecord>>;
    /// Delete a message and decrement the owning session's `message_count`.
    async fn delete_message(&self, id: &str) -> Result<bool>;

    // ── Agents ────────────────────────────────────────────────────────────

    async fn insert_agent(&self, agent: AgentRecord) -> Result<AgentRecord>;
    async fn get_agent(&self, id: &str) -> Result<Option<AgentRecord>>;
    async fn update_agent(&self, agent: AgentRecord) -> Result<()>;
    async fn list_agents(&self) -> Result<Vec<AgentRecord>>;
    async fn delete_agent(&self, id: &str) -> Result<bool>;

    // ── Cron jobs ─────────────────────────────────────────────────────────

    async fn upsert_cron_job(&self, job: CronJobRecord) -> Result<()>;
    async fn get_cron_job(&self, name: &str) -> Result<Option<CronJobRecord>>;
    async fn list_cron_jobs(&self) -> Result<Vec<CronJobRecord>>;

    // ── Skill invocations (telemetry) ────────────────────────────────────

    async fn record_skill_invocation(&self, invocation: SkillInvocationRecord) -> Result<()>;
    async fn recent_skill_invocations(&self, skill: &str, limit: usize) -> Result<Vec<SkillInvocationRecord>>;

    /// Liveness probe used by the health endpoint (`SELECT 1` equivalent).
    async fn ping(&self) -> Result<()>;
}
