// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! In-process `Store` implementation: `tokio::sync::RwLock`-guarded tables.
//!
//! This is the default backend. It satisfies every invariant in the
//! testable-properties section without an external database, which is what
//! makes the Session Manager, Agent Pool, Scheduler, and Orchestrator
//! testable with `#[tokio::test]` and no I/O.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::entities::*;
use crate::store::{Result, SessionFilter, SessionOrder, Store, StoreError};

#[derive(Default)]
struct Tables {
    sessions: HashMap<String, SessionRecord>,
    messages: HashMap<String, MessageRecord>,
    // session_id -> next sequence number
    sequences: HashMap<String, u64>,
    archived_sessions: HashMap<String, ArchivedSessionRecord>,
    archived_messages: Vec<ArchivedMessageRecord>,
    agents: HashMap<String, AgentRecord>,
    cron_jobs: HashMap<String, CronJobRecord>,
    invocations: Vec<SkillInvocationRecord>,
}

/// Default, zero-configuration `Store` backend.
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self { tables: RwLock::new(Tables::default()) }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn insert_session(&self, session: SessionRecord) -> Result<SessionRecord> {
        let mut t = self.tables.write().await;
        if t.sessions.contains_key(&session.id) {
            return Err(StoreError::Conflict(format!("session {} already exists", session.id)));
        }
        t.sessions.insert(session.id.clone(), session.clone());
        Ok(session)
    }

    async fn get_session(&self, id: &str) -> Result<Option<SessionRecord>> {
        Ok(self.tables.read().await.sessions.get(id).cloned())
    }

    async fn update_session(&self, session: SessionRecord) -> Result<()> {
        let mut t = self.tables.write().await;
        if !t.sessions.contains_key(&session.id) {
            return Err(StoreError::NotFound);
        }
        t.sessions.insert(session.id.clone(), session);
        Ok(())
    }

    async fn list_sessions(&self, filter: &SessionFilter) -> Result<Vec<SessionRecord>> {
        let t = self.tables.read().await;
        let mut rows: Vec<SessionRecord> = t
            .sessions
            .values()
            .filter(|s| filter.kind.map(|k| k == s.kind).unwrap_or(true))
            .filter(|s| filter.status.map(|st| st == s.status).unwrap_or(true))
            .filter(|s| filter.min_message_count.map(|m| s.message_count >= m).unwrap_or(true))
            .cloned()
            .collect();
        match filter.order {
            SessionOrder::CreatedDesc => rows.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
            SessionOrder::CreatedAsc => rows.sort_by(|a, b| a.created_at.cmp(&b.created_at)),
            SessionOrder::UpdatedDesc => rows.sort_by(|a, b| b.updated_at.cmp(&a.updated_at)),
        }
        let rows = rows.into_iter().skip(filter.offset);
        Ok(match filter.limit {
            Some(n) => rows.take(n).collect(),
            None => rows.collect(),
        })
    }

    async fn archive_session(&self, id: &str) -> Result<bool> {
        let mut t = self.tables.write().await;
        let Some(session) = t.sessions.remove(id) else { return Ok(false) };
        let archived_at = Utc::now();

        // Idempotent insert: a second archive of the same id is a no-op at
        // the archive-table level (the caller already observed `false`
        // because the active row was gone on the second call).
        t.archived_sessions
            .entry(id.to_string())
            .or_insert_with(|| ArchivedSessionRecord { session: session.clone(), archived_at });

        let msg_ids: Vec<String> = t
            .messages
            .values()
            .filter(|m| m.session_id == id)
            .map(|m| m.id.clone())
            .collect();
        for mid in msg_ids {
            if let Some(m) = t.messages.remove(&mid) {
                t.archived_messages.push(ArchivedMessageRecord { message: m, archived_at });
            }
        }
        t.sequences.remove(id);
        Ok(true)
    }

    async fn list_archived_sessions(&self, limit: usize, offset: usize) -> Result<Vec<ArchivedSessionRecord>> {
        let t = self.tables.read().await;
        let mut rows: Vec<ArchivedSessionRecord> = t.archived_sessions.values().cloned().collect();
        rows.sort_by(|a, b| b.archived_at.cmp(&a.archived_at));
        Ok(rows.into_iter().skip(offset).take(limit).collect())
    }

    async fn delete_ghost_sessions(&self, cutoff: chrono::DateTime<chrono::Utc>) -> Result<u64> {
        let mut t = self.tables.write().await;
        let ghost_ids: Vec<String> = t
            .sessions
            .values()
            .filter(|s| s.message_count == 0 && s.created_at < cutoff)
            .map(|s| s.id.clone())
            .collect();
        for id in &ghost_ids {
            t.sessions.remove(id);
            t.sequences.remove(id);
        }
        Ok(ghost_ids.len() as u64)
    }

    async fn delete_session(&self, id: &str) -> Result<bool> {
        let mut t = self.tables.write().await;
        let removed = t.sessions.remove(id).is_some();
        if removed {
            t.sequences.remove(id);
            let dead: Vec<String> = t.messages.values().filter(|m| m.session_id == id).map(|m| m.id.clone()).collect();
            for mid in dead {
                t.messages.remove(&mid);
            }
        }
        Ok(removed)
    }

    async fn append_message(&self, mut message: MessageRecord) -> Result<MessageRecord> {
        let mut t = self.tables.write().await;
        let Some(session) = t.sessions.get(&message.session_id).cloned() else {
            return Err(StoreError::Conflict(format!("session {} not found", message.session_id)));
        };
        if session.status != SessionStatus::Active {
            return Err(StoreError::Conflict(format!("session {} is archived", session.id)));
        }
        let seq = t.sequences.entry(message.session_id.clone()).or_insert(0);
        *seq += 1;
        message.sequence = *seq;

        t.messages.insert(message.id.clone(), message.clone());
        let mut updated = session;
        updated.message_count += 1;
        updated.updated_at = Utc::now();
        t.sessions.insert(updated.id.clone(), updated);
        Ok(message)
    }

    async fn list_messages(&self, session_id: &str) -> Result<Vec<MessageRecord>> {
        let t = self.tables.read().await;
        let mut rows: Vec<MessageRecord> = t.messages.values().filter(|m| m.session_id == session_id).cloned().collect();
        rows.sort_by_key(|m| m.sequence);
        Ok(rows)
    }

    async fn last_assistant_message(&self, session_id: &str) -> Result<Option<MessageRecord>> {
        let rows = self.list_messages(session_id).await?;
        Ok(rows.into_iter().rev().find(|m| m.role == MessageRole::Assistant))
    }

    async fn delete_message(&self, id: &str) -> Result<bool> {
        let mut t = self.tables.write().await;
        let Some(msg) = t.messages.remove(id) else { return Ok(false) };
        if let Some(session) = t.sessions.get_mut(&msg.session_id) {
            session.message_count = session.message_count.saturating_sub(1);
            session.updated_at = Utc::now();
        }
        Ok(true)
    }

    async fn insert_agent(&self, agent: AgentRecord) -> Result<AgentRecord> {
        let mut t = self.tables.write().await;
        t.agents.insert(agent.id.clone(), agent.clone());
        Ok(agent)
    }

    async fn get_agent(&self, id: &str) -> Result<Option<AgentRecord>> {
        Ok(self.tables.read().await.agents.get(id).cloned())
    }

    async fn update_agent(&self, agent: AgentRecord) -> Result<()> {
        let mut t = self.tables.write().await;
        if !t.agents.contains_key(&agent.id) {
            return Err(StoreError::NotFound);
        }
        t.agents.insert(agent.id.clone(), agent);
        Ok(())
    }

    async fn list_agents(&self) -> Result<Vec<AgentRecord>> {
        Ok(self.tables.read().await.agents.values().cloned().collect())
    }

    async fn delete_agent(&self, id: &str) -> Result<bool> {
        Ok(self.tables.write().await.agents.remove(id).is_some())
    }

    async fn upsert_cron_job(&self, job: CronJobRecord) -> Result<()> {
        self.tables.write().await.cron_jobs.insert(job.name.clone(), job);
        Ok(())
    }

    async fn get_cron_job(&self, name: &str) -> Result<Option<CronJobRecord>> {
        Ok(self.tables.read().await.cron_jobs.get(name).cloned())
    }

    async fn list_cron_jobs(&self) -> Result<Vec<CronJobRecord>> {
        Ok(self.tables.read().await.cron_jobs.values().cloned().collect())
    }

    async fn record_skill_invocation(&self, invocation: SkillInvocationRecord) -> Result<()> {
        self.tables.write().await.invocations.push(invocation);
        Ok(())
    }

    async fn recent_skill_invocations(&self, skill: &str, limit: usize) -> Result<Vec<SkillInvocationRecord>> {
        let t = self.tables.read().await;
        let mut rows: Vec<SkillInvocationRecord> =
            t.invocations.iter().filter(|i| i.skill == skill).cloned().collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn ping(&self) -> Result<()> {
        let _ = self.tables.read().await;
        Ok(())
    }
}
