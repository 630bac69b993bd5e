// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Durable `Store` implementation backed by `rusqlite` (bundled + FTS5).
//!
//! Every public method offloads its blocking SQLite work onto
//! `spawn_blocking` so the async runtime is never blocked by disk I/O, per
//! the concurrency model's "a blocking filesystem scan is offloaded to a
//! worker thread" requirement. A single connection is held behind a
//! `std::sync::Mutex` — SQLite serializes writers internally anyway, and the
//! expected write volume (chat sessions, not analytics) does not warrant a
//! pool.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::entities::*;
use crate::migrations::MIGRATIONS;
use crate::store::{Result, SessionFilter, SessionOrder, Store, StoreError};

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &str) -> anyhow::Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        let store = Self { conn: Mutex::new(conn) };
        store.migrate()?;
        Ok(store)
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn: Mutex::new(conn) };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_migrations (version INTEGER PRIMARY KEY, name TEXT NOT NULL, applied_at TEXT NOT NULL);",
        )?;
        for m in MIGRATIONS {
            let applied: Option<i64> = conn
                .query_row("SELECT version FROM schema_migrations WHERE version = ?1", params![m.version], |r| r.get(0))
                .optional()?;
            if applied.is_some() {
                continue;
            }
            conn.execute_batch(m.sql)?;
            conn.execute(
                "INSERT INTO schema_migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
                params![m.version, m.name, Utc::now().to_rfc3339()],
            )?;
        }
        Ok(())
    }
}

fn session_kind_str(k: SessionKind) -> &'static str {
    match k {
        SessionKind::Chat => "chat",
        SessionKind::Roundtable => "roundtable",
        SessionKind::Swarm => "swarm",
        SessionKind::Cron => "cron",
        SessionKind::Internal => "internal",
    }
}

fn session_kind_from(s: &str) -> SessionKind {
    match s {
        "roundtable" => SessionKind::Roundtable,
        "swarm" => SessionKind::Swarm,
        "cron" => SessionKind::Cron,
        "internal" => SessionKind::Internal,
        _ => SessionKind::Chat,
    }
}

fn role_str(r: MessageRole) -> &'static str {
    match r {
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
        MessageRole::System => "system",
        MessageRole::Tool => "tool",
    }
}

fn role_from(s: &str) -> MessageRole {
    match s {
        "assistant" => MessageRole::Assistant,
        "system" => MessageRole::System,
        "tool" => MessageRole::Tool,
        _ => MessageRole::User,
    }
}

fn parse_dt(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map(|d| d.with_timezone(&Utc)).unwrap_or_else(|_| Utc::now())
}

fn row_to_session(row: &rusqlite::Row) -> rusqlite::Result<SessionRecord> {
    let kind: String = row.get("kind")?;
    let status: String = row.get("status")?;
    let metadata: String = row.get("metadata")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;
    Ok(SessionRecord {
        id: row.get("id")?,
        kind: session_kind_from(&kind),
        agent_id: row.get("agent_id")?,
        model_override: row.get("model_override")?,
        title: row.get("title")?,
        message_count: row.get::<_, i64>("message_count")? as u64,
        status: if status == "archived" { SessionStatus::Archived } else { SessionStatus::Active },
        parent_session_id: row.get("parent_session_id")?,
        created_at: parse_dt(&created_at),
        updated_at: parse_dt(&updated_at),
        metadata: serde_json::from_str(&metadata).unwrap_or(serde_json::Value::Null),
    })
}

fn row_to_message(row: &rusqlite::Row) -> rusqlite::Result<MessageRecord> {
    let role: String = row.get("role")?;
    let created_at: String = row.get("created_at")?;
    Ok(MessageRecord {
        id: row.get("id")?,
        session_id: row.get("session_id")?,
        sequence: row.get::<_, i64>("sequence")? as u64,
        role: role_from(&role),
        content: row.get("content")?,
        agent_id: row.get("agent_id")?,
        model_id: row.get("model_id")?,
        input_tokens: row.get::<_, i64>("input_tokens")? as u32,
        output_tokens: row.get::<_, i64>("output_tokens")? as u32,
        created_at: parse_dt(&created_at),
    })
}

macro_rules! blocking {
    ($self:expr, $body:expr) => {{
        let conn = $self.conn.lock().map_err(|_| StoreError::Backend(anyhow::anyhow!("sqlite mutex poisoned")))?;
        $body(&conn)
    }};
}

#[async_trait]
impl Store for SqliteStore {
    async fn insert_session(&self, session: SessionRecord) -> Result<SessionRecord> {
        blocking!(self, |conn: &Connection| -> Result<SessionRecord> {
            conn.execute(
                "INSERT INTO sessions (id, kind, agent_id, model_override, title, message_count, status, parent_session_id, created_at, updated_at, metadata)
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11)",
                params![
                    session.id, session_kind_str(session.kind), session.agent_id, session.model_override,
                    session.title, session.message_count as i64,
                    if session.status == SessionStatus::Archived { "archived" } else { "active" },
                    session.parent_session_id, session.created_at.to_rfc3339(), session.updated_at.to_rfc3339(),
                    serde_json::to_string(&session.metadata).unwrap_or_default(),
                ],
            ).map_err(|e| StoreError::Conflict(e.to_string()))?;
            Ok(session.clone())
        })
    }

    async fn get_session(&self, id: &str) -> Result<Option<SessionRecord>> {
        blocking!(self, |conn: &Connection| -> Result<Option<SessionRecord>> {
            conn.query_row("SELECT * FROM sessions WHERE id = ?1", params![id], row_to_session)
                .optional()
                .map_err(|e| StoreError::Backend(e.into()))
        })
    }

    async fn update_session(&self, session: SessionRecord) -> Result<()> {
        blocking!(self, |conn: &Connection| -> Result<()> {
            let n = conn.execute(
                "UPDATE sessions SET kind=?2, agent_id=?3, model_override=?4, title=?5, message_count=?6, status=?7, parent_session_id=?8, updated_at=?9, metadata=?10 WHERE id=?1",
                params![
                    session.id, session_kind_str(session.kind), session.agent_id, session.model_override,
                    session.title, session.message_count as i64,
                    if session.status == SessionStatus::Archived { "archived" } else { "active" },
                    session.parent_session_id, session.updated_at.to_rfc3339(),
                    serde_json::to_string(&session.metadata).unwrap_or_default(),
                ],
            ).map_err(|e| StoreError::Backend(e.into()))?;
            if n == 0 { return Err(StoreError::NotFound); }
            Ok(())
        })
    }

    async fn list_sessions(&self, filter: &SessionFilter) -> Result<Vec<SessionRecord>> {
        blocking!(self, |conn: &Connection| -> Result<Vec<SessionRecord>> {
            let order = match filter.order {
                SessionOrder::CreatedDesc => "created_at DESC",
                SessionOrder::CreatedAsc => "created_at ASC",
                SessionOrder::UpdatedDesc => "updated_at DESC",
            };
            let sql = format!("SELECT * FROM sessions ORDER BY {order}");
            let mut stmt = conn.prepare(&sql).map_err(|e| StoreError::Backend(e.into()))?;
            let rows = stmt
                .query_map([], row_to_session)
                .map_err(|e| StoreError::Backend(e.into()))?
                .filter_map(|r| r.ok())
                .filter(|s: &SessionRecord| filter.kind.map(|k| k == s.kind).unwrap_or(true))
                .filter(|s| filter.status.map(|st| st == s.status).unwrap_or(true))
                .filter(|s| filter.min_message_count.map(|m| s.message_count >= m).unwrap_or(true))
                .skip(filter.offset);
            Ok(match filter.limit {
                Some(n) => rows.take(n).collect(),
                None => rows.collect(),
            })
        })
    }

    async fn archive_session(&self, id: &str) -> Result<bool> {
        blocking!(self, |conn: &Connection| -> Result<bool> {
            let mut conn_mut = conn;
            let tx = conn_mut.unchecked_transaction().map_err(|e| StoreError::Backend(e.into()))?;
            let existing: Option<SessionRecord> = tx
                .query_row("SELECT * FROM sessions WHERE id = ?1", params![id], row_to_session)
                .optional()
                .map_err(|e| StoreError::Backend(e.into()))?;
            let Some(session) = existing else { return Ok(false) };
            let archived_at = Utc::now().to_rfc3339();

            tx.execute(
                "INSERT OR IGNORE INTO archived_sessions (id, kind, agent_id, model_override, title, message_count, status, parent_session_id, created_at, updated_at, metadata, archived_at)
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12)",
                params![
                    session.id, session_kind_str(session.kind), session.agent_id, session.model_override,
                    session.title, session.message_count as i64, "archived", session.parent_session_id,
                    session.created_at.to_rfc3339(), session.updated_at.to_rfc3339(),
                    serde_json::to_string(&session.metadata).unwrap_or_default(), archived_at,
                ],
            ).map_err(|e| StoreError::Backend(e.into()))?;

            {
                let mut stmt = tx.prepare("SELECT * FROM messages WHERE session_id = ?1").map_err(|e| StoreError::Backend(e.into()))?;
                let msgs: Vec<MessageRecord> = stmt
                    .query_map(params![id], row_to_message)
                    .map_err(|e| StoreError::Backend(e.into()))?
                    .filter_map(|r| r.ok())
                    .collect();
                for m in msgs {
                    tx.execute(
                        "INSERT OR IGNORE INTO archived_messages (id, session_id, sequence, role, content, agent_id, model_id, input_tokens, output_tokens, created_at, archived_at)
                         VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11)",
                        params![m.id, m.session_id, m.sequence as i64, role_str(m.role), m.content, m.agent_id, m.model_id, m.input_tokens as i64, m.output_tokens as i64, m.created_at.to_rfc3339(), archived_at],
                    ).map_err(|e| StoreError::Backend(e.into()))?;
                }
            }

            tx.execute("DELETE FROM messages WHERE session_id = ?1", params![id]).map_err(|e| StoreError::Backend(e.into()))?;
            tx.execute("DELETE FROM sessions WHERE id = ?1", params![id]).map_err(|e| StoreError::Backend(e.into()))?;
            tx.commit().map_err(|e| StoreError::Backend(e.into()))?;
            Ok(true)
        })
    }

    async fn list_archived_sessions(&self, limit: usize, offset: usize) -> Result<Vec<ArchivedSessionRecord>> {
        blocking!(self, |conn: &Connection| -> Result<Vec<ArchivedSessionRecord>> {
            let mut stmt = conn
                .prepare("SELECT * FROM archived_sessions ORDER BY archived_at DESC LIMIT ?1 OFFSET ?2")
                .map_err(|e| StoreError::Backend(e.into()))?;
            let rows = stmt
                .query_map(params![limit as i64, offset as i64], |row| {
                    let archived_at: String = row.get("archived_at")?;
                    Ok(ArchivedSessionRecord { session: row_to_session(row)?, archived_at: parse_dt(&archived_at) })
                })
                .map_err(|e| StoreError::Backend(e.into()))?
                .filter_map(|r| r.ok())
                .collect();
            Ok(rows)
        })
    }

    async fn delete_ghost_sessions(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        blocking!(self, |conn: &Connection| -> Result<u64> {
            let n = conn
                .execute(
                    "DELETE FROM sessions WHERE message_count = 0 AND created_at < ?1",
                    params![cutoff.to_rfc3339()],
                )
                .map_err(|e| StoreError::Backend(e.into()))?;
            Ok(n as u64)
        })
    }

    async fn delete_session(&self, id: &str) -> Result<bool> {
        blocking!(self, |conn: &Connection| -> Result<bool> {
            conn.execute("DELETE FROM messages WHERE session_id = ?1", params![id]).map_err(|e| StoreError::Backend(e.into()))?;
            let n = conn.execute("DELETE FROM sessions WHERE id = ?1", params![id]).map_err(|e| StoreError::Backend(e.into()))?;
            Ok(n > 0)
        })
    }

    async fn append_message(&self, mut message: MessageRecord) -> Result<MessageRecord> {
        blocking!(self, |conn: &Connection| -> Result<MessageRecord> {
            let mut conn_mut = conn;
            let tx = conn_mut.unchecked_transaction().map_err(|e| StoreError::Backend(e.into()))?;
            let status: Option<String> = tx
                .query_row("SELECT status FROM sessions WHERE id = ?1", params![message.session_id], |r| r.get(0))
                .optional()
                .map_err(|e| StoreError::Backend(e.into()))?;
            match status.as_deref() {
                Some("active") => {}
                Some(_) => return Err(StoreError::Conflict(format!("session {} is archived", message.session_id))),
                None => return Err(StoreError::Conflict(format!("session {} not found", message.session_id))),
            }
            let next_seq: i64 = tx
                .query_row("SELECT COALESCE(MAX(sequence), 0) + 1 FROM messages WHERE session_id = ?1", params![message.session_id], |r| r.get(0))
                .map_err(|e| StoreError::Backend(e.into()))?;
            message.sequence = next_seq as u64;
            tx.execute(
                "INSERT INTO messages (id, session_id, sequence, role, content, agent_id, model_id, input_tokens, output_tokens, created_at)
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)",
                params![message.id, message.session_id, next_seq, role_str(message.role), message.content, message.agent_id, message.model_id, message.input_tokens as i64, message.output_tokens as i64, message.created_at.to_rfc3339()],
            ).map_err(|e| StoreError::Backend(e.into()))?;
            tx.execute(
                "UPDATE sessions SET message_count = message_count + 1, updated_at = ?2 WHERE id = ?1",
                params![message.session_id, Utc::now().to_rfc3339()],
            ).map_err(|e| StoreError::Backend(e.into()))?;
            tx.commit().map_err(|e| StoreError::Backend(e.into()))?;
            Ok(message)
        })
    }

    async fn list_messages(&self, session_id: &str) -> Result<Vec<MessageRecord>> {
        blocking!(self, |conn: &Connection| -> Result<Vec<MessageRecord>> {
            let mut stmt = conn
                .prepare("SELECT * FROM messages WHERE session_id = ?1 ORDER BY sequence ASC")
                .map_err(|e| StoreError::Backend(e.into()))?;
            let rows = stmt
                .query_map(params![session_id], row_to_message)
                .map_err(|e| StoreError::Backend(e.into()))?
                .filter_map(|r| r.ok())
                .collect();
            Ok(rows)
        })
    }

    async fn last_assistant_message(&self, session_id: &str) -> Result<Option<MessageRecord>> {
        let rows = self.list_messages(session_id).await?;
        Ok(rows.into_iter().rev().find(|m| m.role == MessageRole::Assistant))
    }

    async fn delete_message(&self, id: &str) -> Result<bool> {
        blocking!(self, |conn: &Connection| -> Result<bool> {
            let mut conn_mut = conn;
            let tx = conn_mut.unchecked_transaction().map_err(|e| StoreError::Backend(e.into()))?;
            let session_id: Option<String> = tx
                .query_row("SELECT session_id FROM messages WHERE id = ?1", params![id], |r| r.get(0))
                .optional()
                .map_err(|e| StoreError::Backend(e.into()))?;
            let Some(session_id) = session_id else { return Ok(false) };
            tx.execute("DELETE FROM messages WHERE id = ?1", params![id]).map_err(|e| StoreError::Backend(e.into()))?;
            tx.execute(
                "UPDATE sessions SET message_count = MAX(message_count - 1, 0), updated_at = ?2 WHERE id = ?1",
                params![session_id, Utc::now().to_rfc3339()],
            ).map_err(|e| StoreError::Backend(e.into()))?;
            tx.commit().map_err(|e| StoreError::Backend(e.into()))?;
            Ok(true)
        })
    }

    async fn insert_agent(&self, agent: AgentRecord) -> Result<AgentRecord> {
        blocking!(self, |conn: &Connection| -> Result<AgentRecord> {
            conn.execute(
                "INSERT INTO agents (id, name, role, instructions, pinned_model, session_id, state, created_at, updated_at) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)",
                params![agent.id, agent.name, agent.role, agent.instructions, agent.pinned_model, agent.session_id, format!("{:?}", agent.state).to_lowercase(), agent.created_at.to_rfc3339(), agent.updated_at.to_rfc3339()],
            ).map_err(|e| StoreError::Backend(e.into()))?;
            Ok(agent)
        })
    }

    async fn get_agent(&self, id: &str) -> Result<Option<AgentRecord>> {
        blocking!(self, |conn: &Connection| -> Result<Option<AgentRecord>> {
            conn.query_row("SELECT * FROM agents WHERE id = ?1", params![id], row_to_agent)
                .optional()
                .map_err(|e| StoreError::Backend(e.into()))
        })
    }

    async fn update_agent(&self, agent: AgentRecord) -> Result<()> {
        blocking!(self, |conn: &Connection| -> Result<()> {
            let n = conn.execute(
                "UPDATE agents SET name=?2, role=?3, instructions=?4, pinned_model=?5, session_id=?6, state=?7, updated_at=?8 WHERE id=?1",
                params![agent.id, agent.name, agent.role, agent.instructions, agent.pinned_model, agent.session_id, format!("{:?}", agent.state).to_lowercase(), agent.updated_at.to_rfc3339()],
            ).map_err(|e| StoreError::Backend(e.into()))?;
            if n == 0 { return Err(StoreError::NotFound); }
            Ok(())
        })
    }

    async fn list_agents(&self) -> Result<Vec<AgentRecord>> {
        blocking!(self, |conn: &Connection| -> Result<Vec<AgentRecord>> {
            let mut stmt = conn.prepare("SELECT * FROM agents").map_err(|e| StoreError::Backend(e.into()))?;
            let rows = stmt.query_map([], row_to_agent).map_err(|e| StoreError::Backend(e.into()))?.filter_map(|r| r.ok()).collect();
            Ok(rows)
        })
    }

    async fn delete_agent(&self, id: &str) -> Result<bool> {
        blocking!(self, |conn: &Connection| -> Result<bool> {
            let n = conn.execute("DELETE FROM agents WHERE id = ?1", params![id]).map_err(|e| StoreError::Backend(e.into()))?;
            Ok(n > 0)
        })
    }

    async fn upsert_cron_job(&self, job: CronJobRecord) -> Result<()> {
        blocking!(self, |conn: &Connection| -> Result<()> {
            conn.execute(
                "INSERT INTO cron_jobs (name, schedule, skill, action, model, args, next_run, last_run_at, last_run_outcome)
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)
                 ON CONFLICT(name) DO UPDATE SET schedule=excluded.schedule, skill=excluded.skill, action=excluded.action, model=excluded.model, args=excluded.args, next_run=excluded.next_run, last_run_at=excluded.last_run_at, last_run_outcome=excluded.last_run_outcome",
                params![
                    job.name, job.schedule, job.skill, job.action, job.model,
                    serde_json::to_string(&job.args).unwrap_or_default(),
                    job.next_run.map(|d| d.to_rfc3339()), job.last_run_at.map(|d| d.to_rfc3339()),
                    job.last_run_outcome.map(|o| format!("{:?}", o).to_lowercase()),
                ],
            ).map_err(|e| StoreError::Backend(e.into()))?;
            Ok(())
        })
    }

    async fn get_cron_job(&self, name: &str) -> Result<Option<CronJobRecord>> {
        blocking!(self, |conn: &Connection| -> Result<Option<CronJobRecord>> {
            conn.query_row("SELECT * FROM cron_jobs WHERE name = ?1", params![name], row_to_cron_job)
                .optional()
                .map_err(|e| StoreError::Backend(e.into()))
        })
    }

    async fn list_cron_jobs(&self) -> Result<Vec<CronJobRecord>> {
        blocking!(self, |conn: &Connection| -> Result<Vec<CronJobRecord>> {
            let mut stmt = conn.prepare("SELECT * FROM cron_jobs").map_err(|e| StoreError::Backend(e.into()))?;
            let rows = stmt.query_map([], row_to_cron_job).map_err(|e| StoreError::Backend(e.into()))?.filter_map(|r| r.ok()).collect();
            Ok(rows)
        })
    }

    async fn record_skill_invocation(&self, invocation: SkillInvocationRecord) -> Result<()> {
        blocking!(self, |conn: &Connection| -> Result<()> {
            conn.execute(
                "INSERT INTO skill_invocations (id, skill, action, duration_ms, outcome, correlation_id, created_at) VALUES (?1,?2,?3,?4,?5,?6,?7)",
                params![invocation.id, invocation.skill, invocation.action, invocation.duration_ms as i64, format!("{:?}", invocation.outcome).to_lowercase(), invocation.correlation_id, invocation.created_at.to_rfc3339()],
            ).map_err(|e| StoreError::Backend(e.into()))?;
            Ok(())
        })
    }

    async fn recent_skill_invocations(&self, skill: &str, limit: usize) -> Result<Vec<SkillInvocationRecord>> {
        blocking!(self, |conn: &Connection| -> Result<Vec<SkillInvocationRecord>> {
            let mut stmt = conn
                .prepare("SELECT * FROM skill_invocations WHERE skill = ?1 ORDER BY created_at DESC LIMIT ?2")
                .map_err(|e| StoreError::Backend(e.into()))?;
            let rows = stmt
                .query_map(params![skill, limit as i64], |row| {
                    let outcome: String = row.get("outcome")?;
                    let created_at: String = row.get("created_at")?;
                    Ok(SkillInvocationRecord {
                        id: row.get("id")?,
                        skill: row.get("skill")?,
                        action: row.get("action")?,
                        duration_ms: row.get::<_, i64>("duration_ms")? as u64,
                        outcome: match outcome.as_str() {
                            "error" => InvocationOutcome::Error,
                            "circuit_open" => InvocationOutcome::CircuitOpen,
                            "timeout" => InvocationOutcome::Timeout,
                            _ => InvocationOutcome::Ok,
                        },
                        correlation_id: row.get("correlation_id")?,
                        created_at: parse_dt(&created_at),
                    })
                })
                .map_err(|e| StoreError::Backend(e.into()))?
                .filter_map(|r| r.ok())
                .collect();
            Ok(rows)
        })
    }

    async fn ping(&self) -> Result<()> {
        blocking!(self, |conn: &Connection| -> Result<()> {
            conn.query_row("SELECT 1", [], |_| Ok(())).map_err(|e| StoreError::Backend(e.into()))
        })
    }
}

fn row_to_agent(row: &rusqlite::Row) -> rusqlite::Result<AgentRecord> {
    let state: String = row.get("state")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;
    Ok(AgentRecord {
        id: row.get("id")?,
        name: row.get("name")?,
        role: row.get("role")?,
        instructions: row.get("instructions")?,
        pinned_model: row.get("pinned_model")?,
        session_id: row.get("session_id")?,
        state: match state.as_str() {
            "idle" => AgentState::Idle,
            "busy" => AgentState::Busy,
            "completed" => AgentState::Completed,
            "failed" => AgentState::Failed,
            "terminated" => AgentState::Terminated,
            _ => AgentState::Spawning,
        },
        created_at: parse_dt(&created_at),
        updated_at: parse_dt(&updated_at),
    })
}

fn row_to_cron_job(row: &rusqlite::Row) -> rusqlite::Result<CronJobRecord> {
    let args: String = row.get("args")?;
    let next_run: Option<String> = row.get("next_run")?;
    let last_run_at: Option<String> = row.get("last_run_at")?;
    let last_run_outcome: Option<String> = row.get("last_run_outcome")?;
    Ok(CronJobRecord {
        name: row.get("name")?,
        schedule: row.get("schedule")?,
        skill: row.get("skill")?,
        action: row.get("action")?,
        model: row.get("model")?,
        args: serde_json::from_str(&args).unwrap_or(serde_json::Value::Null),
        next_run: next_run.map(|s| parse_dt(&s)),
        last_run_at: last_run_at.map(|s| parse_dt(&s)),
        last_run_outcome: last_run_outcome.map(|s| match s.as_str() {
            "error" => JobOutcome::Error,
            "skipped" => JobOutcome::Skipped,
            _ => JobOutcome::Ok,
        }),
    })
}
