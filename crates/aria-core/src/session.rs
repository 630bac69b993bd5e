// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The Session Manager: owns the session and message collections, enforces
//! the message-count/sequence invariants, and drives archival, ghost
//! pruning, and quick/slow title assignment.

use std::sync::Arc;
use std::time::Duration;

use aria_config::SessionConfig;
use aria_memory::{
    MessageRecord, MessageRole, SessionFilter, SessionKind, SessionOrder, SessionRecord,
    SessionStatus, Store,
};
use chrono::Utc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::correlation::CorrelationId;
use crate::error::CoreError;
use crate::title::{is_slash_command, quick_title, TitleSummarizer};

mod keyed_mutex {
    //! One `tokio::sync::Mutex<()>` per session id, created lazily. Serializes
    //! concurrent appends to a session so message sequence numbers stay
    //! strictly increasing.
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

    #[derive(Default)]
    pub struct KeyedMutexes(RwLock<HashMap<String, Arc<Mutex<()>>>>);

    impl KeyedMutexes {
        pub fn new() -> Self {
            Self::default()
        }

        pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
            let existing = self.0.read().await.get(key).cloned();
            let mutex = match existing {
                Some(m) => m,
                None => {
                    let mut w = self.0.write().await;
                    w.entry(key.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
                }
            };
            mutex.lock_owned().await
        }
    }
}

use keyed_mutex::KeyedMutexes;

/// Filter parameters for [`SessionManager::list_sessions`].
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub kind: Option<SessionKind>,
    pub include_archived: bool,
    pub min_message_count: Option<u64>,
    pub order: SessionOrder,
    pub limit: Option<usize>,
    pub offset: usize,
}

pub struct SessionManager {
    store: Arc<dyn Store>,
    config: SessionConfig,
    locks: KeyedMutexes,
    summarizer: Option<Arc<dyn TitleSummarizer>>,
}

impl SessionManager {
    pub fn new(store: Arc<dyn Store>, config: SessionConfig) -> Self {
        Self { store, config, locks: KeyedMutexes::new(), summarizer: None }
    }

    pub fn with_summarizer(mut self, summarizer: Arc<dyn TitleSummarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    /// Create a session. Callers must invoke this lazily, on the first user
    /// message, never speculatively (otherwise ghost pruning has nothing
    /// to clean up a never-used session).
    #[instrument(skip(self), fields(correlation_id = %correlation_id))]
    pub async fn create_session(
        &self,
        kind: SessionKind,
        agent_id: Option<String>,
        model_override: Option<String>,
        correlation_id: CorrelationId,
    ) -> Result<SessionRecord, CoreError> {
        let session = SessionRecord::new(Uuid::new_v4().to_string(), kind, agent_id, model_override);
        info!(session_id = %session.id, ?kind, "session created");
        Ok(self.store.insert_session(session).await?)
    }

    /// Append a message, assigning a strictly-increasing sequence number and
    /// incrementing `message_count`. On the first user message of a
    /// titleless session, synchronously sets the quick title then, unless
    /// the message is a slash command, spawns the slow-title task.
    #[instrument(skip(self, content), fields(correlation_id = %correlation_id))]
    pub async fn append_message(
        &self,
        session_id: &str,
        role: MessageRole,
        content: String,
        agent_id: Option<String>,
        model_id: Option<String>,
        correlation_id: CorrelationId,
    ) -> Result<MessageRecord, CoreError> {
        let _guard = self.locks.lock(session_id).await;

        let session = self.store.get_session(session_id).await?;
        let Some(session) = session else {
            warn!(session_id, "append to missing session");
            return Err(CoreError::NotFound);
        };
        if session.status != SessionStatus::Active {
            warn!(session_id, "append to archived session rejected");
            return Err(CoreError::Conflict("session is archived".into()));
        }

        let record = MessageRecord {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            sequence: 0, // assigned by the store
            role,
            content: content.clone(),
            agent_id,
            model_id,
            input_tokens: 0,
            output_tokens: 0,
            created_at: Utc::now(),
        };
        let saved = self.store.append_message(record).await?;

        if role == MessageRole::User && session.title.is_none() && session.message_count == 0 {
            let quick = quick_title(&content);
            self.update_title(session_id, quick, correlation_id).await?;

            if !is_slash_command(&content) {
                if let Some(summarizer) = self.summarizer.clone() {
                    let store = self.store.clone();
                    let session_id = session_id.to_string();
                    let timeout = Duration::from_secs(self.config.slow_title_timeout_secs);
                    tokio::spawn(async move {
                        let result = tokio::time::timeout(timeout, summarizer.summarize(&content)).await;
                        match result {
                            Ok(Ok(title)) => {
                                if let Ok(Some(mut s)) = store.get_session(&session_id).await {
                                    if s.status == SessionStatus::Active {
                                        s.title = Some(title);
                                        s.updated_at = Utc::now();
                                        let _ = store.update_session(s).await;
                                    }
                                }
                            }
                            Ok(Err(e)) => warn!(session_id, error = %e, "slow-title generation failed"),
                            Err(_) => warn!(session_id, "slow-title generation timed out"),
                        }
                    });
                }
            }
        }

        Ok(saved)
    }

    /// Idempotent; overwritten by a later call.
    pub async fn update_title(
        &self,
        session_id: &str,
        title: String,
        _correlation_id: CorrelationId,
    ) -> Result<(), CoreError> {
        let mut session = self.store.get_session(session_id).await?.ok_or(CoreError::NotFound)?;
        session.title = Some(title);
        session.updated_at = Utc::now();
        Ok(self.store.update_session(session).await?)
    }

    /// Default excludes archived sessions. Ghost is a derived status, not
    /// stored directly: `message_count=0 AND created_at < now - ghost_ttl`.
    pub async fn list_sessions(&self, filter: ListFilter) -> Result<Vec<SessionRecord>, CoreError> {
        let store_filter = SessionFilter {
            kind: filter.kind,
            status: if filter.include_archived { None } else { Some(SessionStatus::Active) },
            min_message_count: filter.min_message_count,
            order: filter.order,
            limit: filter.limit,
            offset: filter.offset,
        };
        Ok(self.store.list_sessions(&store_filter).await?)
    }

    /// Sessions currently eligible for ghost pruning, without deleting them.
    pub async fn list_ghost_sessions(&self) -> Result<Vec<SessionRecord>, CoreError> {
        let ttl = chrono::Duration::minutes(self.config.ghost_ttl_minutes);
        let now = Utc::now();
        let all = self
            .store
            .list_sessions(&SessionFilter { status: Some(SessionStatus::Active), ..Default::default() })
            .await?;
        Ok(all.into_iter().filter(|s| s.is_ghost(now, ttl)).collect())
    }

    /// Archive is all-or-nothing. Returns `true` iff an active row existed.
    /// Archiving a roundtable session cascade-archives its child
    /// participant sessions (linked via `parent_session_id`).
    #[instrument(skip(self))]
    pub async fn archive_session(&self, session_id: &str) -> Result<bool, CoreError> {
        let Some(session) = self.store.get_session(session_id).await? else { return Ok(false) };
        let archived = self.store.archive_session(session_id).await?;
        if archived && session.kind == SessionKind::Roundtable {
            let children = self
                .store
                .list_sessions(&SessionFilter { status: Some(SessionStatus::Active), ..Default::default() })
                .await?
                .into_iter()
                .filter(|s| s.parent_session_id.as_deref() == Some(session_id));
            for child in children {
                let _ = self.store.archive_session(&child.id).await;
            }
        }
        Ok(archived)
    }

    pub async fn list_archived_sessions(&self, limit: usize, offset: usize) -> Result<Vec<SessionRecord>, CoreError> {
        let rows = self.store.list_archived_sessions(limit, offset).await?;
        Ok(rows.into_iter().map(|a| a.session).collect())
    }

    /// Deletes sessions where `message_count=0 AND created_at < now -
    /// older_than`. Tolerant of races: rows that receive their first
    /// message between cutoff computation and delete simply fall outside
    /// the delete's predicate.
    pub async fn delete_ghost_sessions(&self, older_than: chrono::Duration) -> Result<u64, CoreError> {
        let cutoff = Utc::now() - older_than;
        Ok(self.store.delete_ghost_sessions(cutoff).await?)
    }

    /// Archives (does not delete) sessions with `updated_at < now - days`.
    /// Independent of ghost pruning, which targets empty sessions instead
    /// of aged-but-populated ones.
    pub async fn prune_old_sessions(&self, days: i64, dry_run: bool) -> Result<Vec<String>, CoreError> {
        let cutoff = Utc::now() - chrono::Duration::days(days);
        let candidates = self
            .store
            .list_sessions(&SessionFilter { status: Some(SessionStatus::Active), ..Default::default() })
            .await?
            .into_iter()
            .filter(|s| s.updated_at < cutoff)
            .map(|s| s.id)
            .collect::<Vec<_>>();
        if dry_run {
            return Ok(candidates);
        }
        let mut archived = Vec::with_capacity(candidates.len());
        for id in candidates {
            if self.archive_session(&id).await? {
                archived.push(id);
            }
        }
        Ok(archived)
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aria_memory::InMemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn manager() -> SessionManager {
        SessionManager::new(Arc::new(InMemoryStore::new()), SessionConfig::default())
    }

    struct FixedSummarizer(String);

    #[async_trait::async_trait]
    impl TitleSummarizer for FixedSummarizer {
        async fn summarize(&self, _first_message: &str) -> anyhow::Result<String> {
            Ok(self.0.clone())
        }
    }

    struct FailingSummarizer;

    #[async_trait::async_trait]
    impl TitleSummarizer for FailingSummarizer {
        async fn summarize(&self, _first_message: &str) -> anyhow::Result<String> {
            anyhow::bail!("boom")
        }
    }

    struct HangingSummarizer(Arc<AtomicUsize>);

    #[async_trait::async_trait]
    impl TitleSummarizer for HangingSummarizer {
        async fn summarize(&self, _first_message: &str) -> anyhow::Result<String> {
            self.0.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok("never".into())
        }
    }

    #[tokio::test]
    async fn create_session_starts_with_zero_messages() {
        let mgr = manager();
        let s = mgr.create_session(SessionKind::Chat, None, None, CorrelationId::new()).await.unwrap();
        assert_eq!(s.message_count, 0);
    }

    #[tokio::test]
    async fn append_message_assigns_increasing_sequence() {
        let mgr = manager();
        let s = mgr.create_session(SessionKind::Chat, None, None, CorrelationId::new()).await.unwrap();
        let m1 = mgr.append_message(&s.id, MessageRole::User, "hi".into(), None, None, CorrelationId::new()).await.unwrap();
        let m2 = mgr.append_message(&s.id, MessageRole::Assistant, "hello".into(), None, None, CorrelationId::new()).await.unwrap();
        assert_eq!(m1.sequence, 1);
        assert_eq!(m2.sequence, 2);
    }

    #[tokio::test]
    async fn append_to_archived_session_fails_with_conflict() {
        let mgr = manager();
        let s = mgr.create_session(SessionKind::Chat, None, None, CorrelationId::new()).await.unwrap();
        mgr.archive_session(&s.id).await.unwrap();
        let err = mgr
            .append_message(&s.id, MessageRole::User, "hi".into(), None, None, CorrelationId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn first_user_message_sets_quick_title() {
        let mgr = manager();
        let s = mgr.create_session(SessionKind::Chat, None, None, CorrelationId::new()).await.unwrap();
        mgr.append_message(&s.id, MessageRole::User, "hello".into(), None, None, CorrelationId::new()).await.unwrap();
        let reloaded = mgr.store.get_session(&s.id).await.unwrap().unwrap();
        assert_eq!(reloaded.title.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn slow_title_overwrites_quick_title_on_success() {
        let mgr = manager().with_summarizer(Arc::new(FixedSummarizer("A concise summary".into())));
        let s = mgr.create_session(SessionKind::Chat, None, None, CorrelationId::new()).await.unwrap();
        mgr.append_message(&s.id, MessageRole::User, "hello there".into(), None, None, CorrelationId::new()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let reloaded = mgr.store.get_session(&s.id).await.unwrap().unwrap();
        assert_eq!(reloaded.title.as_deref(), Some("A concise summary"));
    }

    #[tokio::test]
    async fn slow_title_failure_leaves_quick_title_intact() {
        let mgr = manager().with_summarizer(Arc::new(FailingSummarizer));
        let s = mgr.create_session(SessionKind::Chat, None, None, CorrelationId::new()).await.unwrap();
        mgr.append_message(&s.id, MessageRole::User, "hello there".into(), None, None, CorrelationId::new()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let reloaded = mgr.store.get_session(&s.id).await.unwrap().unwrap();
        assert_eq!(reloaded.title.as_deref(), Some("hello there"));
    }

    #[tokio::test]
    async fn slash_command_first_message_skips_slow_title() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mgr = manager().with_summarizer(Arc::new(HangingSummarizer(calls.clone())));
        let s = mgr.create_session(SessionKind::Chat, None, None, CorrelationId::new()).await.unwrap();
        mgr.append_message(&s.id, MessageRole::User, "/rt @a @b topic".into(), None, None, CorrelationId::new()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0, "slash-command first message must not trigger slow-title");
    }

    #[tokio::test]
    async fn archive_is_idempotent_returns_false_second_time() {
        let mgr = manager();
        let s = mgr.create_session(SessionKind::Chat, None, None, CorrelationId::new()).await.unwrap();
        assert!(mgr.archive_session(&s.id).await.unwrap());
        assert!(!mgr.archive_session(&s.id).await.unwrap());
    }

    #[tokio::test]
    async fn archive_roundtable_cascades_to_children() {
        let mgr = manager();
        let parent = mgr.create_session(SessionKind::Roundtable, None, None, CorrelationId::new()).await.unwrap();
        let mut child = mgr.create_session(SessionKind::Chat, None, None, CorrelationId::new()).await.unwrap();
        child.parent_session_id = Some(parent.id.clone());
        mgr.store.update_session(child.clone()).await.unwrap();

        mgr.archive_session(&parent.id).await.unwrap();
        assert!(mgr.store.get_session(&child.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn ghost_prune_deletes_aged_empty_sessions() {
        let mgr = manager();
        let mut s = mgr.create_session(SessionKind::Chat, None, None, CorrelationId::new()).await.unwrap();
        s.created_at = Utc::now() - chrono::Duration::minutes(20);
        mgr.store.update_session(s.clone()).await.unwrap();

        let deleted = mgr.delete_ghost_sessions(chrono::Duration::minutes(15)).await.unwrap();
        assert_eq!(deleted, 1);
    }

    #[tokio::test]
    async fn prune_old_sessions_dry_run_does_not_archive() {
        let mgr = manager();
        let mut s = mgr.create_session(SessionKind::Chat, None, None, CorrelationId::new()).await.unwrap();
        s.updated_at = Utc::now() - chrono::Duration::days(100);
        mgr.store.update_session(s.clone()).await.unwrap();

        let candidates = mgr.prune_old_sessions(90, true).await.unwrap();
        assert_eq!(candidates, vec![s.id.clone()]);
        assert!(mgr.store.get_session(&s.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn prune_old_sessions_archives_when_not_dry_run() {
        let mgr = manager();
        let mut s = mgr.create_session(SessionKind::Chat, None, None, CorrelationId::new()).await.unwrap();
        s.updated_at = Utc::now() - chrono::Duration::days(100);
        mgr.store.update_session(s.clone()).await.unwrap();

        let archived = mgr.prune_old_sessions(90, false).await.unwrap();
        assert_eq!(archived, vec![s.id.clone()]);
        assert!(mgr.store.get_session(&s.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_sessions_excludes_archived_by_default() {
        let mgr = manager();
        let s = mgr.create_session(SessionKind::Chat, None, None, CorrelationId::new()).await.unwrap();
        mgr.archive_session(&s.id).await.unwrap();
        let sessions = mgr.list_sessions(ListFilter::default()).await.unwrap();
        assert!(sessions.is_empty());
    }
}
