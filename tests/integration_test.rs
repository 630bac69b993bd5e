// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! End-to-end scenarios driving a disposable `CoreContext` built on
//! `InMemoryStore` and the mock model provider — no live network or
//! database required.

use std::sync::Arc;
use std::time::Duration;

use aria_bootstrap::CoreContext;
use aria_config::Config;
use aria_core::{CorrelationId, ListFilter};
use aria_memory::{MessageRole, SessionKind};
use futures::StreamExt;

fn ctx() -> CoreContext {
    CoreContext::build(Config::default()).expect("default config must build a context")
}

#[tokio::test]
async fn lazy_session_creation_then_chat_round_trip() {
    let ctx = ctx();
    let session = ctx.sessions.create_session(SessionKind::Chat, None, None, CorrelationId::new()).await.unwrap();
    assert_eq!(session.message_count, 0);

    let (_turn, mut stream) = aria_gateway::http::chat::start_turn(&ctx.sessions, &ctx.model_gateway, &ctx.config, &session.id, "hello there".into())
        .await
        .unwrap();
    while let Some(delta) = stream.next().await {
        delta.unwrap();
    }

    let messages = ctx.store.list_messages(&session.id).await.unwrap();
    assert_eq!(messages.len(), 2, "user message plus assistant reply");
    assert_eq!(messages[0].role, MessageRole::User);
    assert_eq!(messages[1].role, MessageRole::Assistant);
    assert!(messages[1].content.contains("MOCK"), "mock provider echoes the prompt");

    let reloaded = ctx.store.get_session(&session.id).await.unwrap().unwrap();
    assert_eq!(reloaded.title.as_deref(), Some("hello there"), "first user message sets the quick title");
}

#[tokio::test]
async fn ghost_sessions_are_listed_and_pruned_independently_of_active_ones() {
    let ctx = ctx();
    let mut ghost = ctx.sessions.create_session(SessionKind::Chat, None, None, CorrelationId::new()).await.unwrap();
    ghost.created_at = chrono::Utc::now() - chrono::Duration::minutes(20);
    ctx.store.update_session(ghost.clone()).await.unwrap();

    let active = ctx.sessions.create_session(SessionKind::Chat, None, None, CorrelationId::new()).await.unwrap();
    ctx.sessions.append_message(&active.id, MessageRole::User, "keep me".into(), None, None, CorrelationId::new()).await.unwrap();

    let ghosts = ctx.sessions.list_ghost_sessions().await.unwrap();
    assert_eq!(ghosts.len(), 1);
    assert_eq!(ghosts[0].id, ghost.id);

    let deleted = ctx.sessions.delete_ghost_sessions(chrono::Duration::minutes(15)).await.unwrap();
    assert_eq!(deleted, 1);
    assert!(ctx.store.get_session(&ghost.id).await.unwrap().is_none());
    assert!(ctx.store.get_session(&active.id).await.unwrap().is_some());
}

#[tokio::test]
async fn archiving_a_roundtable_session_cascades_to_its_children() {
    let ctx = ctx();
    let parent = ctx.sessions.create_session(SessionKind::Roundtable, None, None, CorrelationId::new()).await.unwrap();
    let mut child = ctx.sessions.create_session(SessionKind::Chat, None, None, CorrelationId::new()).await.unwrap();
    child.parent_session_id = Some(parent.id.clone());
    ctx.store.update_session(child.clone()).await.unwrap();

    assert!(ctx.sessions.archive_session(&parent.id).await.unwrap());
    assert!(ctx.sessions.archive_session(&parent.id).await.unwrap() == false, "archive is idempotent");

    let archived = ctx.sessions.list_archived_sessions(10, 0).await.unwrap();
    assert!(archived.iter().any(|s| s.id == parent.id));
    let sessions = ctx.sessions.list_sessions(ListFilter { include_archived: false, ..Default::default() }).await.unwrap();
    assert!(!sessions.iter().any(|s| s.id == child.id), "cascaded child is no longer active");
}

#[tokio::test]
async fn delegate_task_completes_using_the_mock_provider() {
    let ctx = ctx();
    let result = ctx.agent_pool.delegate_task("summarize the incident", "analyst", Some("mock-local".into()), None, Some(Duration::from_secs(5)), true).await.unwrap();
    assert_eq!(result.status, aria_team::DelegationStatus::Completed);
    assert!(result.result.contains("MOCK"));
}

#[tokio::test]
async fn delegate_task_with_unknown_model_is_rejected() {
    let ctx = ctx();
    let err = ctx.agent_pool.delegate_task("do something", "analyst", Some("not-a-real-model".into()), None, Some(Duration::from_secs(5)), true).await.unwrap_err();
    assert!(matches!(err, aria_team::AgentPoolError::UnknownModel(_)));
}

#[tokio::test]
async fn llm_gateway_skill_is_reachable_through_safe_execute() {
    let ctx = ctx();
    let outcome = ctx.skills.safe_execute("llm_gateway", "auto", serde_json::json!({ "prompt": "ping" })).await.unwrap();
    assert!(outcome.ok);
    assert!(outcome.data.unwrap()["text"].as_str().unwrap().contains("MOCK"));
}

#[tokio::test]
async fn spawning_and_terminating_an_agent_cleans_up_its_empty_session() {
    let ctx = ctx();
    let agent = ctx.agent_pool.spawn_agent("scout", "researcher", "look around", None).await.unwrap();
    let session_id = agent.session_id.clone();
    assert!(ctx.store.get_session(&session_id).await.unwrap().is_some());

    ctx.agent_pool.terminate(&agent.id, true).await.unwrap();
    assert!(ctx.store.get_session(&session_id).await.unwrap().is_none(), "empty session is deleted, not archived");
}

#[tokio::test]
async fn scheduler_starts_with_zero_jobs_from_default_config_and_accepts_new_ones() {
    let ctx = ctx();
    assert!(ctx.scheduler.job_names().await.is_empty());

    ctx.scheduler
        .add_job(aria_config::CronJobConfig { name: "nightly".into(), schedule: "0 3 * * *".into(), skill: "llm_gateway".into(), action: "auto".into(), model: None, args: serde_json::Value::Null })
        .await
        .unwrap();
    assert_eq!(ctx.scheduler.job_names().await, vec!["nightly".to_string()]);

    let err = ctx
        .scheduler
        .add_job(aria_config::CronJobConfig { name: "nightly".into(), schedule: "0 4 * * *".into(), skill: "llm_gateway".into(), action: "auto".into(), model: None, args: serde_json::Value::Null })
        .await
        .unwrap_err();
    assert!(matches!(err, aria_core::CoreError::Conflict(_)));
}
