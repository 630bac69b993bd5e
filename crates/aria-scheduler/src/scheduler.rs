// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Cron dispatch over the Agent Pool / Skill Framework, plus the fixed-
//! interval background maintenance tasks that run independently of any
//! configured job.

use std::sync::Arc;
use std::time::Duration;

use aria_config::{CronJobConfig, SchedulerConfig};
use aria_core::{CoreError, SessionManager};
use aria_skills::SkillRegistry;
use aria_team::AgentPool;
use chrono::Utc;
use tokio::sync::{watch, RwLock};
use tracing::{error, info, warn};

use crate::job::Job;

const FAILURE_CIRCUIT_THRESHOLD: u32 = 5;

pub struct Scheduler {
    jobs: RwLock<Vec<Job>>,
    config: SchedulerConfig,
    agent_pool: Arc<AgentPool>,
    skills: Arc<SkillRegistry>,
    sessions: Arc<SessionManager>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig, agent_pool: Arc<AgentPool>, skills: Arc<SkillRegistry>, sessions: Arc<SessionManager>) -> anyhow::Result<Self> {
        let jobs = config.jobs.iter().cloned().map(Job::new).collect::<Result<Vec<_>, _>>()?;
        Ok(Self { jobs: RwLock::new(jobs), config, agent_pool, skills, sessions })
    }

    /// Adds a new job definition, used by `POST /cron`. Rejects a duplicate
    /// name so jobs stay addressable by it, matching `PATCH /cron/{id}`.
    pub async fn add_job(&self, job_config: CronJobConfig) -> Result<(), CoreError> {
        let mut jobs = self.jobs.write().await;
        if jobs.iter().any(|j| j.config.name == job_config.name) {
            return Err(CoreError::Conflict(format!("cron job {:?} already exists", job_config.name)));
        }
        let job = Job::new(job_config).map_err(|e| CoreError::Validation { field: "schedule".into(), message: e.to_string() })?;
        jobs.push(job);
        Ok(())
    }

    /// Patches the named job's model override, used by `PATCH /cron/{id}`.
    pub async fn patch_job_model(&self, name: &str, model: Option<String>) -> Result<(), CoreError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.iter_mut().find(|j| j.config.name == name).ok_or(CoreError::NotFound)?;
        job.config.model = model;
        Ok(())
    }

    /// Dispatches `job` once: to the Agent Pool when its skill is the
    /// well-known `"agent_pool"` intrinsic, otherwise directly through the
    /// Skill Framework's `safe_execute`.
    async fn dispatch(&self, job: &Job) {
        let Some(_guard) = job.try_acquire() else {
            info!(job = job.config.name, "previous run still in flight, skipping this fire");
            return;
        };

        let outcome = if job.config.skill == "agent_pool" {
            let task = job.config.args.get("task").and_then(|v| v.as_str()).unwrap_or_default();
            self.agent_pool
                .delegate_task(task, &job.config.action, job.config.model.clone(), None, None, true)
                .await
                .map(|r| r.status == aria_team::DelegationStatus::Completed)
                .map_err(|e| e.to_string())
        } else {
            self.skills
                .safe_execute(&job.config.skill, &job.config.action, job.config.args.clone())
                .await
                .map(|o| o.ok)
                .map_err(|e| e.to_string())
        };

        match outcome {
            Ok(true) => {
                job.consecutive_failures.store(0, std::sync::atomic::Ordering::SeqCst);
                info!(job = job.config.name, "job completed");
            }
            Ok(false) | Err(_) => {
                let failures = job.consecutive_failures.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
                warn!(job = job.config.name, failures, "job run failed");
                if failures >= FAILURE_CIRCUIT_THRESHOLD {
                    error!(job = job.config.name, "job has failed repeatedly; its skill circuit will reject further calls until it half-opens");
                }
            }
        }
    }

    /// Runs the cron loop and the three fixed-interval background tasks
    /// until `shutdown` fires. Each timer is independent; a slow job does
    /// not delay ghost pruning or the heartbeat.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ghost_prune = tokio::time::interval(Duration::from_secs(self.config.ghost_prune_interval_secs));
        let mut archive_scan = tokio::time::interval(Duration::from_secs(self.config.archive_scan_interval_secs));
        let mut heartbeat = tokio::time::interval(Duration::from_secs(self.config.heartbeat_interval_secs));
        let mut cron_tick = tokio::time::interval(Duration::from_secs(1));

        loop {
            tokio::select! {
                _ = ghost_prune.tick() => {
                    match self.sessions.delete_ghost_sessions(chrono::Duration::minutes(15)).await {
                        Ok(n) if n > 0 => info!(deleted = n, "ghost prune"),
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "ghost prune failed"),
                    }
                }
                _ = archive_scan.tick() => {
                    match self.sessions.prune_old_sessions(90, false).await {
                        Ok(archived) if !archived.is_empty() => info!(count = archived.len(), "archive scan"),
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "archive scan failed"),
                    }
                }
                _ = heartbeat.tick() => {
                    info!("heartbeat");
                }
                _ = cron_tick.tick() => {
                    let now = Utc::now();
                    let jobs = self.jobs.read().await;
                    for job in jobs.iter() {
                        if let Some(next) = job.next_fire_after(now - chrono::Duration::seconds(1)) {
                            if next <= now {
                                self.dispatch(job).await;
                            }
                        }
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("scheduler shutting down");
                        break;
                    }
                }
            }
        }
    }

    pub async fn job_names(&self) -> Vec<String> {
        self.jobs.read().await.iter().map(|j| j.config.name.clone()).collect()
    }

    /// Read-only snapshot of every configured job's summary, for
    /// admin/status surfaces (`GET /cron`).
    pub async fn job_summaries(&self) -> Vec<JobSummary> {
        self.jobs
            .read()
            .await
            .iter()
            .map(|j| JobSummary {
                name: j.config.name.clone(),
                schedule: j.config.schedule.clone(),
                skill: j.config.skill.clone(),
                action: j.config.action.clone(),
                model: j.config.model.clone(),
                consecutive_failures: j.consecutive_failures.load(std::sync::atomic::Ordering::SeqCst),
            })
            .collect()
    }
}

/// Owned, point-in-time view of a configured job. Decoupled from [`Job`]
/// so callers (HTTP handlers) don't need to hold the jobs lock.
#[derive(Debug, Clone, serde::Serialize)]
pub struct JobSummary {
    pub name: String,
    pub schedule: String,
    pub skill: String,
    pub action: String,
    pub model: Option<String>,
    pub consecutive_failures: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use aria_memory::{InMemoryStore, Store};
    use aria_model::Message as ModelMessage;
    use aria_team::{AgentPoolError, ModelRunner};
    use serde_json::json;
    use std::sync::atomic::Ordering;

    struct NoopRunner;

    #[async_trait::async_trait]
    impl ModelRunner for NoopRunner {
        async fn run(&self, _model: Option<&str>, _messages: Vec<ModelMessage>) -> Result<(String, u64), AgentPoolError> {
            Ok(("ok".into(), 1))
        }
    }

    fn harness(jobs: Vec<aria_config::CronJobConfig>) -> (Scheduler, Arc<SkillRegistry>) {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let sessions = Arc::new(SessionManager::new(store.clone(), Default::default()));
        let pool = Arc::new(AgentPool::new(store, sessions.clone(), Arc::new(NoopRunner), Default::default()));
        let skills = Arc::new(SkillRegistry::new());
        let config = SchedulerConfig { jobs, ..Default::default() };
        (Scheduler::new(config, pool, skills.clone(), sessions).unwrap(), skills)
    }

    #[tokio::test]
    async fn loads_job_definitions_on_construction() {
        let jobs = vec![aria_config::CronJobConfig {
            name: "nightly".into(),
            schedule: "0 0 * * *".into(),
            skill: "noop".into(),
            action: "run".into(),
            model: None,
            args: json!({}),
        }];
        let (scheduler, _) = harness(jobs);
        assert_eq!(scheduler.job_names().await, vec!["nightly"]);
    }

    #[tokio::test]
    async fn add_job_rejects_duplicate_name() {
        let (scheduler, _) = harness(vec![]);
        let cfg = aria_config::CronJobConfig {
            name: "dup".into(),
            schedule: "0 0 * * *".into(),
            skill: "noop".into(),
            action: "run".into(),
            model: None,
            args: json!({}),
        };
        scheduler.add_job(cfg.clone()).await.unwrap();
        let err = scheduler.add_job(cfg).await.unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn patch_job_model_updates_existing_job() {
        let jobs = vec![aria_config::CronJobConfig {
            name: "nightly".into(),
            schedule: "0 0 * * *".into(),
            skill: "noop".into(),
            action: "run".into(),
            model: None,
            args: json!({}),
        }];
        let (scheduler, _) = harness(jobs);
        scheduler.patch_job_model("nightly", Some("gpt-fast".into())).await.unwrap();
        let summaries = scheduler.job_summaries().await;
        assert_eq!(summaries[0].model.as_deref(), Some("gpt-fast"));
    }

    #[tokio::test]
    async fn patch_job_model_unknown_name_not_found() {
        let (scheduler, _) = harness(vec![]);
        let err = scheduler.patch_job_model("ghost", None).await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound));
    }

    #[tokio::test]
    async fn dispatch_routes_non_agent_jobs_through_skill_registry() {
        use aria_skills::{Skill, SkillError, SkillLayer};
        use async_trait::async_trait;

        struct CountingSkill;
        #[async_trait]
        impl Skill for CountingSkill {
            fn name(&self) -> &str { "counter" }
            fn layer(&self) -> SkillLayer { SkillLayer::LEAF }
            async fn invoke(&self, _action: &str, _args: serde_json::Value) -> Result<serde_json::Value, SkillError> {
                Ok(json!({}))
            }
        }

        let mut skills = SkillRegistry::new();
        skills.register(Arc::new(CountingSkill), &[]).unwrap();

        let job_cfg = aria_config::CronJobConfig {
            name: "counter-job".into(),
            schedule: "0 0 * * *".into(),
            skill: "counter".into(),
            action: "tick".into(),
            model: None,
            args: json!({}),
        };
        let (scheduler, _) = harness(vec![job_cfg]);
        let scheduler = Scheduler { jobs: scheduler.jobs, config: scheduler.config, agent_pool: scheduler.agent_pool, skills: Arc::new(skills), sessions: scheduler.sessions };

        let jobs = scheduler.jobs.read().await;
        scheduler.dispatch(&jobs[0]).await;
        assert_eq!(jobs[0].consecutive_failures.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn overlapping_fire_is_skipped_while_previous_run_holds_lock() {
        let jobs = vec![aria_config::CronJobConfig {
            name: "slow".into(),
            schedule: "0 0 * * *".into(),
            skill: "agent_pool".into(),
            action: "worker".into(),
            model: None,
            args: json!({"task": "do it"}),
        }];
        let (scheduler, _) = harness(jobs);
        let lock = scheduler.jobs.read().await;
        let guard = lock[0].try_acquire().unwrap();
        scheduler.dispatch(&lock[0]).await;
        drop(guard);
        assert_eq!(lock[0].consecutive_failures.load(Ordering::SeqCst), 0, "skipped fire must not count as a failure");
    }

    #[tokio::test]
    async fn repeated_failures_increment_the_failure_counter() {
        let jobs = vec![aria_config::CronJobConfig {
            name: "broken".into(),
            schedule: "0 0 * * *".into(),
            skill: "missing-skill".into(),
            action: "whatever".into(),
            model: None,
            args: json!({}),
        }];
        let (scheduler, _) = harness(jobs);
        let lock = scheduler.jobs.read().await;
        for _ in 0..3 {
            scheduler.dispatch(&lock[0]).await;
        }
        assert_eq!(lock[0].consecutive_failures.load(Ordering::SeqCst), 3);
    }
}
