// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! A single cron job: schedule parsing, next-fire computation, and the
//! per-job mutex that prevents overlapping executions.

use std::str::FromStr;
use std::sync::Arc;

use aria_config::CronJobConfig;
use chrono::{DateTime, Utc};
use cron::Schedule;
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("invalid cron schedule {0:?}: {1}")]
    InvalidSchedule(String, String),
}

/// The `cron` crate requires a leading seconds field; configuration files
/// use the conventional 5-field form, so a missing seconds field defaults
/// to `0`.
fn parse_schedule(expr: &str) -> Result<Schedule, cron::error::Error> {
    let field_count = expr.split_whitespace().count();
    if field_count == 5 {
        Schedule::from_str(&format!("0 {expr}"))
    } else {
        Schedule::from_str(expr)
    }
}

pub struct Job {
    pub config: CronJobConfig,
    schedule: Schedule,
    /// Held for the duration of a run; a fire that arrives while this is
    /// locked is skipped rather than queued.
    run_lock: Arc<Mutex<()>>,
    pub consecutive_failures: std::sync::atomic::AtomicU32,
}

impl Job {
    pub fn new(config: CronJobConfig) -> Result<Self, JobError> {
        let schedule = parse_schedule(&config.schedule)
            .map_err(|e| JobError::InvalidSchedule(config.schedule.clone(), e.to_string()))?;
        Ok(Self { config, schedule, run_lock: Arc::new(Mutex::new(())), consecutive_failures: Default::default() })
    }

    pub fn next_fire_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&after).next()
    }

    /// Attempts to acquire the per-job run lock. Returns `None` (and the
    /// fire is skipped, per the non-overlapping-execution contract) if the
    /// previous run is still in flight.
    pub fn try_acquire(&self) -> Option<tokio::sync::OwnedMutexGuard<()>> {
        self.run_lock.clone().try_lock_owned().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cfg(schedule: &str) -> CronJobConfig {
        CronJobConfig { name: "test".into(), schedule: schedule.into(), skill: "noop".into(), action: "run".into(), model: None, args: json!({}) }
    }

    #[test]
    fn valid_schedule_parses() {
        assert!(Job::new(cfg("0 0 * * * *")).is_ok());
    }

    #[test]
    fn invalid_schedule_errors() {
        assert!(Job::new(cfg("not a cron expression")).is_err());
    }

    #[test]
    fn next_fire_is_strictly_after_given_time() {
        let job = Job::new(cfg("0 0 * * * *")).unwrap();
        let now = Utc::now();
        let next = job.next_fire_after(now).unwrap();
        assert!(next > now);
    }

    #[tokio::test]
    async fn second_acquire_fails_while_first_holds_lock() {
        let job = Job::new(cfg("0 0 * * * *")).unwrap();
        let guard = job.try_acquire().unwrap();
        assert!(job.try_acquire().is_none());
        drop(guard);
        assert!(job.try_acquire().is_some());
    }
}
