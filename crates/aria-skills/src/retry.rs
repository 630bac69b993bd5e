// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Exponential backoff retry, applied only to transient failures.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::skill::SkillError;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, initial_backoff: Duration::from_millis(200), max_backoff: Duration::from_secs(5) }
    }
}

impl RetryPolicy {
    fn backoff_for(&self, attempt: u32) -> Duration {
        let scaled = self.initial_backoff.saturating_mul(1u32 << attempt.min(20));
        scaled.min(self.max_backoff)
    }

    /// Runs `op` up to `max_attempts` times. Only [`SkillError::Transient`]
    /// is retried; a permanent error returns immediately.
    pub async fn run<F, Fut, T>(&self, mut op: F) -> Result<T, SkillError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SkillError>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) if e.is_transient() && attempt + 1 < self.max_attempts => {
                    let wait = self.backoff_for(attempt);
                    debug!(attempt, ?wait, "retrying after transient skill failure");
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
