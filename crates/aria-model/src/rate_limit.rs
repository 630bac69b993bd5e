// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Sliding-window request/token limiters for a single model entry.
//!
//! Requests-per-minute uses a one-minute sliding log of timestamps. Tokens
//! per day uses a one-day sliding log of `(timestamp, tokens)` pairs so
//! partially-elapsed days don't reset the budget early. The request-count
//! window keeps accumulating through a circuit half-open probe rather than
//! resetting — a half-open probe is still a real request against the quota.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

pub const MINUTE: Duration = Duration::from_secs(60);
const DAY: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Default)]
pub struct RateLimiter {
    max_rpm: Option<u32>,
    max_tpd: Option<u64>,
    request_log: VecDeque<Instant>,
    token_log: VecDeque<(Instant, u64)>,
}

impl RateLimiter {
    pub fn new(max_rpm: Option<u32>, max_tpd: Option<u64>) -> Self {
        Self {
            max_rpm,
            max_tpd,
            request_log: VecDeque::new(),
            token_log: VecDeque::new(),
        }
    }

    fn prune(&mut self, now: Instant) {
        while let Some(front) = self.request_log.front() {
            if now.duration_since(*front) > MINUTE {
                self.request_log.pop_front();
            } else {
                break;
            }
        }
        while let Some((ts, _)) = self.token_log.front() {
            if now.duration_since(*ts) > DAY {
                self.token_log.pop_front();
            } else {
                break;
            }
        }
    }

    /// Returns `true` and reserves quota if a request may proceed right now.
    /// Call [`Self::record_tokens`] after the call completes to charge the
    /// TPD budget for the tokens actually consumed.
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        self.prune(now);
        if let Some(max_rpm) = self.max_rpm {
            if self.request_log.len() as u32 >= max_rpm {
                return false;
            }
        }
        if let Some(max_tpd) = self.max_tpd {
            let used: u64 = self.token_log.iter().map(|(_, t)| t).sum();
            if used >= max_tpd {
                return false;
            }
        }
        self.request_log.push_back(now);
        true
    }

    pub fn record_tokens(&mut self, now: Instant, tokens: u64) {
        self.token_log.push_back((now, tokens));
    }

    pub fn tokens_used_today(&mut self, now: Instant) -> u64 {
        self.prune(now);
        self.token_log.iter().map(|(_, t)| t).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbounded_limiter_always_admits() {
        let mut l = RateLimiter::new(None, None);
        let now = Instant::now();
        for _ in 0..1000 {
            assert!(l.try_acquire(now));
        }
    }

    #[test]
    fn rpm_limit_rejects_past_budget() {
        let mut l = RateLimiter::new(Some(2), None);
        let now = Instant::now();
        assert!(l.try_acquire(now));
        assert!(l.try_acquire(now));
        assert!(!l.try_acquire(now));
    }

    #[test]
    fn rpm_limit_recovers_after_window_elapses() {
        let mut l = RateLimiter::new(Some(1), None);
        let t0 = Instant::now();
        assert!(l.try_acquire(t0));
        assert!(!l.try_acquire(t0));
        let t1 = t0 + Duration::from_secs(61);
        assert!(l.try_acquire(t1));
    }

    #[test]
    fn tpd_limit_rejects_once_budget_exhausted() {
        let mut l = RateLimiter::new(None, Some(100));
        let now = Instant::now();
        assert!(l.try_acquire(now));
        l.record_tokens(now, 100);
        assert!(!l.try_acquire(now));
    }

    #[test]
    fn tpd_budget_recovers_after_a_day() {
        let mut l = RateLimiter::new(None, Some(100));
        let t0 = Instant::now();
        assert!(l.try_acquire(t0));
        l.record_tokens(t0, 100);
        let t1 = t0 + Duration::from_secs(24 * 60 * 60 + 1);
        assert!(l.try_acquire(t1));
    }

    #[test]
    fn tokens_used_today_reflects_recorded_usage() {
        let mut l = RateLimiter::new(None, Some(1000));
        let now = Instant::now();
        l.record_tokens(now, 30);
        l.record_tokens(now, 20);
        assert_eq!(l.tokens_used_today(now), 50);
    }
}
