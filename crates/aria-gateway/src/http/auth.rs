// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Process-wide API key authentication for HTTP/GraphQL, plus the
//! WebSocket query-parameter variant used at upgrade time.
//!
//! A missing key in production is a startup failure (fail-closed, §4.7);
//! in debug mode requests are allowed through unauthenticated with a
//! warning so local development doesn't need a key at all. Comparison
//! uses [`subtle::ConstantTimeEq`] so a wrong-length guess can't be timed.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{clock::DefaultClock, state::keyed::DashMapStateStore, Quota, RateLimiter};
use subtle::ConstantTimeEq;
use tracing::warn;

type IpLimiter = RateLimiter<IpAddr, DashMapStateStore<IpAddr>, DefaultClock>;

/// Shared auth state threaded through axum middleware and the WS upgrade
/// handler. `key` is `None` only when running in debug mode with no
/// configured API key.
#[derive(Clone)]
pub struct AuthState {
    key: Option<Arc<str>>,
    limiter: Arc<IpLimiter>,
    debug: bool,
}

impl AuthState {
    pub fn new(key: Option<String>, debug: bool, max_failed_per_min: u32) -> Self {
        let quota = Quota::per_minute(NonZeroU32::new(max_failed_per_min.max(1)).unwrap()).allow_burst(NonZeroU32::new(2).unwrap());
        Self {
            key: key.map(Arc::from),
            limiter: Arc::new(RateLimiter::keyed(quota)),
            debug,
        }
    }

    fn verify(&self, provided: Option<&str>) -> bool {
        match (&self.key, self.debug) {
            (None, true) => true,
            (None, false) => false,
            (Some(expected), _) => provided
                .map(|p| p.as_bytes().ct_eq(expected.as_bytes()).into())
                .unwrap_or(false),
        }
    }
}

/// Paths that are always reachable without the process API key. The health
/// probe must stay unauthenticated so external liveness checks (and
/// operators locked out of their own key) can still see the process is up.
const UNAUTHENTICATED_PATHS: &[&str] = &["/health"];

pub async fn api_key_mw(
    State(auth): State<AuthState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    req: Request,
    next: Next,
) -> Response {
    if UNAUTHENTICATED_PATHS.contains(&req.uri().path()) {
        return next.run(req).await;
    }

    let provided = extract_bearer(req.headers());
    if auth.verify(provided) {
        return next.run(req).await;
    }

    let ip = addr.ip();
    if !is_loopback(ip) {
        if auth.limiter.check_key(&ip).is_err() {
            warn!(%ip, "rate limit exceeded after repeated auth failures");
            return (StatusCode::TOO_MANY_REQUESTS, [(axum::http::header::RETRY_AFTER, "60")], "Too Many Requests").into_response();
        }
    }
    warn!(%ip, "authentication failed");
    (StatusCode::UNAUTHORIZED, "Unauthorized").into_response()
}

/// Validates the `token` query parameter used at WebSocket upgrade time.
/// Returns `false` on mismatch; the caller closes the socket with code
/// 4001 rather than returning an HTTP error, since the upgrade has
/// already completed by the time this runs.
pub fn verify_ws_token(auth: &AuthState, token: Option<&str>) -> bool {
    auth.verify(token)
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let auth = headers.get(axum::http::header::AUTHORIZATION)?.to_str().ok()?;
    auth.strip_prefix("Bearer ")
}

fn is_loopback(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4 == Ipv4Addr::LOCALHOST,
        IpAddr::V6(v6) => v6.is_loopback(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correct_key_verifies() {
        let auth = AuthState::new(Some("secret".into()), false, 10);
        assert!(auth.verify(Some("secret")));
    }

    #[test]
    fn wrong_key_rejected() {
        let auth = AuthState::new(Some("secret".into()), false, 10);
        assert!(!auth.verify(Some("nope")));
    }

    #[test]
    fn missing_key_production_fails_closed() {
        let auth = AuthState::new(None, false, 10);
        assert!(!auth.verify(None));
    }

    #[test]
    fn missing_key_debug_mode_allows_unauthenticated() {
        let auth = AuthState::new(None, true, 10);
        assert!(auth.verify(None));
    }

    #[test]
    fn extract_bearer_from_valid_header() {
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::AUTHORIZATION, "Bearer my-token-123".parse().unwrap());
        assert_eq!(extract_bearer(&headers), Some("my-token-123"));
    }

    #[test]
    fn extract_bearer_missing_header() {
        assert!(extract_bearer(&HeaderMap::new()).is_none());
    }

    #[test]
    fn loopback_v4_is_loopback() {
        assert!(is_loopback(IpAddr::V4(Ipv4Addr::LOCALHOST)));
    }

    #[test]
    fn ws_token_verification_matches_key_verification() {
        let auth = AuthState::new(Some("secret".into()), false, 10);
        assert!(verify_ws_token(&auth, Some("secret")));
        assert!(!verify_ws_token(&auth, Some("wrong")));
        assert!(!verify_ws_token(&auth, None));
    }
}
