//! Session cookie middleware with transparent refresh
//!
//! Decodes the session cookie once per request and stores the result as a
//! [`CurrentSession`] extension. A session whose access token expires within
//! the refresh margin is refreshed against the identity provider first: the
//! new cookie goes out on the response and replaces the old one on the
//! request, so the transcoder forwards the fresh token. When the refresh
//! fails the cookie is cleared and the request continues unauthenticated.
//!
//! Concurrent requests carrying the same refresh token share one refresh
//! through [`RefreshCoalescer`], and requests that arrive shortly after with
//! the old cookie get the same result instead of replaying a rotated token.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use admiral_auth::SessionToken;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use chrono::Utc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::cookies::{append_set_cookie, read_cookie, replace_request_cookie};
use crate::handlers::AuthState;

/// Session decoded from the request cookie, if any
#[derive(Debug, Clone, Default)]
pub struct CurrentSession(pub Option<SessionToken>);

impl CurrentSession {
    /// The session when it has not yet expired
    pub fn active(&self) -> Option<&SessionToken> {
        self.0.as_ref().filter(|s| !s.is_expired_at(Utc::now()))
    }
}

/// How long a finished refresh is handed to requests still presenting the old token
pub const REFRESH_REPLAY_WINDOW: Duration = Duration::from_secs(30);

/// Result of one refresh; the error is kept as text so waiters can share it
pub type RefreshOutcome = Result<SessionToken, String>;

type RefreshSlot = Arc<OnceCell<RefreshOutcome>>;

/// Single-flight session refresh keyed by refresh token
#[derive(Debug, Default)]
pub struct RefreshCoalescer {
    slots: Mutex<HashMap<String, (Instant, RefreshSlot)>>,
}

impl RefreshCoalescer {
    /// Run `refresh` unless a refresh of `refresh_token` is in flight or just finished
    pub async fn refresh<F, Fut>(&self, refresh_token: &str, refresh: F) -> RefreshOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = RefreshOutcome>,
    {
        let slot = self.slot(refresh_token);
        slot.get_or_init(refresh).await.clone()
    }

    fn slot(&self, refresh_token: &str) -> RefreshSlot {
        let now = Instant::now();
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.retain(|_, (created, _)| now.duration_since(*created) < REFRESH_REPLAY_WINDOW);
        let (_, slot) = slots
            .entry(refresh_token.to_string())
            .or_insert_with(|| (now, Arc::new(OnceCell::new())));
        Arc::clone(slot)
    }
}

/// Outcome of inspecting the session cookie
enum CookieUpdate {
    Keep,
    Replace(String),
    Clear,
}

/// Middleware applied with [`axum::middleware::from_fn_with_state`]
pub async fn session_middleware(State(state): State<AuthState>, mut request: Request, next: Next) -> Response {
    let cookie_name = state.cookies.session_name().to_string();
    let (session, update) = match read_cookie(request.headers(), &cookie_name) {
        None => (None, CookieUpdate::Keep),
        Some(raw) => resolve_session(&state, &raw).await,
    };

    match &update {
        CookieUpdate::Keep => {}
        CookieUpdate::Replace(value) => {
            replace_request_cookie(request.headers_mut(), &cookie_name, Some(value));
        }
        CookieUpdate::Clear => replace_request_cookie(request.headers_mut(), &cookie_name, None),
    }
    request.extensions_mut().insert(CurrentSession(session));

    let mut response = next.run(request).await;
    match update {
        CookieUpdate::Keep => {}
        CookieUpdate::Replace(value) => {
            append_set_cookie(response.headers_mut(), state.cookies.session_cookie(&value));
        }
        CookieUpdate::Clear => append_set_cookie(response.headers_mut(), state.cookies.clear_session()),
    }
    response
}

async fn resolve_session(state: &AuthState, raw: &str) -> (Option<SessionToken>, CookieUpdate) {
    let session = match state.services.sessions.decode(raw) {
        Ok(session) => session,
        Err(e) => {
            debug!(error = %e, "Discarding session cookie");
            return (None, CookieUpdate::Clear);
        }
    };

    let margin = state.services.config.cookie.refresh_margin();
    if !session.needs_refresh_at(Utc::now(), margin) {
        return (Some(session), CookieUpdate::Keep);
    }
    let Some(refresh_token) = session.refresh_token.as_deref() else {
        return (Some(session), CookieUpdate::Keep);
    };

    let outcome = state
        .refreshes
        .refresh(refresh_token, move || async move {
            state
                .services
                .exchanger
                .refresh(refresh_token)
                .await
                .map_err(|e| e.to_string())
        })
        .await;
    let refreshed = match outcome {
        Ok(refreshed) => refreshed,
        Err(e) => {
            warn!(subject = %session.claims.sub, error = %e, "Session refresh failed; dropping session");
            return (None, CookieUpdate::Clear);
        }
    };

    match state.services.sessions.encode(&refreshed) {
        Ok(encoded) => {
            info!(subject = %refreshed.claims.sub, "Session refreshed");
            (Some(refreshed), CookieUpdate::Replace(encoded))
        }
        Err(e) => {
            warn!(error = %e, "Refreshed session could not be encoded; dropping session");
            (None, CookieUpdate::Clear)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use admiral_auth::IdentityClaims;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn refreshed(access_token: &str) -> SessionToken {
        SessionToken::new(
            access_token,
            Some("rt-2".to_string()),
            Utc::now() + chrono::Duration::hours(1),
            IdentityClaims {
                sub: "abc123".into(),
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_concurrent_refreshes_share_one_call() {
        let coalescer = RefreshCoalescer::default();
        let calls = AtomicUsize::new(0);
        let calls = &calls;
        let refresh = move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            Ok(refreshed("at-2"))
        };

        let (first, second) = tokio::join!(coalescer.refresh("rt-1", refresh), coalescer.refresh("rt-1", refresh));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.unwrap().access_token, "at-2");
        assert_eq!(second.unwrap().access_token, "at-2");

        // A late request with the old token gets the same result
        let late = coalescer.refresh("rt-1", refresh).await.unwrap();
        assert_eq!(late.access_token, "at-2");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_distinct_refresh_tokens_refresh_independently() {
        let coalescer = RefreshCoalescer::default();
        let calls = AtomicUsize::new(0);
        let calls = &calls;
        let refresh = move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<SessionToken, _>("invalid_grant".to_string())
        };

        assert!(coalescer.refresh("rt-a", refresh).await.is_err());
        assert!(coalescer.refresh("rt-b", refresh).await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
