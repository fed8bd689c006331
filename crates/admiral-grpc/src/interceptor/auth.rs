use std::sync::Arc;
use std::time::Duration;

use admiral_auth::TokenVerifier;
use async_trait::async_trait;
use http::header::AUTHORIZATION;
use tonic::Status;
use tracing::{debug, warn};

use super::{CallContext, CallInterceptor};
use crate::error::status_from_auth_error;

/// Fails closed on any call without a fully verified bearer credential
///
/// On success the verified [`admiral_auth::CallIdentity`] is inserted into the
/// request extensions, where handlers read it with
/// `request.extensions().get::<CallIdentity>()`.
#[derive(Clone)]
pub struct AuthenticationInterceptor {
    verifier: Arc<dyn TokenVerifier>,
    timeout: Duration,
}

impl std::fmt::Debug for AuthenticationInterceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticationInterceptor")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl AuthenticationInterceptor {
    /// Verify with `verifier`, giving up after `timeout`
    pub fn new(verifier: Arc<dyn TokenVerifier>, timeout: Duration) -> Self {
        Self { verifier, timeout }
    }
}

#[async_trait]
impl CallInterceptor for AuthenticationInterceptor {
    fn name(&self) -> &'static str {
        "authentication"
    }

    async fn on_request(&self, ctx: &mut CallContext) -> Result<(), Status> {
        let Some(token) = bearer_token(&ctx.headers) else {
            warn!(method = %ctx.method, reason = "missing bearer credential", "Call denied");
            return Err(Status::unauthenticated("missing bearer credential"));
        };

        let identity = match tokio::time::timeout(self.timeout, self.verifier.verify(token)).await {
            Ok(Ok(identity)) => identity,
            Ok(Err(e)) => {
                warn!(method = %ctx.method, reason = %e, "Call denied");
                return Err(status_from_auth_error(&e));
            }
            Err(_) => {
                warn!(method = %ctx.method, timeout_ms = self.timeout.as_millis() as u64, "Credential verification timed out");
                return Err(Status::unauthenticated("credential verification timed out"));
            }
        };

        debug!(
            method = %ctx.method,
            subject = %identity.subject(),
            kind = ?identity.credential_kind(),
            "Call authenticated"
        );
        ctx.extensions.insert(identity);
        Ok(())
    }
}

/// Token from `authorization: Bearer <token>`; the scheme is case-insensitive
fn bearer_token(headers: &http::HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}
