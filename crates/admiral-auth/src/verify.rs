//! Bearer credential verification
//!
//! [`CredentialVerifier`] is the only producer of [`CallIdentity`]. It routes
//! each bearer credential by its JWS key id: values stamped with the session
//! key id are decoded by the [`SessionCodec`]; anything else is treated as a
//! JWT from the external authorization server, if one is configured. Every
//! failure path ends in an error, never in an identity.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use crate::error::{AuthError, AuthResult};
use crate::jwt::JwtVerifier;
use crate::session::{SessionCodec, is_session_token};
use crate::types::{CallIdentity, CredentialKind};

/// Turns a bearer credential into a verified identity
#[async_trait]
pub trait TokenVerifier: Send + Sync + 'static {
    /// Verify `token`
    ///
    /// # Errors
    ///
    /// Returns an error for any credential that is not fully verified.
    async fn verify(&self, token: &str) -> AuthResult<CallIdentity>;
}

/// Verifies session cookies and, in external mode, JWT access tokens
#[derive(Debug, Clone)]
pub struct CredentialVerifier {
    sessions: SessionCodec,
    jwt: Option<Arc<JwtVerifier>>,
}

impl CredentialVerifier {
    /// Create a verifier accepting only this server's session tokens
    pub fn new(sessions: SessionCodec) -> Self {
        Self { sessions, jwt: None }
    }

    /// Also accept JWTs issued by the external authorization server
    #[must_use]
    pub fn with_jwt_verifier(mut self, jwt: Arc<JwtVerifier>) -> Self {
        self.jwt = Some(jwt);
        self
    }

    /// Session codec used for cookie credentials
    pub fn sessions(&self) -> &SessionCodec {
        &self.sessions
    }
}

#[async_trait]
impl TokenVerifier for CredentialVerifier {
    async fn verify(&self, token: &str) -> AuthResult<CallIdentity> {
        if token.is_empty() {
            return Err(AuthError::unauthenticated("empty credential"));
        }

        if is_session_token(token) {
            let session = self.sessions.decode(token)?;
            if session.is_expired_at(Utc::now()) {
                debug!(subject = %session.claims.sub, "Session access token expired");
                return Err(AuthError::SessionExpired);
            }
            return Ok(CallIdentity::new(session.claims, CredentialKind::Session));
        }

        match &self.jwt {
            Some(jwt) => {
                let claims = jwt.verify(token).await?;
                Ok(CallIdentity::new(claims, CredentialKind::Jwt))
            }
            None => Err(AuthError::unauthenticated("unrecognised credential")),
        }
    }
}
