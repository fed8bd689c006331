//! JWT validation against the authorization server's JWKS
//!
//! Used for bearer tokens minted by an external authorization server. Checks:
//! - Signature against a JWKS key (asymmetric algorithms only)
//! - Issuer (configured override, else the metadata document's `issuer`)
//! - Audience, when one is configured
//! - Expiry with configurable clock skew tolerance

use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use tokio::sync::OnceCell;
use tracing::{debug, warn};
use url::Url;

use super::jwks::JwksClient;
use crate::config::AuthConfig;
use crate::discovery::MetadataProvider;
use crate::error::{AuthError, AuthResult};
use crate::oauth2::http_client::HttpTransport;
use crate::types::IdentityClaims;

/// Algorithms accepted for externally issued tokens
pub const ALLOWED_ALGORITHMS: &[Algorithm] = &[
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
    Algorithm::ES256,
    Algorithm::ES384,
];

#[derive(Debug)]
struct Resolved {
    issuer: String,
    jwks: JwksClient,
}

/// Verifies externally issued JWT access tokens
///
/// The issuer and JWKS location are resolved from the metadata provider on
/// first use and reused afterwards; the key set itself is cached by
/// [`JwksClient`].
pub struct JwtVerifier {
    provider: Arc<dyn MetadataProvider>,
    transport: Arc<dyn HttpTransport>,
    issuer_override: Option<String>,
    jwks_uri_override: Option<Url>,
    audience: Option<String>,
    leeway: u64,
    cache_ttl: Duration,
    resolved: OnceCell<Resolved>,
}

impl std::fmt::Debug for JwtVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtVerifier")
            .field("issuer_override", &self.issuer_override)
            .field("audience", &self.audience)
            .field("leeway", &self.leeway)
            .finish_non_exhaustive()
    }
}

impl JwtVerifier {
    /// Create a verifier backed by `provider` for issuer and JWKS discovery
    pub fn new(config: &AuthConfig, provider: Arc<dyn MetadataProvider>, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            provider,
            transport,
            issuer_override: config.authorization_server.issuer.clone(),
            jwks_uri_override: config.jwks.jwks_uri.clone(),
            audience: config.jwks.audience.clone(),
            leeway: config.jwks.leeway_secs,
            cache_ttl: Duration::from_secs(config.jwks.cache_ttl_secs),
            resolved: OnceCell::new(),
        }
    }

    async fn resolved(&self) -> AuthResult<&Resolved> {
        self.resolved
            .get_or_try_init(|| async {
                let metadata = self.provider.get_metadata().await?;
                let issuer = self
                    .issuer_override
                    .clone()
                    .or(metadata.issuer)
                    .ok_or_else(|| AuthError::config("authorization server metadata has no issuer"))?;
                let jwks_uri = match &self.jwks_uri_override {
                    Some(url) => url.clone(),
                    None => {
                        let raw = metadata
                            .jwks_uri
                            .ok_or_else(|| AuthError::config("authorization server metadata has no jwks_uri"))?;
                        Url::parse(&raw).map_err(|e| AuthError::config(format!("invalid jwks_uri: {e}")))?
                    }
                };
                debug!(%issuer, jwks_uri = %jwks_uri, "Resolved JWT verification settings");
                Ok(Resolved {
                    issuer,
                    jwks: JwksClient::new(jwks_uri, Arc::clone(&self.transport), self.cache_ttl),
                })
            })
            .await
    }

    /// Verify a bearer JWT and return its identity claims
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Unauthenticated`] for every failure, including an
    /// unreachable or malformed metadata document or key set.
    pub async fn verify(&self, token: &str) -> AuthResult<IdentityClaims> {
        let header = decode_header(token).map_err(|_| AuthError::unauthenticated("malformed token"))?;
        if !ALLOWED_ALGORITHMS.contains(&header.alg) {
            warn!(alg = ?header.alg, "Rejected token with disallowed algorithm");
            return Err(AuthError::unauthenticated("disallowed signing algorithm"));
        }

        let resolved = self.resolved().await.map_err(keys_unavailable)?;
        let jwk = resolved
            .jwks
            .find_key(header.kid.as_deref())
            .await
            .map_err(keys_unavailable)?
            .ok_or_else(|| AuthError::unauthenticated("unknown signing key"))?;
        let key = DecodingKey::from_jwk(&jwk).map_err(|_| AuthError::unauthenticated("unusable signing key"))?;

        let mut validation = Validation::new(header.alg);
        validation.leeway = self.leeway;
        validation.set_issuer(&[resolved.issuer.as_str()]);
        match &self.audience {
            Some(audience) => validation.set_audience(&[audience.as_str()]),
            None => validation.validate_aud = false,
        }

        decode::<IdentityClaims>(token, &key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::unauthenticated("token expired"),
                ErrorKind::InvalidIssuer => AuthError::unauthenticated("issuer mismatch"),
                ErrorKind::InvalidAudience => AuthError::unauthenticated("audience mismatch"),
                _ => AuthError::unauthenticated("invalid token"),
            })
    }
}

fn keys_unavailable(error: AuthError) -> AuthError {
    warn!(error = %error, "Signing keys unavailable, denying token");
    AuthError::unauthenticated("signing keys unavailable")
}
