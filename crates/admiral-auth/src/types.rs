//! Core authentication types

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

/// Profile claims returned by the identity provider's userinfo endpoint
///
/// Only these five claims are decoded; anything else in the document is ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityClaims {
    /// Subject identifier
    pub sub: String,
    /// Full display name
    #[serde(default)]
    pub name: String,
    /// Preferred username
    #[serde(default)]
    pub preferred_username: String,
    /// Given name
    #[serde(default)]
    pub given_name: String,
    /// Family name
    #[serde(default)]
    pub family_name: String,
}

/// Tokens obtained from the identity provider, carried client-side in a signed cookie
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionToken {
    /// IdP access token
    pub access_token: String,
    /// IdP refresh token, when the grant produced one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Access-token expiry, second precision
    #[serde(with = "chrono::serde::ts_seconds")]
    pub expires_at: DateTime<Utc>,
    /// Identity claims captured at exchange time
    pub claims: IdentityClaims,
}

impl SessionToken {
    /// Create a session token; `expires_at` is truncated to whole seconds
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_at: DateTime<Utc>,
        claims: IdentityClaims,
    ) -> Self {
        let expires_at = DateTime::from_timestamp(expires_at.timestamp(), 0).unwrap_or(expires_at);
        Self {
            access_token: access_token.into(),
            refresh_token,
            expires_at,
            claims,
        }
    }

    /// Whether the access token has expired at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Whether the access token expires within `margin` of `now` and can be refreshed
    pub fn needs_refresh_at(&self, now: DateTime<Utc>, margin: std::time::Duration) -> bool {
        let margin = ChronoDuration::from_std(margin).unwrap_or_else(|_| ChronoDuration::zero());
        self.refresh_token.is_some() && self.expires_at <= now + margin
    }
}

/// How a caller proved its identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialKind {
    /// Signed session cookie issued by this server
    Session,
    /// Access token issued by the external authorization server
    Jwt,
}

/// Verified identity of the caller of a single request
///
/// Only the credential verifier in this crate can construct one, so holding a
/// `CallIdentity` implies the credential it came from was verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallIdentity {
    claims: IdentityClaims,
    kind: CredentialKind,
}

impl CallIdentity {
    pub(crate) fn new(claims: IdentityClaims, kind: CredentialKind) -> Self {
        Self { claims, kind }
    }

    /// Subject identifier
    pub fn subject(&self) -> &str {
        &self.claims.sub
    }

    /// Full display name
    pub fn name(&self) -> &str {
        &self.claims.name
    }

    /// Preferred username
    pub fn preferred_username(&self) -> &str {
        &self.claims.preferred_username
    }

    /// Given name
    pub fn given_name(&self) -> &str {
        &self.claims.given_name
    }

    /// Family name
    pub fn family_name(&self) -> &str {
        &self.claims.family_name
    }

    /// All profile claims
    pub fn claims(&self) -> &IdentityClaims {
        &self.claims
    }

    /// Credential kind that produced this identity
    pub fn credential_kind(&self) -> CredentialKind {
        self.kind
    }
}

/// Public client registration handed to native clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRegistration {
    /// Client id to use
    pub client_id: String,
    /// Redirect URI to use
    pub redirect_uri: String,
    /// Scopes to request
    pub scopes: Vec<String>,
    /// Metadata key under which to present the bearer token
    pub authorization_metadata_key: String,
}
