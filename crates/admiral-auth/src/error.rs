//! Error taxonomy for authentication and OAuth2 flows
//!
//! Every fallible operation in this crate returns [`AuthError`]. Variants are
//! deliberately coarse: callers decide on an HTTP or RPC status from the
//! variant alone, and no variant carries credential material.

use http::StatusCode;

/// Result alias used throughout the crate
pub type AuthResult<T> = Result<T, AuthError>;

/// Authentication and authorization failures
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum AuthError {
    /// Configuration is missing a required value or holds an unusable one
    #[error("Invalid auth configuration: {0}")]
    ConfigurationInvalid(String),

    /// An upstream server could not be reached or answered with an error status
    #[error("Upstream unavailable at {url}: {reason}")]
    UpstreamUnavailable {
        /// URL that was requested
        url: String,
        /// Human-readable cause
        reason: String,
        /// Whether the failure was a timeout
        timed_out: bool,
    },

    /// An upstream server answered with a body that could not be decoded
    #[error("Malformed upstream response from {url}: {reason}")]
    UpstreamMalformed {
        /// URL that was requested
        url: String,
        /// Decoding error
        reason: String,
    },

    /// The token endpoint could not be reached or its success body was unusable
    #[error("Token exchange failed: {0}")]
    TokenExchangeFailed(String),

    /// The token endpoint rejected the grant
    #[error("Token exchange rejected with status {status}")]
    TokenExchangeRejected {
        /// HTTP status returned by the token endpoint
        status: u16,
        /// Response body, truncated, for diagnostics
        body: String,
    },

    /// The userinfo endpoint answered with a non-success status
    #[error("Identity provider rejected the request with status {status}")]
    IdentityProviderRejected {
        /// HTTP status returned by the userinfo endpoint
        status: u16,
    },

    /// The userinfo endpoint answered 200 with a body that is not valid claims
    #[error("Identity provider returned malformed user info: {0}")]
    IdentityProviderMalformed(String),

    /// Session token signature, structure or key id is not acceptable
    #[error("Session token is invalid")]
    SessionInvalid,

    /// Session token signature is valid but its lifetime has elapsed
    #[error("Session token has expired")]
    SessionExpired,

    /// Callback `state` does not match the value issued by `/login`
    #[error("OAuth2 state mismatch")]
    StateMismatch,

    /// The identity provider returned an `error` parameter on the callback
    #[error("Authorization denied by identity provider: {0}")]
    AuthorizationDenied(String),

    /// No acceptable credential was presented
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),
}

impl AuthError {
    /// Shorthand for [`AuthError::ConfigurationInvalid`]
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigurationInvalid(message.into())
    }

    /// Shorthand for [`AuthError::Unauthenticated`]
    pub fn unauthenticated(reason: impl Into<String>) -> Self {
        Self::Unauthenticated(reason.into())
    }

    /// HTTP status that best represents this error on the REST surface
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthenticated(_)
            | Self::SessionInvalid
            | Self::SessionExpired
            | Self::AuthorizationDenied(_) => StatusCode::UNAUTHORIZED,
            Self::StateMismatch => StatusCode::BAD_REQUEST,
            Self::IdentityProviderRejected { status } if *status == 401 || *status == 403 => {
                StatusCode::UNAUTHORIZED
            }
            Self::UpstreamUnavailable {
                timed_out: true, ..
            } => StatusCode::GATEWAY_TIMEOUT,
            Self::UpstreamUnavailable { .. }
            | Self::UpstreamMalformed { .. }
            | Self::TokenExchangeFailed(_)
            | Self::TokenExchangeRejected { .. }
            | Self::IdentityProviderRejected { .. }
            | Self::IdentityProviderMalformed(_) => StatusCode::BAD_GATEWAY,
            Self::ConfigurationInvalid(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable error code for JSON bodies
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ConfigurationInvalid(_) => "configuration_invalid",
            Self::UpstreamUnavailable { .. } => "upstream_unavailable",
            Self::UpstreamMalformed { .. } => "upstream_malformed",
            Self::TokenExchangeFailed(_) => "token_exchange_failed",
            Self::TokenExchangeRejected { .. } => "token_exchange_rejected",
            Self::IdentityProviderRejected { .. } => "identity_provider_rejected",
            Self::IdentityProviderMalformed(_) => "identity_provider_malformed",
            Self::SessionInvalid => "session_invalid",
            Self::SessionExpired => "session_expired",
            Self::StateMismatch => "state_mismatch",
            Self::AuthorizationDenied(_) => "access_denied",
            Self::Unauthenticated(_) => "unauthenticated",
        }
    }

    /// Whether this error means the caller presented no usable credential
    pub fn is_credential_failure(&self) -> bool {
        matches!(
            self,
            Self::Unauthenticated(_) | Self::SessionInvalid | Self::SessionExpired
        )
    }
}
