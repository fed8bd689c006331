//! Gateway error types
//!
//! [`GatewayError`] covers startup: configuration, certificates, listener
//! binding and route registration. [`ApiError`] renders request-time auth
//! failures as JSON for the HTTP surface.

use std::net::SocketAddr;
use std::path::PathBuf;

use admiral_auth::AuthError;
use admiral_grpc::GrpcError;
use axum::Json;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use crate::tls::TlsError;

/// Result type for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Gateway startup error
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Config file not found
    #[error("Configuration file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),

    /// Unsupported file format
    #[error("Unsupported configuration file format for {}. Use .toml, .yaml, .yml, or .json", .0.display())]
    UnsupportedConfigFormat(PathBuf),

    /// Configuration parsing error
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] config::ConfigError),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Certificate or key could not be loaded
    #[error("TLS setup failed: {0}")]
    Tls(#[from] TlsError),

    /// Listener could not be bound
    #[error("Failed to bind {address}: {source}")]
    Bind {
        /// Requested address
        address: SocketAddr,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Two REST bindings claim the same method and path
    #[error("Duplicate REST binding: {method} {path}")]
    DuplicateRoute {
        /// HTTP method
        method: http::Method,
        /// Route path
        path: String,
    },

    /// REST binding path cannot be routed
    #[error("Invalid REST binding path '{path}': {reason}")]
    InvalidRoute {
        /// Route path
        path: String,
        /// What is wrong with it
        reason: String,
    },

    /// Auth component construction failed
    #[error("Auth setup failed: {0}")]
    Auth(#[from] AuthError),

    /// RPC server construction failed
    #[error("RPC setup failed: {0}")]
    Grpc(#[from] GrpcError),

    /// Logging could not be initialized
    #[error("Logging setup failed: {0}")]
    Logging(String),

    /// I/O error while serving
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Request-time auth failure rendered as `{"error", "error_description"}`
#[derive(Debug)]
pub struct ApiError(pub AuthError);

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        Self(err)
    }
}

impl ApiError {
    /// Human-readable description safe to show the caller
    ///
    /// Never includes tokens, cookie values or upstream response bodies.
    pub fn description(&self) -> String {
        match &self.0 {
            AuthError::ConfigurationInvalid(_) => "the server's authentication configuration is invalid".into(),
            AuthError::UpstreamUnavailable { timed_out: true, .. } => {
                "the authorization server did not respond in time".into()
            }
            AuthError::UpstreamUnavailable { .. } => "the authorization server is unavailable".into(),
            AuthError::UpstreamMalformed { .. } => "the authorization server returned an unreadable response".into(),
            AuthError::TokenExchangeFailed(_) => "the token request to the identity provider failed".into(),
            AuthError::TokenExchangeRejected { status, .. } => {
                format!("the identity provider rejected the token request (status {status})")
            }
            AuthError::IdentityProviderRejected { status } => {
                format!("the identity provider rejected the userinfo request (status {status})")
            }
            AuthError::IdentityProviderMalformed(_) => "the identity provider returned unreadable userinfo".into(),
            AuthError::SessionInvalid => "the session is invalid".into(),
            AuthError::SessionExpired => "the session has expired".into(),
            AuthError::StateMismatch => "the login state did not match; start the login again".into(),
            AuthError::AuthorizationDenied(reason) => format!("authorization was denied: {reason}"),
            AuthError::Unauthenticated(_) => "authentication is required".into(),
            _ => "authentication failed".into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.0.status_code();
        if status.is_server_error() {
            tracing::warn!(error = %self.0, status = status.as_u16(), "Auth request failed");
        } else {
            tracing::debug!(error = %self.0, status = status.as_u16(), "Auth request rejected");
        }
        let body = Json(json!({
            "error": self.0.error_code(),
            "error_description": self.description(),
        }));
        (status, body).into_response()
    }
}
