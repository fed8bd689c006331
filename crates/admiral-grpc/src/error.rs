//! Error types for the RPC layer
//!
//! Maps auth failures onto gRPC status codes. Status messages are generic so
//! no credential material or upstream response body reaches the caller.

use admiral_auth::AuthError;
use thiserror::Error;
use tonic::Status;

/// Result type for RPC layer operations
pub type GrpcResult<T> = Result<T, GrpcError>;

/// Error type for RPC layer operations
#[derive(Debug, Error)]
pub enum GrpcError {
    /// gRPC transport error
    #[error("gRPC transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    /// gRPC status error
    #[error("gRPC status error: {0}")]
    Status(#[from] Status),

    /// Authentication failure
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl GrpcError {
    /// Create a configuration error
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

impl From<GrpcError> for Status {
    fn from(err: GrpcError) -> Self {
        match err {
            GrpcError::Transport(e) => Status::unavailable(e.to_string()),
            GrpcError::Status(s) => s,
            GrpcError::Auth(e) => status_from_auth_error(&e),
            GrpcError::Config(msg) => Status::failed_precondition(msg),
        }
    }
}

/// Convert an auth error to a gRPC status
///
/// Credential failures become `UNAUTHENTICATED`; upstream failures during
/// verification also deny the call rather than surfacing as server errors.
#[must_use]
pub fn status_from_auth_error(err: &AuthError) -> Status {
    match err {
        AuthError::SessionExpired => Status::unauthenticated("session expired"),
        AuthError::StateMismatch => Status::invalid_argument("state mismatch"),
        AuthError::ConfigurationInvalid(_) => Status::unauthenticated("authentication unavailable"),
        AuthError::UpstreamUnavailable { timed_out: true, .. } => {
            Status::unauthenticated("credential verification timed out")
        }
        _ => Status::unauthenticated("invalid or missing credentials"),
    }
}
