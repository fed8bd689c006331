//! JWT verification for externally issued access tokens
//!
//! - [`JwksClient`] - key set retrieval with TTL caching and rotation handling
//! - [`JwtVerifier`] - signature, issuer, audience and expiry checks

mod jwks;
mod validator;

pub use jwks::{DEFAULT_JWKS_CACHE_TTL, JwksClient, MIN_REFRESH_INTERVAL};
pub use validator::{ALLOWED_ALGORITHMS, JwtVerifier};
