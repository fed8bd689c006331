//! # Admiral Auth
//!
//! OAuth2 building blocks for the Admiral control-plane gateway: signed
//! session cookies, authorization server discovery, the browser login flow
//! against an OpenID Connect identity provider, and bearer credential
//! verification.
//!
//! ## Architecture
//!
//! - [`session`] - HS256 signed session and login-state cookies
//! - [`discovery`] - Self-hosted or relayed authorization server metadata
//! - [`oauth2`](crate::oauth2) - Token exchange, refresh and userinfo through [`HttpTransport`](crate::oauth2::HttpTransport)
//! - [`jwt`] - JWKS-backed verification of externally issued tokens
//! - [`verify`] - The single producer of [`CallIdentity`]
//! - [`services`] - Assembly of all of the above from [`AuthConfig`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use admiral_auth::{AuthConfig, AuthServices, oauth2::ReqwestTransport};
//!
//! # fn example(config: AuthConfig) -> Result<(), Box<dyn std::error::Error>> {
//! let transport = Arc::new(ReqwestTransport::new()?);
//! let services = AuthServices::from_config(config, transport)?;
//! let descriptor = services.metadata.client_descriptor();
//! println!("native clients use {}", descriptor.client_id);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod discovery;
pub mod error;
pub mod jwt;
pub mod oauth2;
pub mod services;
pub mod session;
pub mod types;
pub mod verify;

pub use config::{
    AuthConfig, AuthorizationServerConfig, AuthorizationServerKind, ClientConfig, CookieConfig,
    IdentityProviderConfig, JwksConfig, RESERVED_ROUTES, SameSite,
};
pub use error::{AuthError, AuthResult};
pub use services::AuthServices;
pub use session::{LoginState, SessionCodec};
pub use types::{CallIdentity, ClientRegistration, CredentialKind, IdentityClaims, SessionToken};
pub use verify::{CredentialVerifier, TokenVerifier};
