//! Assembly of the auth components from configuration

use std::sync::Arc;

use tracing::info;

use crate::config::{AuthConfig, AuthorizationServerKind};
use crate::discovery::{MetadataProvider, metadata_provider_from_config};
use crate::error::AuthResult;
use crate::jwt::JwtVerifier;
use crate::oauth2::{HttpTransport, TokenExchanger};
use crate::session::SessionCodec;
use crate::verify::{CredentialVerifier, TokenVerifier};

/// All auth components, built once at startup and shared read-only
#[derive(Clone)]
pub struct AuthServices {
    /// Validated configuration
    pub config: Arc<AuthConfig>,
    /// Metadata provider variant selected by configuration
    pub metadata: Arc<dyn MetadataProvider>,
    /// Identity provider client
    pub exchanger: Arc<TokenExchanger>,
    /// Cookie codec
    pub sessions: SessionCodec,
    /// Bearer credential verifier used by the authentication interceptor
    pub verifier: Arc<dyn TokenVerifier>,
}

impl std::fmt::Debug for AuthServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthServices")
            .field("kind", &self.metadata.kind())
            .field("exchanger", &self.exchanger)
            .field("sessions", &self.sessions)
            .finish_non_exhaustive()
    }
}

impl AuthServices {
    /// Validate `config` and build every component
    ///
    /// # Errors
    ///
    /// Returns [`crate::AuthError::ConfigurationInvalid`] if validation fails.
    pub fn from_config(config: AuthConfig, transport: Arc<dyn HttpTransport>) -> AuthResult<Self> {
        config.validate()?;

        let metadata = metadata_provider_from_config(&config, Arc::clone(&transport))?;
        let exchanger = Arc::new(TokenExchanger::from_config(&config, Arc::clone(&transport))?);
        let sessions = SessionCodec::from_config(&config.cookie)?;

        let mut verifier = CredentialVerifier::new(sessions.clone());
        if config.authorization_server.kind == AuthorizationServerKind::External {
            verifier = verifier.with_jwt_verifier(Arc::new(JwtVerifier::new(
                &config,
                Arc::clone(&metadata),
                transport,
            )));
        }

        info!(
            authorization_server = ?config.authorization_server.kind,
            identity_provider = %config.identity_provider.base_url,
            "Auth services initialised"
        );

        Ok(Self {
            config: Arc::new(config),
            metadata,
            exchanger,
            sessions,
            verifier: Arc::new(verifier),
        })
    }
}
