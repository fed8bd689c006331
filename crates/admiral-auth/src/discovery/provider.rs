//! Metadata providers and the discovery document fetcher

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use tracing::{debug, error, info};
use url::Url;

use super::types::AuthorizationServerMetadata;
use crate::config::{AuthConfig, AuthorizationServerKind};
use crate::error::{AuthError, AuthResult};
use crate::oauth2::http_client::{HttpTransport, get_request};
use crate::types::ClientRegistration;

/// RFC 8414 discovery path, resolved against the server root
pub const OAUTH2_METADATA_PATH: &str = "/.well-known/oauth-authorization-server";

/// OIDC discovery suffix, appended to the issuer
pub const OPENID_CONFIGURATION_SUFFIX: &str = ".well-known/openid-configuration";

/// Self-hosted authorize endpoint, relative to the public URI
pub const AUTHORIZE_RELATIVE_PATH: &str = "oauth2/authorize";
/// Self-hosted token endpoint, relative to the public URI
pub const TOKEN_RELATIVE_PATH: &str = "oauth2/token";
/// Self-hosted JWKS endpoint, relative to the public URI
pub const JWKS_RELATIVE_PATH: &str = "oauth2/jwks";

/// Supplies the authorization server metadata document and client descriptor
#[async_trait]
pub trait MetadataProvider: Send + Sync + 'static {
    /// Current authorization server metadata
    ///
    /// # Errors
    ///
    /// Self-hosted providers fail only on URL resolution
    /// ([`AuthError::ConfigurationInvalid`]). External providers fail with
    /// [`AuthError::UpstreamUnavailable`] or [`AuthError::UpstreamMalformed`].
    async fn get_metadata(&self) -> AuthResult<AuthorizationServerMetadata>;

    /// Public client registration; never fails
    fn client_descriptor(&self) -> ClientRegistration;

    /// Which variant this is
    fn kind(&self) -> AuthorizationServerKind;
}

/// Build the provider variant selected by configuration
///
/// # Errors
///
/// Returns [`AuthError::ConfigurationInvalid`] if the external discovery URL
/// cannot be derived.
pub fn metadata_provider_from_config(
    config: &AuthConfig,
    transport: Arc<dyn HttpTransport>,
) -> AuthResult<Arc<dyn MetadataProvider>> {
    let descriptor = client_descriptor_from_config(config);
    match config.authorization_server.kind {
        AuthorizationServerKind::SelfHosted => Ok(Arc::new(SelfHostedMetadata::new(config, descriptor))),
        AuthorizationServerKind::External => {
            let url = external_metadata_url(config)?;
            let fetcher = DocumentFetcher::new(
                url,
                transport,
                Duration::from_secs(config.discovery_cache_ttl_secs),
            );
            Ok(Arc::new(ExternalMetadataProxy::new(fetcher, descriptor)))
        }
    }
}

fn client_descriptor_from_config(config: &AuthConfig) -> ClientRegistration {
    ClientRegistration {
        client_id: config.client.client_id.clone(),
        redirect_uri: config.client.redirect_uri.clone(),
        scopes: config.client.scopes.clone(),
        authorization_metadata_key: config.grpc_authorization_header.clone(),
    }
}

/// Discovery URL for external mode: explicit override, then the authorization
/// server base, then the identity provider base
///
/// # Errors
///
/// Returns [`AuthError::ConfigurationInvalid`] if the URL cannot be resolved.
pub fn external_metadata_url(config: &AuthConfig) -> AuthResult<Url> {
    if let Some(url) = &config.authorization_server.metadata_url {
        return Ok(url.clone());
    }
    let base = config
        .authorization_server
        .base_url
        .as_ref()
        .unwrap_or(&config.identity_provider.base_url);
    base.join(OAUTH2_METADATA_PATH)
        .map_err(|e| AuthError::config(format!("invalid authorization server base URL: {e}")))
}

/// OIDC discovery URL for an issuer base
///
/// # Errors
///
/// Returns [`AuthError::ConfigurationInvalid`] if the URL cannot be resolved.
pub fn openid_configuration_url(issuer: &Url) -> AuthResult<Url> {
    let mut base = issuer.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join(OPENID_CONFIGURATION_SUFFIX)
        .map_err(|e| AuthError::config(format!("invalid identity provider base URL: {e}")))
}

/// Metadata synthesized from local configuration; performs no I/O
#[derive(Debug, Clone)]
pub struct SelfHostedMetadata {
    public_uri: Url,
    issuer: String,
    grant_types: Vec<String>,
    scopes: Vec<String>,
    descriptor: ClientRegistration,
}

impl SelfHostedMetadata {
    /// Create from configuration
    pub fn new(config: &AuthConfig, descriptor: ClientRegistration) -> Self {
        Self {
            public_uri: config.http_public_uri.clone(),
            issuer: config
                .authorization_server
                .issuer
                .clone()
                .unwrap_or_else(|| config.http_public_uri.to_string()),
            grant_types: config.authorization_server.grant_types.clone(),
            scopes: config.authorization_server.scopes.clone(),
            descriptor,
        }
    }

    fn resolve(&self, relative: &str) -> AuthResult<String> {
        self.public_uri
            .join(relative)
            .map(String::from)
            .map_err(|e| AuthError::config(format!("cannot resolve '{relative}': {e}")))
    }
}

#[async_trait]
impl MetadataProvider for SelfHostedMetadata {
    async fn get_metadata(&self) -> AuthResult<AuthorizationServerMetadata> {
        Ok(AuthorizationServerMetadata {
            issuer: Some(self.issuer.clone()),
            authorization_endpoint: Some(self.resolve(AUTHORIZE_RELATIVE_PATH)?),
            token_endpoint: Some(self.resolve(TOKEN_RELATIVE_PATH)?),
            jwks_uri: Some(self.resolve(JWKS_RELATIVE_PATH)?),
            scopes_supported: Some(self.scopes.clone()),
            response_types_supported: Some(vec![
                "code".to_string(),
                "token".to_string(),
                "code token".to_string(),
            ]),
            grant_types_supported: Some(self.grant_types.clone()),
            token_endpoint_auth_methods_supported: Some(vec!["client_secret_basic".to_string()]),
            code_challenge_methods_supported: Some(vec!["S256".to_string()]),
            additional_fields: Default::default(),
        })
    }

    fn client_descriptor(&self) -> ClientRegistration {
        self.descriptor.clone()
    }

    fn kind(&self) -> AuthorizationServerKind {
        AuthorizationServerKind::SelfHosted
    }
}

/// Metadata relayed unmodified from an external authorization server
#[derive(Debug, Clone)]
pub struct ExternalMetadataProxy {
    fetcher: DocumentFetcher<AuthorizationServerMetadata>,
    descriptor: ClientRegistration,
}

impl ExternalMetadataProxy {
    /// Create from a fetcher pointed at the discovery URL
    pub fn new(fetcher: DocumentFetcher<AuthorizationServerMetadata>, descriptor: ClientRegistration) -> Self {
        Self { fetcher, descriptor }
    }

    /// Discovery URL being relayed
    pub fn metadata_url(&self) -> &Url {
        self.fetcher.url()
    }
}

#[async_trait]
impl MetadataProvider for ExternalMetadataProxy {
    async fn get_metadata(&self) -> AuthResult<AuthorizationServerMetadata> {
        self.fetcher.fetch().await
    }

    fn client_descriptor(&self) -> ClientRegistration {
        self.descriptor.clone()
    }

    fn kind(&self) -> AuthorizationServerKind {
        AuthorizationServerKind::External
    }
}

#[derive(Debug, Clone)]
struct CachedDocument<T> {
    document: T,
    fetched_at: Instant,
}

/// Fetches a JSON document with one GET per call, optionally cached for a TTL
///
/// A zero TTL disables the cache, so every call reaches the upstream server.
pub struct DocumentFetcher<T> {
    url: Url,
    transport: Arc<dyn HttpTransport>,
    cache_ttl: Duration,
    cache: Arc<RwLock<Option<CachedDocument<T>>>>,
}

impl<T> Clone for DocumentFetcher<T> {
    fn clone(&self) -> Self {
        Self {
            url: self.url.clone(),
            transport: Arc::clone(&self.transport),
            cache_ttl: self.cache_ttl,
            cache: Arc::clone(&self.cache),
        }
    }
}

impl<T> std::fmt::Debug for DocumentFetcher<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentFetcher")
            .field("url", &self.url.as_str())
            .field("cache_ttl", &self.cache_ttl)
            .finish_non_exhaustive()
    }
}

impl<T> DocumentFetcher<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Create a fetcher; `cache_ttl` of zero disables caching
    pub fn new(url: Url, transport: Arc<dyn HttpTransport>, cache_ttl: Duration) -> Self {
        Self {
            url,
            transport,
            cache_ttl,
            cache: Arc::new(RwLock::new(None)),
        }
    }

    /// Document URL
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Fetch the document, from cache when still fresh
    ///
    /// # Errors
    ///
    /// - [`AuthError::UpstreamUnavailable`] on transport failure or non-2xx status
    /// - [`AuthError::UpstreamMalformed`] when the body does not decode
    pub async fn fetch(&self) -> AuthResult<T> {
        if !self.cache_ttl.is_zero() {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref()
                && cached.fetched_at.elapsed() < self.cache_ttl
            {
                debug!(url = %self.url, "Using cached discovery document");
                return Ok(cached.document.clone());
            }
        }

        self.refresh().await
    }

    /// Fetch the document from upstream, replacing any cached copy
    ///
    /// # Errors
    ///
    /// Same as [`DocumentFetcher::fetch`].
    pub async fn refresh(&self) -> AuthResult<T> {
        let document = self.fetch_uncached().await?;

        if !self.cache_ttl.is_zero() {
            let mut cache = self.cache.write().await;
            *cache = Some(CachedDocument {
                document: document.clone(),
                fetched_at: Instant::now(),
            });
        }

        Ok(document)
    }

    async fn fetch_uncached(&self) -> AuthResult<T> {
        debug!(url = %self.url, "Fetching discovery document");

        let unavailable = |reason: String, timed_out: bool| AuthError::UpstreamUnavailable {
            url: self.url.to_string(),
            reason,
            timed_out,
        };

        let request = get_request(self.url.as_str()).map_err(|e| unavailable(e.to_string(), false))?;
        let response = self.transport.send(request).await.map_err(|e| {
            error!(url = %self.url, error = %e, "Discovery request failed");
            unavailable(e.to_string(), e.is_timeout())
        })?;

        if !response.status().is_success() {
            error!(url = %self.url, status = %response.status(), "Discovery endpoint returned error status");
            return Err(unavailable(format!("status {}", response.status()), false));
        }

        let document = serde_json::from_slice(response.body()).map_err(|e| {
            error!(url = %self.url, error = %e, "Failed to parse discovery document");
            AuthError::UpstreamMalformed {
                url: self.url.to_string(),
                reason: e.to_string(),
            }
        })?;

        info!(url = %self.url, "Fetched discovery document");
        Ok(document)
    }
}
