//! Authentication Configuration Types
//!
//! All values are loaded once at startup and are immutable afterwards. Call
//! [`AuthConfig::validate`] before building any component from a config.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use url::Url;

use crate::error::{AuthError, AuthResult};

/// Minimum length of the cookie signing key in bytes (HS256 key size)
pub const MIN_SIGNING_KEY_LEN: usize = 32;

/// Paths the gateway serves itself; the callback may not shadow any of them
pub const RESERVED_ROUTES: &[&str] = &[
    "/healthcheck",
    "/api/v1/openapi",
    "/login",
    "/me",
    "/.well-known/oauth-authorization-server",
    "/config/v1/client",
    "/oauth2/jwks",
];

/// Authentication configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Public base URI of this server, used for self-hosted endpoints and the callback
    pub http_public_uri: Url,
    /// Authorization server descriptor settings
    #[serde(default)]
    pub authorization_server: AuthorizationServerConfig,
    /// Upstream OpenID Connect identity provider used for browser logins
    pub identity_provider: IdentityProviderConfig,
    /// Public client registration handed to native clients
    #[serde(default)]
    pub client: ClientConfig,
    /// Metadata key under which native RPC clients present their bearer token
    #[serde(default = "default_grpc_authorization_header")]
    pub grpc_authorization_header: String,
    /// Session cookie settings
    pub cookie: CookieConfig,
    /// JWKS verification settings for externally issued tokens
    #[serde(default)]
    pub jwks: JwksConfig,
    /// TTL for cached external discovery documents; 0 disables caching
    #[serde(default)]
    pub discovery_cache_ttl_secs: u64,
    /// Deadline for credential verification inside the interceptor
    #[serde(default = "default_verify_timeout_ms")]
    pub verify_timeout_ms: u64,
    /// Destination after login when no valid `redirect_url` is supplied
    #[serde(default = "default_post_login_redirect")]
    pub post_login_redirect: String,
}

/// Which authorization server the metadata endpoint describes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthorizationServerKind {
    /// Metadata synthesized from local configuration
    #[default]
    #[serde(rename = "self")]
    SelfHosted,
    /// Metadata relayed from an external authorization server
    External,
}

/// Authorization server settings
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizationServerConfig {
    /// Self-hosted or external
    #[serde(default)]
    pub kind: AuthorizationServerKind,
    /// Base URL of the external authorization server
    #[serde(default)]
    pub base_url: Option<Url>,
    /// Explicit discovery document URL, overriding `base_url`
    #[serde(default)]
    pub metadata_url: Option<Url>,
    /// Issuer advertised in self mode; defaults to the public URI
    #[serde(default)]
    pub issuer: Option<String>,
    /// Grant types advertised in self mode
    #[serde(default = "default_grant_types")]
    pub grant_types: Vec<String>,
    /// Scopes advertised in self mode
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
}

impl Default for AuthorizationServerConfig {
    fn default() -> Self {
        Self {
            kind: AuthorizationServerKind::SelfHosted,
            base_url: None,
            metadata_url: None,
            issuer: None,
            grant_types: default_grant_types(),
            scopes: default_scopes(),
        }
    }
}

/// Upstream identity provider settings
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityProviderConfig {
    /// Issuer base URL; discovery lives under `.well-known/openid-configuration`
    pub base_url: Url,
    /// Confidential client id registered with the IdP
    pub client_id: String,
    /// Confidential client secret registered with the IdP
    #[serde(deserialize_with = "deserialize_secret")]
    pub client_secret: SecretString,
    /// Scopes requested during login
    #[serde(default = "default_idp_scopes")]
    pub scopes: Vec<String>,
    /// Userinfo endpoint override; discovered when unset
    #[serde(default)]
    pub userinfo_url: Option<Url>,
    /// Callback path relative to the public URI
    #[serde(default = "default_callback_path")]
    pub callback_path: String,
}

/// Public client registration projected by the client descriptor
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientConfig {
    /// Client id native clients should use
    #[serde(default)]
    pub client_id: String,
    /// Redirect URI native clients should use
    #[serde(default)]
    pub redirect_uri: String,
    /// Scopes native clients should request
    #[serde(default)]
    pub scopes: Vec<String>,
}

/// `SameSite` attribute written on session cookies
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SameSite {
    /// `SameSite=Strict`
    Strict,
    /// `SameSite=Lax`
    #[default]
    Lax,
    /// `SameSite=None` (requires `Secure`)
    None,
}

impl SameSite {
    /// Attribute value as written in `Set-Cookie`
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Strict => "Strict",
            Self::Lax => "Lax",
            Self::None => "None",
        }
    }
}

/// Session cookie settings
#[derive(Debug, Clone, Deserialize)]
pub struct CookieConfig {
    /// HMAC key used to sign session cookies
    #[serde(deserialize_with = "deserialize_secret")]
    pub signing_key: SecretString,
    /// Cookie name
    #[serde(default = "default_cookie_name")]
    pub name: String,
    /// Lifetime of the signed session cookie
    #[serde(default = "default_cookie_ttl_secs")]
    pub ttl_secs: u64,
    /// Refresh the access token when it expires within this margin
    #[serde(default = "default_refresh_margin_secs")]
    pub refresh_margin_secs: u64,
    /// `SameSite` attribute
    #[serde(default)]
    pub same_site: SameSite,
    /// Write `Secure`; always forced on when serving TLS
    #[serde(default)]
    pub secure: bool,
}

impl CookieConfig {
    /// Session lifetime as a [`Duration`]
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// Refresh margin as a [`Duration`]
    pub fn refresh_margin(&self) -> Duration {
        Duration::from_secs(self.refresh_margin_secs)
    }

    /// Name of the short-lived cookie carrying login state
    pub fn login_cookie_name(&self) -> String {
        format!("{}_login", self.name)
    }
}

/// JWKS verification settings
#[derive(Debug, Clone, Deserialize)]
pub struct JwksConfig {
    /// Expected `aud` claim; audience is not checked when unset
    #[serde(default)]
    pub audience: Option<String>,
    /// Explicit JWKS URL; discovered from authorization server metadata when unset
    #[serde(default)]
    pub jwks_uri: Option<Url>,
    /// JWKS cache lifetime
    #[serde(default = "default_jwks_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// Clock skew tolerance for `exp`/`nbf`
    #[serde(default = "default_leeway_secs")]
    pub leeway_secs: u64,
}

impl Default for JwksConfig {
    fn default() -> Self {
        Self {
            audience: None,
            jwks_uri: None,
            cache_ttl_secs: default_jwks_cache_ttl_secs(),
            leeway_secs: default_leeway_secs(),
        }
    }
}

impl AuthConfig {
    /// Check that every value needed at runtime is present and usable
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::ConfigurationInvalid`] naming the first offending field.
    pub fn validate(&self) -> AuthResult<()> {
        if self.cookie.signing_key.expose_secret().len() < MIN_SIGNING_KEY_LEN {
            return Err(AuthError::config(format!(
                "cookie.signing_key must be at least {MIN_SIGNING_KEY_LEN} bytes"
            )));
        }
        if self.cookie.name.is_empty() {
            return Err(AuthError::config("cookie.name must not be empty"));
        }
        if self.cookie.ttl_secs == 0 {
            return Err(AuthError::config("cookie.ttl_secs must be positive"));
        }
        if self.cookie.same_site == SameSite::None && !self.cookie.secure {
            return Err(AuthError::config(
                "cookie.same_site = none requires cookie.secure = true",
            ));
        }
        if self.identity_provider.client_id.is_empty() {
            return Err(AuthError::config("identity_provider.client_id must not be empty"));
        }
        if http::HeaderName::from_bytes(self.grpc_authorization_header.as_bytes()).is_err() {
            return Err(AuthError::config(format!(
                "grpc_authorization_header '{}' is not a valid metadata key",
                self.grpc_authorization_header
            )));
        }
        let callback_route = self.callback_route();
        if RESERVED_ROUTES.contains(&callback_route.as_str()) {
            return Err(AuthError::config(format!(
                "identity_provider.callback_path '{callback_route}' collides with a built-in route"
            )));
        }
        self.callback_url()?;
        Ok(())
    }

    /// Route path of the callback, always with a leading `/`
    pub fn callback_route(&self) -> String {
        format!("/{}", self.identity_provider.callback_path.trim_start_matches('/'))
    }

    /// Absolute callback URL registered with the identity provider
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::ConfigurationInvalid`] when the path cannot be resolved.
    pub fn callback_url(&self) -> AuthResult<Url> {
        self.http_public_uri
            .join(self.identity_provider.callback_path.trim_start_matches('/'))
            .map_err(|e| AuthError::config(format!("invalid callback path: {e}")))
    }

    /// Verification deadline as a [`Duration`]
    pub fn verify_timeout(&self) -> Duration {
        Duration::from_millis(self.verify_timeout_ms)
    }
}

// Deserialization for SecretString without requiring SerializableSecret
fn deserialize_secret<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = serde::Deserialize::deserialize(deserializer)?;
    Ok(SecretString::new(s))
}

fn default_grpc_authorization_header() -> String {
    "admiral-authorization".to_string()
}

fn default_verify_timeout_ms() -> u64 {
    5_000
}

fn default_post_login_redirect() -> String {
    "/console".to_string()
}

fn default_grant_types() -> Vec<String> {
    vec![
        "authorization_code".to_string(),
        "client_credentials".to_string(),
        "refresh_token".to_string(),
    ]
}

fn default_scopes() -> Vec<String> {
    vec!["all".to_string()]
}

fn default_idp_scopes() -> Vec<String> {
    vec!["openid".to_string(), "profile".to_string()]
}

fn default_callback_path() -> String {
    "callback".to_string()
}

fn default_cookie_name() -> String {
    "admiral_session".to_string()
}

fn default_cookie_ttl_secs() -> u64 {
    24 * 60 * 60
}

fn default_refresh_margin_secs() -> u64 {
    60
}

fn default_jwks_cache_ttl_secs() -> u64 {
    600
}

fn default_leeway_secs() -> u64 {
    60
}
