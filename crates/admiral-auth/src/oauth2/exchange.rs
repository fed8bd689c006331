//! Authorization code exchange, refresh and userinfo retrieval
//!
//! [`TokenExchanger`] speaks to the upstream OpenID Connect identity provider.
//! Endpoints come from the provider's discovery document unless overridden in
//! configuration. Token requests are form-encoded and authenticate the client
//! with `client_secret_basic`; failed requests are never retried.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use oauth2::{CsrfToken, PkceCodeChallenge};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, info, warn};
use url::{Url, form_urlencoded};

use crate::config::AuthConfig;
use crate::discovery::{DocumentFetcher, OpenIdConfiguration, openid_configuration_url};
use crate::error::{AuthError, AuthResult};
use crate::oauth2::http_client::{HttpRequest, HttpTransport};
use crate::session::LoginState;
use crate::types::{IdentityClaims, SessionToken};

/// Access token lifetime assumed when the token endpoint omits `expires_in`
pub const DEFAULT_ACCESS_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

/// Upper bound on an advertised `expires_in`
pub const MAX_ACCESS_TOKEN_LIFETIME: Duration = Duration::from_secs(30 * 24 * 3600);

/// How long the identity provider's discovery document is reused
const PROVIDER_CONFIGURATION_TTL: Duration = Duration::from_secs(300);

/// Longest token endpoint error body kept for diagnostics
const MAX_ERROR_BODY_CHARS: usize = 512;

/// A freshly generated authorization request
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    /// Identity provider authorize URL including state and PKCE challenge
    pub url: Url,
    /// State to persist until the callback
    pub login_state: LoginState,
}

#[derive(Debug, Deserialize)]
struct TokenEndpointResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Exchanges authorization codes and refresh tokens with the identity provider
pub struct TokenExchanger {
    transport: Arc<dyn HttpTransport>,
    provider: DocumentFetcher<OpenIdConfiguration>,
    client_id: String,
    client_secret: SecretString,
    redirect_uri: Url,
    scopes: Vec<String>,
    userinfo_override: Option<Url>,
}

impl std::fmt::Debug for TokenExchanger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenExchanger")
            .field("provider", &self.provider)
            .field("client_id", &self.client_id)
            .field("redirect_uri", &self.redirect_uri.as_str())
            .finish_non_exhaustive()
    }
}

impl TokenExchanger {
    /// Create an exchanger for the configured identity provider
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::ConfigurationInvalid`] if the discovery or callback
    /// URL cannot be resolved.
    pub fn from_config(config: &AuthConfig, transport: Arc<dyn HttpTransport>) -> AuthResult<Self> {
        let idp = &config.identity_provider;
        let discovery_url = openid_configuration_url(&idp.base_url)?;
        Ok(Self {
            provider: DocumentFetcher::new(discovery_url, Arc::clone(&transport), PROVIDER_CONFIGURATION_TTL),
            transport,
            client_id: idp.client_id.clone(),
            client_secret: idp.client_secret.clone(),
            redirect_uri: config.callback_url()?,
            scopes: idp.scopes.clone(),
            userinfo_override: idp.userinfo_url.clone(),
        })
    }

    /// Build an authorize URL with a fresh CSRF state and S256 PKCE challenge
    ///
    /// # Errors
    ///
    /// Fails if the identity provider's discovery document cannot be fetched
    /// or names an unusable authorization endpoint.
    pub async fn authorization_request(&self, redirect_url: &str) -> AuthResult<AuthorizationRequest> {
        let provider = self.provider.fetch().await?;
        let mut url = Url::parse(&provider.authorization_endpoint).map_err(|e| AuthError::UpstreamMalformed {
            url: self.provider.url().to_string(),
            reason: format!("invalid authorization_endpoint: {e}"),
        })?;

        let state = CsrfToken::new_random();
        let (challenge, verifier) = PkceCodeChallenge::new_random_sha256();

        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", self.redirect_uri.as_str())
            .append_pair("scope", &self.scopes.join(" "))
            .append_pair("state", state.secret())
            .append_pair("code_challenge", challenge.as_str())
            .append_pair("code_challenge_method", "S256");

        Ok(AuthorizationRequest {
            url,
            login_state: LoginState {
                state: state.secret().clone(),
                pkce_verifier: verifier.secret().clone(),
                redirect_url: redirect_url.to_string(),
            },
        })
    }

    /// Exchange an authorization code for a session token
    ///
    /// # Errors
    ///
    /// - [`AuthError::TokenExchangeFailed`] on transport failure or an undecodable success body
    /// - [`AuthError::TokenExchangeRejected`] when the token endpoint returns non-2xx
    /// - Any userinfo error from [`TokenExchanger::fetch_user_info`]
    pub async fn exchange_code(&self, code: &str, pkce_verifier: &str) -> AuthResult<SessionToken> {
        let form = form_urlencoded::Serializer::new(String::new())
            .append_pair("grant_type", "authorization_code")
            .append_pair("code", code)
            .append_pair("redirect_uri", self.redirect_uri.as_str())
            .append_pair("code_verifier", pkce_verifier)
            .finish();

        let response = self.token_request(form).await?;
        let claims = self.fetch_user_info(&response.access_token).await?;
        info!(subject = %claims.sub, "Exchanged authorization code");
        session_from_response(response, None, claims)
    }

    /// Obtain a new session token from a refresh token
    ///
    /// The refresh token is kept when the identity provider does not rotate it.
    ///
    /// # Errors
    ///
    /// Same as [`TokenExchanger::exchange_code`].
    pub async fn refresh(&self, refresh_token: &str) -> AuthResult<SessionToken> {
        let form = form_urlencoded::Serializer::new(String::new())
            .append_pair("grant_type", "refresh_token")
            .append_pair("refresh_token", refresh_token)
            .finish();

        let response = self.token_request(form).await?;
        let claims = self.fetch_user_info(&response.access_token).await?;
        debug!(subject = %claims.sub, "Refreshed session");
        session_from_response(response, Some(refresh_token), claims)
    }

    /// Fetch profile claims for an access token
    ///
    /// # Errors
    ///
    /// - [`AuthError::ConfigurationInvalid`] if no userinfo endpoint is known
    /// - [`AuthError::UpstreamUnavailable`] on transport failure
    /// - [`AuthError::IdentityProviderRejected`] on any status other than 200
    /// - [`AuthError::IdentityProviderMalformed`] if the body is not valid claims
    pub async fn fetch_user_info(&self, access_token: &str) -> AuthResult<IdentityClaims> {
        let url = self.userinfo_url().await?;

        let request = http::Request::get(url.as_str())
            .header(http::header::ACCEPT, "application/json")
            .header(http::header::AUTHORIZATION, format!("Bearer {access_token}"))
            .body(Vec::new())
            .map_err(|e| AuthError::config(format!("invalid userinfo request: {e}")))?;

        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| AuthError::UpstreamUnavailable {
                url: url.to_string(),
                reason: e.to_string(),
                timed_out: e.is_timeout(),
            })?;

        if response.status() != http::StatusCode::OK {
            warn!(status = %response.status(), "Userinfo request rejected");
            return Err(AuthError::IdentityProviderRejected {
                status: response.status().as_u16(),
            });
        }

        serde_json::from_slice(response.body())
            .map_err(|e| AuthError::IdentityProviderMalformed(e.to_string()))
    }

    async fn userinfo_url(&self) -> AuthResult<Url> {
        if let Some(url) = &self.userinfo_override {
            return Ok(url.clone());
        }
        let provider = self.provider.fetch().await?;
        let endpoint = provider
            .userinfo_endpoint
            .ok_or_else(|| AuthError::config("identity provider advertises no userinfo endpoint"))?;
        Url::parse(&endpoint).map_err(|e| AuthError::config(format!("invalid userinfo endpoint: {e}")))
    }

    async fn token_request(&self, form: String) -> AuthResult<TokenEndpointResponse> {
        let provider = self.provider.fetch().await?;

        let request = http::Request::post(provider.token_endpoint.as_str())
            .header(http::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(http::header::ACCEPT, "application/json")
            .header(http::header::AUTHORIZATION, self.basic_authorization())
            .body(form.into_bytes())
            .map_err(|e| AuthError::TokenExchangeFailed(format!("invalid token request: {e}")))?;

        let response = self.send_token_request(request).await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body: String = String::from_utf8_lossy(response.body())
                .chars()
                .take(MAX_ERROR_BODY_CHARS)
                .collect();
            warn!(status, "Token endpoint rejected the grant");
            return Err(AuthError::TokenExchangeRejected { status, body });
        }

        serde_json::from_slice(response.body())
            .map_err(|e| AuthError::TokenExchangeFailed(format!("malformed token response: {e}")))
    }

    async fn send_token_request(&self, request: HttpRequest) -> AuthResult<http::Response<Vec<u8>>> {
        self.transport.send(request).await.map_err(|e| {
            warn!(error = %e, "Token request failed");
            AuthError::TokenExchangeFailed(e.to_string())
        })
    }

    // RFC 6749 section 2.3.1: credentials are form-encoded before base64
    fn basic_authorization(&self) -> String {
        let id: String = form_urlencoded::byte_serialize(self.client_id.as_bytes()).collect();
        let secret: String =
            form_urlencoded::byte_serialize(self.client_secret.expose_secret().as_bytes()).collect();
        format!("Basic {}", STANDARD.encode(format!("{id}:{secret}")))
    }
}

fn session_from_response(
    response: TokenEndpointResponse,
    previous_refresh_token: Option<&str>,
    claims: IdentityClaims,
) -> AuthResult<SessionToken> {
    let lifetime = response
        .expires_in
        .map_or(DEFAULT_ACCESS_TOKEN_LIFETIME, Duration::from_secs)
        .min(MAX_ACCESS_TOKEN_LIFETIME);
    let expires_at = chrono::Duration::from_std(lifetime)
        .ok()
        .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
        .ok_or_else(|| AuthError::TokenExchangeFailed(format!("unusable expires_in {:?}", response.expires_in)))?;
    let refresh_token = response
        .refresh_token
        .or_else(|| previous_refresh_token.map(str::to_string));
    Ok(SessionToken::new(response.access_token, refresh_token, expires_at, claims))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_support::config_with_idp;
    use crate::oauth2::http_client::{FnTransport, HttpResponse, TransportError};
    use pretty_assertions::assert_eq;

    const DISCOVERY: &str = r#"{
        "issuer": "https://idp.example.com",
        "authorization_endpoint": "https://idp.example.com/authorize",
        "token_endpoint": "https://idp.example.com/token",
        "userinfo_endpoint": "https://idp.example.com/userinfo"
    }"#;

    fn respond(status: u16, body: &str) -> Result<HttpResponse, TransportError> {
        Ok(http::Response::builder()
            .status(status)
            .body(body.as_bytes().to_vec())
            .unwrap())
    }

    fn exchanger_with<F>(handler: F) -> TokenExchanger
    where
        F: Fn(HttpRequest) -> Result<HttpResponse, TransportError> + Send + Sync + 'static,
    {
        let config = config_with_idp("https://idp.example.com/");
        TokenExchanger::from_config(&config, Arc::new(FnTransport::new(handler))).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_user_info_decodes_claims() {
        let exchanger = exchanger_with(|req: HttpRequest| match req.uri().path() {
            "/.well-known/openid-configuration" => respond(200, DISCOVERY),
            "/userinfo" => {
                assert_eq!(
                    req.headers().get(http::header::AUTHORIZATION).unwrap(),
                    "Bearer access-1"
                );
                respond(
                    200,
                    r#"{"sub":"abc123","name":"John Smith","preferred_username":"jsmith@company.com","given_name":"John","family_name":"Smith","email":"jsmith@company.com"}"#,
                )
            }
            other => panic!("unexpected path {other}"),
        });

        let claims = exchanger.fetch_user_info("access-1").await.unwrap();
        assert_eq!(
            claims,
            IdentityClaims {
                sub: "abc123".into(),
                name: "John Smith".into(),
                preferred_username: "jsmith@company.com".into(),
                given_name: "John".into(),
                family_name: "Smith".into(),
            }
        );
    }

    #[tokio::test]
    async fn test_fetch_user_info_non_200_is_rejected() {
        let exchanger = exchanger_with(|req: HttpRequest| match req.uri().path() {
            "/.well-known/openid-configuration" => respond(200, DISCOVERY),
            _ => respond(401, r#"{"error":"invalid_token"}"#),
        });

        assert!(matches!(
            exchanger.fetch_user_info("expired").await,
            Err(AuthError::IdentityProviderRejected { status: 401 })
        ));
    }

    #[tokio::test]
    async fn test_fetch_user_info_non_json_is_malformed() {
        let exchanger = exchanger_with(|req: HttpRequest| match req.uri().path() {
            "/.well-known/openid-configuration" => respond(200, DISCOVERY),
            _ => respond(200, "<html>login</html>"),
        });

        assert!(matches!(
            exchanger.fetch_user_info("token").await,
            Err(AuthError::IdentityProviderMalformed(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_userinfo_endpoint_is_configuration_error() {
        let exchanger = exchanger_with(|_req: HttpRequest| {
            respond(
                200,
                r#"{"issuer":"https://idp.example.com","authorization_endpoint":"https://idp.example.com/a","token_endpoint":"https://idp.example.com/t"}"#,
            )
        });

        assert!(matches!(
            exchanger.fetch_user_info("token").await,
            Err(AuthError::ConfigurationInvalid(_))
        ));
    }

    #[tokio::test]
    async fn test_exchange_code_uses_basic_auth_and_pkce() {
        let exchanger = exchanger_with(|req: HttpRequest| match req.uri().path() {
            "/.well-known/openid-configuration" => respond(200, DISCOVERY),
            "/token" => {
                let auth = req.headers().get(http::header::AUTHORIZATION).unwrap();
                assert_eq!(auth, &format!("Basic {}", STANDARD.encode("admiral-web:s3cr3t")));
                let body = String::from_utf8(req.body().clone()).unwrap();
                assert!(body.contains("grant_type=authorization_code"));
                assert!(body.contains("code=the-code"));
                assert!(body.contains("code_verifier=the-verifier"));
                respond(
                    200,
                    r#"{"access_token":"at-1","refresh_token":"rt-1","expires_in":600,"token_type":"Bearer"}"#,
                )
            }
            "/userinfo" => respond(200, r#"{"sub":"abc123"}"#),
            other => panic!("unexpected path {other}"),
        });

        let before = Utc::now();
        let session = exchanger.exchange_code("the-code", "the-verifier").await.unwrap();
        assert_eq!(session.access_token, "at-1");
        assert_eq!(session.refresh_token.as_deref(), Some("rt-1"));
        assert_eq!(session.claims.sub, "abc123");
        assert!(session.expires_at >= before + chrono::Duration::seconds(599));
        assert!(session.expires_at <= Utc::now() + chrono::Duration::seconds(600));
    }

    #[tokio::test]
    async fn test_exchange_rejected_carries_status_and_body() {
        let exchanger = exchanger_with(|req: HttpRequest| match req.uri().path() {
            "/.well-known/openid-configuration" => respond(200, DISCOVERY),
            _ => respond(400, r#"{"error":"invalid_grant"}"#),
        });

        match exchanger.exchange_code("bad", "verifier").await {
            Err(AuthError::TokenExchangeRejected { status, body }) => {
                assert_eq!(status, 400);
                assert!(body.contains("invalid_grant"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_exchange_transport_failure_is_exchange_failed() {
        let exchanger = exchanger_with(|req: HttpRequest| match req.uri().path() {
            "/.well-known/openid-configuration" => respond(200, DISCOVERY),
            _ => Err(TransportError::Request("connection refused".into())),
        });

        assert!(matches!(
            exchanger.exchange_code("code", "verifier").await,
            Err(AuthError::TokenExchangeFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_refresh_keeps_refresh_token_when_not_rotated() {
        let exchanger = exchanger_with(|req: HttpRequest| match req.uri().path() {
            "/.well-known/openid-configuration" => respond(200, DISCOVERY),
            "/token" => {
                let body = String::from_utf8(req.body().clone()).unwrap();
                assert!(body.contains("grant_type=refresh_token"));
                assert!(body.contains("refresh_token=rt-old"));
                respond(200, r#"{"access_token":"at-2"}"#)
            }
            "/userinfo" => respond(200, r#"{"sub":"abc123"}"#),
            other => panic!("unexpected path {other}"),
        });

        let session = exchanger.refresh("rt-old").await.unwrap();
        assert_eq!(session.access_token, "at-2");
        assert_eq!(session.refresh_token.as_deref(), Some("rt-old"));
    }

    #[tokio::test]
    async fn test_huge_expires_in_is_capped() {
        let exchanger = exchanger_with(|req: HttpRequest| match req.uri().path() {
            "/.well-known/openid-configuration" => respond(200, DISCOVERY),
            "/token" => respond(200, r#"{"access_token":"at","expires_in":1000000000000000}"#),
            "/userinfo" => respond(200, r#"{"sub":"abc123"}"#),
            other => panic!("unexpected path {other}"),
        });

        let session = exchanger.exchange_code("code", "verifier").await.unwrap();
        let cap = chrono::Duration::from_std(MAX_ACCESS_TOKEN_LIFETIME).unwrap();
        assert!(session.expires_at <= Utc::now() + cap);
        assert!(session.expires_at > Utc::now() + chrono::Duration::days(29));

        let refreshed = exchanger.refresh("rt").await.unwrap();
        assert!(refreshed.expires_at <= Utc::now() + cap);
    }

    #[tokio::test]
    async fn test_authorization_request_carries_state_and_pkce() {
        let exchanger = exchanger_with(|_req: HttpRequest| respond(200, DISCOVERY));

        let request = exchanger.authorization_request("/console").await.unwrap();
        let pairs: std::collections::HashMap<String, String> =
            request.url.query_pairs().into_owned().collect();

        assert_eq!(request.url.path(), "/authorize");
        assert_eq!(pairs["response_type"], "code");
        assert_eq!(pairs["client_id"], "admiral-web");
        assert_eq!(pairs["redirect_uri"], "https://admiral.example.com/callback");
        assert_eq!(pairs["scope"], "openid profile");
        assert_eq!(pairs["code_challenge_method"], "S256");
        assert_eq!(pairs["state"], request.login_state.state);
        assert!(!request.login_state.pkce_verifier.is_empty());
        assert_eq!(request.login_state.redirect_url, "/console");

        let second = exchanger.authorization_request("/console").await.unwrap();
        assert_ne!(second.login_state.state, request.login_state.state);
    }
}
