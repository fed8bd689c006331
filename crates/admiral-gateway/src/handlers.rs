//! HTTP auth handlers
//!
//! The browser login flow (`/login` → identity provider → `/callback`), the
//! current user (`/me`), and the unauthenticated discovery documents native
//! clients read before logging in.

use std::sync::Arc;

use admiral_auth::discovery::AuthorizationServerMetadata;
use admiral_auth::{AuthError, AuthServices, AuthorizationServerKind, ClientRegistration, IdentityClaims};
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::{Extension, Json, Router};
use chrono::Utc;
use http::HeaderMap;
use http::header::CONTENT_TYPE;
use serde::Deserialize;
use serde_json::{Value, json};
use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};
use url::Url;

use crate::cookies::{CookiePolicy, append_set_cookie, read_cookie};
use crate::error::ApiError;
use crate::refresh::{CurrentSession, RefreshCoalescer};

/// Bundled OpenAPI document served at `/api/v1/openapi`
pub const OPENAPI_DOCUMENT: &str = include_str!("../assets/openapi.json");

/// Shared state of the auth handlers
#[derive(Debug, Clone)]
pub struct AuthState {
    /// Auth components
    pub services: AuthServices,
    /// Cookie naming and attributes
    pub cookies: CookiePolicy,
    /// Shared in-flight session refreshes
    pub refreshes: Arc<RefreshCoalescer>,
}

impl AuthState {
    /// Create handler state
    pub fn new(services: AuthServices, force_secure_cookies: bool) -> Self {
        let cookies = CookiePolicy::new(&services.config.cookie, force_secure_cookies);
        Self {
            services,
            cookies,
            refreshes: Arc::new(RefreshCoalescer::default()),
        }
    }

    /// Route path of the OAuth2 callback, e.g. `/callback`
    pub fn callback_route(&self) -> String {
        self.services.config.callback_route()
    }
}

/// Unauthenticated auth routes: callback and discovery documents
pub fn public_routes(state: AuthState) -> Router {
    let mut router = Router::new()
        .route(&state.callback_route(), get(callback))
        .route("/.well-known/oauth-authorization-server", get(authorization_server_metadata))
        .route("/config/v1/client", get(client_config));
    if state.services.config.authorization_server.kind == AuthorizationServerKind::SelfHosted {
        router = router.route("/oauth2/jwks", get(self_hosted_jwks));
    }
    router.with_state(state)
}

/// Auth routes that read the current session
pub fn session_routes(state: AuthState) -> Router {
    Router::new()
        .route("/login", get(login).post(login))
        .route("/me", get(me))
        .with_state(state)
}

/// Query parameters of `/login`
#[derive(Debug, Default, Deserialize)]
pub struct LoginParams {
    /// Where to go once logged in
    pub redirect_url: Option<String>,
}

/// `GET|POST /login`
///
/// Redirects straight to the destination when the session is still valid,
/// otherwise to the identity provider with fresh state and PKCE challenge.
pub async fn login(
    State(state): State<AuthState>,
    Extension(current): Extension<CurrentSession>,
    Query(params): Query<LoginParams>,
) -> Result<Response, ApiError> {
    let config = &state.services.config;
    let redirect = safe_redirect(
        params.redirect_url.as_deref(),
        &config.http_public_uri,
        &config.post_login_redirect,
    );

    if let Some(session) = current.active() {
        debug!(subject = %session.claims.sub, redirect = %redirect, "Already logged in");
        return Ok(Redirect::temporary(&redirect).into_response());
    }

    let request = state.services.exchanger.authorization_request(&redirect).await?;
    let login_cookie = state.services.sessions.encode_login_state(&request.login_state)?;

    debug!(redirect = %redirect, "Starting login");
    let mut response = Redirect::temporary(request.url.as_str()).into_response();
    append_set_cookie(response.headers_mut(), state.cookies.login_cookie(&login_cookie));
    Ok(response)
}

/// Query parameters of the OAuth2 callback
#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    /// Authorization code
    pub code: Option<String>,
    /// Echoed CSRF state
    pub state: Option<String>,
    /// Error code when the user or provider denied the request
    pub error: Option<String>,
    /// Error detail
    pub error_description: Option<String>,
}

/// `GET /callback`
///
/// Verifies the echoed state against the login-state cookie before touching
/// the identity provider, then exchanges the code and sets the session.
pub async fn callback(
    State(state): State<AuthState>,
    headers: HeaderMap,
    Query(params): Query<CallbackParams>,
) -> Result<Response, ApiError> {
    if let Some(error) = params.error {
        let reason = match params.error_description {
            Some(description) => format!("{error}: {description}"),
            None => error,
        };
        warn!(reason = %reason, "Identity provider denied authorization");
        return Err(AuthError::AuthorizationDenied(reason).into());
    }

    let login = read_cookie(&headers, state.cookies.login_name())
        .and_then(|raw| state.services.sessions.decode_login_state(&raw).ok())
        .ok_or_else(|| {
            warn!("Callback without valid login state");
            AuthError::StateMismatch
        })?;

    let presented = params.state.unwrap_or_default();
    if !bool::from(presented.as_bytes().ct_eq(login.state.as_bytes())) {
        warn!("Callback state does not match login state");
        return Err(AuthError::StateMismatch.into());
    }

    let code = params
        .code
        .filter(|code| !code.is_empty())
        .ok_or_else(|| AuthError::AuthorizationDenied("missing authorization code".into()))?;

    let session = state.services.exchanger.exchange_code(&code, &login.pkce_verifier).await?;
    let encoded = state.services.sessions.encode(&session)?;
    info!(subject = %session.claims.sub, "Login completed");

    let mut response = Redirect::temporary(&login.redirect_url).into_response();
    append_set_cookie(response.headers_mut(), state.cookies.session_cookie(&encoded));
    append_set_cookie(response.headers_mut(), state.cookies.clear_login());
    Ok(response)
}

/// `GET /me`: identity provider userinfo for the current session
pub async fn me(
    State(state): State<AuthState>,
    Extension(current): Extension<CurrentSession>,
) -> Result<Json<IdentityClaims>, ApiError> {
    let session = current.0.ok_or_else(|| AuthError::unauthenticated("no session"))?;
    if session.is_expired_at(Utc::now()) {
        return Err(AuthError::SessionExpired.into());
    }
    let claims = state.services.exchanger.fetch_user_info(&session.access_token).await?;
    Ok(Json(claims))
}

/// `GET /.well-known/oauth-authorization-server`
pub async fn authorization_server_metadata(
    State(state): State<AuthState>,
) -> Result<Json<AuthorizationServerMetadata>, ApiError> {
    Ok(Json(state.services.metadata.get_metadata().await?))
}

/// `GET /config/v1/client`
pub async fn client_config(State(state): State<AuthState>) -> Json<ClientRegistration> {
    Json(state.services.metadata.client_descriptor())
}

/// `GET /oauth2/jwks` in self mode
///
/// Sessions are HMAC-signed, so there are no public keys to publish.
pub async fn self_hosted_jwks() -> Json<Value> {
    Json(json!({ "keys": [] }))
}

/// `GET /healthcheck`
pub async fn healthcheck() -> Json<Value> {
    Json(json!({ "status": "SERVING" }))
}

/// `GET /api/v1/openapi`
pub async fn openapi() -> impl IntoResponse {
    ([(CONTENT_TYPE, "application/json")], OPENAPI_DOCUMENT)
}

/// Destination after login, restricted to this server's origin
///
/// Accepts absolute paths and absolute URLs sharing the origin of
/// `public_uri`. Anything else, including protocol-relative `//host`
/// targets and anything outside visible ASCII, falls back to `default`.
pub fn safe_redirect(target: Option<&str>, public_uri: &Url, default: &str) -> String {
    let Some(target) = target
        .map(str::trim)
        .filter(|t| !t.is_empty() && t.bytes().all(|b| b.is_ascii_graphic()))
    else {
        return default.to_string();
    };

    if target.starts_with('/') {
        if target.starts_with("//") || target.starts_with("/\\") {
            return default.to_string();
        }
        return target.to_string();
    }

    match Url::parse(target) {
        Ok(url) if url.origin() == public_uri.origin() => target.to_string(),
        _ => default.to_string(),
    }
}
