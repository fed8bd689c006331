//! Common test utilities for gateway integration tests
//!
//! A wiremock identity provider, gateway configuration helpers and a
//! gateway running on ephemeral ports.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use admiral_auth::{IdentityClaims, SessionCodec, SessionToken};
use admiral_gateway::{Gateway, GatewayResult, ServerConfig};
use serde_json::json;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{header, method, path},
};

/// Signing key shared by the gateway config and [`session_cookie`]
pub const SIGNING_KEY: &str = "0123456789abcdef0123456789abcdef";

/// Session cookie name used by the test configuration
pub const SESSION_COOKIE: &str = "admiral_session";

/// Login-state cookie name used by the test configuration
pub const LOGIN_COOKIE: &str = "admiral_session_login";

/// Mock OpenID Connect identity provider
pub struct MockIdentityProvider {
    pub server: MockServer,
}

impl MockIdentityProvider {
    /// Start a mock server with OIDC discovery mounted
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        let base = server.uri();

        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "issuer": base,
                "authorization_endpoint": format!("{base}/authorize"),
                "token_endpoint": format!("{base}/token"),
                "userinfo_endpoint": format!("{base}/userinfo"),
            })))
            .mount(&server)
            .await;

        Self { server }
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }

    /// Mock a successful token endpoint response
    pub async fn mock_token_success(&self, access_token: &str, refresh_token: Option<&str>) {
        let mut body = json!({
            "access_token": access_token,
            "token_type": "Bearer",
            "expires_in": 3600,
        });
        if let Some(refresh) = refresh_token {
            body["refresh_token"] = json!(refresh);
        }

        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// Mock a token endpoint that rotates the refresh token and may be called once
    pub async fn mock_token_rotation_once(&self, access_token: &str, refresh_token: &str) {
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": access_token,
                "refresh_token": refresh_token,
                "token_type": "Bearer",
                "expires_in": 3600,
            })))
            .expect(1)
            .mount(&self.server)
            .await;
    }

    /// Mock a token endpoint that rejects every grant
    pub async fn mock_token_rejected(&self) {
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({ "error": "invalid_grant" })))
            .mount(&self.server)
            .await;
    }

    /// Require that the token endpoint is never called
    pub async fn expect_no_token_request(&self) {
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&self.server)
            .await;
    }

    /// Mock the userinfo endpoint for a specific access token
    pub async fn mock_userinfo(&self, access_token: &str, sub: &str) {
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .and(header("authorization", format!("Bearer {access_token}").as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "sub": sub,
                "name": "John Smith",
                "preferred_username": "jsmith@company.com",
                "given_name": "John",
                "family_name": "Smith",
            })))
            .mount(&self.server)
            .await;
    }
}

/// Insecure-mode configuration on ephemeral loopback ports with auth enabled
pub fn auth_config(idp: &str) -> serde_json::Value {
    json!({
        "http_address": "127.0.0.1:0",
        "grpc_address": "127.0.0.1:0",
        "security": {
            "use_auth": true,
            "allowed_origins": ["https://console.example.com"]
        },
        "auth": {
            "http_public_uri": "https://admiral.example.com/",
            "identity_provider": {
                "base_url": idp,
                "client_id": "admiral-web",
                "client_secret": "s3cr3t"
            },
            "client": {
                "client_id": "admiral-cli",
                "redirect_uri": "http://localhost:53593/callback",
                "scopes": ["all"]
            },
            "cookie": { "signing_key": SIGNING_KEY }
        }
    })
}

/// Insecure-mode configuration with auth disabled
pub fn open_config() -> serde_json::Value {
    json!({
        "http_address": "127.0.0.1:0",
        "grpc_address": "127.0.0.1:0",
        "security": { "use_auth": false }
    })
}

pub fn server_config(value: serde_json::Value) -> ServerConfig {
    serde_json::from_value(value).expect("valid test configuration")
}

/// A gateway serving in the background until dropped or stopped
pub struct TestGateway {
    pub http: SocketAddr,
    pub grpc: Option<SocketAddr>,
    pub interceptors: Vec<&'static str>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<GatewayResult<()>>>,
}

impl TestGateway {
    pub async fn start(config: ServerConfig) -> Self {
        let gateway = Gateway::builder(config).bind().await.expect("gateway binds");
        Self::spawn(gateway)
    }

    pub fn spawn(gateway: Gateway) -> Self {
        let http = gateway.http_addr();
        let grpc = gateway.grpc_addr();
        let interceptors = gateway.interceptors().to_vec();
        let (tx, rx) = oneshot::channel();
        let handle = tokio::spawn(gateway.serve_with_shutdown(async {
            let _ = rx.await;
        }));
        Self {
            http,
            grpc,
            interceptors,
            shutdown: Some(tx),
            handle: Some(handle),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.http)
    }

    /// Signal shutdown and wait for the serve loop to return
    pub async fn stop(mut self) -> GatewayResult<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let handle = self.handle.take().expect("not yet stopped");
        tokio::time::timeout(Duration::from_secs(35), handle)
            .await
            .expect("gateway stops")
            .expect("serve task does not panic")
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

/// HTTP client that neither follows redirects nor stores cookies
pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .expect("client builds")
}

/// `name=value` pairs from every `Set-Cookie` header of a response
pub fn set_cookies(response: &reqwest::Response) -> Vec<String> {
    response
        .headers()
        .get_all(reqwest::header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(str::to_string)
        .collect()
}

/// Full `Set-Cookie` value for cookie `name`
pub fn find_set_cookie(response: &reqwest::Response, name: &str) -> Option<String> {
    set_cookies(response)
        .into_iter()
        .find(|c| c.starts_with(&format!("{name}=")))
}

/// Value of cookie `name` as set by a response
pub fn cookie_value(response: &reqwest::Response, name: &str) -> Option<String> {
    let cookie = find_set_cookie(response, name)?;
    let pair = cookie.split(';').next()?;
    pair.split_once('=').map(|(_, v)| v.to_string())
}

pub fn claims(sub: &str) -> IdentityClaims {
    IdentityClaims {
        sub: sub.to_string(),
        name: "John Smith".to_string(),
        preferred_username: "jsmith@company.com".to_string(),
        given_name: "John".to_string(),
        family_name: "Smith".to_string(),
    }
}

/// Encoded session whose access token expires in `expires_in` seconds
pub fn session_cookie(access_token: &str, refresh_token: Option<&str>, expires_in: i64) -> String {
    let codec = SessionCodec::new(SIGNING_KEY.as_bytes(), Duration::from_secs(3600)).expect("codec");
    let token = SessionToken::new(
        access_token,
        refresh_token.map(str::to_string),
        chrono::Utc::now() + chrono::Duration::seconds(expires_in),
        claims("abc123"),
    );
    codec.encode(&token).expect("encode session")
}

/// Decode a session cookie value issued by the gateway
pub fn decode_session(value: &str) -> SessionToken {
    SessionCodec::new(SIGNING_KEY.as_bytes(), Duration::from_secs(3600))
        .expect("codec")
        .decode(value)
        .expect("valid session cookie")
}
