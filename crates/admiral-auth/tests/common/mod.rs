//! Common test utilities for integration tests
//!
//! A wiremock-backed identity provider / authorization server plus helpers to
//! build configurations and signed test JWTs.

#![allow(dead_code)]

use admiral_auth::AuthConfig;
use serde_json::json;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{header, method, path},
};

/// PKCS#8 RSA private key matching the key in `fixtures/jwks.json`
pub const SIGNING_KEY_PEM: &[u8] = include_bytes!("../fixtures/signing_key.pem");

/// JWKS document publishing the public half of [`SIGNING_KEY_PEM`] as `test-key-1`
pub const JWKS_JSON: &str = include_str!("../fixtures/jwks.json");

/// Mock identity provider and authorization server
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
                "jwks_uri": format!("{base}/keys"),
            })))
            .mount(&server)
            .await;

        Self { server }
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }

    /// Mock the RFC 8414 metadata document with `body`
    pub async fn mock_authorization_server_metadata(&self, body: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path("/.well-known/oauth-authorization-server"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// Mock the JWKS endpoint with the fixture key set
    pub async fn mock_jwks(&self) {
        Mock::given(method("GET"))
            .and(path("/keys"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(JWKS_JSON, "application/json"))
            .mount(&self.server)
            .await;
    }

    /// Mock the JWKS endpoint with an arbitrary status and body
    pub async fn mock_jwks_response(&self, status: u16, body: &str) {
        Mock::given(method("GET"))
            .and(path("/keys"))
            .respond_with(ResponseTemplate::new(status).set_body_raw(body.to_string(), "application/json"))
            .mount(&self.server)
            .await;
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

/// Configuration pointing both the identity provider and the external
/// authorization server at `base`
pub fn external_config(base: &str) -> AuthConfig {
    serde_json::from_value(json!({
        "http_public_uri": "https://admiral.example.com/",
        "authorization_server": { "kind": "external", "base_url": base },
        "identity_provider": {
            "base_url": base,
            "client_id": "admiral-web",
            "client_secret": "s3cr3t"
        },
        "client": {
            "client_id": "admiral-cli",
            "redirect_uri": "http://localhost:53593/callback",
            "scopes": ["all"]
        },
        "cookie": { "signing_key": "0123456789abcdef0123456789abcdef" },
        "jwks": { "audience": "admiral" }
    }))
    .expect("valid test configuration")
}

/// Sign `claims` with the fixture RSA key under key id `test-key-1`
pub fn sign_jwt(claims: serde_json::Value) -> String {
    sign_jwt_with_kid(claims, "test-key-1")
}

/// Sign `claims` with the fixture RSA key, stamping `kid` in the header
pub fn sign_jwt_with_kid(claims: serde_json::Value, kid: &str) -> String {
    use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};

    let key = EncodingKey::from_rsa_pem(SIGNING_KEY_PEM).expect("Invalid RSA key");
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());
    encode(&header, &claims, &key).expect("Failed to encode test JWT")
}

/// Seconds since the Unix epoch, offset by `delta`
pub fn unix_time(delta: i64) -> i64 {
    chrono::Utc::now().timestamp() + delta
}
