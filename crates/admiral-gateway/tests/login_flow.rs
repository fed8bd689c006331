//! Browser login flow against a mock identity provider

mod common;

use admiral_auth::AuthError;
use admiral_gateway::{Gateway, GatewayError};
use common::*;
use pretty_assertions::assert_eq;
use reqwest::StatusCode;
use reqwest::header::{COOKIE, LOCATION};
use url::Url;

async fn start(idp: &MockIdentityProvider) -> TestGateway {
    TestGateway::start(server_config(auth_config(&idp.uri()))).await
}

/// Run `/login` and return (authorize URL, login-state cookie value)
async fn begin_login(gateway: &TestGateway, redirect: &str) -> (Url, String) {
    let response = http_client()
        .get(gateway.url("/login"))
        .query(&[("redirect_url", redirect)])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);

    let location = response.headers()[LOCATION].to_str().unwrap().to_string();
    let login = cookie_value(&response, LOGIN_COOKIE).expect("login-state cookie set");
    (Url::parse(&location).unwrap(), login)
}

fn query_param(url: &Url, name: &str) -> Option<String> {
    url.query_pairs().find(|(k, _)| k == name).map(|(_, v)| v.into_owned())
}

#[tokio::test]
async fn test_login_redirects_to_identity_provider() {
    let idp = MockIdentityProvider::start().await;
    let gateway = start(&idp).await;

    let (authorize, _) = begin_login(&gateway, "/projects").await;

    assert!(authorize.as_str().starts_with(&format!("{}/authorize", idp.uri())));
    assert_eq!(query_param(&authorize, "client_id").as_deref(), Some("admiral-web"));
    assert_eq!(query_param(&authorize, "code_challenge_method").as_deref(), Some("S256"));
    assert_eq!(
        query_param(&authorize, "redirect_uri").as_deref(),
        Some("https://admiral.example.com/callback")
    );
    assert!(query_param(&authorize, "state").is_some_and(|s| !s.is_empty()));
}

#[tokio::test]
async fn test_login_state_cookie_attributes() {
    let idp = MockIdentityProvider::start().await;
    let gateway = start(&idp).await;

    let response = http_client().get(gateway.url("/login")).send().await.unwrap();
    let cookie = find_set_cookie(&response, LOGIN_COOKIE).unwrap();
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("Path=/"));
    assert!(cookie.contains("SameSite=Lax"));
    assert!(cookie.contains("Max-Age=600"));
}

#[tokio::test]
async fn test_callback_completes_login() {
    // GIVEN: a login in progress
    let idp = MockIdentityProvider::start().await;
    idp.mock_token_success("at-1", Some("rt-1")).await;
    idp.mock_userinfo("at-1", "abc123").await;
    let gateway = start(&idp).await;
    let (authorize, login) = begin_login(&gateway, "/projects/7").await;
    let state = query_param(&authorize, "state").unwrap();

    // WHEN: the identity provider redirects back with the issued state
    let response = http_client()
        .get(gateway.url("/callback"))
        .query(&[("code", "auth-code"), ("state", state.as_str())])
        .header(COOKIE, format!("{LOGIN_COOKIE}={login}"))
        .send()
        .await
        .unwrap();

    // THEN: session cookie set, login cookie cleared, original destination restored
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(response.headers()[LOCATION], "/projects/7");

    let session = decode_session(&cookie_value(&response, SESSION_COOKIE).unwrap());
    assert_eq!(session.access_token, "at-1");
    assert_eq!(session.refresh_token.as_deref(), Some("rt-1"));
    assert_eq!(session.claims.sub, "abc123");

    let cleared = find_set_cookie(&response, LOGIN_COOKIE).unwrap();
    assert!(cleared.starts_with(&format!("{LOGIN_COOKIE}=;")));
    assert!(cleared.contains("Max-Age=0"));
}

#[tokio::test]
async fn test_callback_state_mismatch_skips_exchange() {
    // GIVEN: a login in progress and a token endpoint that must not be hit
    let idp = MockIdentityProvider::start().await;
    idp.expect_no_token_request().await;
    let gateway = start(&idp).await;
    let (_, login) = begin_login(&gateway, "/").await;

    // WHEN: the callback carries a forged state
    let response = http_client()
        .get(gateway.url("/callback"))
        .query(&[("code", "auth-code"), ("state", "forged")])
        .header(COOKIE, format!("{LOGIN_COOKIE}={login}"))
        .send()
        .await
        .unwrap();

    // THEN: rejected without a session
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(find_set_cookie(&response, SESSION_COOKIE).is_none());
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "state_mismatch");
}

#[tokio::test]
async fn test_callback_without_login_cookie_rejected() {
    let idp = MockIdentityProvider::start().await;
    idp.expect_no_token_request().await;
    let gateway = start(&idp).await;

    let response = http_client()
        .get(gateway.url("/callback"))
        .query(&[("code", "auth-code"), ("state", "anything")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_callback_error_parameter_is_denied() {
    let idp = MockIdentityProvider::start().await;
    idp.expect_no_token_request().await;
    let gateway = start(&idp).await;

    let response = http_client()
        .get(gateway.url("/callback"))
        .query(&[("error", "access_denied"), ("error_description", "user cancelled")])
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "access_denied");
}

#[tokio::test]
async fn test_login_with_valid_session_skips_identity_provider() {
    let idp = MockIdentityProvider::start().await;
    let gateway = start(&idp).await;
    let session = session_cookie("at-1", None, 3600);

    let response = http_client()
        .get(gateway.url("/login"))
        .query(&[("redirect_url", "/projects")])
        .header(COOKIE, format!("{SESSION_COOKIE}={session}"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(response.headers()[LOCATION], "/projects");
    assert!(find_set_cookie(&response, LOGIN_COOKIE).is_none());
}

#[tokio::test]
async fn test_login_rejects_foreign_redirect() {
    let idp = MockIdentityProvider::start().await;
    let gateway = start(&idp).await;
    let session = session_cookie("at-1", None, 3600);

    let response = http_client()
        .get(gateway.url("/login"))
        .query(&[("redirect_url", "https://evil.example.com/")])
        .header(COOKIE, format!("{SESSION_COOKIE}={session}"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.headers()[LOCATION], "/console");
}

#[tokio::test]
async fn test_login_rejects_header_breaking_redirect() {
    let idp = MockIdentityProvider::start().await;
    let gateway = start(&idp).await;
    let session = session_cookie("at-1", None, 3600);

    let response = http_client()
        .get(gateway.url("/login"))
        .query(&[("redirect_url", "/projects\r\nX-Injected:1")])
        .header(COOKIE, format!("{SESSION_COOKIE}={session}"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(response.headers()[LOCATION], "/console");
    assert!(response.headers().get("x-injected").is_none());
}

#[tokio::test]
async fn test_callback_path_shadowing_builtin_route_fails_bind() {
    let idp = MockIdentityProvider::start().await;
    let mut value = auth_config(&idp.uri());
    value["auth"]["identity_provider"]["callback_path"] = serde_json::json!("login");

    let result = Gateway::builder(server_config(value)).bind().await;
    assert!(matches!(
        result,
        Err(GatewayError::Auth(AuthError::ConfigurationInvalid(_)))
    ));
}

#[tokio::test]
async fn test_me_returns_userinfo() {
    let idp = MockIdentityProvider::start().await;
    idp.mock_userinfo("at-1", "abc123").await;
    let gateway = start(&idp).await;
    let session = session_cookie("at-1", None, 3600);

    let response = http_client()
        .get(gateway.url("/me"))
        .header(COOKIE, format!("{SESSION_COOKIE}={session}"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["sub"], "abc123");
    assert_eq!(body["preferred_username"], "jsmith@company.com");
}

#[tokio::test]
async fn test_me_without_session_is_unauthorized() {
    let idp = MockIdentityProvider::start().await;
    let gateway = start(&idp).await;

    let response = http_client().get(gateway.url("/me")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_tampered_session_cookie_is_cleared() {
    let idp = MockIdentityProvider::start().await;
    let gateway = start(&idp).await;
    let mut session = session_cookie("at-1", None, 3600);
    session.replace_range(session.len() - 4.., "AAAA");

    let response = http_client()
        .get(gateway.url("/me"))
        .header(COOKIE, format!("{SESSION_COOKIE}={session}"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let cleared = find_set_cookie(&response, SESSION_COOKIE).unwrap();
    assert!(cleared.contains("Max-Age=0"));
}

#[tokio::test]
async fn test_discovery_documents_are_public() {
    let idp = MockIdentityProvider::start().await;
    let gateway = start(&idp).await;
    let client = http_client();

    let metadata: serde_json::Value = client
        .get(gateway.url("/.well-known/oauth-authorization-server"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(metadata["issuer"], "https://admiral.example.com/");
    assert_eq!(metadata["token_endpoint"], "https://admiral.example.com/oauth2/token");

    let client_config: serde_json::Value = client
        .get(gateway.url("/config/v1/client"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(client_config["client_id"], "admiral-cli");
    assert_eq!(client_config["authorization_metadata_key"], "admiral-authorization");

    let jwks: serde_json::Value = client
        .get(gateway.url("/oauth2/jwks"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(jwks, serde_json::json!({ "keys": [] }));
}
