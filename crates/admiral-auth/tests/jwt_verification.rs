//! JWKS-backed verification of externally issued access tokens

mod common;

use std::sync::Arc;

use admiral_auth::oauth2::ReqwestTransport;
use admiral_auth::{AuthError, AuthServices, CredentialKind, IdentityClaims, SessionToken};
use common::{MockIdentityProvider, external_config, sign_jwt, sign_jwt_with_kid, unix_time};
use serde_json::json;

async fn services(idp: &MockIdentityProvider) -> AuthServices {
    idp.mock_jwks().await;
    services_without_keys(idp).await
}

/// Services whose JWKS endpoint the caller mocks
async fn services_without_keys(idp: &MockIdentityProvider) -> AuthServices {
    idp.mock_authorization_server_metadata(json!({
        "issuer": idp.uri(),
        "jwks_uri": format!("{}/keys", idp.uri()),
    }))
    .await;

    let transport = Arc::new(ReqwestTransport::new().unwrap());
    AuthServices::from_config(external_config(&idp.uri()), transport).unwrap()
}

#[tokio::test]
async fn test_valid_jwt_accepted() {
    let idp = MockIdentityProvider::start().await;
    let services = services(&idp).await;

    let token = sign_jwt(json!({
        "iss": idp.uri(),
        "aud": "admiral",
        "sub": "service-account-7",
        "name": "Deployer",
        "exp": unix_time(300),
    }));

    let identity = services.verifier.verify(&token).await.unwrap();
    assert_eq!(identity.subject(), "service-account-7");
    assert_eq!(identity.name(), "Deployer");
    assert_eq!(identity.credential_kind(), CredentialKind::Jwt);
}

#[tokio::test]
async fn test_wrong_issuer_denied() {
    let idp = MockIdentityProvider::start().await;
    let services = services(&idp).await;

    let token = sign_jwt(json!({
        "iss": "https://evil.example.com",
        "aud": "admiral",
        "sub": "intruder",
        "exp": unix_time(300),
    }));

    assert!(services.verifier.verify(&token).await.is_err());
}

#[tokio::test]
async fn test_wrong_audience_denied() {
    let idp = MockIdentityProvider::start().await;
    let services = services(&idp).await;

    let token = sign_jwt(json!({
        "iss": idp.uri(),
        "aud": "some-other-api",
        "sub": "service-account-7",
        "exp": unix_time(300),
    }));

    assert!(services.verifier.verify(&token).await.is_err());
}

#[tokio::test]
async fn test_expired_jwt_denied() {
    let idp = MockIdentityProvider::start().await;
    let services = services(&idp).await;

    // Beyond the 60 second leeway
    let token = sign_jwt(json!({
        "iss": idp.uri(),
        "aud": "admiral",
        "sub": "service-account-7",
        "exp": unix_time(-600),
    }));

    assert!(services.verifier.verify(&token).await.is_err());
}

#[tokio::test]
async fn test_tampered_jwt_denied() {
    let idp = MockIdentityProvider::start().await;
    let services = services(&idp).await;

    let token = sign_jwt(json!({
        "iss": idp.uri(),
        "aud": "admiral",
        "sub": "service-account-7",
        "exp": unix_time(300),
    }));
    let (head, signature) = token.rsplit_once('.').unwrap();
    let forged = format!("{head}.{}", signature.chars().rev().collect::<String>());

    assert!(services.verifier.verify(&forged).await.is_err());
}

fn valid_claims(idp: &MockIdentityProvider) -> serde_json::Value {
    json!({
        "iss": idp.uri(),
        "aud": "admiral",
        "sub": "service-account-7",
        "exp": unix_time(300),
    })
}

#[tokio::test]
async fn test_jwks_server_error_denies() {
    let idp = MockIdentityProvider::start().await;
    idp.mock_jwks_response(500, r#"{"error":"internal"}"#).await;
    let services = services_without_keys(&idp).await;

    let token = sign_jwt(valid_claims(&idp));
    assert!(matches!(
        services.verifier.verify(&token).await,
        Err(AuthError::Unauthenticated(_))
    ));
}

#[tokio::test]
async fn test_jwks_garbage_body_denies() {
    let idp = MockIdentityProvider::start().await;
    idp.mock_jwks_response(200, "<html>not a key set</html>").await;
    let services = services_without_keys(&idp).await;

    let token = sign_jwt(valid_claims(&idp));
    assert!(matches!(
        services.verifier.verify(&token).await,
        Err(AuthError::Unauthenticated(_))
    ));
}

#[tokio::test]
async fn test_jwks_unreachable_denies() {
    let idp = MockIdentityProvider::start().await;
    let mut config = external_config(&idp.uri());
    config.jwks.jwks_uri = Some("http://127.0.0.1:1/keys".parse().unwrap());
    idp.mock_authorization_server_metadata(json!({ "issuer": idp.uri() })).await;
    let services = AuthServices::from_config(config, Arc::new(ReqwestTransport::new().unwrap())).unwrap();

    let token = sign_jwt(valid_claims(&idp));
    assert!(matches!(
        services.verifier.verify(&token).await,
        Err(AuthError::Unauthenticated(_))
    ));
}

#[tokio::test]
async fn test_unknown_kid_denies() {
    let idp = MockIdentityProvider::start().await;
    let services = services(&idp).await;

    let token = sign_jwt_with_kid(valid_claims(&idp), "rotated-away");
    assert!(matches!(
        services.verifier.verify(&token).await,
        Err(AuthError::Unauthenticated(_))
    ));
}

#[tokio::test]
async fn test_session_tokens_still_accepted_in_external_mode() {
    let idp = MockIdentityProvider::start().await;
    let services = services(&idp).await;

    let session = SessionToken::new(
        "upstream-access-token",
        None,
        chrono::Utc::now() + chrono::Duration::hours(1),
        IdentityClaims {
            sub: "abc123".into(),
            ..Default::default()
        },
    );
    let cookie = services.sessions.encode(&session).unwrap();

    let identity = services.verifier.verify(&cookie).await.unwrap();
    assert_eq!(identity.subject(), "abc123");
    assert_eq!(identity.credential_kind(), CredentialKind::Session);
}
