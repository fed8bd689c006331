//! # Authorization Server Discovery Types
//!
//! Types for OAuth 2.0 Authorization Server Metadata (RFC 8414) and the subset
//! of OpenID Connect Discovery 1.0 used by the browser login flow.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// OAuth 2.0 Authorization Server Metadata (RFC 8414)
///
/// Every field is optional: documents relayed from an external authorization
/// server are passed through without validation. Unknown members, explicit
/// `null`s and members whose value does not have the expected type are kept
/// in `additional_fields`, so the relayed document matches the upstream one.
///
/// ## Example
///
/// ```json
/// {
///   "issuer": "https://server.example.com",
///   "authorization_endpoint": "https://server.example.com/authorize",
///   "token_endpoint": "https://server.example.com/token",
///   "jwks_uri": "https://server.example.com/jwks",
///   "response_types_supported": ["code", "token"],
///   "code_challenge_methods_supported": ["S256"]
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(from = "Map<String, Value>")]
pub struct AuthorizationServerMetadata {
    /// The authorization server's issuer identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,

    /// URL of the authorization endpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_endpoint: Option<String>,

    /// URL of the token endpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_endpoint: Option<String>,

    /// URL of the JWK Set document
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwks_uri: Option<String>,

    /// Supported scope values
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scopes_supported: Option<Vec<String>>,

    /// Supported `response_type` values
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_types_supported: Option<Vec<String>>,

    /// Supported grant types
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grant_types_supported: Option<Vec<String>>,

    /// Supported client authentication methods at the token endpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_endpoint_auth_methods_supported: Option<Vec<String>>,

    /// Supported PKCE code challenge methods
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_challenge_methods_supported: Option<Vec<String>>,

    /// Members not modelled above, preserved verbatim
    #[serde(flatten)]
    pub additional_fields: BTreeMap<String, Value>,
}

impl From<Map<String, Value>> for AuthorizationServerMetadata {
    fn from(mut document: Map<String, Value>) -> Self {
        Self {
            issuer: take(&mut document, "issuer"),
            authorization_endpoint: take(&mut document, "authorization_endpoint"),
            token_endpoint: take(&mut document, "token_endpoint"),
            jwks_uri: take(&mut document, "jwks_uri"),
            scopes_supported: take(&mut document, "scopes_supported"),
            response_types_supported: take(&mut document, "response_types_supported"),
            grant_types_supported: take(&mut document, "grant_types_supported"),
            token_endpoint_auth_methods_supported: take(&mut document, "token_endpoint_auth_methods_supported"),
            code_challenge_methods_supported: take(&mut document, "code_challenge_methods_supported"),
            additional_fields: document.into_iter().collect(),
        }
    }
}

// Moves `key` out of the document only when it decodes as `T`
fn take<T: DeserializeOwned>(document: &mut Map<String, Value>, key: &str) -> Option<T> {
    let typed = serde_json::from_value(document.get(key)?.clone()).ok()?;
    document.remove(key);
    Some(typed)
}

impl AuthorizationServerMetadata {
    /// Whether the server advertises S256 PKCE
    pub fn supports_pkce_s256(&self) -> bool {
        self.code_challenge_methods_supported
            .as_ref()
            .is_some_and(|methods| methods.iter().any(|m| m == "S256"))
    }
}

/// OpenID Provider endpoints needed to run the authorization code flow
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OpenIdConfiguration {
    /// Issuer identifier
    pub issuer: String,
    /// Authorization endpoint
    pub authorization_endpoint: String,
    /// Token endpoint
    pub token_endpoint: String,
    /// Userinfo endpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub userinfo_endpoint: Option<String>,
    /// JWK Set document
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwks_uri: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_fields_survive_round_trip() {
        let upstream = serde_json::json!({
            "issuer": "https://auth.example.com",
            "authorization_endpoint": "https://auth.example.com/v1/authorize",
            "device_authorization_endpoint": "https://auth.example.com/v1/device",
            "claims_supported": ["sub", "name"],
            "request_parameter_supported": true
        });

        let parsed: AuthorizationServerMetadata = serde_json::from_value(upstream.clone()).unwrap();
        assert_eq!(parsed.issuer.as_deref(), Some("https://auth.example.com"));
        assert!(parsed.additional_fields.contains_key("device_authorization_endpoint"));
        assert_eq!(serde_json::to_value(&parsed).unwrap(), upstream);
    }

    #[test]
    fn test_nulls_and_odd_types_relayed_verbatim() {
        let upstream = serde_json::json!({
            "issuer": "https://auth.example.com",
            "jwks_uri": null,
            "scopes_supported": "openid profile",
            "grant_types_supported": ["authorization_code", 7],
            "code_challenge_methods_supported": ["S256"]
        });

        let parsed: AuthorizationServerMetadata = serde_json::from_value(upstream.clone()).unwrap();
        assert_eq!(parsed.jwks_uri, None);
        assert_eq!(parsed.scopes_supported, None);
        assert!(parsed.supports_pkce_s256());
        assert_eq!(serde_json::to_value(&parsed).unwrap(), upstream);
    }

    #[test]
    fn test_non_object_document_rejected() {
        assert!(serde_json::from_str::<AuthorizationServerMetadata>("[1, 2]").is_err());
    }

    #[test]
    fn test_pkce_detection() {
        let metadata = AuthorizationServerMetadata {
            code_challenge_methods_supported: Some(vec!["plain".into(), "S256".into()]),
            ..Default::default()
        };
        assert!(metadata.supports_pkce_s256());
        assert!(!AuthorizationServerMetadata::default().supports_pkce_s256());
    }
}
