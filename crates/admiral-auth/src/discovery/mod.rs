//! # Authorization Server Discovery
//!
//! Supplies the OAuth 2.0 Authorization Server Metadata document (RFC 8414)
//! that clients use to find where to authenticate, plus the public client
//! registration native clients need.
//!
//! Two [`MetadataProvider`] variants exist, chosen once from configuration:
//!
//! - [`SelfHostedMetadata`] synthesizes the document from local settings with
//!   no network access. Endpoints resolve relative to the public URI.
//! - [`ExternalMetadataProxy`] relays the document published by an external
//!   authorization server, one GET per call unless a cache TTL is configured.
//!
//! [`DocumentFetcher`] is shared with the login flow, which reads the
//! identity provider's OpenID configuration the same way.

mod provider;
mod types;

pub use provider::{
    AUTHORIZE_RELATIVE_PATH, DocumentFetcher, ExternalMetadataProxy, JWKS_RELATIVE_PATH,
    MetadataProvider, OAUTH2_METADATA_PATH, OPENID_CONFIGURATION_SUFFIX, SelfHostedMetadata,
    TOKEN_RELATIVE_PATH, external_metadata_url, metadata_provider_from_config,
    openid_configuration_url,
};
pub use types::{AuthorizationServerMetadata, OpenIdConfiguration};
