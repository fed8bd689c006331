//! Wire messages for the built-in identity service
//!
//! Declared with the prost derive rather than generated from `.proto` files;
//! field tags match `admiral/identity/v1/identity.proto`:
//!
//! ```proto
//! package admiral.identity.v1;
//!
//! service IdentityService {
//!   rpc UserInfo(UserInfoRequest) returns (UserInfoResponse);
//! }
//!
//! message UserInfoRequest {}
//!
//! message UserInfoResponse {
//!   string subject = 1;
//!   string name = 2;
//!   string preferred_username = 3;
//!   string given_name = 4;
//!   string family_name = 5;
//! }
//! ```

use admiral_auth::CallIdentity;
use serde::{Deserialize, Serialize};

/// Fully-qualified service name
pub const IDENTITY_SERVICE_NAME: &str = "admiral.identity.v1.IdentityService";

/// Request path of `IdentityService/UserInfo`
pub const USER_INFO_PATH: &str = "/admiral.identity.v1.IdentityService/UserInfo";

/// Request for the caller's identity
#[derive(Clone, PartialEq, Eq, ::prost::Message, Serialize, Deserialize)]
pub struct UserInfoRequest {}

/// The caller's identity as established by the authentication interceptor
#[derive(Clone, PartialEq, Eq, ::prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct UserInfoResponse {
    /// Subject identifier
    #[prost(string, tag = "1")]
    pub subject: String,
    /// Full display name
    #[prost(string, tag = "2")]
    pub name: String,
    /// Preferred username
    #[prost(string, tag = "3")]
    pub preferred_username: String,
    /// Given name
    #[prost(string, tag = "4")]
    pub given_name: String,
    /// Family name
    #[prost(string, tag = "5")]
    pub family_name: String,
}

impl From<&CallIdentity> for UserInfoResponse {
    fn from(identity: &CallIdentity) -> Self {
        Self {
            subject: identity.subject().to_string(),
            name: identity.name().to_string(),
            preferred_username: identity.preferred_username().to_string(),
            given_name: identity.given_name().to_string(),
            family_name: identity.family_name().to_string(),
        }
    }
}
