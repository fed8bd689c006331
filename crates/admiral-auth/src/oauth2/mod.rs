//! OAuth 2 client side of the browser login flow
//!
//! - [`http_client`] - outbound transport abstraction shared by every upstream call
//! - [`exchange`] - authorize URL construction, code exchange, refresh and userinfo

pub mod exchange;
pub mod http_client;

pub use exchange::{AuthorizationRequest, DEFAULT_ACCESS_TOKEN_LIFETIME, TokenExchanger};
pub use http_client::{FnTransport, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, TransportError};
