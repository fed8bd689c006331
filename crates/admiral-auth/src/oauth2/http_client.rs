//! Outbound HTTP transport for identity provider calls
//!
//! Every request this crate makes (discovery, token, userinfo, JWKS) goes
//! through [`HttpTransport`]. Production code uses [`ReqwestTransport`]; tests
//! inject canned responses with [`FnTransport`] or point a
//! [`ReqwestTransport`] at a `wiremock` server.
//!
//! ## Security Configuration
//!
//! [`ReqwestTransport`] is configured to:
//! - NOT follow redirects (SSRF protection per OAuth2 security guidance)
//! - Use rustls for TLS (no OpenSSL dependency)

use std::time::Duration;

use async_trait::async_trait;

/// Type alias for an outbound request
pub type HttpRequest = http::Request<Vec<u8>>;
/// Type alias for a buffered response
pub type HttpResponse = http::Response<Vec<u8>>;

/// Error type for transport operations
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Request could not be sent or the connection failed
    #[error("HTTP request failed: {0}")]
    Request(String),

    /// Request did not complete in time
    #[error("HTTP request timed out")]
    Timeout,

    /// Response body could not be read
    #[error("Failed to read response body: {0}")]
    BodyRead(String),

    /// A request or response could not be represented
    #[error("Invalid HTTP message: {0}")]
    InvalidMessage(String),
}

impl TransportError {
    /// Whether the failure was a timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}

/// Sends a buffered HTTP request and returns the buffered response
#[async_trait]
pub trait HttpTransport: Send + Sync + 'static {
    /// Send `request`; any status is a successful send
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Reqwest-backed transport with hardened defaults
#[derive(Clone)]
pub struct ReqwestTransport {
    inner: reqwest::Client,
}

impl ReqwestTransport {
    /// Default per-request timeout
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Create a transport with redirects disabled and the default timeout
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Request`] if the TLS backend cannot be initialised.
    pub fn new() -> Result<Self, TransportError> {
        Self::with_timeout(Self::DEFAULT_TIMEOUT)
    }

    /// Create a transport with a custom per-request timeout
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Request`] if the TLS backend cannot be initialised.
    pub fn with_timeout(timeout: Duration) -> Result<Self, TransportError> {
        let inner = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Request(e.to_string()))?;
        Ok(Self { inner })
    }

    /// Create from an existing reqwest client
    ///
    /// # Warning
    /// Ensure the client is configured with `redirect::Policy::none()`.
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { inner: client }
    }
}

impl std::fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestTransport")
            .field("inner", &"<reqwest::Client>")
            .finish()
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let (parts, body) = request.into_parts();

        let response = self
            .inner
            .request(parts.method, parts.uri.to_string())
            .headers(parts.headers)
            .body(body)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let mut builder = http::Response::builder().status(response.status());
        if let Some(headers) = builder.headers_mut() {
            headers.extend(response.headers().clone());
        }

        let body = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout
            } else {
                TransportError::BodyRead(e.to_string())
            }
        })?;

        builder
            .body(body.to_vec())
            .map_err(|e| TransportError::InvalidMessage(e.to_string()))
    }
}

fn map_reqwest_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Request(e.to_string())
    }
}

/// Transport backed by a closure, for canned responses in tests
///
/// ```rust
/// use admiral_auth::oauth2::{FnTransport, HttpRequest};
///
/// let transport = FnTransport::new(|_req: HttpRequest| {
///     Ok(http::Response::builder().status(200).body(b"{}".to_vec()).unwrap())
/// });
/// # let _ = transport;
/// ```
pub struct FnTransport<F> {
    handler: F,
}

impl<F> FnTransport<F>
where
    F: Fn(HttpRequest) -> Result<HttpResponse, TransportError> + Send + Sync + 'static,
{
    /// Wrap a closure
    pub fn new(handler: F) -> Self {
        Self { handler }
    }
}

#[async_trait]
impl<F> HttpTransport for FnTransport<F>
where
    F: Fn(HttpRequest) -> Result<HttpResponse, TransportError> + Send + Sync + 'static,
{
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        (self.handler)(request)
    }
}

/// Build a body-less GET request
pub(crate) fn get_request(url: &str) -> Result<HttpRequest, TransportError> {
    http::Request::get(url)
        .header(http::header::ACCEPT, "application/json")
        .body(Vec::new())
        .map_err(|e| TransportError::InvalidMessage(e.to_string()))
}
