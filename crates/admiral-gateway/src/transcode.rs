//! JSON/REST to RPC transcoding
//!
//! Each [`RestBindings`] entry maps an HTTP method and literal path onto a
//! unary RPC. The JSON request (query string for `GET` and `DELETE`, body
//! otherwise) is decoded into the request message, sent through an
//! [`RpcChannel`] with the caller's credential attached as `authorization`
//! metadata, and the reply is rendered back as JSON. Failed calls render as
//! `{"code", "message", "details"}` with the HTTP status grpc-gateway uses.

use std::collections::{BTreeMap, HashSet};
use std::convert::Infallible;
use std::sync::Arc;

use admiral_grpc::RpcService;
use axum::Json;
use axum::Router;
use axum::extract::{Query, Request};
use axum::response::{IntoResponse, Response};
use axum::routing::{MethodFilter, MethodRouter, on};
use futures::future::BoxFuture;
use http::header::AUTHORIZATION;
use http::uri::PathAndQuery;
use http::{HeaderMap, Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use thiserror::Error;
use tonic::metadata::AsciiMetadataValue;
use tonic::transport::Channel;
use tonic::{Code, Status};
use tower::ServiceExt;
use tower::util::BoxCloneSyncService;
use tracing::debug;

use crate::cookies::read_cookie;
use crate::error::{GatewayError, GatewayResult};

/// Largest JSON request body accepted
pub const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

type RpcRequest = http::Request<tonic::body::Body>;

/// Transport failure between the transcoder and the RPC server
#[derive(Debug, Error)]
#[error("rpc channel: {0}")]
pub struct ChannelError(String);

/// Client-side view of the RPC server used by the transcoder
pub type RpcChannel = BoxCloneSyncService<RpcRequest, http::Response<tonic::body::Body>, ChannelError>;

/// Channel dispatching straight into the in-process RPC service
pub fn in_process_channel(service: RpcService) -> RpcChannel {
    BoxCloneSyncService::new(ServiceExt::<RpcRequest>::map_err(service, |never: Infallible| -> ChannelError {
        match never {}
    }))
}

/// Channel dialing the RPC listener
pub fn remote_channel(channel: Channel) -> RpcChannel {
    BoxCloneSyncService::new(ServiceExt::<RpcRequest>::map_err(
        channel,
        |e: tonic::transport::Error| ChannelError(e.to_string()),
    ))
}

/// Which credential a transcoded call carries
#[derive(Debug, Clone, Default)]
pub struct CredentialForwarding {
    session_cookie: Option<String>,
}

impl CredentialForwarding {
    /// Forward the `Authorization` header only
    pub fn header_only() -> Self {
        Self::default()
    }

    /// Forward the `Authorization` header, else the named session cookie as a bearer
    pub fn with_session_cookie(name: impl Into<String>) -> Self {
        Self {
            session_cookie: Some(name.into()),
        }
    }

    /// `authorization` metadata value for a request
    ///
    /// An explicit `Authorization` header wins over the cookie.
    pub fn authorization(&self, headers: &HeaderMap) -> Option<String> {
        if let Some(value) = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) {
            return Some(value.to_string());
        }
        let name = self.session_cookie.as_deref()?;
        read_cookie(headers, name).map(|token| format!("Bearer {token}"))
    }
}

type TranscodeFn =
    Arc<dyn Fn(Request, RpcChannel, Arc<CredentialForwarding>) -> BoxFuture<'static, Response> + Send + Sync>;

struct Binding {
    method: Method,
    path: String,
    handler: TranscodeFn,
}

/// REST routes transcoded onto RPC methods
#[derive(Default)]
pub struct RestBindings {
    bindings: Vec<Binding>,
    seen: HashSet<(Method, String)>,
    reserved: HashSet<String>,
}

impl std::fmt::Debug for RestBindings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.bindings.iter().map(|b| format!("{} {}", b.method, b.path)))
            .finish()
    }
}

impl RestBindings {
    /// Empty set of bindings
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a path for a built-in route so no binding can shadow it
    pub(crate) fn reserve(&mut self, path: &str) {
        self.reserved.insert(path.to_string());
    }

    /// Number of bindings registered
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Whether no binding is registered
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Bind `method path` to the unary RPC at `rpc_path`
    ///
    /// # Errors
    ///
    /// - [`GatewayError::InvalidRoute`] if the path is not a literal absolute
    ///   path, the method has no route filter, or `rpc_path` is unparseable
    /// - [`GatewayError::DuplicateRoute`] if the method and path are taken
    pub fn unary<Req, Resp>(mut self, method: Method, path: &str, rpc_path: &str) -> GatewayResult<Self>
    where
        Req: prost::Message + Default + DeserializeOwned + Send + Sync + 'static,
        Resp: prost::Message + Default + Serialize + Send + Sync + 'static,
    {
        validate_path(path)?;
        if MethodFilter::try_from(method.clone()).is_err() {
            return Err(invalid(path, format!("method {method} cannot be routed")));
        }
        let rpc_path: PathAndQuery = rpc_path
            .parse()
            .map_err(|e: http::uri::InvalidUri| invalid(path, format!("bad rpc path: {e}")))?;

        if self.reserved.contains(path) || !self.seen.insert((method.clone(), path.to_string())) {
            return Err(GatewayError::DuplicateRoute {
                method,
                path: path.to_string(),
            });
        }

        let handler: TranscodeFn = Arc::new(move |request, channel, forwarding| {
            let rpc_path = rpc_path.clone();
            Box::pin(async move {
                transcode_unary::<Req, Resp>(request, channel, &forwarding, rpc_path)
                    .await
                    .unwrap_or_else(|status| status_response(&status))
            })
        });
        self.bindings.push(Binding {
            method,
            path: path.to_string(),
            handler,
        });
        Ok(self)
    }

    /// Router serving every binding through `channel`
    pub fn into_router(self, channel: RpcChannel, forwarding: Arc<CredentialForwarding>) -> Router {
        let mut by_path: BTreeMap<String, MethodRouter> = BTreeMap::new();
        for Binding { method, path, handler } in self.bindings {
            // Checked in `unary`
            let Ok(filter) = MethodFilter::try_from(method) else {
                continue;
            };
            let channel = channel.clone();
            let forwarding = Arc::clone(&forwarding);
            let endpoint = move |request: Request| {
                let handler = Arc::clone(&handler);
                let channel = channel.clone();
                let forwarding = Arc::clone(&forwarding);
                async move { handler(request, channel, forwarding).await }
            };
            let entry = by_path.remove(&path);
            let method_router = match entry {
                Some(existing) => existing.on(filter, endpoint),
                None => on(filter, endpoint),
            };
            by_path.insert(path, method_router);
        }

        by_path
            .into_iter()
            .fold(Router::new(), |router, (path, method_router)| router.route(&path, method_router))
    }
}

fn invalid(path: &str, reason: impl Into<String>) -> GatewayError {
    GatewayError::InvalidRoute {
        path: path.to_string(),
        reason: reason.into(),
    }
}

fn validate_path(path: &str) -> GatewayResult<()> {
    if !path.starts_with('/') {
        return Err(invalid(path, "must start with '/'"));
    }
    if path.contains(['{', '}', ':', '*', '?', '#']) {
        return Err(invalid(path, "only literal paths are supported"));
    }
    Ok(())
}

async fn transcode_unary<Req, Resp>(
    request: Request,
    channel: RpcChannel,
    forwarding: &CredentialForwarding,
    rpc_path: PathAndQuery,
) -> Result<Response, Status>
where
    Req: prost::Message + Default + DeserializeOwned + Send + Sync + 'static,
    Resp: prost::Message + Default + Serialize + Send + Sync + 'static,
{
    let (parts, body) = request.into_parts();

    let message: Req = if parts.method == Method::GET || parts.method == Method::DELETE {
        Query::<Req>::try_from_uri(&parts.uri)
            .map_err(|e| Status::invalid_argument(format!("invalid query: {e}")))?
            .0
    } else {
        let bytes = axum::body::to_bytes(body, MAX_BODY_BYTES)
            .await
            .map_err(|e| Status::invalid_argument(format!("failed to read body: {e}")))?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            Req::default()
        } else {
            serde_json::from_slice(&bytes).map_err(|e| Status::invalid_argument(format!("invalid JSON: {e}")))?
        }
    };

    let mut rpc_request = tonic::Request::new(message);
    if let Some(authorization) = forwarding.authorization(&parts.headers) {
        let value = AsciiMetadataValue::try_from(authorization)
            .map_err(|_| Status::unauthenticated("credential is not valid metadata"))?;
        rpc_request.metadata_mut().insert("authorization", value);
    }

    debug!(rpc = %rpc_path, "Transcoding REST call");
    let mut grpc = tonic::client::Grpc::new(channel);
    grpc.ready()
        .await
        .map_err(|e| Status::unavailable(format!("rpc service unavailable: {e}")))?;
    let response = grpc
        .unary(rpc_request, rpc_path, tonic_prost::ProstCodec::<Req, Resp>::default())
        .await?;

    Ok(Json(response.into_inner()).into_response())
}

/// HTTP status for a gRPC code, following grpc-gateway
pub fn http_status_from_code(code: Code) -> StatusCode {
    match code {
        Code::Ok => StatusCode::OK,
        // 499 Client Closed Request
        Code::Cancelled => StatusCode::from_u16(499).unwrap_or(StatusCode::BAD_REQUEST),
        Code::Unknown | Code::Internal | Code::DataLoss => StatusCode::INTERNAL_SERVER_ERROR,
        Code::InvalidArgument | Code::FailedPrecondition | Code::OutOfRange => StatusCode::BAD_REQUEST,
        Code::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
        Code::NotFound => StatusCode::NOT_FOUND,
        Code::AlreadyExists | Code::Aborted => StatusCode::CONFLICT,
        Code::PermissionDenied => StatusCode::FORBIDDEN,
        Code::Unauthenticated => StatusCode::UNAUTHORIZED,
        Code::ResourceExhausted => StatusCode::TOO_MANY_REQUESTS,
        Code::Unimplemented => StatusCode::NOT_IMPLEMENTED,
        Code::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
    }
}

fn status_response(status: &Status) -> Response {
    let body = Json(json!({
        "code": status.code() as i32,
        "message": status.message(),
        "details": [],
    }));
    (http_status_from_code(status.code()), body).into_response()
}
