//! Per-request protocol classification for the shared secure port

use std::convert::Infallible;
use std::task::{Context, Poll};

use admiral_grpc::RpcService;
use axum::body::Body;
use http::header::CONTENT_TYPE;
use http::{Request, Response, Version};
use tower::util::{BoxCloneSyncService, Oneshot};
use tower::{Service, ServiceExt};

/// Boxed HTTP service as seen by the connection loop
pub type BoxHttpService = BoxCloneSyncService<Request<Body>, Response<Body>, Infallible>;

/// Where a request is sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// gRPC over HTTP/2
    Rpc,
    /// Anything else: browser, REST and discovery traffic
    Http,
}

impl Protocol {
    /// Classify a request by HTTP version and content type
    pub fn classify<B>(request: &Request<B>) -> Self {
        let is_grpc = request
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("application/grpc"));
        if request.version() == Version::HTTP_2 && is_grpc {
            Self::Rpc
        } else {
            Self::Http
        }
    }
}

/// Sends RPC traffic to the RPC service and the rest to the HTTP router
#[derive(Clone)]
pub struct ProtocolRouter {
    rpc: BoxHttpService,
    http: BoxHttpService,
}

impl std::fmt::Debug for ProtocolRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolRouter").finish_non_exhaustive()
    }
}

impl ProtocolRouter {
    /// Router over the two services
    pub fn new(rpc: BoxHttpService, http: BoxHttpService) -> Self {
        Self { rpc, http }
    }
}

impl Service<Request<Body>> for ProtocolRouter {
    type Response = Response<Body>;
    type Error = Infallible;
    type Future = Oneshot<BoxHttpService, Request<Body>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // Readiness is driven per call by `Oneshot`
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let target = match Protocol::classify(&request) {
            Protocol::Rpc => self.rpc.clone(),
            Protocol::Http => self.http.clone(),
        };
        target.oneshot(request)
    }
}

/// The RPC service with its body type erased to the HTTP router's
pub fn rpc_http_service(service: RpcService) -> BoxHttpService {
    BoxCloneSyncService::new(ServiceExt::<Request<Body>>::map_response(
        service,
        |response: Response<tonic::body::Body>| response.map(Body::new),
    ))
}

/// An axum router as a [`BoxHttpService`]
pub fn http_service(router: axum::Router) -> BoxHttpService {
    BoxCloneSyncService::new(router)
}
