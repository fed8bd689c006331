//! Built-in identity service
//!
//! `IdentityService/UserInfo` answers with the identity the authentication
//! interceptor attached to the call. It is the simplest authenticated RPC and
//! is transcoded at `GET /api/v1/identity`.

use std::convert::Infallible;
use std::sync::Arc;
use std::task::{Context, Poll};

use admiral_auth::CallIdentity;
use futures::future::BoxFuture;
use tonic::body::Body;
use tonic::codegen::{Body as HttpBody, Bytes, Service, StdError};
use tonic::server::{NamedService, UnaryService};
use tonic::{Request, Response, Status};

use crate::proto::{IDENTITY_SERVICE_NAME, USER_INFO_PATH, UserInfoRequest, UserInfoResponse};

/// Identity service handlers
#[async_trait::async_trait]
pub trait IdentityService: Send + Sync + 'static {
    /// Return the verified identity of the caller
    async fn user_info(&self, request: Request<UserInfoRequest>) -> Result<Response<UserInfoResponse>, Status>;
}

/// Default implementation reading the [`CallIdentity`] request extension
#[derive(Debug, Clone, Copy, Default)]
pub struct CallerIdentityService;

#[async_trait::async_trait]
impl IdentityService for CallerIdentityService {
    async fn user_info(&self, request: Request<UserInfoRequest>) -> Result<Response<UserInfoResponse>, Status> {
        let identity = request
            .extensions()
            .get::<CallIdentity>()
            .ok_or_else(|| Status::unauthenticated("no verified identity on this call"))?;
        Ok(Response::new(UserInfoResponse::from(identity)))
    }
}

/// tonic server glue for [`IdentityService`]
#[derive(Debug)]
pub struct IdentityServiceServer<T> {
    inner: Arc<T>,
}

impl<T: IdentityService> IdentityServiceServer<T> {
    /// Wrap a handler implementation
    pub fn new(inner: T) -> Self {
        Self { inner: Arc::new(inner) }
    }
}

impl<T> Clone for IdentityServiceServer<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> NamedService for IdentityServiceServer<T> {
    const NAME: &'static str = IDENTITY_SERVICE_NAME;
}

struct UserInfoSvc<T>(Arc<T>);

impl<T: IdentityService> UnaryService<UserInfoRequest> for UserInfoSvc<T> {
    type Response = UserInfoResponse;
    type Future = BoxFuture<'static, Result<Response<Self::Response>, Status>>;

    fn call(&mut self, request: Request<UserInfoRequest>) -> Self::Future {
        let inner = Arc::clone(&self.0);
        Box::pin(async move { inner.user_info(request).await })
    }
}

impl<T, B> Service<http::Request<B>> for IdentityServiceServer<T>
where
    T: IdentityService,
    B: HttpBody + Send + 'static,
    B::Error: Into<StdError> + Send + 'static,
{
    type Response = http::Response<Body>;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: http::Request<B>) -> Self::Future {
        match req.uri().path() {
            USER_INFO_PATH => {
                let inner = Arc::clone(&self.inner);
                Box::pin(async move {
                    let codec = tonic_prost::ProstCodec::default();
                    let mut grpc = tonic::server::Grpc::new(codec);
                    Ok(grpc.unary(UserInfoSvc(inner), req).await)
                })
            }
            _ => Box::pin(async move { Ok(Status::unimplemented("").into_http()) }),
        }
    }
}

/// Minimal client for [`IdentityService`]
#[derive(Debug, Clone)]
pub struct IdentityServiceClient<T> {
    inner: tonic::client::Grpc<T>,
}

impl<T> IdentityServiceClient<T>
where
    T: tonic::client::GrpcService<Body>,
    T::Error: Into<StdError>,
    T::ResponseBody: HttpBody<Data = Bytes> + Send + 'static,
    <T::ResponseBody as HttpBody>::Error: Into<StdError> + Send,
{
    /// Wrap a transport, such as a `tonic::transport::Channel`
    pub fn new(inner: T) -> Self {
        Self {
            inner: tonic::client::Grpc::new(inner),
        }
    }

    /// Call `UserInfo`
    ///
    /// # Errors
    ///
    /// Returns the status produced by the server or the transport.
    pub async fn user_info(
        &mut self,
        request: impl tonic::IntoRequest<UserInfoRequest>,
    ) -> Result<Response<UserInfoResponse>, Status> {
        self.inner
            .ready()
            .await
            .map_err(|e| Status::unknown(format!("Service was not ready: {}", e.into())))?;
        let codec = tonic_prost::ProstCodec::default();
        let path = http::uri::PathAndQuery::from_static(USER_INFO_PATH);
        self.inner.unary(request.into_request(), path, codec).await
    }
}
