//! Tower integration for the interceptor chain

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tonic::Code;
use tower::{Layer, Service};
use tracing::{Instrument, info_span};

use super::{CallContext, InterceptorChain};

/// Tower layer running an [`InterceptorChain`] around every call
#[derive(Debug, Clone)]
pub struct InterceptorLayer {
    chain: Arc<InterceptorChain>,
}

impl InterceptorLayer {
    /// Create a layer for `chain`
    pub fn new(chain: Arc<InterceptorChain>) -> Self {
        Self { chain }
    }
}

impl<S> Layer<S> for InterceptorLayer {
    type Service = InterceptedService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        InterceptedService {
            inner,
            chain: Arc::clone(&self.chain),
        }
    }
}

/// Service produced by [`InterceptorLayer`]
#[derive(Debug, Clone)]
pub struct InterceptedService<S> {
    inner: S,
    chain: Arc<InterceptorChain>,
}

impl<S> InterceptedService<S> {
    /// The chain applied to each call
    pub fn chain(&self) -> &InterceptorChain {
        &self.chain
    }
}

impl<S, ReqBody, ResBody> Service<http::Request<ReqBody>> for InterceptedService<S>
where
    S: Service<http::Request<ReqBody>, Response = http::Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send,
    ReqBody: Send + 'static,
    ResBody: Default + Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: http::Request<ReqBody>) -> Self::Future {
        // The readied service handles this call; a fresh clone takes its place
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let chain = Arc::clone(&self.chain);

        let (mut parts, body) = request.into_parts();
        let method = parts.uri.path().to_string();
        let span = info_span!("rpc_call", method = %method);

        Box::pin(
            async move {
                let mut ctx = CallContext::new(
                    method,
                    std::mem::take(&mut parts.headers),
                    std::mem::take(&mut parts.extensions),
                );

                let (ran, outcome) = chain.run(&mut ctx).await;
                if let Err(status) = outcome {
                    chain.finish(&ctx, ran, status.code());
                    return Ok(status.into_http());
                }

                parts.headers = std::mem::take(&mut ctx.headers);
                parts.extensions = std::mem::take(&mut ctx.extensions);
                let response = inner.call(http::Request::from_parts(parts, body)).await;

                let code = match &response {
                    Ok(response) => response_code(response.headers()),
                    Err(_) => Code::Internal,
                };
                chain.finish(&ctx, ran, code);
                response
            }
            .instrument(span),
        )
    }
}

/// Status of a response as far as its headers tell
///
/// Errors raised before the body starts are sent trailers-only, with
/// `grpc-status` in the headers. Anything else is treated as `OK`.
fn response_code(headers: &http::HeaderMap) -> Code {
    headers
        .get("grpc-status")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<i32>().ok())
        .map_or(Code::Ok, Code::from)
}
