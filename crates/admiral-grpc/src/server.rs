//! RPC server assembly
//!
//! [`RpcServer`] bundles every registered `tonic` service behind one
//! [`InterceptorChain`]. It produces a tower service; binding listeners and
//! serving connections is left to the gateway.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use admiral_auth::TokenVerifier;
use tonic::body::Body;
use tonic::server::NamedService;
use tonic::service::{Routes, RoutesBuilder};
use tower::{Layer, Service};
use tracing::info;

use crate::error::{GrpcError, GrpcResult};
use crate::identity::{CallerIdentityService, IdentityServiceServer};
use crate::interceptor::{
    AuthenticationInterceptor, InterceptedService, InterceptorChain, InterceptorLayer, LoggingInterceptor,
    MetadataEnrichmentInterceptor, MetricsInterceptor,
};

/// The intercepted RPC service handed to the gateway
pub type RpcService = InterceptedService<Routes>;

struct Authentication {
    verifier: Arc<dyn TokenVerifier>,
    authorization_header: String,
    timeout: Duration,
}

/// Builder for [`RpcServer`]
pub struct RpcServerBuilder {
    authentication: Option<Authentication>,
    routes: RoutesBuilder,
    services: Vec<&'static str>,
}

impl std::fmt::Debug for RpcServerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcServerBuilder")
            .field("authentication", &self.authentication.is_some())
            .field("services", &self.services)
            .finish()
    }
}

impl Default for RpcServerBuilder {
    fn default() -> Self {
        let builder = Self {
            authentication: None,
            routes: RoutesBuilder::default(),
            services: Vec::new(),
        };
        builder.add_service(IdentityServiceServer::new(CallerIdentityService))
    }
}

impl RpcServerBuilder {
    /// Require a verified credential on every call
    ///
    /// Installs the `custom_metadata` and `authentication` interceptors.
    /// Without this the chain is `metrics → logging` only.
    pub fn authentication(
        mut self,
        verifier: Arc<dyn TokenVerifier>,
        authorization_header: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        self.authentication = Some(Authentication {
            verifier,
            authorization_header: authorization_header.into(),
            timeout,
        });
        self
    }

    /// Register a `tonic` service
    pub fn add_service<S>(mut self, service: S) -> Self
    where
        S: Service<http::Request<Body>, Response = http::Response<Body>, Error = Infallible>
            + NamedService
            + Clone
            + Send
            + Sync
            + 'static,
        S::Future: Send + 'static,
    {
        self.routes.add_service(service);
        self.services.push(S::NAME);
        self
    }

    /// Build the chain in its fixed order and wrap the registered services
    ///
    /// # Errors
    ///
    /// Returns [`GrpcError::Config`] if the authorization header name is invalid.
    pub fn build(self) -> GrpcResult<RpcServer> {
        let mut chain = InterceptorChain::new().with(MetricsInterceptor::new(self.services.iter().copied()));
        if let Some(auth) = self.authentication {
            let enrichment = MetadataEnrichmentInterceptor::new(&auth.authorization_header).map_err(|e| {
                GrpcError::config(format!(
                    "invalid authorization header name '{}': {e}",
                    auth.authorization_header
                ))
            })?;
            chain = chain
                .with(enrichment)
                .with(AuthenticationInterceptor::new(auth.verifier, auth.timeout));
        }
        chain = chain.with(LoggingInterceptor::new());

        info!(
            interceptors = ?chain.names(),
            services = ?self.services,
            "RPC server assembled"
        );

        let layer = InterceptorLayer::new(Arc::new(chain));
        Ok(RpcServer {
            service: layer.layer(self.routes.routes()),
            services: self.services,
        })
    }
}

/// All RPC services behind the interceptor chain
#[derive(Debug, Clone)]
pub struct RpcServer {
    service: RpcService,
    services: Vec<&'static str>,
}

impl RpcServer {
    /// Start building; the identity service is pre-registered
    pub fn builder() -> RpcServerBuilder {
        RpcServerBuilder::default()
    }

    /// The interceptor chain in execution order
    pub fn chain(&self) -> &InterceptorChain {
        self.service.chain()
    }

    /// Fully-qualified names of the registered services
    pub fn service_names(&self) -> &[&'static str] {
        &self.services
    }

    /// The tower service to serve
    pub fn into_service(self) -> RpcService {
        self.service
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use admiral_auth::{CredentialVerifier, SessionCodec};
    use pretty_assertions::assert_eq;

    fn verifier() -> Arc<dyn TokenVerifier> {
        let codec = SessionCodec::new(b"0123456789abcdef0123456789abcdef", Duration::from_secs(60)).unwrap();
        Arc::new(CredentialVerifier::new(codec))
    }

    #[test]
    fn test_chain_order_with_auth() {
        let server = RpcServer::builder()
            .authentication(verifier(), "admiral-authorization", Duration::from_secs(5))
            .build()
            .unwrap();
        assert_eq!(
            server.chain().names(),
            ["metrics", "custom_metadata", "authentication", "logging"]
        );
    }

    #[test]
    fn test_chain_order_without_auth() {
        let server = RpcServer::builder().build().unwrap();
        assert_eq!(server.chain().names(), ["metrics", "logging"]);
    }

    #[test]
    fn test_identity_service_registered() {
        let server = RpcServer::builder().build().unwrap();
        assert_eq!(server.service_names(), ["admiral.identity.v1.IdentityService"]);
    }

    #[test]
    fn test_invalid_header_name_rejected() {
        let result = RpcServer::builder()
            .authentication(verifier(), "not a header", Duration::from_secs(5))
            .build();
        assert!(matches!(result, Err(GrpcError::Config(_))));
    }
}
