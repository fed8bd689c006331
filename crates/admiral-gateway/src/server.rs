//! Gateway assembly and connection serving
//!
//! [`GatewayBuilder::bind`] does all fallible startup work (certificates,
//! auth components, RPC assembly, REST registration, listener binding)
//! before a single connection is accepted. [`Gateway::serve`] then runs one
//! task per connection until a shutdown signal arrives.
//!
//! | Mode     | Listeners                            | REST → RPC path          |
//! |----------|--------------------------------------|--------------------------|
//! | insecure | plaintext HTTP + plaintext RPC (h2c) | lazy channel to RPC port |
//! | secure   | one TLS port, ALPN `h2`/`http/1.1`   | in process               |

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use admiral_auth::oauth2::{HttpTransport, ReqwestTransport};
use admiral_auth::{AuthServices, RESERVED_ROUTES};
use admiral_grpc::proto::{USER_INFO_PATH, UserInfoRequest, UserInfoResponse};
use admiral_grpc::{RpcServer, RpcServerBuilder};
use axum::Router;
use axum::body::Body;
use axum::routing::get;
use http::{HeaderValue, Method, Request};
use hyper::body::Incoming;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use hyper_util::service::TowerToHyperService;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_rustls::TlsAcceptor;
use tonic::transport::Channel;
use tower::ServiceExt;
use tower::util::BoxCloneSyncService;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::handlers::{self, AuthState};
use crate::refresh::session_middleware;
use crate::router::{BoxHttpService, ProtocolRouter, http_service, rpc_http_service};
use crate::tls;
use crate::transcode::{CredentialForwarding, RestBindings, RpcChannel, in_process_channel, remote_channel};

/// Path of the built-in identity REST binding
pub const IDENTITY_REST_PATH: &str = "/api/v1/identity";

/// Time allowed for a client to finish the TLS handshake
const TLS_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Time open connections get to finish after shutdown starts
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Downstream services mounted at startup
///
/// Implementations add `tonic` services to the RPC server and REST bindings
/// to the transcoder. Both hooks default to adding nothing.
pub trait ServiceRegistry: Send + Sync {
    /// Add RPC services
    fn register_rpc(&self, builder: RpcServerBuilder) -> RpcServerBuilder {
        builder
    }

    /// Add REST bindings
    ///
    /// # Errors
    ///
    /// Propagates [`GatewayError::DuplicateRoute`] and
    /// [`GatewayError::InvalidRoute`] from [`RestBindings::unary`].
    fn register_rest(&self, bindings: RestBindings) -> GatewayResult<RestBindings> {
        Ok(bindings)
    }
}

struct NoServices;

impl ServiceRegistry for NoServices {}

/// Builder for [`Gateway`]
pub struct GatewayBuilder {
    config: ServerConfig,
    transport: Option<Arc<dyn HttpTransport>>,
    registry: Arc<dyn ServiceRegistry>,
}

impl std::fmt::Debug for GatewayBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayBuilder")
            .field("config", &self.config)
            .field("custom_transport", &self.transport.is_some())
            .finish_non_exhaustive()
    }
}

impl GatewayBuilder {
    /// Outbound transport for identity provider calls; defaults to reqwest
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Downstream services to mount
    #[must_use]
    pub fn registry(mut self, registry: Arc<dyn ServiceRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Do all startup work and bind the listeners
    ///
    /// # Errors
    ///
    /// Any configuration, certificate, auth, registration or bind failure.
    /// Nothing is served when this fails.
    pub async fn bind(self) -> GatewayResult<Gateway> {
        let Self {
            config,
            transport,
            registry,
        } = self;
        config.validate()?;
        let secure = config.security.secure;

        let tls = match (&config.security.tls, secure) {
            (Some(files), true) => Some(tls::acceptor(files)?),
            _ => None,
        };

        let auth = match config.active_auth() {
            Some(auth_config) => {
                let transport = match transport {
                    Some(transport) => transport,
                    None => Arc::new(
                        ReqwestTransport::new()
                            .map_err(|e| GatewayError::Config(format!("outbound HTTP client: {e}")))?,
                    ),
                };
                Some(AuthServices::from_config(auth_config.clone(), transport)?)
            }
            None => None,
        };

        let mut rpc_builder = RpcServer::builder();
        if let Some(auth) = &auth {
            rpc_builder = rpc_builder.authentication(
                Arc::clone(&auth.verifier),
                auth.config.grpc_authorization_header.clone(),
                auth.config.verify_timeout(),
            );
        }
        let rpc = registry.register_rpc(rpc_builder).build()?;
        let interceptors = rpc.chain().names();
        let services = rpc.service_names().to_vec();
        let rpc_service = rpc.into_service();

        let auth_state = auth.map(|services| AuthState::new(services, secure));
        let bindings = registry.register_rest(builtin_bindings(auth_state.as_ref())?)?;

        let http_listener = bind_listener(config.http_address).await?;
        let http_addr = http_listener.local_addr()?;
        let grpc_listener = if secure {
            None
        } else {
            Some(bind_listener(config.grpc_address).await?)
        };
        let grpc_addr = grpc_listener.as_ref().map(TcpListener::local_addr).transpose()?;

        let channel: RpcChannel = match grpc_addr {
            Some(addr) => remote_channel(lazy_channel(addr)?),
            None => in_process_channel(rpc_service.clone()),
        };
        let forwarding = Arc::new(match &auth_state {
            Some(state) => CredentialForwarding::with_session_cookie(state.cookies.session_name()),
            None => CredentialForwarding::header_only(),
        });
        let router = http_router(auth_state, bindings, channel, forwarding, &config.security.allowed_origins)?;

        let (http_entry, rpc_entry) = if secure {
            let routed = ProtocolRouter::new(rpc_http_service(rpc_service), http_service(router));
            (BoxCloneSyncService::new(routed), None)
        } else {
            (http_service(router), Some(rpc_http_service(rpc_service)))
        };

        info!(
            http = %http_addr,
            rpc = ?grpc_addr,
            secure,
            interceptors = ?interceptors,
            services = ?services,
            "Gateway bound"
        );

        Ok(Gateway {
            http_listener,
            grpc_listener,
            tls,
            http_service: http_entry,
            rpc_service: rpc_entry,
            interceptors,
            http_addr,
            grpc_addr,
        })
    }
}

/// A bound gateway, ready to serve
pub struct Gateway {
    http_listener: TcpListener,
    grpc_listener: Option<TcpListener>,
    tls: Option<TlsAcceptor>,
    http_service: BoxHttpService,
    rpc_service: Option<BoxHttpService>,
    interceptors: Vec<&'static str>,
    http_addr: SocketAddr,
    grpc_addr: Option<SocketAddr>,
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("http_addr", &self.http_addr)
            .field("grpc_addr", &self.grpc_addr)
            .field("secure", &self.tls.is_some())
            .field("interceptors", &self.interceptors)
            .finish_non_exhaustive()
    }
}

impl Gateway {
    /// Start building a gateway for `config`
    pub fn builder(config: ServerConfig) -> GatewayBuilder {
        GatewayBuilder {
            config,
            transport: None,
            registry: Arc::new(NoServices),
        }
    }

    /// Bound HTTP address; the only address in secure mode
    pub fn http_addr(&self) -> SocketAddr {
        self.http_addr
    }

    /// Bound RPC address in insecure mode
    pub fn grpc_addr(&self) -> Option<SocketAddr> {
        self.grpc_addr
    }

    /// Interceptor names in execution order
    pub fn interceptors(&self) -> &[&'static str] {
        &self.interceptors
    }

    /// Serve until Ctrl+C or SIGTERM
    ///
    /// # Errors
    ///
    /// Returns an error if a listener task fails.
    pub async fn serve(self) -> GatewayResult<()> {
        self.serve_with_shutdown(shutdown_signal()).await
    }

    /// Serve until `signal` resolves, then drain open connections
    ///
    /// # Errors
    ///
    /// Returns an error if a listener task fails.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> GatewayResult<()>
    where
        F: std::future::Future<Output = ()> + Send,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut listeners = JoinSet::new();

        listeners.spawn(serve_listener(
            self.http_listener,
            self.tls,
            self.http_service,
            shutdown_rx.clone(),
            "http",
        ));
        if let (Some(listener), Some(service)) = (self.grpc_listener, self.rpc_service) {
            listeners.spawn(serve_listener(listener, None, service, shutdown_rx, "rpc"));
        }

        let result = tokio::select! {
            () = signal => {
                info!("Shutdown signal received");
                Ok(())
            }
            Some(joined) = listeners.join_next() => {
                joined.map_err(|e| GatewayError::Io(std::io::Error::other(e)))
            }
        };

        let _ = shutdown_tx.send(true);
        while let Some(joined) = listeners.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "Listener task failed during shutdown");
            }
        }
        info!("Gateway stopped");
        result
    }
}

fn builtin_bindings(auth: Option<&AuthState>) -> GatewayResult<RestBindings> {
    let mut bindings = RestBindings::new();
    for path in RESERVED_ROUTES {
        bindings.reserve(path);
    }
    if let Some(auth) = auth {
        bindings.reserve(&auth.callback_route());
    }
    bindings.unary::<UserInfoRequest, UserInfoResponse>(Method::GET, IDENTITY_REST_PATH, USER_INFO_PATH)
}

fn http_router(
    auth: Option<AuthState>,
    bindings: RestBindings,
    channel: RpcChannel,
    forwarding: Arc<CredentialForwarding>,
    allowed_origins: &[String],
) -> GatewayResult<Router> {
    let mut router = Router::new()
        .route("/healthcheck", get(handlers::healthcheck))
        .route("/api/v1/openapi", get(handlers::openapi));

    let rest = bindings.into_router(channel, forwarding);
    router = match auth {
        Some(state) => {
            let sessioned = handlers::session_routes(state.clone())
                .merge(rest)
                .layer(axum::middleware::from_fn_with_state(state.clone(), session_middleware));
            router.merge(sessioned).merge(handlers::public_routes(state))
        }
        None => router.merge(rest),
    };

    Ok(router.layer(TraceLayer::new_for_http()).layer(cors_layer(allowed_origins)?))
}

/// CORS policy; answers preflight requests before routing
fn cors_layer(allowed_origins: &[String]) -> GatewayResult<CorsLayer> {
    if allowed_origins.is_empty() {
        return Ok(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any));
    }

    let origins = allowed_origins
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin)
                .map_err(|e| GatewayError::Config(format!("invalid allowed origin '{origin}': {e}")))
        })
        .collect::<GatewayResult<Vec<_>>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(AllowMethods::list([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ]))
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true))
}

async fn bind_listener(address: SocketAddr) -> GatewayResult<TcpListener> {
    TcpListener::bind(address)
        .await
        .map_err(|source| GatewayError::Bind { address, source })
}

/// Channel to the local RPC listener, connected on first use
fn lazy_channel(addr: SocketAddr) -> GatewayResult<Channel> {
    let ip = match addr.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
        IpAddr::V6(ip) if ip.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
        ip => ip,
    };
    let uri = format!("http://{}", SocketAddr::new(ip, addr.port()));
    let endpoint = Channel::from_shared(uri.clone())
        .map_err(|e| GatewayError::Config(format!("invalid RPC endpoint '{uri}': {e}")))?;
    Ok(endpoint.connect_lazy())
}

async fn serve_listener(
    listener: TcpListener,
    tls: Option<TlsAcceptor>,
    service: BoxHttpService,
    mut shutdown: watch::Receiver<bool>,
    name: &'static str,
) {
    let mut connections = JoinSet::new();
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    connections.spawn(serve_connection(
                        stream,
                        peer,
                        tls.clone(),
                        service.clone(),
                        shutdown.clone(),
                    ));
                }
                Err(e) => warn!(listener = name, error = %e, "Accept failed"),
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }

    debug!(listener = name, open = connections.len(), "Draining connections");
    let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
        while connections.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        warn!(listener = name, open = connections.len(), "Aborting connections after grace period");
        connections.abort_all();
    }
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    tls: Option<TlsAcceptor>,
    service: BoxHttpService,
    shutdown: watch::Receiver<bool>,
) {
    let _ = stream.set_nodelay(true);
    let Some(acceptor) = tls else {
        drive_connection(stream, peer, service, shutdown).await;
        return;
    };

    match tokio::time::timeout(TLS_HANDSHAKE_TIMEOUT, acceptor.accept(stream)).await {
        Ok(Ok(tls_stream)) => drive_connection(tls_stream, peer, service, shutdown).await,
        Ok(Err(e)) => debug!(peer = %peer, error = %e, "TLS handshake failed"),
        Err(_) => debug!(peer = %peer, "TLS handshake timed out"),
    }
}

async fn drive_connection<I>(io: I, peer: SocketAddr, service: BoxHttpService, mut shutdown: watch::Receiver<bool>)
where
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let service = service.map_request(|request: Request<Incoming>| request.map(Body::new));
    let builder = auto::Builder::new(TokioExecutor::new());
    let connection = builder.serve_connection(TokioIo::new(io), TowerToHyperService::new(service));
    tokio::pin!(connection);

    let result = tokio::select! {
        result = connection.as_mut() => result,
        _ = shutdown.changed() => {
            connection.as_mut().graceful_shutdown();
            connection.await
        }
    };
    if let Err(e) = result {
        debug!(peer = %peer, error = %e, "Connection closed with error");
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
