//! Admiral RPC layer
//!
//! The RPC side of the Admiral control plane front end, built on
//! [tonic](https://github.com/hyperium/tonic).
//!
//! # Features
//!
//! - **Interceptor chain**: ordered per-call stages (metrics, credential
//!   header lifting, authentication, logging) applied as a tower layer
//! - **Identity service**: `admiral.identity.v1.IdentityService/UserInfo`
//!   returns the caller's verified identity
//! - **Server builder**: [`RpcServer`] assembles registered services behind
//!   the chain for the gateway to serve
//!
//! # Quick Start
//!
//! ```ignore
//! use admiral_grpc::RpcServer;
//!
//! let server = RpcServer::builder()
//!     .authentication(services.verifier.clone(), "admiral-authorization", timeout)
//!     .add_service(MyServiceServer::new(my_impl))
//!     .build()?;
//!
//! assert_eq!(server.chain().names(), ["metrics", "custom_metadata", "authentication", "logging"]);
//! let service = server.into_service();
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod identity;
pub mod interceptor;
pub mod proto;
pub mod server;

pub use error::{GrpcError, GrpcResult, status_from_auth_error};
pub use identity::{CallerIdentityService, IdentityService, IdentityServiceClient, IdentityServiceServer};
pub use interceptor::{CallContext, CallInterceptor, InterceptorChain};
pub use server::{RpcServer, RpcServerBuilder, RpcService};
