//! Admiral gateway
//!
//! The network front end of the Admiral control plane: one gateway serving
//! native RPC clients and browsers. It owns the OAuth2 browser login flow,
//! publishes authorization server discovery documents, transcodes JSON/REST
//! calls onto RPC methods, and in secure mode shares a single TLS port
//! between both protocols.
//!
//! # Modules
//!
//! - [`config`] - file and environment configuration
//! - [`server`] - startup, listeners and connection serving
//! - [`router`] - protocol classification on the shared port
//! - [`handlers`] - `/login`, `/callback`, `/me` and discovery routes
//! - [`refresh`] - session cookie decoding and transparent refresh
//! - [`transcode`] - REST to RPC bindings
//! - [`cookies`] - session and login-state cookie attributes
//! - [`tls`] - certificate loading
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use admiral_gateway::{Gateway, ServerConfig};
//!
//! # async fn example() -> Result<(), admiral_gateway::GatewayError> {
//! let config = ServerConfig::from_file("admiral.toml")?;
//! let gateway = Gateway::builder(config).bind().await?;
//! println!("serving HTTP on {}", gateway.http_addr());
//! gateway.serve().await
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod cookies;
pub mod error;
pub mod handlers;
mod logging;
pub mod refresh;
pub mod router;
pub mod server;
pub mod tls;
pub mod transcode;

pub use config::{LogFormat, LoggingConfig, SecurityConfig, ServerConfig, TlsFiles};
pub use error::{ApiError, GatewayError, GatewayResult};
pub use router::{Protocol, ProtocolRouter};
pub use server::{Gateway, GatewayBuilder, IDENTITY_REST_PATH, ServiceRegistry};
pub use transcode::{ChannelError, CredentialForwarding, RestBindings, RpcChannel};
