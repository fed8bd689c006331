//! Per-call interceptor chain
//!
//! Every RPC passes through an ordered [`InterceptorChain`] before its
//! handler runs. Each [`CallInterceptor`] sees the call's metadata and
//! extensions through a [`CallContext`]; any of them may deny the call by
//! returning a [`Status`], in which case later interceptors and the handler
//! never run.
//!
//! The server installs, in order:
//!
//! | name              | interceptor                          | auth disabled |
//! |-------------------|--------------------------------------|---------------|
//! | `metrics`         | [`MetricsInterceptor`]               | installed     |
//! | `custom_metadata` | [`MetadataEnrichmentInterceptor`]    | omitted       |
//! | `authentication`  | [`AuthenticationInterceptor`]        | omitted       |
//! | `logging`         | [`LoggingInterceptor`]               | installed     |

mod auth;
mod chain;
mod layer;
mod logging;
mod metadata;
mod metrics;

use std::time::Instant;

use async_trait::async_trait;
use tonic::{Code, Status};

pub use auth::AuthenticationInterceptor;
pub use chain::InterceptorChain;
pub use layer::{InterceptedService, InterceptorLayer};
pub use logging::LoggingInterceptor;
pub use metadata::MetadataEnrichmentInterceptor;
pub use metrics::{MetricsInterceptor, UNKNOWN_METHOD, init_rpc_metrics};

/// What an interceptor sees of a call
#[derive(Debug)]
pub struct CallContext {
    /// Full method path, e.g. `/admiral.identity.v1.IdentityService/UserInfo`
    pub method: String,
    /// Request metadata
    pub headers: http::HeaderMap,
    /// Request extensions, forwarded to the handler
    pub extensions: http::Extensions,
    /// When the call entered the chain
    pub started: Instant,
}

impl CallContext {
    /// Create a context for `method`
    pub fn new(method: impl Into<String>, headers: http::HeaderMap, extensions: http::Extensions) -> Self {
        Self {
            method: method.into(),
            headers,
            extensions,
            started: Instant::now(),
        }
    }

    /// Last path segment of the method, e.g. `UserInfo`
    pub fn method_name(&self) -> &str {
        self.method.rsplit('/').next().unwrap_or(&self.method)
    }
}

/// A single stage of the chain
#[async_trait]
pub trait CallInterceptor: Send + Sync + 'static {
    /// Stable name used in the chain listing and logs
    fn name(&self) -> &'static str;

    /// Inspect or modify the call before the handler runs
    ///
    /// # Errors
    ///
    /// Returning a status denies the call with that status.
    async fn on_request(&self, ctx: &mut CallContext) -> Result<(), Status> {
        let _ = ctx;
        Ok(())
    }

    /// Observe how the call finished
    ///
    /// Called in reverse order for every interceptor whose `on_request` ran.
    fn on_response(&self, ctx: &CallContext, code: Code) {
        let _ = (ctx, code);
    }
}
