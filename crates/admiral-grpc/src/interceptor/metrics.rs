//! RPC call metrics
//!
//! - `admiral_rpc_requests_total` - calls entering the chain (labels: method)
//! - `admiral_rpc_responses_total` - finished calls (labels: method, code)
//! - `admiral_rpc_duration_seconds` - time from chain entry to completion (labels: method)
//!
//! The method label is the request path only for registered services, and
//! only when the call was not `Unimplemented`; everything else is counted
//! under [`UNKNOWN_METHOD`]. A `metrics` recorder must be installed for these
//! to be exported.

use std::collections::HashSet;
use std::sync::{Arc, Once};

use async_trait::async_trait;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use tonic::{Code, Status};

use super::{CallContext, CallInterceptor};

static INIT: Once = Once::new();

/// Method label for paths outside the registered services
pub const UNKNOWN_METHOD: &str = "unknown";

/// Register metric descriptions; idempotent
pub fn init_rpc_metrics() {
    INIT.call_once(|| {
        describe_counter!("admiral_rpc_requests_total", "Total RPC calls received");
        describe_counter!("admiral_rpc_responses_total", "Total RPC calls finished, by status code");
        describe_histogram!("admiral_rpc_duration_seconds", "RPC call duration in seconds");
    });
}

/// Records call counts and durations
#[derive(Debug, Clone, Default)]
pub struct MetricsInterceptor {
    services: Arc<HashSet<&'static str>>,
}

impl MetricsInterceptor {
    /// Create the interceptor for the named services and register descriptions
    pub fn new(services: impl IntoIterator<Item = &'static str>) -> Self {
        init_rpc_metrics();
        Self {
            services: Arc::new(services.into_iter().collect()),
        }
    }

    /// Bounded label for a request path
    pub fn method_label(&self, path: &str) -> String {
        let service = path.strip_prefix('/').and_then(|p| p.split_once('/')).map(|(s, _)| s);
        match service {
            Some(service) if self.services.contains(service) => path.to_string(),
            _ => UNKNOWN_METHOD.to_string(),
        }
    }
}

#[async_trait]
impl CallInterceptor for MetricsInterceptor {
    fn name(&self) -> &'static str {
        "metrics"
    }

    async fn on_request(&self, ctx: &mut CallContext) -> Result<(), Status> {
        counter!("admiral_rpc_requests_total", "method" => self.method_label(&ctx.method)).increment(1);
        Ok(())
    }

    fn on_response(&self, ctx: &CallContext, code: Code) {
        let method = match code {
            Code::Unimplemented => UNKNOWN_METHOD.to_string(),
            _ => self.method_label(&ctx.method),
        };
        counter!(
            "admiral_rpc_responses_total",
            "method" => method.clone(),
            "code" => format!("{code:?}")
        )
        .increment(1);
        histogram!("admiral_rpc_duration_seconds", "method" => method)
            .record(ctx.started.elapsed().as_secs_f64());
    }
}
