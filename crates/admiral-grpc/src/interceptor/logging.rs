use async_trait::async_trait;
use tonic::{Code, Status};
use tracing::{debug, info, warn};

use super::{CallContext, CallInterceptor};

/// Logs each call and its outcome
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingInterceptor;

impl LoggingInterceptor {
    /// Create the interceptor
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CallInterceptor for LoggingInterceptor {
    fn name(&self) -> &'static str {
        "logging"
    }

    async fn on_request(&self, ctx: &mut CallContext) -> Result<(), Status> {
        debug!(method = %ctx.method, "RPC request");
        Ok(())
    }

    fn on_response(&self, ctx: &CallContext, code: Code) {
        let duration_ms = ctx.started.elapsed().as_millis() as u64;
        match code {
            Code::Ok => info!(method = %ctx.method, duration_ms, "RPC completed"),
            Code::Internal | Code::Unknown | Code::DataLoss => {
                warn!(method = %ctx.method, code = ?code, duration_ms, "RPC failed");
            }
            _ => info!(method = %ctx.method, code = ?code, duration_ms, "RPC completed"),
        }
    }
}
