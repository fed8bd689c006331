use std::sync::Arc;

use tonic::{Code, Status};

use super::{CallContext, CallInterceptor};

/// Ordered list of interceptors
#[derive(Clone, Default)]
pub struct InterceptorChain {
    interceptors: Vec<Arc<dyn CallInterceptor>>,
}

impl std::fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl InterceptorChain {
    /// Create an empty chain
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an interceptor
    #[must_use]
    pub fn with(mut self, interceptor: impl CallInterceptor) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    /// Interceptor names in execution order
    pub fn names(&self) -> Vec<&'static str> {
        self.interceptors.iter().map(|i| i.name()).collect()
    }

    /// Number of installed interceptors
    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    /// Whether the chain is empty
    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    /// Run `on_request` in order, stopping at the first denial
    ///
    /// Returns how many interceptors ran, including a denying one, so that
    /// [`Self::finish`] reports to exactly those.
    pub(crate) async fn run(&self, ctx: &mut CallContext) -> (usize, Result<(), Status>) {
        for (index, interceptor) in self.interceptors.iter().enumerate() {
            if let Err(status) = interceptor.on_request(ctx).await {
                return (index + 1, Err(status));
            }
        }
        (self.interceptors.len(), Ok(()))
    }

    /// Run `on_response` in reverse for the first `ran` interceptors
    pub(crate) fn finish(&self, ctx: &CallContext, ran: usize, code: Code) {
        for interceptor in self.interceptors[..ran].iter().rev() {
            interceptor.on_response(ctx, code);
        }
    }
}
