use async_trait::async_trait;
use http::{HeaderName, HeaderValue, header::AUTHORIZATION};
use tonic::Status;
use tracing::debug;

use super::{CallContext, CallInterceptor};

/// Lifts the native-client credential header into `authorization`
///
/// Native clients present their token under a configurable metadata key
/// (`admiral-authorization` by default). When the call carries no
/// `authorization` header, the value is copied over, with a `Bearer ` scheme
/// prefixed if it has none. An existing `authorization` header always wins.
#[derive(Debug, Clone)]
pub struct MetadataEnrichmentInterceptor {
    source: HeaderName,
}

impl MetadataEnrichmentInterceptor {
    /// Copy from the `source` metadata key
    ///
    /// # Errors
    ///
    /// Returns an error if `source` is not a valid header name.
    pub fn new(source: &str) -> Result<Self, http::header::InvalidHeaderName> {
        Ok(Self {
            source: HeaderName::from_bytes(source.to_ascii_lowercase().as_bytes())?,
        })
    }
}

#[async_trait]
impl CallInterceptor for MetadataEnrichmentInterceptor {
    fn name(&self) -> &'static str {
        "custom_metadata"
    }

    async fn on_request(&self, ctx: &mut CallContext) -> Result<(), Status> {
        if ctx.headers.contains_key(AUTHORIZATION) {
            return Ok(());
        }
        let Some(value) = ctx.headers.get(&self.source) else {
            return Ok(());
        };

        let raw = value.to_str().unwrap_or_default().trim();
        if raw.is_empty() {
            return Ok(());
        }
        let bearer = if has_bearer_scheme(raw) {
            raw.to_string()
        } else {
            format!("Bearer {raw}")
        };

        if let Ok(value) = HeaderValue::from_str(&bearer) {
            debug!(method = %ctx.method, source = %self.source, "Lifted credential header");
            ctx.headers.insert(AUTHORIZATION, value);
        }
        Ok(())
    }
}

fn has_bearer_scheme(value: &str) -> bool {
    value.len() > 7 && value[..7].eq_ignore_ascii_case("bearer ")
}
