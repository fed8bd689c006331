//! JWKS (JSON Web Key Set) fetching and caching
//!
//! Keys are cached for a TTL (10 minutes by default). A token signed with an
//! unknown key id triggers one forced refresh, rate limited so a stream of
//! bogus tokens cannot hammer the authorization server.

use std::sync::Arc;
use std::time::{Duration, Instant};

use jsonwebtoken::jwk::{Jwk, JwkSet};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

use crate::discovery::DocumentFetcher;
use crate::error::AuthResult;
use crate::oauth2::http_client::HttpTransport;

/// Default JWKS cache lifetime
pub const DEFAULT_JWKS_CACHE_TTL: Duration = Duration::from_secs(600);

/// Minimum interval between forced refreshes
pub const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(5);

/// JWKS client for fetching and caching a key set
#[derive(Debug, Clone)]
pub struct JwksClient {
    fetcher: DocumentFetcher<JwkSet>,
    last_forced_refresh: Arc<RwLock<Option<Instant>>>,
}

impl JwksClient {
    /// Create a client with a cache TTL
    pub fn new(jwks_uri: Url, transport: Arc<dyn HttpTransport>, cache_ttl: Duration) -> Self {
        Self {
            fetcher: DocumentFetcher::new(jwks_uri, transport, cache_ttl),
            last_forced_refresh: Arc::new(RwLock::new(None)),
        }
    }

    /// JWKS endpoint URL
    pub fn jwks_uri(&self) -> &Url {
        self.fetcher.url()
    }

    /// Get the key set, from cache when fresh
    ///
    /// # Errors
    ///
    /// Returns upstream errors from the JWKS endpoint.
    pub async fn get_jwks(&self) -> AuthResult<JwkSet> {
        self.fetcher.fetch().await
    }

    /// Find a signing key, refreshing once if `kid` is not in the cached set
    ///
    /// With no `kid`, a set containing exactly one key yields that key.
    ///
    /// # Errors
    ///
    /// Returns upstream errors from the JWKS endpoint.
    pub async fn find_key(&self, kid: Option<&str>) -> AuthResult<Option<Jwk>> {
        let jwks = self.get_jwks().await?;
        if let Some(key) = select_key(&jwks, kid) {
            return Ok(Some(key));
        }

        {
            let last = self.last_forced_refresh.read().await;
            if let Some(at) = *last
                && at.elapsed() < MIN_REFRESH_INTERVAL
            {
                warn!(jwks_uri = %self.jwks_uri(), "JWKS refresh rate limited, using cache");
                return Ok(None);
            }
        }
        *self.last_forced_refresh.write().await = Some(Instant::now());

        info!(jwks_uri = %self.jwks_uri(), kid = ?kid, "Unknown key id, refreshing JWKS");
        let jwks = self.fetcher.refresh().await?;
        debug!(key_count = jwks.keys.len(), "Refreshed JWKS");
        Ok(select_key(&jwks, kid))
    }
}

fn select_key(jwks: &JwkSet, kid: Option<&str>) -> Option<Jwk> {
    match kid {
        Some(kid) => jwks.find(kid).cloned(),
        None if jwks.keys.len() == 1 => jwks.keys.first().cloned(),
        None => None,
    }
}
