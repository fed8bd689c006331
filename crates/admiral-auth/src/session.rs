//! Signed session cookies
//!
//! Session tokens are stored client-side as HS256 compact JWS values. The
//! server keeps no session table: a cookie is trusted only if its signature
//! verifies under the configured key, its key id names the expected payload,
//! and its `exp` has not passed. The same codec also signs the short-lived
//! login-state cookie that carries the CSRF `state` and PKCE verifier between
//! `/login` and `/callback`; the two payloads use distinct key ids so one can
//! never be replayed as the other.

use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, decode_header, encode};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::debug;

use crate::config::{CookieConfig, MIN_SIGNING_KEY_LEN};
use crate::error::{AuthError, AuthResult};
use crate::types::SessionToken;

/// Key id stamped on session cookies
pub const SESSION_KEY_ID: &str = "admiral-session";

/// Key id stamped on login-state cookies
pub const LOGIN_STATE_KEY_ID: &str = "admiral-login";

/// Lifetime of a login-state cookie
pub const LOGIN_STATE_TTL: Duration = Duration::from_secs(10 * 60);

/// State carried from `/login` to `/callback`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginState {
    /// CSRF `state` sent to the identity provider
    pub state: String,
    /// PKCE code verifier matching the challenge sent to the identity provider
    pub pkce_verifier: String,
    /// Where to send the browser once the session is established
    pub redirect_url: String,
}

#[derive(Serialize, Deserialize)]
struct Envelope<T> {
    iat: i64,
    exp: i64,
    #[serde(rename = "dat")]
    payload: T,
}

/// Encodes and verifies signed cookie payloads
#[derive(Clone)]
pub struct SessionCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
}

impl std::fmt::Debug for SessionCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCodec")
            .field("keys", &"<redacted>")
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl SessionCodec {
    /// Create a codec from a raw signing key and session lifetime
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::ConfigurationInvalid`] if the key is shorter than
    /// 32 bytes or the lifetime is zero.
    pub fn new(signing_key: &[u8], ttl: Duration) -> AuthResult<Self> {
        if signing_key.len() < MIN_SIGNING_KEY_LEN {
            return Err(AuthError::config(format!(
                "session signing key must be at least {MIN_SIGNING_KEY_LEN} bytes"
            )));
        }
        if ttl.is_zero() {
            return Err(AuthError::config("session TTL must be positive"));
        }
        Ok(Self {
            encoding_key: EncodingKey::from_secret(signing_key),
            decoding_key: DecodingKey::from_secret(signing_key),
            ttl,
        })
    }

    /// Create a codec from cookie configuration
    ///
    /// # Errors
    ///
    /// See [`SessionCodec::new`].
    pub fn from_config(config: &CookieConfig) -> AuthResult<Self> {
        Self::new(config.signing_key.expose_secret().as_bytes(), config.ttl())
    }

    /// Session lifetime
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Sign a session token; the cookie expires one TTL from now
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::ConfigurationInvalid`] if signing fails.
    pub fn encode(&self, token: &SessionToken) -> AuthResult<String> {
        self.encode_at(token, Utc::now())
    }

    pub(crate) fn encode_at(&self, token: &SessionToken, issued_at: DateTime<Utc>) -> AuthResult<String> {
        self.seal(SESSION_KEY_ID, token, issued_at, self.ttl)
    }

    /// Verify and decode a session cookie value
    ///
    /// # Errors
    ///
    /// - [`AuthError::SessionExpired`] when the signature is valid but the TTL elapsed
    /// - [`AuthError::SessionInvalid`] for any signature, structure or key id failure
    pub fn decode(&self, value: &str) -> AuthResult<SessionToken> {
        self.open(SESSION_KEY_ID, value)
    }

    /// Sign a login-state payload with a fixed short lifetime
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::ConfigurationInvalid`] if signing fails.
    pub fn encode_login_state(&self, state: &LoginState) -> AuthResult<String> {
        self.seal(LOGIN_STATE_KEY_ID, state, Utc::now(), LOGIN_STATE_TTL)
    }

    /// Verify and decode a login-state cookie value
    ///
    /// # Errors
    ///
    /// Same as [`SessionCodec::decode`].
    pub fn decode_login_state(&self, value: &str) -> AuthResult<LoginState> {
        self.open(LOGIN_STATE_KEY_ID, value)
    }

    fn seal<T: Serialize>(
        &self,
        key_id: &str,
        payload: &T,
        issued_at: DateTime<Utc>,
        ttl: Duration,
    ) -> AuthResult<String> {
        let iat = issued_at.timestamp();
        let envelope = Envelope {
            iat,
            exp: iat.saturating_add(i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX)),
            payload,
        };

        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some(key_id.to_string());

        encode(&header, &envelope, &self.encoding_key)
            .map_err(|e| AuthError::config(format!("failed to sign cookie: {e}")))
    }

    fn open<T: DeserializeOwned>(&self, key_id: &str, value: &str) -> AuthResult<T> {
        let header = decode_header(value).map_err(|_| AuthError::SessionInvalid)?;
        if header.alg != Algorithm::HS256 || header.kid.as_deref() != Some(key_id) {
            debug!(expected_kid = key_id, "Rejected cookie with unexpected header");
            return Err(AuthError::SessionInvalid);
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp"]);

        match decode::<Envelope<T>>(value, &self.decoding_key, &validation) {
            Ok(data) => Ok(data.claims.payload),
            Err(e) if matches!(e.kind(), ErrorKind::ExpiredSignature) => Err(AuthError::SessionExpired),
            Err(e) => {
                debug!(error = %e, "Rejected cookie");
                Err(AuthError::SessionInvalid)
            }
        }
    }
}

/// Whether `value` carries the session key id, without verifying it
///
/// Used to route bearer credentials to the right verifier.
pub fn is_session_token(value: &str) -> bool {
    decode_header(value)
        .map(|header| header.kid.as_deref() == Some(SESSION_KEY_ID))
        .unwrap_or(false)
}
