//! Session and login-state cookies
//!
//! Both cookies are `HttpOnly` with `Path=/`. The session cookie lives for the
//! configured session TTL, the login-state cookie for the ten minute login
//! window. `Secure` is set when configured and always in secure mode.

use std::time::Duration;

use admiral_auth::{CookieConfig, SameSite};
use admiral_auth::session::LOGIN_STATE_TTL;
use http::header::{COOKIE, SET_COOKIE};
use http::{HeaderMap, HeaderValue};

/// Naming and attributes for the cookies this server sets
#[derive(Debug, Clone)]
pub struct CookiePolicy {
    session_name: String,
    login_name: String,
    same_site: SameSite,
    secure: bool,
    session_ttl: Duration,
}

impl CookiePolicy {
    /// Policy from the cookie settings; `force_secure` is set in secure mode
    pub fn new(config: &CookieConfig, force_secure: bool) -> Self {
        Self {
            session_name: config.name.clone(),
            login_name: config.login_cookie_name(),
            same_site: config.same_site,
            secure: config.secure || force_secure,
            session_ttl: config.ttl(),
        }
    }

    /// Name of the session cookie
    pub fn session_name(&self) -> &str {
        &self.session_name
    }

    /// Name of the login-state cookie
    pub fn login_name(&self) -> &str {
        &self.login_name
    }

    /// `Set-Cookie` value storing an encoded session
    pub fn session_cookie(&self, value: &str) -> Option<HeaderValue> {
        self.build(&self.session_name, value, self.session_ttl.as_secs())
    }

    /// `Set-Cookie` value storing encoded login state
    pub fn login_cookie(&self, value: &str) -> Option<HeaderValue> {
        self.build(&self.login_name, value, LOGIN_STATE_TTL.as_secs())
    }

    /// `Set-Cookie` value deleting the session cookie
    pub fn clear_session(&self) -> Option<HeaderValue> {
        self.build(&self.session_name, "", 0)
    }

    /// `Set-Cookie` value deleting the login-state cookie
    pub fn clear_login(&self) -> Option<HeaderValue> {
        self.build(&self.login_name, "", 0)
    }

    fn build(&self, name: &str, value: &str, max_age: u64) -> Option<HeaderValue> {
        let mut cookie = format!(
            "{name}={value}; Path=/; Max-Age={max_age}; HttpOnly; SameSite={}",
            self.same_site.as_str()
        );
        if self.secure {
            cookie.push_str("; Secure");
        }
        HeaderValue::from_str(&cookie).ok()
    }
}

/// Value of cookie `name` from the request's `Cookie` headers
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .find_map(|pair| {
            let (key, value) = pair.trim().split_once('=')?;
            (key == name && !value.is_empty()).then(|| value.to_string())
        })
}

/// Rewrite the request's `Cookie` headers, replacing or removing cookie `name`
///
/// Used after a transparent refresh so downstream handlers and the
/// transcoder see the new session.
pub fn replace_request_cookie(headers: &mut HeaderMap, name: &str, value: Option<&str>) {
    let mut pairs: Vec<String> = headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .map(str::trim)
        .filter(|pair| !pair.is_empty() && pair.split_once('=').is_none_or(|(key, _)| key != name))
        .map(str::to_string)
        .collect();
    if let Some(value) = value {
        pairs.push(format!("{name}={value}"));
    }

    headers.remove(COOKIE);
    if !pairs.is_empty()
        && let Ok(value) = HeaderValue::from_str(&pairs.join("; "))
    {
        headers.insert(COOKIE, value);
    }
}

/// Append a `Set-Cookie` header if one was built
pub fn append_set_cookie(headers: &mut HeaderMap, cookie: Option<HeaderValue>) {
    if let Some(cookie) = cookie {
        headers.append(SET_COOKIE, cookie);
    }
}
