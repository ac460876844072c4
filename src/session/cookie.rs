//! Session cookie contract.
//!
//! The cookie is `HttpOnly; SameSite=Strict; Path=/; Max-Age=86400`, with an
//! optional `Secure` flag for HTTPS deployments. Clearing re-issues the same
//! cookie with an empty value and `Max-Age=-1`.

use axum::http::HeaderMap;
use axum::http::header::COOKIE;
use axum_extra::extract::cookie::{Cookie, SameSite};

use super::store::SESSION_TTL_SECS;
use super::token::SessionToken;

/// Default cookie name.
pub const DEFAULT_COOKIE_NAME: &str = "session";

/// `Max-Age` used to make the browser drop the cookie immediately.
const EXPIRE_NOW: time::Duration = time::Duration::seconds(-1);

/// Name and flags of the session cookie for one deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookie {
    name: String,
    secure: bool,
}

impl Default for SessionCookie {
    fn default() -> Self {
        Self::new(DEFAULT_COOKIE_NAME, false)
    }
}

impl SessionCookie {
    pub fn new(name: impl Into<String>, secure: bool) -> Self {
        Self {
            name: name.into(),
            secure,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Cookie binding the browser to `token`.
    pub fn issue(&self, token: &SessionToken) -> Cookie<'static> {
        self.build(
            token.as_str().to_string(),
            time::Duration::seconds(SESSION_TTL_SECS),
        )
    }

    /// Cookie that makes the browser drop the session.
    pub fn clear(&self) -> Cookie<'static> {
        self.build(String::new(), EXPIRE_NOW)
    }

    fn build(&self, value: String, max_age: time::Duration) -> Cookie<'static> {
        Cookie::build((self.name.clone(), value))
            .http_only(true)
            .same_site(SameSite::Strict)
            .secure(self.secure)
            .path("/")
            .max_age(max_age)
            .build()
    }

    /// Find the session token among the request's `Cookie` headers.
    ///
    /// Every pair carrying the cookie name is considered; the first one whose
    /// value is a well-formed token wins. Returns `None` when there is none.
    pub fn read_token(&self, headers: &HeaderMap) -> Option<SessionToken> {
        headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| Cookie::split_parse(value))
            .filter_map(Result::ok)
            .filter(|cookie| cookie.name() == self.name)
            .find_map(|cookie| SessionToken::parse(cookie.value_trimmed()))
    }
}
