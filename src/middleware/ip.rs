//! Client IP extraction for per-client rate limiting and login throttling.
//!
//! # Sources, in order
//!
//! 1. `X-Forwarded-For` (first entry) and then `X-Real-IP`, **only** when
//!    proxy headers are trusted
//! 2. The TCP peer address from Axum's `ConnectInfo<SocketAddr>`
//! 3. [`UNKNOWN_IP`]
//!
//! # Security Warning: IP Spoofing Risk
//!
//! Proxy headers are client-controlled unless a reverse proxy overwrites them.
//! Enable `TRUST_PROXY_HEADERS` only when the service is reachable solely
//! through such a proxy; otherwise a client can rotate spoofed addresses to
//! dodge its bucket or drain someone else's.
//!
//! All requests without an identifiable address share the `"unknown"` key
//! and therefore one bucket.

use std::borrow::Cow;
use std::convert::Infallible;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRef, FromRequestParts};
use axum::http::request::Parts;
use axum::http::{Extensions, HeaderMap, Request};
use tracing::trace;

/// Fallback key when no client IP can be determined.
pub const UNKNOWN_IP: &str = "unknown";

/// How the client address of a request is determined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientIpSource {
    trust_proxy_headers: bool,
}

impl ClientIpSource {
    /// Use only the TCP peer address.
    pub fn peer_only() -> Self {
        Self {
            trust_proxy_headers: false,
        }
    }

    /// Prefer proxy headers, falling back to the TCP peer address.
    pub fn behind_proxy() -> Self {
        Self {
            trust_proxy_headers: true,
        }
    }

    pub fn new(trust_proxy_headers: bool) -> Self {
        Self {
            trust_proxy_headers,
        }
    }

    /// Extract the client IP for `req`.
    ///
    /// Returns `Cow::Borrowed` for the shared `"unknown"` key so the common
    /// fallback does not allocate.
    pub fn client_ip<B>(&self, req: &Request<B>) -> Cow<'static, str> {
        self.resolve(req.headers(), req.extensions())
    }

    fn resolve(&self, headers: &HeaderMap, extensions: &Extensions) -> Cow<'static, str> {
        if self.trust_proxy_headers
            && let Some(ip) = ip_from_proxy_headers(headers)
        {
            trace!(client_ip = %ip, "Client IP from proxy header");
            return Cow::Owned(ip.to_string());
        }

        match extensions.get::<ConnectInfo<SocketAddr>>() {
            Some(ConnectInfo(addr)) => Cow::Owned(addr.ip().to_string()),
            None => Cow::Borrowed(UNKNOWN_IP),
        }
    }
}

/// First non-empty address from `X-Forwarded-For`, else `X-Real-IP`.
fn ip_from_proxy_headers(headers: &HeaderMap) -> Option<&str> {
    // Format: "client, proxy1, proxy2" - we want the first (client) IP
    if let Some(forwarded) = headers.get("x-forwarded-for")
        && let Ok(value) = forwarded.to_str()
        && let Some(first) = value.split(',').next().map(str::trim)
        && !first.is_empty()
    {
        return Some(first);
    }

    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Client IP of the current request, for handlers.
///
/// Resolved with the [`ClientIpSource`] held in the router state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIp(pub String);

impl<S> FromRequestParts<S> for ClientIp
where
    ClientIpSource: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let source = ClientIpSource::from_ref(state);
        Ok(Self(source.resolve(&parts.headers, &parts.extensions).into_owned()))
    }
}
