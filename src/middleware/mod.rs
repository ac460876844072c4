//! HTTP middleware for sessions, access control, rate limiting, and timing.
//!
//! # Architecture
//!
//! ```text
//! Request → Trace → Request ID → Timing → Session → Rate Limiter → Authorize → Handler
//!                                  ↓         ↓            ↓              ↓
//!                             log + perf  extensions  429 Too Many   303 login / 403
//! ```
//!
//! - **Timing**: wall-clock duration per request, slow-request warnings
//! - **Session**: resolves the session cookie; never rejects
//! - **Rate Limiting**: per-client-IP token bucket with idle sweep
//! - **Authorize**: per route group; redirect when anonymous, 403 on wrong role
//! - **Login throttle**: governor-backed brute-force guard used by the login handler
//!
//! # Security Considerations
//!
//! - Session tokens are only read from the `HttpOnly` cookie, never from URLs
//! - Proxy headers are ignored for client identity unless explicitly trusted
//! - Credential comparison is constant-time (see `services::credentials`)

pub mod authorize;
pub mod ip;
pub mod login_throttle;
pub mod rate_limit;
pub mod session;
pub mod timing;

pub use authorize::AuthorizeLayer;
pub use ip::{ClientIp, ClientIpSource, UNKNOWN_IP};
pub use login_throttle::LoginThrottle;
pub use rate_limit::{RateLimitError, RateLimitLayer, RateLimiter};
pub use session::{CurrentSession, LoginPath, SessionLayer};
pub use timing::{RequestClass, TimingLayer, classify};
