//! Sessions: tokens, the in-memory store, roles and impersonation.

pub mod cookie;
pub mod model;
pub mod store;
pub mod token;

pub use cookie::SessionCookie;
pub use model::{RealIdentity, Role, Session, UnknownRole};
pub use store::{SESSION_TTL_SECS, SessionStore};
pub use token::SessionToken;

/// Errors surfaced by session creation.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("missing required session field: {0}")]
    MissingField(&'static str),

    #[error("secure random source unavailable: {0}")]
    TokenGeneration(String),
}
