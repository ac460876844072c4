use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::session::{Role, Session};

/// Login form body (`application/x-www-form-urlencoded`).
#[derive(Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for LoginForm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginForm")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Request to view the system as another role.
#[derive(Debug, Deserialize)]
pub struct ImpersonateRequest {
    /// Target role name, e.g. `"member"`
    pub role: String,
}

/// What the caller's session looks like from the outside.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionView {
    pub account_id: String,
    pub email: String,
    /// Displayed role
    pub role: Role,
    pub impersonating: bool,
    /// Role of the account that actually signed in
    pub real_role: Role,
    pub created_at: DateTime<Utc>,
}

impl From<&Session> for SessionView {
    fn from(session: &Session) -> Self {
        Self {
            account_id: session.account_id.clone(),
            email: session.email.clone(),
            role: session.role,
            impersonating: session.is_impersonating(),
            real_role: session.real_role(),
            created_at: session.created_at,
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service health status
    pub status: String,
    /// Service version
    pub version: String,
    /// Current timestamp
    pub timestamp: DateTime<Utc>,
    /// Sessions currently held in memory (including not yet evicted expired ones)
    pub active_sessions: usize,
    /// Client IPs tracked by the rate limiter (0 when disabled)
    pub rate_limited_clients: usize,
    /// Uptime in seconds
    pub uptime_seconds: u64,
}
