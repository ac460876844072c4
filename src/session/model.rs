//! Session record, role set and the impersonation overlay.
//!
//! # Displayed vs. real role
//!
//! While an admin impersonates another role, [`Session::role`] holds the
//! *displayed* role and the admin's own identity is kept in a
//! [`RealIdentity`] overlay. Checks that gate what the user sees use the
//! displayed role ([`Session::is_admin`], [`Session::has_role`]). Checks that
//! gate leaving impersonation or other audit-sensitive actions use
//! [`Session::is_real_admin`], which consults the overlay.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Closed set of roles known to the school application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Coach,
    Member,
    Trial,
}

impl Role {
    /// All roles, most privileged first.
    pub const ALL: [Role; 4] = [Role::Admin, Role::Coach, Role::Member, Role::Trial];

    /// Lowercase wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Coach => "coach",
            Role::Member => "member",
            Role::Trial => "trial",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string is not one of the known role names.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role: {0:?}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "coach" => Ok(Role::Coach),
            "member" => Ok(Role::Member),
            "trial" => Ok(Role::Trial),
            _ => Err(UnknownRole(s.to_string())),
        }
    }
}

/// The admin identity hidden behind an impersonated session.
///
/// Either all three fields are present or there is no overlay at all; the
/// `Option<RealIdentity>` on [`Session`] makes a half-filled overlay
/// unrepresentable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealIdentity {
    pub account_id: String,
    pub email: String,
    pub role: Role,
}

impl RealIdentity {
    /// Build an overlay from loosely typed parts (form fields, legacy records).
    ///
    /// Returns `None` unless every part is non-empty and the role parses, so
    /// a record carrying only a real account id is treated as
    /// non-impersonating.
    pub fn from_parts(account_id: &str, email: &str, role: &str) -> Option<Self> {
        if account_id.is_empty() || email.is_empty() || role.trim().is_empty() {
            return None;
        }
        Some(Self {
            account_id: account_id.to_string(),
            email: email.to_string(),
            role: role.parse().ok()?,
        })
    }
}

/// One authenticated browser session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub account_id: String,
    pub email: String,
    /// Displayed role. Differs from the real role while impersonating.
    pub role: Role,
    pub created_at: DateTime<Utc>,
    /// Present only while an admin is viewing the system as another role.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub real: Option<RealIdentity>,
}

impl Session {
    pub fn new(
        account_id: impl Into<String>,
        email: impl Into<String>,
        role: Role,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            email: email.into(),
            role,
            created_at,
            real: None,
        }
    }

    pub fn is_impersonating(&self) -> bool {
        self.real.is_some()
    }

    /// The role of the person actually signed in.
    pub fn real_role(&self) -> Role {
        self.real.as_ref().map_or(self.role, |real| real.role)
    }

    /// Exact match against the displayed role.
    pub fn has_role(&self, role: Role) -> bool {
        self.role == role
    }

    /// Whether the displayed role is one of `roles`.
    pub fn has_any_role(&self, roles: &[Role]) -> bool {
        roles.contains(&self.role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(Role::Admin)
    }

    pub fn is_coach_or_admin(&self) -> bool {
        matches!(self.role, Role::Coach | Role::Admin)
    }

    /// Admin check that survives impersonation.
    pub fn is_real_admin(&self) -> bool {
        self.real_role() == Role::Admin
    }

    /// Present this session as `target` while remembering the current identity.
    ///
    /// Only a non-impersonating admin may start, and the target must not be
    /// admin itself. Returns `false` and leaves the session untouched
    /// otherwise.
    pub fn begin_impersonation(&mut self, target: Role) -> bool {
        if self.is_impersonating() || !self.is_admin() || target == Role::Admin {
            return false;
        }
        self.real = Some(RealIdentity {
            account_id: self.account_id.clone(),
            email: self.email.clone(),
            role: self.role,
        });
        self.role = target;
        true
    }

    /// Restore the real identity. Returns `false` if there was nothing to end.
    pub fn end_impersonation(&mut self) -> bool {
        match self.real.take() {
            Some(real) => {
                self.account_id = real.account_id;
                self.email = real.email;
                self.role = real.role;
                true
            }
            None => false,
        }
    }
}
