//! In-memory session store with expire-on-access.
//!
//! Sessions live for a fixed 24 hours from creation. There is no expiry
//! timer: a stale entry is noticed and removed by the read that finds it.
//!
//! # Locking
//!
//! A single readers-writer lock guards the map. [`SessionStore::get`] takes
//! the shared lock for the common case. When it finds an expired entry it
//! releases the shared lock, takes the exclusive lock, re-checks the entry
//! (a concurrent `update` or `delete` may have run in between), and only then
//! removes it.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::RwLock;
use tracing::debug;

use super::model::{Role, Session};
use super::token::SessionToken;
use super::SessionError;
use crate::metrics;

/// Session lifetime in seconds, measured from `created_at`.
pub const SESSION_TTL_SECS: i64 = 24 * 60 * 60;

/// [`SESSION_TTL_SECS`] as a chrono delta.
pub fn session_ttl() -> TimeDelta {
    TimeDelta::seconds(SESSION_TTL_SECS)
}

/// Thread-safe session store.
///
/// Cloning yields another handle to the same map. Each application owns one
/// instance and hands clones to the middleware that needs it.
#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session for a verified identity and return its token.
    ///
    /// # Errors
    ///
    /// - [`SessionError::MissingField`] if `account_id` or `email` is empty
    /// - [`SessionError::TokenGeneration`] if the random source fails
    pub fn create(
        &self,
        account_id: &str,
        email: &str,
        role: Role,
    ) -> Result<SessionToken, SessionError> {
        self.create_at(account_id, email, role, Utc::now())
    }

    pub(crate) fn create_at(
        &self,
        account_id: &str,
        email: &str,
        role: Role,
        now: DateTime<Utc>,
    ) -> Result<SessionToken, SessionError> {
        if account_id.is_empty() {
            return Err(SessionError::MissingField("account_id"));
        }
        if email.is_empty() {
            return Err(SessionError::MissingField("email"));
        }

        let token = SessionToken::generate()?;
        let session = Session::new(account_id, email, role, now);
        self.sessions
            .write()
            .insert(token.as_str().to_string(), session);

        metrics::record_session_created(role);
        debug!(account_id, role = %role, "Session created");
        Ok(token)
    }

    /// Look up a live session. Unknown and expired tokens both yield `None`.
    pub fn get(&self, token: &SessionToken) -> Option<Session> {
        self.get_at(token, Utc::now())
    }

    pub(crate) fn get_at(&self, token: &SessionToken, now: DateTime<Utc>) -> Option<Session> {
        let key = token.as_str();
        {
            let sessions = self.sessions.read();
            match sessions.get(key) {
                None => return None,
                Some(session) if !is_expired(session, now) => return Some(session.clone()),
                Some(_) => {}
            }
        }

        let mut sessions = self.sessions.write();
        match sessions.get(key) {
            Some(session) if is_expired(session, now) => {
                if let Some(expired) = sessions.remove(key) {
                    metrics::record_session_expired();
                    debug!(account_id = %expired.account_id, "Session expired on access");
                }
                None
            }
            // Replaced with a live session between the two lock acquisitions
            Some(session) => Some(session.clone()),
            None => None,
        }
    }

    /// Remove a session. Absent tokens are ignored.
    pub fn delete(&self, token: &SessionToken) {
        self.sessions.write().remove(token.as_str());
    }

    /// Replace the stored session wholesale, but only if the token exists.
    pub fn update(&self, token: &SessionToken, session: Session) -> bool {
        let mut sessions = self.sessions.write();
        match sessions.get_mut(token.as_str()) {
            Some(slot) => {
                *slot = session;
                true
            }
            None => false,
        }
    }

    /// Number of stored sessions, including expired ones not yet read.
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of sessions that have not expired yet.
    pub fn active_count(&self) -> usize {
        self.active_count_at(Utc::now())
    }

    pub(crate) fn active_count_at(&self, now: DateTime<Utc>) -> usize {
        self.sessions
            .read()
            .values()
            .filter(|session| !is_expired(session, now))
            .count()
    }
}

fn is_expired(session: &Session, now: DateTime<Utc>) -> bool {
    now.signed_duration_since(session.created_at) > session_ttl()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::thread;

    use super::*;
    use crate::session::model::RealIdentity;

    #[test]
    fn test_create_get_delete() {
        let store = SessionStore::new();
        let token = store.create("acct-1", "a@x.com", Role::Member).unwrap();

        let session = store.get(&token).unwrap();
        assert_eq!(session.role, Role::Member);
        assert_eq!(session.account_id, "acct-1");
        assert!(!session.is_impersonating());

        store.delete(&token);
        assert!(store.get(&token).is_none());
        // Idempotent
        store.delete(&token);
        assert!(store.is_empty());
    }

    #[test]
    fn test_create_rejects_empty_fields() {
        let store = SessionStore::new();
        assert!(matches!(
            store.create("", "a@x.com", Role::Member),
            Err(SessionError::MissingField("account_id"))
        ));
        assert!(matches!(
            store.create("acct-1", "", Role::Member),
            Err(SessionError::MissingField("email"))
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn test_expiry_boundary() {
        let store = SessionStore::new();
        let created = Utc::now();
        let token = store
            .create_at("acct-1", "a@x.com", Role::Coach, created)
            .unwrap();

        let almost = created + TimeDelta::hours(23) + TimeDelta::minutes(59);
        assert!(store.get_at(&token, almost).is_some());

        let exactly = created + session_ttl();
        assert!(store.get_at(&token, exactly).is_some());

        let past = created + session_ttl() + TimeDelta::seconds(1);
        assert!(store.get_at(&token, past).is_none());
        // Evicted by the read, not just hidden
        assert_eq!(store.len(), 0);
        assert!(store.get_at(&token, almost).is_none());
    }

    #[test]
    fn test_active_count_ignores_unread_expired_sessions() {
        let store = SessionStore::new();
        let now = Utc::now();
        let stale = now - session_ttl() - TimeDelta::seconds(1);
        store.create_at("acct-1", "a@x.com", Role::Member, stale).unwrap();
        store.create_at("acct-2", "b@x.com", Role::Coach, now).unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.active_count_at(now), 1);
        assert_eq!(store.active_count(), 1);
    }

    #[test]
    fn test_unknown_token_is_absent() {
        let store = SessionStore::new();
        let token = SessionToken::generate().unwrap();
        assert!(store.get(&token).is_none());
    }

    #[test]
    fn test_update_requires_existing_token() {
        let store = SessionStore::new();
        let existing = store.create("acct-1", "a@x.com", Role::Admin).unwrap();
        let unknown = SessionToken::generate().unwrap();

        let replacement = Session::new("acct-2", "b@x.com", Role::Trial, Utc::now());
        assert!(!store.update(&unknown, replacement.clone()));
        assert_eq!(store.len(), 1);
        assert!(store.get(&unknown).is_none());
        assert_eq!(store.get(&existing).unwrap().account_id, "acct-1");
    }

    #[test]
    fn test_update_replaces_whole_value() {
        let store = SessionStore::new();
        let token = store.create("acct-1", "a@x.com", Role::Admin).unwrap();

        let mut original = store.get(&token).unwrap();
        original.real = RealIdentity::from_parts("acct-1", "a@x.com", "admin");
        original.role = Role::Member;
        assert!(store.update(&token, original.clone()));
        assert_eq!(store.get(&token).unwrap(), original);

        // No merging: dropping the overlay in the new value drops it in the store
        let plain = Session::new("acct-3", "c@x.com", Role::Coach, original.created_at);
        assert!(store.update(&token, plain.clone()));
        assert_eq!(store.get(&token).unwrap(), plain);
    }

    #[test]
    fn test_reads_return_copies() {
        let store = SessionStore::new();
        let token = store.create("acct-1", "a@x.com", Role::Member).unwrap();

        let mut copy = store.get(&token).unwrap();
        copy.role = Role::Admin;
        assert_eq!(store.get(&token).unwrap().role, Role::Member);
    }

    #[test]
    fn test_concurrent_create_and_get() {
        let store = SessionStore::new();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                thread::spawn(move || {
                    for j in 0..100 {
                        let id = format!("acct-{i}-{j}");
                        let token = store.create(&id, "a@x.com", Role::Member).unwrap();
                        assert_eq!(store.get(&token).unwrap().account_id, id);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.len(), 800);
    }
}
