//! Credential verification for the login form.
//!
//! Account storage lives outside this crate; handlers only see the
//! [`CredentialVerifier`] trait. [`StaticAccounts`] is the in-memory
//! implementation used for the bootstrap admin and in tests.

use subtle::ConstantTimeEq;
use tracing::debug;

use crate::config::BootstrapAdmin;
use crate::session::Role;

/// Identity returned by a successful credential check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub account_id: String,
    pub email: String,
    pub role: Role,
}

/// Checks an email/password pair.
pub trait CredentialVerifier: Send + Sync {
    /// Returns the account on a match, `None` otherwise.
    fn verify(&self, email: &str, password: &str) -> Option<Account>;
}

struct StaticAccount {
    account: Account,
    password: String,
}

/// Fixed set of accounts held in memory.
///
/// Email lookup is case-insensitive. Passwords are compared in constant time,
/// and a comparison is performed even for unknown emails.
#[derive(Default)]
pub struct StaticAccounts {
    accounts: Vec<StaticAccount>,
}

impl StaticAccounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accounts configured through the environment.
    pub fn from_bootstrap(admin: Option<&BootstrapAdmin>) -> Self {
        let mut accounts = Self::new();
        if let Some(admin) = admin {
            accounts = accounts.with_account(
                &admin.account_id,
                &admin.email,
                Role::Admin,
                &admin.password,
            );
        }
        accounts
    }

    pub fn with_account(mut self, account_id: &str, email: &str, role: Role, password: &str) -> Self {
        self.accounts.push(StaticAccount {
            account: Account {
                account_id: account_id.to_string(),
                email: email.to_string(),
                role,
            },
            password: password.to_string(),
        });
        self
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

impl CredentialVerifier for StaticAccounts {
    fn verify(&self, email: &str, password: &str) -> Option<Account> {
        let candidate = self
            .accounts
            .iter()
            .find(|a| a.account.email.eq_ignore_ascii_case(email));

        let Some(candidate) = candidate else {
            // Burn a comparison so unknown emails cost the same as wrong passwords
            let _ = constant_time_eq(password, "");
            debug!("Login for unknown email");
            return None;
        };

        if constant_time_eq(password, &candidate.password) {
            Some(candidate.account.clone())
        } else {
            None
        }
    }
}

/// Constant-time string comparison via `subtle`.
fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
