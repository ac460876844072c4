//! Session token generation.
//!
//! Tokens are 32 bytes drawn from the operating system CSPRNG and encoded as
//! 64 lowercase hex characters. This is the only accepted format; anything
//! else arriving in a cookie is treated as "no session".

use std::fmt;

use rand::TryRngCore;
use rand::rngs::OsRng;

use super::SessionError;

/// Bytes of entropy per token.
pub const TOKEN_BYTES: usize = 32;

/// Length of the hex-encoded token.
pub const TOKEN_HEX_LEN: usize = TOKEN_BYTES * 2;

/// Opaque, unguessable session key.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SessionToken(String);

impl SessionToken {
    /// Draw a fresh token from the OS random source.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::TokenGeneration`] if the random source is
    /// unavailable. Not retried.
    pub fn generate() -> Result<Self, SessionError> {
        let mut bytes = [0u8; TOKEN_BYTES];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| SessionError::TokenGeneration(e.to_string()))?;
        Ok(Self(hex::encode(bytes)))
    }

    /// Accept a token only in the exact generated format.
    pub fn parse(raw: &str) -> Option<Self> {
        let well_formed = raw.len() == TOKEN_HEX_LEN
            && raw
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        well_formed.then(|| Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// Tokens are credentials: keep them out of Debug output and logs.
impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = self.0.get(..8).unwrap_or_default();
        write!(f, "SessionToken({prefix}…)")
    }
}
