//! Brute-force protection for the login form.
//!
//! A keyed GCRA limiter per client IP. Every login attempt is checked
//! against it before credentials are looked at, and every failed attempt
//! spends one additional cell, so repeated failures exhaust the budget
//! roughly twice as fast as successful logins do.

use std::num::NonZeroU32;
use std::sync::Arc;

use governor::clock::{Clock, DefaultClock};
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};
use tracing::warn;

use crate::metrics;

/// Used when the configured limit is zero.
const FALLBACK_LIMIT: NonZeroU32 = NonZeroU32::MIN;

type KeyedLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Per-IP login attempt limiter. Cheap to clone.
#[derive(Clone)]
pub struct LoginThrottle {
    limiter: Arc<KeyedLimiter>,
}

impl LoginThrottle {
    /// Allow `per_minute` attempts per IP with bursts of up to `burst`.
    pub fn new(per_minute: u32, burst: u32) -> Self {
        let per_minute = NonZeroU32::new(per_minute).unwrap_or(FALLBACK_LIMIT);
        let burst = NonZeroU32::new(burst).unwrap_or(per_minute);
        let quota = Quota::per_minute(per_minute).allow_burst(burst);

        Self {
            limiter: Arc::new(RateLimiter::keyed(quota)),
        }
    }

    /// Admit one login attempt from `client_ip`.
    ///
    /// Returns the number of seconds to wait when the IP is throttled.
    pub fn check(&self, client_ip: &str) -> Result<(), u64> {
        match self.limiter.check_key(&client_ip.to_string()) {
            Ok(()) => Ok(()),
            Err(not_until) => {
                let wait = not_until.wait_time_from(DefaultClock::default().now());
                let retry_after = wait.as_secs().max(1);
                warn!(
                    client_ip,
                    retry_after_secs = retry_after,
                    "Login attempts throttled for IP"
                );
                metrics::record_login_failure("throttled");
                Err(retry_after)
            }
        }
    }

    /// Charge an extra cell for a failed attempt.
    pub fn record_failure(&self, client_ip: &str) {
        let _ = self.limiter.check_key(&client_ip.to_string());
    }

    /// Drop state for IPs whose budget has fully recovered.
    pub fn retain_recent(&self) {
        self.limiter.retain_recent();
    }

    /// Number of IPs with throttle state.
    pub fn len(&self) -> usize {
        self.limiter.len()
    }

    pub fn is_empty(&self) -> bool {
        self.limiter.is_empty()
    }
}

impl Default for LoginThrottle {
    fn default() -> Self {
        Self::new(10, 5)
    }
}
