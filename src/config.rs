//! Application configuration loaded from environment variables.
//!
//! # Configuration Hierarchy
//!
//! All configuration is loaded from environment variables with sensible defaults
//! for development. In production, configure via environment variables or a `.env` file.
//! Values are read once at startup and shared read-only for the process lifetime.
//!
//! # Sessions
//!
//! - `SESSION_COOKIE_NAME`: Cookie carrying the session token (default: `session`)
//! - `SESSION_COOKIE_SECURE`: Add the `Secure` attribute (default: false)
//! - `LOGIN_PATH`: Where unauthenticated page requests are redirected (default: `/login`)
//!
//! # Rate Limiting
//!
//! - `RATE_LIMIT_CAPACITY`: Requests per client IP per interval (default: 60, 0 = disabled)
//! - `RATE_LIMIT_INTERVAL_SECS`: Refill interval (default: 60)
//! - `RATE_LIMIT_SWEEP_SECS` / `RATE_LIMIT_IDLE_SECS`: Idle client eviction (default: 60 / 300)
//! - `TRUST_PROXY_HEADERS`: Key clients by `X-Forwarded-For` / `X-Real-IP` (default: false)
//!
//! # Observability
//!
//! - `SLOW_REQUEST_THRESHOLD_MS`: Requests at or above this are logged as slow (default: 200)
//! - `STATIC_PATH_PREFIXES`: Paths excluded from request timing
//! - `METRICS_PORT`: Prometheus listener port (default: 9090, 0 = disabled)

use std::env;
use std::time::Duration;

use crate::error::{AppError, AppResult};
use crate::session::cookie::DEFAULT_COOKIE_NAME;

/// Bootstrap admin account configured through the environment.
///
/// Stands in for the account database while the persistence layer lives
/// outside this crate.
#[derive(Clone)]
pub struct BootstrapAdmin {
    pub account_id: String,
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for BootstrapAdmin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BootstrapAdmin")
            .field("account_id", &self.account_id)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Application configuration loaded from environment variables.
///
/// # Example
///
/// ```rust,ignore
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.server_addr());
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Server host address (default: "0.0.0.0")
    pub host: String,

    /// Server port (default: 3000)
    pub port: u16,

    /// Maximum request body size in bytes (default: 64KB)
    pub max_request_body_size: usize,

    // =========================================================================
    // Session Configuration
    // =========================================================================
    /// Session cookie name, fixed per deployment
    pub session_cookie_name: String,

    /// Whether the session cookie carries the `Secure` attribute
    pub session_cookie_secure: bool,

    /// Login entry point for unauthenticated page requests
    pub login_path: String,

    /// Optional bootstrap admin credential
    pub bootstrap_admin: Option<BootstrapAdmin>,

    // =========================================================================
    // Rate Limiting Configuration
    // =========================================================================
    /// Bucket capacity per client IP (default: 60). Set to 0 to disable.
    pub rate_limit_capacity: u32,

    /// Refill interval; each whole interval elapsed refills `capacity` tokens
    pub rate_limit_interval: Duration,

    /// How often idle clients are swept
    pub rate_limit_sweep_interval: Duration,

    /// Clients not seen for longer than this are evicted by the sweep
    pub rate_limit_idle_ttl: Duration,

    /// Trust `X-Forwarded-For` / `X-Real-IP` when keying clients.
    /// Only enable behind a reverse proxy that overwrites these headers.
    pub trust_proxy_headers: bool,

    /// Failed login attempts allowed per IP per minute (default: 10)
    pub login_failure_limit: u32,

    /// Burst allowance for failed login attempts (default: 5)
    pub login_failure_burst: u32,

    // =========================================================================
    // Observability Configuration
    // =========================================================================
    /// Requests taking at least this long are classified as slow (default: 200ms)
    pub slow_request_threshold: Duration,

    /// Path prefixes excluded from request timing
    pub static_path_prefixes: Vec<String>,

    /// Number of timing entries retained for the perf dashboard (default: 500)
    pub perf_buffer_size: usize,

    /// Port for Prometheus metrics endpoint (default: 9090, 0 = disabled)
    pub metrics_port: u16,
}

impl Config {
    /// Load configuration from environment variables with sensible defaults.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if any configuration value is invalid
    /// (e.g., non-numeric PORT value, zero refill interval).
    pub fn from_env() -> AppResult<Self> {
        // Load an .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let config = Self {
            // Server
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: Self::parse_env("PORT", 3000)?,
            max_request_body_size: Self::parse_env("MAX_REQUEST_BODY_SIZE", 64 * 1024)?,

            // Sessions
            session_cookie_name: env::var("SESSION_COOKIE_NAME")
                .unwrap_or_else(|_| DEFAULT_COOKIE_NAME.to_string()),
            session_cookie_secure: Self::parse_env("SESSION_COOKIE_SECURE", false)?,
            login_path: env::var("LOGIN_PATH").unwrap_or_else(|_| "/login".to_string()),
            bootstrap_admin: Self::parse_bootstrap_admin()?,

            // Rate limiting
            rate_limit_capacity: Self::parse_env("RATE_LIMIT_CAPACITY", 60)?,
            rate_limit_interval: Duration::from_secs(Self::parse_env(
                "RATE_LIMIT_INTERVAL_SECS",
                60,
            )?),
            rate_limit_sweep_interval: Duration::from_secs(Self::parse_env(
                "RATE_LIMIT_SWEEP_SECS",
                60,
            )?),
            rate_limit_idle_ttl: Duration::from_secs(Self::parse_env("RATE_LIMIT_IDLE_SECS", 300)?),
            trust_proxy_headers: Self::parse_env("TRUST_PROXY_HEADERS", false)?,
            login_failure_limit: Self::parse_env("LOGIN_FAILURE_LIMIT", 10)?,
            login_failure_burst: Self::parse_env("LOGIN_FAILURE_BURST", 5)?,

            // Observability
            slow_request_threshold: Duration::from_millis(Self::parse_env(
                "SLOW_REQUEST_THRESHOLD_MS",
                200,
            )?),
            static_path_prefixes: Self::parse_static_path_prefixes(),
            perf_buffer_size: Self::parse_env("PERF_BUFFER_SIZE", 500)?,
            metrics_port: Self::parse_env("METRICS_PORT", 9090)?,
        };

        // Validate configuration before returning
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values for consistency and correctness.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if validation fails.
    fn validate(&self) -> AppResult<()> {
        if !is_valid_cookie_name(&self.session_cookie_name) {
            return Err(AppError::ConfigError(format!(
                "SESSION_COOKIE_NAME ({:?}) must be a non-empty cookie token",
                self.session_cookie_name
            )));
        }

        if !self.login_path.starts_with('/') {
            return Err(AppError::ConfigError(format!(
                "LOGIN_PATH ({:?}) must start with '/'",
                self.login_path
            )));
        }

        if self.rate_limiting_enabled() {
            if self.rate_limit_interval.is_zero() {
                return Err(AppError::ConfigError(
                    "RATE_LIMIT_INTERVAL_SECS must be greater than 0".to_string(),
                ));
            }
            if self.rate_limit_sweep_interval.is_zero() {
                return Err(AppError::ConfigError(
                    "RATE_LIMIT_SWEEP_SECS must be greater than 0".to_string(),
                ));
            }
        }

        if self.login_failure_limit == 0 {
            return Err(AppError::ConfigError(
                "LOGIN_FAILURE_LIMIT must be greater than 0".to_string(),
            ));
        }

        if self.slow_request_threshold.is_zero() {
            return Err(AppError::ConfigError(
                "SLOW_REQUEST_THRESHOLD_MS must be greater than 0".to_string(),
            ));
        }

        if self.perf_buffer_size == 0 {
            return Err(AppError::ConfigError(
                "PERF_BUFFER_SIZE must be greater than 0".to_string(),
            ));
        }

        if self.max_request_body_size == 0 {
            return Err(AppError::ConfigError(
                "MAX_REQUEST_BODY_SIZE must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Get the full server address for binding.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if rate limiting is enabled.
    pub fn rate_limiting_enabled(&self) -> bool {
        self.rate_limit_capacity > 0
    }

    /// Check if Prometheus metrics export is enabled.
    pub fn metrics_enabled(&self) -> bool {
        self.metrics_port > 0
    }

    /// Get the metrics endpoint address.
    ///
    /// Returns `None` if metrics are disabled (port = 0).
    pub fn metrics_addr(&self) -> Option<std::net::SocketAddr> {
        if self.metrics_enabled() {
            Some(std::net::SocketAddr::from((
                [0, 0, 0, 0],
                self.metrics_port,
            )))
        } else {
            None
        }
    }

    /// Parse an environment variable into the specified type with a default value.
    fn parse_env<T>(name: &str, default: T) -> AppResult<T>
    where
        T: std::str::FromStr + ToString,
        T::Err: std::fmt::Display,
    {
        match env::var(name) {
            Ok(val) => val
                .trim()
                .parse()
                .map_err(|e| AppError::ConfigError(format!("Invalid {name}: {e}"))),
            Err(_) => Ok(default),
        }
    }

    /// Parse static path prefixes from environment variable.
    ///
    /// Default: "/static/,/favicon.ico"
    fn parse_static_path_prefixes() -> Vec<String> {
        env::var("STATIC_PATH_PREFIXES")
            .unwrap_or_else(|_| "/static/,/favicon.ico".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty() && s.starts_with('/'))
            .collect()
    }

    /// Read the bootstrap admin credential.
    ///
    /// `ADMIN_EMAIL` and `ADMIN_PASSWORD` must be set together;
    /// `ADMIN_ACCOUNT_ID` defaults to "admin".
    fn parse_bootstrap_admin() -> AppResult<Option<BootstrapAdmin>> {
        let email = env::var("ADMIN_EMAIL").ok().filter(|v| !v.is_empty());
        let password = env::var("ADMIN_PASSWORD").ok().filter(|v| !v.is_empty());

        match (email, password) {
            (Some(email), Some(password)) => Ok(Some(BootstrapAdmin {
                account_id: env::var("ADMIN_ACCOUNT_ID")
                    .ok()
                    .filter(|v| !v.is_empty())
                    .unwrap_or_else(|| "admin".to_string()),
                email,
                password,
            })),
            (None, None) => Ok(None),
            _ => Err(AppError::ConfigError(
                "ADMIN_EMAIL and ADMIN_PASSWORD must be set together".to_string(),
            )),
        }
    }
}

/// Cookie names are RFC 6265 tokens: visible ASCII minus separators.
fn is_valid_cookie_name(name: &str) -> bool {
    !name.is_empty()
        && name.bytes().all(|b| {
            b.is_ascii_graphic()
                && !matches!(
                    b,
                    b'(' | b')' | b'<' | b'>' | b'@' | b',' | b';' | b':' | b'\\' | b'"'
                        | b'/' | b'[' | b']' | b'?' | b'=' | b'{' | b'}'
                )
        })
}

/// Default configuration for testing and development.
///
/// Production deployments should use `Config::from_env()` instead.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Server
            host: "0.0.0.0".to_string(),
            port: 3000,
            max_request_body_size: 64 * 1024,
            // Sessions
            session_cookie_name: DEFAULT_COOKIE_NAME.to_string(),
            session_cookie_secure: false,
            login_path: "/login".to_string(),
            bootstrap_admin: None,
            // Rate limiting
            rate_limit_capacity: 60,
            rate_limit_interval: Duration::from_secs(60),
            rate_limit_sweep_interval: Duration::from_secs(60),
            rate_limit_idle_ttl: Duration::from_secs(300),
            trust_proxy_headers: false,
            login_failure_limit: 10,
            login_failure_burst: 5,
            // Observability
            slow_request_threshold: Duration::from_millis(200),
            static_path_prefixes: vec!["/static/".to_string(), "/favicon.ico".to_string()],
            perf_buffer_size: 500,
            metrics_port: 9090,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = Config::default();

        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.session_cookie_name, "session");
        assert_eq!(config.login_path, "/login");
        assert_eq!(config.rate_limit_capacity, 60);
        assert_eq!(config.slow_request_threshold, Duration::from_millis(200));
        assert!(config.bootstrap_admin.is_none());
        assert!(!config.trust_proxy_headers);
    }

    #[test]
    fn test_server_addr_format() {
        let config = Config {
            host: "localhost".to_string(),
            port: 3000,
            ..Config::default()
        };

        assert_eq!(config.server_addr(), "localhost:3000");
    }

    #[test]
    fn test_rate_limiting_enabled() {
        let config = Config::default();
        assert!(config.rate_limiting_enabled());

        let config = Config {
            rate_limit_capacity: 0,
            ..Config::default()
        };
        assert!(!config.rate_limiting_enabled());
    }

    #[test]
    fn test_metrics_addr() {
        let config = Config::default();
        assert_eq!(config.metrics_addr().unwrap().port(), 9090);

        let config = Config {
            metrics_port: 0,
            ..Config::default()
        };
        assert!(config.metrics_addr().is_none());
    }

    #[test]
    fn test_validate_zero_interval() {
        let config = Config {
            rate_limit_interval: Duration::ZERO,
            ..Config::default()
        };

        let result = config.validate();
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("RATE_LIMIT_INTERVAL_SECS")
        );
    }

    #[test]
    fn test_validate_zero_interval_ignored_when_disabled() {
        let config = Config {
            rate_limit_capacity: 0,
            rate_limit_interval: Duration::ZERO,
            ..Config::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_cookie_name() {
        for bad in ["", "my session", "a=b", "sid;"] {
            let config = Config {
                session_cookie_name: bad.to_string(),
                ..Config::default()
            };
            let result = config.validate();
            assert!(result.is_err(), "{bad:?} should be rejected");
            assert!(
                result
                    .unwrap_err()
                    .to_string()
                    .contains("SESSION_COOKIE_NAME")
            );
        }
    }

    #[test]
    fn test_validate_login_path() {
        let config = Config {
            login_path: "login".to_string(),
            ..Config::default()
        };
        assert!(config.validate().unwrap_err().to_string().contains("LOGIN_PATH"));
    }

    #[test]
    fn test_validate_slow_threshold_zero() {
        let config = Config {
            slow_request_threshold: Duration::ZERO,
            ..Config::default()
        };
        assert!(
            config
                .validate()
                .unwrap_err()
                .to_string()
                .contains("SLOW_REQUEST_THRESHOLD_MS")
        );
    }

    #[test]
    fn test_bootstrap_admin_debug_redacts_password() {
        let admin = BootstrapAdmin {
            account_id: "admin".to_string(),
            email: "root@dojo.example".to_string(),
            password: "kiai-secret".to_string(),
        };
        let debug = format!("{admin:?}");
        assert!(debug.contains("root@dojo.example"));
        assert!(!debug.contains("kiai-secret"));
    }

    #[test]
    fn test_validate_valid_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }
}
