mod admin;
mod auth;
mod health;

pub use admin::{coach_area, exit_impersonation, impersonate, perf};
pub use auth::{login, login_page, logout, me};
pub use health::{health_check, readiness_check};
