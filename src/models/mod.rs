mod api;

pub use api::{HealthResponse, ImpersonateRequest, LoginForm, SessionView};
