//! Login, logout and session introspection.
//!
//! # Endpoints
//!
//! - `GET /login` - Login entry point (where gates redirect to)
//! - `POST /login` - Form login; sets the session cookie
//! - `POST /logout` - Drops the session and clears the cookie
//! - `GET /me` - The caller's session as JSON
//!
//! # Login Flow
//!
//! ```text
//! validate input → 400
//!   → login throttle → 429 + Retry-After
//!   → verify credentials → 401 (and one extra throttle cell)
//!   → create session → 303 to "/" with Set-Cookie
//! ```

use axum::extract::{Form, State};
use axum::response::{IntoResponse, Redirect, Response};
use axum::{Extension, Json};
use axum_extra::extract::CookieJar;
use tracing::{info, instrument, warn};

use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::middleware::{ClientIp, CurrentSession};
use crate::models::{LoginForm, SessionView};
use crate::session::SessionToken;
use crate::state::AppState;
use crate::validation::{validate_email, validate_password};

/// Where a successful login lands.
const HOME_PATH: &str = "/";

/// Login entry point.
///
/// Page rendering belongs to the embedding application; this only tells
/// clients how to sign in.
pub async fn login_page() -> &'static str {
    "Sign in by submitting the form fields `email` and `password` to POST /login."
}

/// Form login.
///
/// A session the browser already carried is deleted once the new one is
/// about to be issued, so re-logging in never leaves an orphan behind.
#[instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    ClientIp(client_ip): ClientIp,
    previous: Option<Extension<SessionToken>>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> AppResult<Response> {
    if let Err(e) = validate_email(&form.email).and_then(|()| validate_password(&form.password)) {
        metrics::record_login_failure("invalid_input");
        return Err(e);
    }

    state
        .login_throttle
        .check(&client_ip)
        .map_err(|retry_after_secs| AppError::TooManyRequests { retry_after_secs })?;

    let Some(account) = state.credentials.verify(&form.email, &form.password) else {
        state.login_throttle.record_failure(&client_ip);
        metrics::record_login_failure("bad_credentials");
        warn!(target: "audit", email = %form.email, client_ip = %client_ip, "Login failed");
        return Err(AppError::Unauthorized(
            "Invalid email or password".to_string(),
        ));
    };

    if let Some(Extension(previous)) = previous {
        state.sessions.delete(&previous);
    }

    let token = state
        .sessions
        .create(&account.account_id, &account.email, account.role)?;

    info!(
        target: "audit",
        account_id = %account.account_id,
        role = %account.role,
        client_ip = %client_ip,
        "Login succeeded"
    );

    Ok((jar.add(state.cookie.issue(&token)), Redirect::to(HOME_PATH)).into_response())
}

/// Logout. Always succeeds, with or without a session.
#[instrument(skip_all)]
pub async fn logout(
    State(state): State<AppState>,
    current: Option<Extension<SessionToken>>,
    jar: CookieJar,
) -> Response {
    if let Some(Extension(token)) = current {
        state.sessions.delete(&token);
        info!(target: "audit", "Logout");
    }

    (
        jar.add(state.cookie.clear()),
        Redirect::to(&state.config.login_path),
    )
        .into_response()
}

/// The caller's session.
///
/// # Response Body
///
/// ```json
/// {
///   "account_id": "a-1",
///   "email": "sensei@dojo.example",
///   "role": "member",
///   "impersonating": true,
///   "real_role": "admin",
///   "created_at": "2024-01-15T10:30:00Z"
/// }
/// ```
pub async fn me(current: CurrentSession) -> Json<SessionView> {
    Json(SessionView::from(&current.session))
}
