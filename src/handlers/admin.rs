//! Impersonation, the performance dashboard and the coach area.
//!
//! # Endpoints
//!
//! - `POST /admin/impersonate` - View the system as another role (admin)
//! - `POST /impersonation/exit` - Return to the real identity (real admin)
//! - `GET /admin/perf` - Request timing snapshot (admin)
//! - `GET /coach` - Coach area (admin or coach)
//!
//! # Impersonation
//!
//! While impersonating, the session's displayed role is the target role and
//! every gate treats the admin as that role. Only exiting consults the real
//! identity, which is why `/impersonation/exit` sits behind a plain
//! authentication gate instead of an admin role gate.

use axum::Json;
use axum::extract::State;
use tracing::{info, instrument};

use crate::error::{AppError, AppResult};
use crate::middleware::CurrentSession;
use crate::models::{ImpersonateRequest, SessionView};
use crate::services::PerfSnapshot;
use crate::state::AppState;
use crate::validation::validate_impersonation_target;

/// Start impersonating a non-admin role.
///
/// # Request Body
///
/// ```json
/// { "role": "member" }
/// ```
#[instrument(skip_all)]
pub async fn impersonate(
    State(state): State<AppState>,
    current: CurrentSession,
    Json(request): Json<ImpersonateRequest>,
) -> AppResult<Json<SessionView>> {
    let target = validate_impersonation_target(&request.role)?;
    let CurrentSession { mut session, token } = current;

    if !session.begin_impersonation(target) {
        return Err(AppError::Forbidden(
            "Only an administrator who is not already impersonating can impersonate".to_string(),
        ));
    }

    if !state.sessions.update(&token, session.clone()) {
        return Err(AppError::Unauthorized("Session has ended".to_string()));
    }

    info!(
        target: "audit",
        account_id = %session.account_id,
        impersonated_role = %target,
        "Impersonation started"
    );

    Ok(Json(SessionView::from(&session)))
}

/// Stop impersonating. A no-op when not impersonating.
#[instrument(skip_all)]
pub async fn exit_impersonation(
    State(state): State<AppState>,
    current: CurrentSession,
) -> AppResult<Json<SessionView>> {
    let CurrentSession { mut session, token } = current;

    if !session.is_real_admin() {
        return Err(AppError::Forbidden(
            "Only administrators can exit impersonation".to_string(),
        ));
    }

    let impersonated_role = session.role;
    if !session.end_impersonation() {
        return Ok(Json(SessionView::from(&session)));
    }

    if !state.sessions.update(&token, session.clone()) {
        return Err(AppError::Unauthorized("Session has ended".to_string()));
    }

    info!(
        target: "audit",
        account_id = %session.account_id,
        impersonated_role = %impersonated_role,
        "Impersonation ended"
    );

    Ok(Json(SessionView::from(&session)))
}

/// Request timing snapshot: lifetime totals, recent and slowest requests.
pub async fn perf(State(state): State<AppState>) -> Json<PerfSnapshot> {
    Json(state.perf.snapshot())
}

/// Coach area landing.
pub async fn coach_area(current: CurrentSession) -> Json<SessionView> {
    Json(SessionView::from(&current.session))
}
