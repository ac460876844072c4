use crate::error::{AppError, AppResult};
use crate::session::Role;

// =============================================================================
// Validation Constants
// =============================================================================

/// Maximum length for an email address (RFC 5321 path limit).
pub const MAX_EMAIL_LENGTH: usize = 254;

/// Maximum accepted password length.
///
/// Bounds the work done by credential comparison on hostile input.
pub const MAX_PASSWORD_LENGTH: usize = 1024;

/// Validate an email address submitted to the login form.
///
/// Rules:
/// - Must be between 1 and 254 characters
/// - Must contain exactly one `@` with a non-empty local part and domain
/// - Must not contain whitespace or control characters
pub fn validate_email(email: &str) -> AppResult<()> {
    if email.is_empty() {
        return Err(AppError::BadRequest("Email cannot be empty".to_string()));
    }

    if email.len() > MAX_EMAIL_LENGTH {
        return Err(AppError::BadRequest(format!(
            "Email cannot exceed {MAX_EMAIL_LENGTH} characters"
        )));
    }

    if let Some(pos) = email
        .chars()
        .position(|c| c.is_whitespace() || c.is_control())
    {
        return Err(AppError::BadRequest(format!(
            "Email contains invalid character at position {pos}"
        )));
    }

    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() && !domain.contains('@') => {
            Ok(())
        }
        _ => Err(AppError::BadRequest(
            "Email must look like name@domain".to_string(),
        )),
    }
}

/// Validate a submitted password.
///
/// Only bounds are checked here; strength rules belong to account creation.
pub fn validate_password(password: &str) -> AppResult<()> {
    if password.is_empty() {
        return Err(AppError::BadRequest(
            "Password cannot be empty".to_string(),
        ));
    }

    if password.len() > MAX_PASSWORD_LENGTH {
        return Err(AppError::BadRequest(format!(
            "Password cannot exceed {MAX_PASSWORD_LENGTH} characters"
        )));
    }

    Ok(())
}

/// Parse and validate the role an admin wants to view the system as.
///
/// Admin is rejected: impersonation always downgrades.
pub fn validate_impersonation_target(role: &str) -> AppResult<Role> {
    let role: Role = role
        .parse()
        .map_err(|e: crate::session::UnknownRole| AppError::BadRequest(e.to_string()))?;

    if role == Role::Admin {
        return Err(AppError::BadRequest(
            "Cannot impersonate the admin role".to_string(),
        ));
    }

    Ok(role)
}
