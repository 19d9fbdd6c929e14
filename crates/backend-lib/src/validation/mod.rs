// ============================
// crates/backend-lib/src/validation/mod.rs
// ============================
//! Request and configuration validation.

use crate::auth::password::{validate_password_strength, PasswordRequirements};
use crate::error::AppError;
use dashkit_common::SignInRequest;
use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

// Common validation constants
const MAX_PASSWORD_LENGTH: usize = 128;
const MAX_EMAIL_LENGTH: usize = 254; // RFC 5321 SMTP limit
const MAX_ROUTE_PATTERN_LENGTH: usize = 512;

// Regex patterns for validation
static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("valid email regex")
});
static ROUTE_PATTERN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/[A-Za-z0-9._~\-/]*(\*)?$").expect("valid route regex")
});

/// Possible validation errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid email: {0}")]
    InvalidEmail(String),

    #[error("Invalid password: {0}")]
    InvalidPassword(String),

    #[error("Invalid route pattern: {0}")]
    InvalidRoutePattern(String),
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::InvalidInput(err.to_string())
    }
}

/// Result type for validation operations
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validate an email address
pub fn validate_email(email: &str) -> ValidationResult<&str> {
    let email = email.trim();

    if email.is_empty() {
        return Err(ValidationError::InvalidEmail(
            "Email address cannot be empty".to_string(),
        ));
    }

    if email.len() > MAX_EMAIL_LENGTH {
        return Err(ValidationError::InvalidEmail(format!(
            "Email address cannot exceed {MAX_EMAIL_LENGTH} characters"
        )));
    }

    if !EMAIL_REGEX.is_match(email) {
        return Err(ValidationError::InvalidEmail(
            "Invalid email address format".to_string(),
        ));
    }

    Ok(email)
}

/// Shape checks on a sign-in body. Strength rules are not applied here:
/// accounts created under older rules must still be able to sign in.
pub fn validate_sign_in(request: &SignInRequest) -> ValidationResult<()> {
    validate_email(&request.email)?;

    if request.password.is_empty() {
        return Err(ValidationError::InvalidPassword(
            "Password must not be empty".to_string(),
        ));
    }

    // bounds the work an anonymous caller can make the hasher do
    if request.password.len() > MAX_PASSWORD_LENGTH {
        return Err(ValidationError::InvalidPassword(format!(
            "Password cannot exceed {MAX_PASSWORD_LENGTH} characters"
        )));
    }

    Ok(())
}

/// Validate a new account's identifier and password
pub fn validate_registration(
    email: &str,
    password: &str,
    requirements: &PasswordRequirements,
) -> ValidationResult<()> {
    validate_email(email)?;

    if password.len() > MAX_PASSWORD_LENGTH {
        return Err(ValidationError::InvalidPassword(format!(
            "Password cannot exceed {MAX_PASSWORD_LENGTH} characters"
        )));
    }

    if !validate_password_strength(password, requirements) {
        return Err(ValidationError::InvalidPassword(format!(
            "Password must be at least {} characters and meet the complexity rules",
            requirements.min_length
        )));
    }

    Ok(())
}

/// Validate a route pattern: an absolute path, optionally ending in `*`
pub fn validate_route_pattern(pattern: &str) -> ValidationResult<&str> {
    if pattern.len() > MAX_ROUTE_PATTERN_LENGTH {
        return Err(ValidationError::InvalidRoutePattern(format!(
            "Pattern cannot exceed {MAX_ROUTE_PATTERN_LENGTH} characters"
        )));
    }

    if !ROUTE_PATTERN_REGEX.is_match(pattern) {
        return Err(ValidationError::InvalidRoutePattern(format!(
            "`{pattern}` must start with `/` and may only end in `*`"
        )));
    }

    Ok(pattern)
}
