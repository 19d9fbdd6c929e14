// crates/backend-lib/src/error.rs

//! Central error types + Axum integration.
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use dashkit_common::ErrorBody;
use thiserror::Error;

/// Why a credential check failed.
///
/// `InvalidCredentials` covers both "no such identifier" and "wrong secret"
/// so callers cannot tell them apart.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("account is not active")]
    AccountNotActive,

    #[error("credential store unavailable: {0}")]
    Backend(String),
}

/// Why a session token was rejected
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    #[error("session token is tampered or malformed")]
    TamperedOrInvalid,

    #[error("session token has expired")]
    Expired,
}

/// Application error types with error codes and context
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Session error: {0}")]
    Session(#[from] TokenError),

    #[error("Role not permitted for this route")]
    Forbidden,

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Authentication rate limit exceeded")]
    AuthRateLimited,

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl AppError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Auth(AuthError::Backend(_)) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Auth(_) | AppError::Session(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::InvalidInput(_) | AppError::Json(_) => StatusCode::BAD_REQUEST,
            AppError::AuthRateLimited => StatusCode::TOO_MANY_REQUESTS,
            AppError::Internal(_) | AppError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            // one code for both so the response cannot be used to probe accounts
            AppError::Auth(AuthError::InvalidCredentials | AuthError::AccountNotActive) => {
                "AUTH_001"
            },
            AppError::Auth(AuthError::Backend(_)) => "AUTH_002",
            AppError::AuthRateLimited => "AUTH_003",
            AppError::Session(_) => "AUTH_004",
            AppError::Forbidden => "AUTH_005",
            AppError::Internal(_) => "INT_001",
            AppError::NotFound(_) => "NF_001",
            AppError::Conflict(_) => "CONF_001",
            AppError::Io(_) => "IO_001",
            AppError::Json(_) => "JSON_001",
            AppError::InvalidInput(_) => "VAL_001",
        }
    }

    /// Get a sanitized message suitable for production use
    pub fn sanitized_message(&self) -> String {
        match self {
            AppError::Auth(AuthError::InvalidCredentials | AuthError::AccountNotActive) => {
                "Invalid email or password".to_string()
            },
            AppError::Auth(AuthError::Backend(_)) => {
                "Sign-in is temporarily unavailable".to_string()
            },
            AppError::Session(_) => "Please sign in again".to_string(),
            AppError::Forbidden => "You do not have access to this page".to_string(),
            AppError::AuthRateLimited => {
                "Too many authentication attempts, please try again later".to_string()
            },
            AppError::Internal(_) => "An internal server error occurred".to_string(),
            AppError::Json(_) => "Invalid request format".to_string(),
            AppError::Io(_) => "Internal server error".to_string(),
            AppError::NotFound(_) => "Resource not found".to_string(),
            AppError::Conflict(_) => "Resource already exists".to_string(),
            AppError::InvalidInput(_) => "Invalid input provided".to_string(),
        }
    }

    /// Errors whose detailed text would reveal account state
    fn is_enumeration_sensitive(&self) -> bool {
        matches!(self, AppError::Auth(_) | AppError::Session(_))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();

        // Use detailed messages in development, sanitized in production
        let message = if cfg!(debug_assertions) && !self.is_enumeration_sensitive() {
            self.to_string()
        } else {
            self.sanitized_message()
        };

        (status, Json(ErrorBody::new(error_code, message))).into_response()
    }
}

impl From<String> for AppError {
    fn from(msg: String) -> Self {
        AppError::Internal(msg)
    }
}

impl From<&str> for AppError {
    fn from(msg: &str) -> Self {
        AppError::Internal(msg.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use std::io::{Error as IoError, ErrorKind};

    #[test]
    fn test_app_error_display() {
        let auth_error = AppError::Auth(AuthError::InvalidCredentials);
        assert_eq!(
            auth_error.to_string(),
            "Authentication error: invalid credentials"
        );

        let io_error = AppError::Io(IoError::new(ErrorKind::NotFound, "File not found"));
        assert!(io_error.to_string().contains("IO error"));

        assert_eq!(
            AppError::Forbidden.to_string(),
            "Role not permitted for this route"
        );
    }

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(
            AppError::Auth(AuthError::InvalidCredentials).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::Session(TokenError::Expired).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::Forbidden.status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::AuthRateLimited.status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            AppError::Auth(AuthError::Backend("down".to_string())).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_credential_failures_share_code_and_message() {
        let wrong = AppError::Auth(AuthError::InvalidCredentials);
        let inactive = AppError::Auth(AuthError::AccountNotActive);

        assert_eq!(wrong.error_code(), inactive.error_code());
        assert_eq!(wrong.sanitized_message(), inactive.sanitized_message());
        assert_eq!(wrong.sanitized_message(), "Invalid email or password");
    }

    #[test]
    fn test_token_failures_ask_for_sign_in() {
        for err in [TokenError::Expired, TokenError::TamperedOrInvalid] {
            let app = AppError::from(err);
            assert_eq!(app.sanitized_message(), "Please sign in again");
            assert_eq!(app.error_code(), "AUTH_004");
        }
    }

    #[test]
    fn test_error_from_impls() {
        let io_err = IoError::new(ErrorKind::PermissionDenied, "Permission denied");
        let app_err: AppError = io_err.into();
        assert!(matches!(app_err, AppError::Io(_)));

        let json_err: serde_json::Error =
            serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let app_err: AppError = json_err.into();
        assert!(matches!(app_err, AppError::Json(_)));

        let app_err: AppError = "Str error".into();
        assert!(matches!(app_err, AppError::Internal(_)));
    }

    #[tokio::test]
    async fn test_account_not_active_response_is_generic() {
        let response = AppError::Auth(AuthError::AccountNotActive).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: ErrorBody = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.error.code, "AUTH_001");
        assert_eq!(body.error.message, "Invalid email or password");
    }
}
