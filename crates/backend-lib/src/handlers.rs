// ============================
// crates/backend-lib/src/handlers.rs
// ============================
//! HTTP handlers for the `/auth` endpoints.

use crate::auth::Credentials;
use crate::error::{AppError, AuthError, TokenError};
use crate::metrics::SIGN_OUT;
use crate::middleware::CurrentSession;
use crate::session;
use crate::storage::normalize_identifier;
use crate::validation::validate_sign_in;
use crate::AppState;
use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use dashkit_common::{SessionView, SignInRequest, SignInResponse};
use metrics::counter;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

/// `POST /auth/sign-in`
pub async fn sign_in(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SignInRequest>,
) -> Result<Response, AppError> {
    validate_sign_in(&request)?;

    let key = normalize_identifier(&request.email);
    if !state.rate_limiter.check_rate_limit(&key) {
        return Err(AppError::AuthRateLimited);
    }

    let SignInRequest {
        email,
        password,
        remember_me,
    } = request;
    let credentials = Credentials::new(email, password).remember_me(remember_me);

    let claims = match state.authenticator.authenticate(&credentials).await {
        Ok(claims) => {
            state.rate_limiter.record_success(&key);
            claims
        },
        Err(e) => {
            if !matches!(e, AuthError::Backend(_)) {
                state.rate_limiter.record_failed_attempt(&key);
            }
            return Err(e.into());
        },
    };

    let token = state.codec.encode(&claims)?;
    let cookie = session::set_session_cookie(
        token.as_str(),
        claims.remaining_secs(claims.issued_at),
        state.settings.secure_cookies,
    )?;

    let body = SignInResponse {
        session: claims.to_view(),
        token: token.into_string(),
    };
    Ok(([(header::SET_COOKIE, cookie)], Json(body)).into_response())
}

/// `POST /auth/sign-out`. Clears the cookie; tokens are not revoked server-side.
pub async fn sign_out(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if let Some(claims) = session::extract_token(&headers).and_then(|t| state.codec.decode(&t).ok()) {
        info!(user_id = %claims.subject_id, "signed out");
    }
    counter!(SIGN_OUT).increment(1);

    (
        StatusCode::NO_CONTENT,
        [(header::SET_COOKIE, session::clear_session_cookie(state.settings.secure_cookies))],
    )
        .into_response()
}

/// `GET /auth/session`: the client's display copy of the current session
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<SessionView>, AppError> {
    let token = session::extract_token(&headers).ok_or(TokenError::TamperedOrInvalid)?;
    let claims = state.codec.decode(&token)?;
    Ok(Json(claims.to_view()))
}

/// `GET /api/me`, behind the gate
pub async fn current_session(CurrentSession(claims): CurrentSession) -> Json<SessionView> {
    Json(claims.to_view())
}

/// `GET /healthz`
pub async fn healthz() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
