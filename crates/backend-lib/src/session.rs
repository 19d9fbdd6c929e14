// ============================
// crates/backend-lib/src/session.rs
// ============================
//! Carrying the session token over HTTP: the `dashkit_session` cookie or an
//! `Authorization: Bearer` header.

use crate::error::AppError;
use axum::http::{header, HeaderMap, HeaderValue};

/// Name of the session cookie
pub const SESSION_COOKIE: &str = "dashkit_session";

const BEARER_PREFIX: &str = "Bearer ";

/// Value of cookie `name`, if the request carries it
pub fn parse_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|s| s.split(';'))
        .find_map(|part| {
            let (k, v) = part.trim().split_once('=')?;
            (k == name && !v.is_empty()).then(|| v.to_string())
        })
}

/// Token from `Authorization: Bearer <token>`
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix(BEARER_PREFIX)?.trim();
    (!token.is_empty()).then(|| token.to_string())
}

/// Raw session token presented by the request. The cookie wins over the header.
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    parse_cookie(headers, SESSION_COOKIE).or_else(|| bearer_token(headers))
}

/// `Set-Cookie` value that stores `token` for `max_age_secs`
pub fn set_session_cookie(token: &str, max_age_secs: u64, secure: bool) -> Result<HeaderValue, AppError> {
    let secure = if secure { "; Secure" } else { "" };
    HeaderValue::from_str(&format!(
        "{SESSION_COOKIE}={token}; HttpOnly; SameSite=Lax; Path=/; Max-Age={max_age_secs}{secure}"
    ))
    .map_err(|e| AppError::Internal(format!("invalid session cookie: {e}")))
}

/// `Set-Cookie` value that makes the client drop the session cookie
pub fn clear_session_cookie(secure: bool) -> HeaderValue {
    let value = if secure {
        "dashkit_session=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0; Expires=Thu, 01 Jan 1970 00:00:00 GMT; Secure"
    } else {
        "dashkit_session=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0; Expires=Thu, 01 Jan 1970 00:00:00 GMT"
    };
    HeaderValue::from_static(value)
}
