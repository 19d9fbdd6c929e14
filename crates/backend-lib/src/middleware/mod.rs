// crates/backend-lib/src/middleware/mod.rs

//! Request gating and session extraction.

use crate::auth::{AuthorizationDecision, SessionClaims};
use crate::error::{AppError, TokenError};
use crate::session;
use crate::AppState;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use std::sync::Arc;
use tracing::debug;


/// Gate every request through the route table.
///
/// Allowed requests carry their `SessionClaims` in the request extensions.
/// Unauthenticated page requests are redirected to the sign-in page with a
/// `callbackUrl`; JSON clients get a 401. Insufficient roles get a 403.
pub async fn require_access(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = session::extract_token(request.headers());
    let path = request.uri().path().to_string();

    match state.gate.authorize_path(&path, token.as_deref()) {
        AuthorizationDecision::Allow(claims) => {
            if let Some(claims) = claims {
                request.extensions_mut().insert(claims);
            }
            next.run(request).await
        },
        AuthorizationDecision::DenyUnauthenticated => {
            debug!(path, "unauthenticated request");
            if accepts_json_only(request.headers()) {
                AppError::Session(TokenError::TamperedOrInvalid).into_response()
            } else {
                let callback = request
                    .uri()
                    .path_and_query()
                    .map_or(path.as_str(), |pq| pq.as_str());
                Redirect::to(&sign_in_redirect(&state.settings.sign_in_path, callback)).into_response()
            }
        },
        AuthorizationDecision::DenyInsufficientRole => {
            debug!(path, "insufficient role");
            AppError::Forbidden.into_response()
        },
    }
}

/// Sign-in location that returns the user to `callback` afterwards
pub fn sign_in_redirect(sign_in_path: &str, callback: &str) -> String {
    format!("{sign_in_path}?callbackUrl={}", urlencoding::encode(callback))
}

fn accepts_json_only(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("application/json") && !accept.contains("text/html"))
}

/// Claims of the signed-in caller, as placed by [`require_access`]
#[derive(Debug, Clone)]
pub struct CurrentSession(pub SessionClaims);

impl<S> FromRequestParts<S> for CurrentSession
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<SessionClaims>()
            .cloned()
            .map(CurrentSession)
            .ok_or(AppError::Session(TokenError::TamperedOrInvalid))
    }
}
