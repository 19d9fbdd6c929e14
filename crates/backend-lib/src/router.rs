// ============================
// crates/backend-lib/src/router.rs
// ============================
//! HTTP router.
use crate::handlers;
use crate::middleware::require_access;
use crate::AppState;
use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Create the router with only the built-in routes
pub fn create_router(state: Arc<AppState>) -> Router {
    create_router_with(state, Router::new())
}

/// Create the router, mounting `protected` behind the authorization gate.
///
/// The `/auth` endpoints and `/healthz` are never gated; every route in
/// `protected` is checked against the configured route table.
pub fn create_router_with(state: Arc<AppState>, protected: Router<Arc<AppState>>) -> Router {
    let protected = protected
        .route("/api/me", get(handlers::current_session))
        .route_layer(from_fn_with_state(state.clone(), require_access));

    Router::new()
        .route("/auth/sign-in", post(handlers::sign_in))
        .route("/auth/sign-out", post(handlers::sign_out))
        .route("/auth/session", get(handlers::get_session))
        .route("/healthz", get(handlers::healthz))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
