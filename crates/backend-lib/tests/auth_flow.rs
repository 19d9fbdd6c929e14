//! End-to-end sign-in, session and sign-out flow over HTTP.

use axum::{
    body::Body,
    http::{header, Request, Response, StatusCode},
    routing::get,
    Router,
};
use backend_lib::{
    auth::{AccessKind, Credentials, RouteRule},
    config::{RateLimitSettings, Settings},
    error::AuthError,
    router::{create_router, create_router_with},
    storage::{CredentialStore, FlatFileStorage},
    AppState,
};
use dashkit_common::{AccountStatus, ErrorBody, Role, SessionView, SignInResponse};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

const SECRET: &str = "integration-test-signing-secret-0123456789";
const PASSWORD: &str = "SecureP@ssw0rd";

/// State over flat-file storage in a temp dir, with one user and one admin.
/// Keep the `TempDir` alive for the duration of the test.
async fn setup_test_env() -> (Arc<AppState>, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let settings = Settings {
        signing_secret: Some(SECRET.to_string()),
        hash_cost_factor: 4,
        data_dir: temp_dir.path().to_path_buf(),
        rate_limit: RateLimitSettings {
            max_failed_attempts: 3,
            lockout_secs: 300,
        },
        routes: vec![RouteRule {
            pattern: "/admin/*".to_string(),
            access: AccessKind::Restricted,
            roles: vec![Role::Admin],
        }],
        ..Settings::default()
    };
    let storage = FlatFileStorage::new(temp_dir.path()).unwrap();
    let state = Arc::new(AppState::new(Arc::new(storage), settings).unwrap());

    state
        .authenticator
        .register_user("a@x.com", PASSWORD, Role::User)
        .await
        .unwrap();
    state
        .authenticator
        .register_user("root@x.com", PASSWORD, Role::Admin)
        .await
        .unwrap();

    (state, temp_dir)
}

fn sign_in_request(email: &str, password: &str, remember_me: bool) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/auth/sign-in")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({ "email": email, "password": password, "rememberMe": remember_me }).to_string(),
        ))
        .unwrap()
}

fn set_cookie(response: &Response<Body>) -> String {
    response.headers()[header::SET_COOKIE]
        .to_str()
        .unwrap()
        .to_string()
}

/// `name=value` part of a `Set-Cookie` header
fn cookie_pair(set_cookie: &str) -> String {
    set_cookie.split(';').next().unwrap().to_string()
}

async fn body_json<T: serde::de::DeserializeOwned>(response: Response<Body>) -> T {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_sign_in_session_sign_out() {
    let (state, _temp_dir) = setup_test_env().await;
    let app = create_router(state);

    let response = app
        .clone()
        .oneshot(sign_in_request("A@x.com", PASSWORD, false))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let cookie_header = set_cookie(&response);
    assert!(cookie_header.contains("HttpOnly"));
    assert!(cookie_header.contains("Max-Age=86400"));
    let cookie = cookie_pair(&cookie_header);

    let signed_in: SignInResponse = body_json(response).await;
    assert_eq!(signed_in.session.role, Role::User);
    assert_eq!(
        signed_in.session.expires_at - signed_in.session.issued_at,
        86_400
    );
    assert_eq!(cookie, format!("dashkit_session={}", signed_in.token));

    // cookie transport
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/auth/session")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let view: SessionView = body_json(response).await;
    assert_eq!(view, signed_in.session);

    // bearer transport
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/me")
                .header(header::AUTHORIZATION, format!("Bearer {}", signed_in.token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/sign-out")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let cleared = set_cookie(&response);
    assert!(cleared.starts_with("dashkit_session=;"));
    assert!(cleared.contains("Max-Age=0"));

    // no cookie, no session
    let response = app
        .oneshot(
            Request::builder()
                .uri("/auth/session")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_remember_me_extends_cookie() {
    let (state, _temp_dir) = setup_test_env().await;
    let response = create_router(state)
        .oneshot(sign_in_request("a@x.com", PASSWORD, true))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(set_cookie(&response).contains("Max-Age=2592000"));
}

#[tokio::test]
async fn test_failures_are_indistinguishable() {
    let (state, _temp_dir) = setup_test_env().await;
    state
        .authenticator
        .register_user("held@x.com", PASSWORD, Role::User)
        .await
        .unwrap();
    state
        .authenticator
        .store()
        .update_status("held@x.com", AccountStatus::Suspended)
        .await
        .unwrap();
    let app = create_router(state);

    let mut bodies = Vec::new();
    for (email, password) in [
        ("a@x.com", "Wrong-passw0rd!"),
        ("nobody@x.com", PASSWORD),
        ("held@x.com", PASSWORD),
    ] {
        let response = app
            .clone()
            .oneshot(sign_in_request(email, password, false))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{email}");
        assert!(response.headers().get(header::SET_COOKIE).is_none());
        let body: ErrorBody = body_json(response).await;
        bodies.push(body);
    }

    assert_eq!(bodies[0], bodies[1]);
    assert_eq!(bodies[1], bodies[2]);
}

#[tokio::test]
async fn test_repeated_failures_lock_out() {
    let (state, _temp_dir) = setup_test_env().await;
    let app = create_router(state);

    for _ in 0..3 {
        let response = app
            .clone()
            .oneshot(sign_in_request("a@x.com", "Wrong-passw0rd!", false))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    // even the right password is refused while locked out
    let response = app
        .oneshot(sign_in_request("a@x.com", PASSWORD, false))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_malformed_sign_in_is_bad_request() {
    let (state, _temp_dir) = setup_test_env().await;
    let response = create_router(state)
        .oneshot(sign_in_request("not-an-email", PASSWORD, false))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_protected_pages_follow_route_table() {
    let (state, _temp_dir) = setup_test_env().await;
    let pages = Router::new()
        .route("/admin/users", get(|| async { "users" }))
        .route("/reports", get(|| async { "reports" }));
    let app = create_router_with(state, pages);

    let sign_in = |email: &'static str| {
        let app = app.clone();
        async move {
            let response = app
                .oneshot(sign_in_request(email, PASSWORD, false))
                .await
                .unwrap();
            cookie_pair(&set_cookie(&response))
        }
    };
    let user = sign_in("a@x.com").await;
    let admin = sign_in("root@x.com").await;

    let fetch = |uri: &'static str, cookie: Option<String>| {
        let app = app.clone();
        async move {
            let mut request = Request::builder().uri(uri);
            if let Some(cookie) = cookie {
                request = request.header(header::COOKIE, cookie);
            }
            app.oneshot(request.body(Body::empty()).unwrap())
                .await
                .unwrap()
        }
    };

    let response = fetch("/admin/users", None).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        response.headers()[header::LOCATION],
        "/sign-in?callbackUrl=%2Fadmin%2Fusers"
    );

    assert_eq!(
        fetch("/admin/users", Some(user.clone())).await.status(),
        StatusCode::FORBIDDEN
    );
    assert_eq!(
        fetch("/admin/users", Some(admin)).await.status(),
        StatusCode::OK
    );
    assert_eq!(fetch("/reports", Some(user)).await.status(), StatusCode::OK);
    assert_eq!(fetch("/reports", None).await.status(), StatusCode::SEE_OTHER);

    // auth endpoints stay reachable without a session
    assert_eq!(fetch("/healthz", None).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_long_identifiers_sign_in_like_any_other() {
    let (state, _temp_dir) = setup_test_env().await;
    let email = format!("{}@example.com", "a".repeat(228));
    assert_eq!(email.len(), 240);
    let app = create_router(state.clone());

    // unknown: an ordinary credential failure, not a storage error
    let err = state
        .authenticator
        .authenticate(&Credentials::new(email.as_str(), PASSWORD))
        .await
        .unwrap_err();
    assert_eq!(err, AuthError::InvalidCredentials);

    let response = app
        .clone()
        .oneshot(sign_in_request(&email, PASSWORD, false))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    state
        .authenticator
        .register_user(&email, PASSWORD, Role::User)
        .await
        .unwrap();

    let response = app
        .oneshot(sign_in_request(&email, PASSWORD, false))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let signed_in: SignInResponse = body_json(response).await;
    assert_eq!(signed_in.session.role, Role::User);
}
