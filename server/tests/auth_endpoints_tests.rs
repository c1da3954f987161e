use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::middleware::{from_fn, from_fn_with_state};
use etask_server::auth::{AuthState, auth_user_middleware, create_auth_router, encode_jwt};
use etask_server::config::Config;
use etask_server::user::UserService;
use std::sync::Arc;
use tower::ServiceExt;

mod common;

fn test_config() -> Config {
    Config {
        db_url: "".to_string(),
        port: 8080,
        jwt_secret: "some_secret".to_string(),
        media_dir: "media".to_string(),
        undo_window_secs: 5,
    }
}

/// Test helper to create the auth app backed by a fresh database.
async fn create_test_app() -> (axum::Router, Arc<AuthState>) {
    let _ = tracing_subscriber::fmt().try_init();
    let db = common::setup_sqlite_db()
        .await
        .expect("Failed to setup test database");
    let auth_state = Arc::new(AuthState::new(Arc::new(db), &test_config()));
    let app = create_auth_router(auth_state.clone()).layer(from_fn_with_state(
        auth_state.clone(),
        auth_user_middleware,
    ));
    (app, auth_state)
}

/// Test helper to create the auth app with a stubbed logged-in user.
async fn create_test_app_with_logged_in_user(
    user_id: i32,
    email: &str,
) -> (axum::Router, Arc<AuthState>) {
    let _ = tracing_subscriber::fmt().try_init();
    let db = common::setup_sqlite_db()
        .await
        .expect("Failed to setup test database");
    let auth_state = Arc::new(AuthState::new(Arc::new(db), &test_config()));
    let app = create_auth_router(auth_state.clone())
        .layer(from_fn(common::create_stub_user_middleware(user_id, email)));
    (app, auth_state)
}

/// Test helper to register an account directly through the service.
async fn create_test_user(auth_state: &AuthState, email: &str, password: &str) {
    UserService::new(&auth_state.db)
        .create_user(email, password)
        .await
        .expect("Failed to create test user");
}

#[tokio::test]
async fn can_sign_up_new_user() {
    let (app, auth_state) = create_test_app().await;

    let request = Request::builder()
        .method("POST")
        .uri("/signup")
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from("email=ana%40example.com&password=secret1"))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body_text = std::str::from_utf8(&body).unwrap();

    assert_eq!(status, StatusCode::OK);
    assert!(body_text.contains("Account created"));
    assert!(body_text.contains("ana@example.com"));

    let user = UserService::new(&auth_state.db)
        .get_user_by_email("ana@example.com")
        .await
        .expect("Signed-up user is missing");
    assert_eq!(user.email(), "ana@example.com");
}

#[tokio::test]
async fn can_reject_signup_with_weak_password() {
    let (app, _auth_state) = create_test_app().await;

    let request = Request::builder()
        .method("POST")
        .uri("/signup")
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from("email=ana%40example.com&password=short"))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body_text = std::str::from_utf8(&body).unwrap();

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers.get("hx-retarget").unwrap(), "#signup-message");
    assert_eq!(headers.get("hx-reswap").unwrap(), "outerHTML");
    assert!(body_text.contains("Password must be at least 6 characters long"));
}

#[tokio::test]
async fn can_reject_signup_with_taken_email() {
    let (app, auth_state) = create_test_app().await;
    create_test_user(&auth_state, "ana@example.com", "secret1").await;

    let request = Request::builder()
        .method("POST")
        .uri("/signup")
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from("email=ana%40example.com&password=secret2"))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body_text = std::str::from_utf8(&body).unwrap();

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers.get("hx-retarget").unwrap(), "#signup-message");
    assert!(body_text.contains("already exists"));
}

#[tokio::test]
async fn can_login_with_valid_credentials() {
    let (app, auth_state) = create_test_app().await;
    create_test_user(&auth_state, "ana@example.com", "secret1").await;

    let request = Request::builder()
        .method("POST")
        .uri("/login")
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from("email=ana%40example.com&password=secret1"))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body_text = std::str::from_utf8(&body).unwrap();

    assert_eq!(status, StatusCode::OK);
    assert!(body_text.contains("Welcome back, ana!"));

    let cookie = headers
        .get("set-cookie")
        .expect("Login did not set a cookie")
        .to_str()
        .unwrap();
    assert!(cookie.starts_with("auth_token="));
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("SameSite=Lax"));
}

#[tokio::test]
async fn can_reject_invalid_credentials() {
    let (app, auth_state) = create_test_app().await;
    create_test_user(&auth_state, "ana@example.com", "secret1").await;

    let request = Request::builder()
        .method("POST")
        .uri("/login")
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from("email=ana%40example.com&password=wrong"))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body_text = std::str::from_utf8(&body).unwrap();

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers.get("hx-retarget").unwrap(), "#login-message");
    assert_eq!(headers.get("hx-reswap").unwrap(), "outerHTML");
    assert!(body_text.contains("Invalid email or password."));
    assert!(headers.get("set-cookie").is_none());
}

#[tokio::test]
async fn can_return_success_when_already_logged_in() {
    let (app, auth_state) = create_test_app().await;
    create_test_user(&auth_state, "ana@example.com", "secret1").await;

    let jwt_token = encode_jwt(1, "ana@example.com", &auth_state.jwt_secret)
        .await
        .unwrap();

    let request = Request::builder()
        .method("POST")
        .uri("/login")
        .header("content-type", "application/x-www-form-urlencoded")
        .header("cookie", format!("auth_token={}", jwt_token))
        .body(Body::from("email=ana%40example.com&password=secret1"))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body_text = std::str::from_utf8(&body).unwrap();

    assert_eq!(status, StatusCode::OK);
    assert!(body_text.contains("Welcome back, ana!"));
}

#[tokio::test]
async fn can_display_login_page() {
    let (app, _auth_state) = create_test_app().await;

    let request = Request::builder()
        .method("GET")
        .uri("/login")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body_text = std::str::from_utf8(&body).unwrap();

    assert_eq!(status, StatusCode::OK);
    assert!(body_text.contains("id=\"login-form\""));
    assert!(body_text.contains("Forgot your password?"));
}

#[tokio::test]
async fn can_display_login_page_for_logged_in_user() {
    let (app, _auth_state) = create_test_app_with_logged_in_user(1, "ana@example.com").await;

    let request = Request::builder()
        .method("GET")
        .uri("/login")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body_text = std::str::from_utf8(&body).unwrap();

    assert_eq!(status, StatusCode::OK);
    assert!(body_text.contains("Already signed in"));
    assert!(body_text.contains("ana"));
    assert!(!body_text.contains("id=\"login-form\""));
}

#[tokio::test]
async fn can_request_password_reset() {
    let (app, auth_state) = create_test_app().await;
    create_test_user(&auth_state, "ana@example.com", "secret1").await;

    let request = Request::builder()
        .method("POST")
        .uri("/forgot-password")
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from("email=ana%40example.com"))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body_text = std::str::from_utf8(&body).unwrap();

    assert_eq!(status, StatusCode::OK);
    assert!(body_text.contains("Reset link sent"));
    assert!(body_text.contains("ana@example.com"));
}

#[tokio::test]
async fn can_reject_password_reset_for_unknown_email() {
    let (app, _auth_state) = create_test_app().await;

    let request = Request::builder()
        .method("POST")
        .uri("/forgot-password")
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from("email=nobody%40example.com"))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body_text = std::str::from_utf8(&body).unwrap();

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        headers.get("hx-retarget").unwrap(),
        "#forgot-password-message"
    );
    assert!(body_text.contains("No account found"));
}

#[tokio::test]
async fn can_logout_and_clear_session_cookie() {
    let (app, _auth_state) = create_test_app().await;

    let request = Request::builder()
        .method("POST")
        .uri("/logout")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers().get("location").unwrap(), "/login");
    let cookie = response
        .headers()
        .get("set-cookie")
        .expect("Logout did not clear the cookie")
        .to_str()
        .unwrap();
    assert!(cookie.starts_with("auth_token="));
    assert!(cookie.contains("Max-Age=0"));
}
