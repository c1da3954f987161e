use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::middleware::from_fn;
use etask_server::media::FsAvatarStore;
use etask_server::user::UserService;
use etask_server::user::web::{UserState, create_user_router};
use std::sync::Arc;
use tower::ServiceExt;

mod common;

const BOUNDARY: &str = "test-boundary";

pub struct TestContext {
    pub app: axum::Router,
    pub state: Arc<UserState>,
    pub owner_id: i32,
    // Kept so the media directory is not cleaned up mid-test.
    #[allow(dead_code)]
    pub media_dir: tempfile::TempDir,
}

async fn setup() -> anyhow::Result<TestContext> {
    // Allow multiple calls to init for tests.
    let _ = tracing_subscriber::fmt().try_init();
    let db = common::setup_sqlite_db().await?;
    let owner = UserService::new(&db)
        .create_user("owner@example.com", "secret1")
        .await?;
    let media_dir = tempfile::tempdir()?;
    let state = Arc::new(UserState {
        db: Arc::new(db),
        avatars: Arc::new(FsAvatarStore::new(media_dir.path())),
    });
    let app = create_user_router(state.clone()).layer(from_fn(
        common::create_stub_user_middleware(owner.id(), "owner@example.com"),
    ));
    Ok(TestContext {
        app,
        state,
        owner_id: owner.id(),
        media_dir,
    })
}

async fn read_body(response: axum::response::Response) -> String {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    std::str::from_utf8(&body).unwrap().to_string()
}

/// Builds a multipart body with a single field.
fn multipart_body(field_name: &str, content_type: &str, bytes: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"avatar\"\r\n",
            field_name
        )
        .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

#[tokio::test]
async fn can_render_settings_page() {
    let state = setup().await.expect("Failed to setup test context");

    let request = Request::builder()
        .uri("/settings")
        .body(Body::empty())
        .unwrap();

    let response = state.app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body_text = read_body(response).await;
    assert!(body_text.contains("owner@example.com"));
    assert!(body_text.contains("Delete account"));
    assert!(body_text.contains("hx-post=\"/settings/delete-account\""));
    let member_since = regex::Regex::new(r"Member since [A-Z][a-z]+ \d{4}").unwrap();
    assert!(member_since.is_match(&body_text));
}

#[tokio::test]
async fn can_render_profile_edit_page() {
    let state = setup().await.expect("Failed to setup test context");

    let request = Request::builder()
        .uri("/profile/edit")
        .body(Body::empty())
        .unwrap();

    let response = state.app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body_text = read_body(response).await;
    assert!(body_text.contains("id=\"profile-area\""));
    assert!(body_text.contains("hx-put=\"/profile\""));
    assert!(body_text.contains("hx-post=\"/profile/avatar\""));
}

#[tokio::test]
async fn can_update_display_name() {
    let state = setup().await.expect("Failed to setup test context");

    let request = Request::builder()
        .method("PUT")
        .uri("/profile")
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from("display_name=Ana+Maria"))
        .unwrap();

    let response = state.app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body_text = read_body(response).await;
    assert!(body_text.contains("Ana Maria"));

    let user = UserService::new(&state.state.db)
        .get_user_by_id(state.owner_id)
        .await
        .expect("Failed to fetch user");
    assert_eq!(user.display_name(), Some("Ana Maria"));
}

#[tokio::test]
async fn can_clear_display_name_with_blank_input() {
    let state = setup().await.expect("Failed to setup test context");
    UserService::new(&state.state.db)
        .update_profile(state.owner_id, Some("Ana".to_string()), None)
        .await
        .expect("Failed to seed display name");

    let request = Request::builder()
        .method("PUT")
        .uri("/profile")
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from("display_name=%20%20"))
        .unwrap();

    let response = state.app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let user = UserService::new(&state.state.db)
        .get_user_by_id(state.owner_id)
        .await
        .expect("Failed to fetch user");
    assert_eq!(user.display_name(), None);
    assert_eq!(user.display_label(), "owner");
}

#[tokio::test]
async fn can_upload_avatar_and_record_url() {
    let state = setup().await.expect("Failed to setup test context");

    let body = multipart_body("avatar", "image/png", b"fake png bytes");
    let request = Request::builder()
        .method("POST")
        .uri("/profile/avatar")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap();

    let response = state.app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let expected_url = format!("/media/avatars/{}.png", state.owner_id);
    let body_text = read_body(response).await;
    assert!(body_text.contains(&expected_url));

    let stored = state
        .media_dir
        .path()
        .join(format!("avatars/{}.png", state.owner_id));
    assert_eq!(std::fs::read(stored).unwrap(), b"fake png bytes");

    let user = UserService::new(&state.state.db)
        .get_user_by_id(state.owner_id)
        .await
        .expect("Failed to fetch user");
    assert_eq!(user.photo_url(), Some(expected_url.as_str()));
}

#[tokio::test]
async fn can_reject_avatar_with_unsupported_type() {
    let state = setup().await.expect("Failed to setup test context");

    let body = multipart_body("avatar", "application/pdf", b"%PDF-");
    let request = Request::builder()
        .method("POST")
        .uri("/profile/avatar")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap();

    let response = state.app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(
        response.headers().get("hx-retarget").unwrap(),
        "#profile-message"
    );
    let body_text = read_body(response).await;
    assert!(body_text.contains("Choose a JPEG, PNG, or WebP image."));
}

#[tokio::test]
async fn can_reject_upload_without_avatar_field() {
    let state = setup().await.expect("Failed to setup test context");

    let body = multipart_body("something-else", "image/png", b"fake png bytes");
    let request = Request::builder()
        .method("POST")
        .uri("/profile/avatar")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap();

    let response = state.app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body_text = read_body(response).await;
    assert!(body_text.contains("Choose an image to upload."));
}

#[tokio::test]
async fn can_delete_account_with_matching_password() {
    let state = setup().await.expect("Failed to setup test context");

    let request = Request::builder()
        .method("POST")
        .uri("/settings/delete-account")
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from("password=secret1"))
        .unwrap();

    let response = state.app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("hx-redirect").unwrap(), "/login");
    let cookie = response
        .headers()
        .get("set-cookie")
        .expect("Deletion did not clear the cookie")
        .to_str()
        .unwrap();
    assert!(cookie.starts_with("auth_token="));

    let result = UserService::new(&state.state.db)
        .get_user_by_id(state.owner_id)
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn can_reject_account_deletion_with_wrong_password() {
    let state = setup().await.expect("Failed to setup test context");

    let request = Request::builder()
        .method("POST")
        .uri("/settings/delete-account")
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from("password=wrong-password"))
        .unwrap();

    let response = state.app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        response.headers().get("hx-retarget").unwrap(),
        "#settings-message"
    );
    let body_text = read_body(response).await;
    assert!(body_text.contains("Password does not match."));

    UserService::new(&state.state.db)
        .get_user_by_id(state.owner_id)
        .await
        .expect("Account should still exist");
}
