use askama::Template;
use axum::{
    Form, Router,
    extract::{Extension, Multipart, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
};
use axum_extra::extract::CookieJar;
use serde::Deserialize;
use std::sync::Arc;

use crate::auth::CurrentUser;
use crate::media::{self, AvatarStore, MediaError};
use crate::user::{User, UserService, UserServiceError};

#[derive(Debug, Deserialize)]
pub struct EditProfileForm {
    display_name: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteAccountForm {
    password: String,
}

#[derive(Clone)]
pub struct UserState {
    pub db: Arc<sea_orm::DatabaseConnection>,
    pub avatars: Arc<dyn AvatarStore>,
}

/// Custom error type for profile and settings handler operations.
#[derive(Debug, thiserror::Error)]
enum UserError {
    /// Represents an error during template rendering.
    #[error("Template rendering failed")]
    Template(#[from] askama::Error),
    /// Represents a user service error.
    #[error("User service error")]
    Service(#[from] UserServiceError),
    /// Represents an avatar storage error.
    #[error("Avatar storage error")]
    Media(#[from] MediaError),
}

impl axum::response::IntoResponse for UserError {
    fn into_response(self) -> axum::response::Response {
        let user_facing_error_message =
            "An unexpected error occurred while processing your request. Please try again later.";
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Html(format!(
                "<h1>Internal Server Error</h1><p>{}</p>",
                user_facing_error_message
            )),
        )
            .into_response()
    }
}

/// Builds an error-fragment response that HTMX swaps into the given message
/// area instead of the form's usual target.
fn error_fragment_response(status: StatusCode, html: String, target: &'static str) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(
        HeaderName::from_static("hx-retarget"),
        HeaderValue::from_static(target),
    );
    headers.insert(
        HeaderName::from_static("hx-reswap"),
        HeaderValue::from_static("innerHTML"),
    );

    let mut response = (status, Html(html)).into_response();
    response.headers_mut().extend(headers);
    response
}

#[derive(Template)]
#[template(path = "settings.html")]
struct SettingsTemplate {
    user: User,
}

impl SettingsTemplate {
    pub fn new(user: User) -> Self {
        Self { user }
    }
}

#[derive(Template)]
#[template(path = "profile_edit.html")]
struct ProfileEditTemplate {
    user: User,
}

impl ProfileEditTemplate {
    pub fn new(user: User) -> Self {
        Self { user }
    }
}

#[derive(Template)]
#[template(path = "profile/profile_form.html")]
struct ProfileFormTemplate {
    user: User,
}

impl ProfileFormTemplate {
    pub fn new(user: User) -> Self {
        Self { user }
    }
}

#[derive(Template)]
#[template(path = "users/error_message.html")]
struct ErrorMessageTemplate {
    message: String,
}

impl ErrorMessageTemplate {
    pub fn new(message: String) -> Self {
        Self { message }
    }
}

/// Handler for the /settings page.
#[tracing::instrument(skip(state))]
async fn settings_page_handler(
    State(state): State<Arc<UserState>>,
    Extension(current_user): Extension<CurrentUser>,
) -> Result<Html<String>, UserError> {
    let service = UserService::new(&state.db);
    let user = service.get_user_by_id(current_user.id).await?;

    let template = SettingsTemplate::new(user);
    template.render().map(Html).map_err(UserError::from)
}

/// Handler for the /profile/edit page.
#[tracing::instrument(skip(state))]
async fn profile_edit_page_handler(
    State(state): State<Arc<UserState>>,
    Extension(current_user): Extension<CurrentUser>,
) -> Result<Html<String>, UserError> {
    let service = UserService::new(&state.db);
    let user = service.get_user_by_id(current_user.id).await?;

    let template = ProfileEditTemplate::new(user);
    template.render().map(Html).map_err(UserError::from)
}

/// Handler for updating the display name via PUT request.
/// Returns the refreshed profile form fragment.
#[tracing::instrument(skip(state))]
async fn update_profile_handler(
    State(state): State<Arc<UserState>>,
    Extension(current_user): Extension<CurrentUser>,
    Form(form): Form<EditProfileForm>,
) -> Result<Html<String>, UserError> {
    let service = UserService::new(&state.db);
    let user = service
        .update_profile(current_user.id, Some(form.display_name), None)
        .await?;

    let template = ProfileFormTemplate::new(user);
    template.render().map(Html).map_err(UserError::from)
}

/// Handler for uploading a new avatar via multipart POST request.
/// Stores the image, records its URL on the profile, and returns the
/// refreshed profile form fragment.
#[tracing::instrument(skip(state, multipart))]
async fn upload_avatar_handler(
    State(state): State<Arc<UserState>>,
    Extension(current_user): Extension<CurrentUser>,
    mut multipart: Multipart,
) -> Result<Response, UserError> {
    match media::read_avatar_upload(&mut multipart).await {
        Ok((ext, bytes)) => {
            let photo_url = state.avatars.store(current_user.id, ext, &bytes).await?;

            let service = UserService::new(&state.db);
            let user = service
                .update_profile(current_user.id, None, Some(photo_url))
                .await?;

            let template = ProfileFormTemplate::new(user);
            let html = template.render().map_err(UserError::from)?;
            Ok(Html(html).into_response())
        }
        Err(MediaError::Io(err)) => Err(UserError::Media(MediaError::Io(err))),
        Err(err) => {
            let (status, message) = match &err {
                MediaError::UnsupportedType(_) => (
                    StatusCode::UNSUPPORTED_MEDIA_TYPE,
                    "Choose a JPEG, PNG, or WebP image.",
                ),
                _ => (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "Choose an image to upload.",
                ),
            };

            let html = ErrorMessageTemplate::new(message.to_string())
                .render()
                .map_err(UserError::from)?;
            Ok(error_fragment_response(status, html, "#profile-message"))
        }
    }
}

/// Handler for deleting the account via POST request.
/// The current password is required; on success the session cookie is
/// cleared and HTMX is told to navigate to the login page.
#[tracing::instrument(skip(state, jar, form))]
async fn delete_account_handler(
    State(state): State<Arc<UserState>>,
    Extension(current_user): Extension<CurrentUser>,
    jar: CookieJar,
    Form(form): Form<DeleteAccountForm>,
) -> Result<(CookieJar, Response), UserError> {
    let service = UserService::new(&state.db);
    match service.delete_account(current_user.id, &form.password).await {
        Ok(deleted) => {
            // The account row is already gone; avatar removal is best effort.
            if let Err(err) = state.avatars.remove(deleted.id()).await {
                tracing::warn!(
                    user_id = deleted.id(),
                    error = %err,
                    "could not remove avatar of deleted account"
                );
            }
            tracing::info!(user_id = deleted.id(), "account deleted");

            let cookie = axum_extra::extract::cookie::Cookie::build(("auth_token", ""))
                .path("/")
                .build();

            let mut response = StatusCode::OK.into_response();
            response.headers_mut().insert(
                HeaderName::from_static("hx-redirect"),
                HeaderValue::from_static("/login"),
            );
            Ok((jar.remove(cookie), response))
        }
        Err(UserServiceError::InvalidCredentials) => {
            let html = ErrorMessageTemplate::new(
                "Password does not match. Enter your current password to delete the account."
                    .to_string(),
            )
            .render()
            .map_err(UserError::from)?;

            Ok((
                jar,
                error_fragment_response(
                    StatusCode::UNPROCESSABLE_ENTITY,
                    html,
                    "#settings-message",
                ),
            ))
        }
        Err(err) => Err(UserError::Service(err)),
    }
}

/// Creates and returns the router with the profile and settings routes.
pub fn create_user_router(state: Arc<UserState>) -> Router {
    Router::new()
        .route("/settings", get(settings_page_handler))
        .route(
            "/settings/delete-account",
            axum::routing::post(delete_account_handler),
        )
        .route("/profile/edit", get(profile_edit_page_handler))
        .route("/profile", axum::routing::put(update_profile_handler))
        .route(
            "/profile/avatar",
            axum::routing::post(upload_avatar_handler),
        )
        .with_state(state)
}
