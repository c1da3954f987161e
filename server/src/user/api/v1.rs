use crate::auth::CurrentUser;
use crate::auth::api::v1::service_error_response;
use crate::media::{self, MediaError};
use crate::user::web::UserState;
use crate::user::{User, UserService};
use crate::web::api::v1::ErrorResponse;
use axum::{
    Json, Router,
    extract::{Extension, Multipart, State},
    http::StatusCode,
    routing::get,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

/// JSON representation of a user account for API responses.
#[derive(Debug, Serialize, ToSchema)]
pub struct UserJson {
    /// Unique identifier for the user
    id: i32,
    /// Email address the account is registered under
    email: String,
    /// Display name shown instead of the email prefix, when set
    display_name: Option<String>,
    /// URL path of the uploaded avatar, when set
    photo_url: Option<String>,
    /// When the account was created
    created_at: chrono::DateTime<chrono::Utc>,
}

impl From<User> for UserJson {
    fn from(user: User) -> Self {
        Self {
            id: user.id(),
            email: user.email().to_string(),
            display_name: user.display_name().map(str::to_string),
            photo_url: user.photo_url().map(str::to_string),
            created_at: user.created_at(),
        }
    }
}

/// JSON request payload for updating the profile.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateProfileRequest {
    /// New display name; a blank value clears it
    display_name: String,
}

/// JSON response for a stored avatar.
#[derive(Debug, Serialize, ToSchema)]
pub struct AvatarResponse {
    /// URL path the avatar is served under
    photo_url: String,
}

/// JSON request payload for account deletion.
#[derive(Debug, Deserialize, ToSchema)]
pub struct DeleteAccountRequest {
    /// Current password, required as re-authentication
    password: String,
}

/// Maps an avatar upload error to the JSON error response for it.
fn media_error_response(err: MediaError) -> (StatusCode, Json<ErrorResponse>) {
    let (status, code) = match &err {
        MediaError::UnsupportedType(_) => {
            (StatusCode::UNSUPPORTED_MEDIA_TYPE, "UNSUPPORTED_MEDIA_TYPE")
        }
        MediaError::MissingField => (StatusCode::UNPROCESSABLE_ENTITY, "MISSING_FIELD"),
        MediaError::Multipart(_) => (StatusCode::BAD_REQUEST, "INVALID_MULTIPART"),
        MediaError::Io(_) => {
            tracing::error!(error = %err, "avatar storage failed");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new(
                    "INTERNAL_ERROR",
                    "An unexpected error occurred while processing your request",
                )),
            );
        }
    };

    (status, Json(ErrorResponse::new(code, &err.to_string())))
}

/// Handler for GET /api/v1/profile - Returns the authenticated user's profile.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/api/v1/profile",
    responses(
        (status = 200, description = "Successfully retrieved profile", body = UserJson),
        (status = 401, description = "Authentication required", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Profile"
)]
pub async fn get_profile_handler(
    State(state): State<Arc<UserState>>,
    Extension(current_user): Extension<CurrentUser>,
) -> Result<Json<UserJson>, (StatusCode, Json<ErrorResponse>)> {
    let service = UserService::new(&state.db);
    let user = service
        .get_user_by_id(current_user.id)
        .await
        .map_err(service_error_response)?;

    Ok(Json(UserJson::from(user)))
}

/// Handler for PUT /api/v1/profile - Updates the display name.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    put,
    path = "/api/v1/profile",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Profile updated", body = UserJson),
        (status = 401, description = "Authentication required", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Profile"
)]
pub async fn update_profile_handler(
    State(state): State<Arc<UserState>>,
    Extension(current_user): Extension<CurrentUser>,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<Json<UserJson>, (StatusCode, Json<ErrorResponse>)> {
    let service = UserService::new(&state.db);
    let user = service
        .update_profile(current_user.id, Some(payload.display_name), None)
        .await
        .map_err(service_error_response)?;

    Ok(Json(UserJson::from(user)))
}

/// Handler for POST /api/v1/profile/avatar - Stores a new avatar image.
/// The image arrives as a multipart field named `avatar`.
#[tracing::instrument(skip(state, multipart))]
#[utoipa::path(
    post,
    path = "/api/v1/profile/avatar",
    request_body(content = Vec<u8>, content_type = "multipart/form-data",
        description = "JPEG, PNG, or WebP image in a field named 'avatar'"),
    responses(
        (status = 200, description = "Avatar stored", body = AvatarResponse),
        (status = 401, description = "Authentication required", body = ErrorResponse),
        (status = 415, description = "Not an accepted image format", body = ErrorResponse),
        (status = 422, description = "Missing avatar field", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Profile"
)]
pub async fn upload_avatar_handler(
    State(state): State<Arc<UserState>>,
    Extension(current_user): Extension<CurrentUser>,
    mut multipart: Multipart,
) -> Result<Json<AvatarResponse>, (StatusCode, Json<ErrorResponse>)> {
    let (ext, bytes) = media::read_avatar_upload(&mut multipart)
        .await
        .map_err(media_error_response)?;

    let photo_url = state
        .avatars
        .store(current_user.id, ext, &bytes)
        .await
        .map_err(media_error_response)?;

    let service = UserService::new(&state.db);
    service
        .update_profile(current_user.id, None, Some(photo_url.clone()))
        .await
        .map_err(service_error_response)?;

    Ok(Json(AvatarResponse { photo_url }))
}

/// Handler for DELETE /api/v1/account - Deletes the account.
/// The body carries the current password as re-authentication; deletion
/// cascades to the user's tasks and removes the stored avatar.
#[tracing::instrument(skip(state, payload))]
#[utoipa::path(
    delete,
    path = "/api/v1/account",
    request_body = DeleteAccountRequest,
    responses(
        (status = 204, description = "Account deleted"),
        (status = 401, description = "Password does not match", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Profile"
)]
pub async fn delete_account_handler(
    State(state): State<Arc<UserState>>,
    Extension(current_user): Extension<CurrentUser>,
    Json(payload): Json<DeleteAccountRequest>,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    let service = UserService::new(&state.db);
    let deleted = service
        .delete_account(current_user.id, &payload.password)
        .await
        .map_err(service_error_response)?;

    // The account row is already gone; avatar removal is best effort.
    if let Err(err) = state.avatars.remove(deleted.id()).await {
        tracing::warn!(
            user_id = deleted.id(),
            error = %err,
            "could not remove avatar of deleted account"
        );
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Creates a JSON API router for the profile endpoints.
pub fn create_api_router(state: Arc<UserState>) -> Router {
    Router::new()
        .route(
            "/profile",
            get(get_profile_handler).put(update_profile_handler),
        )
        .route(
            "/profile/avatar",
            axum::routing::post(upload_avatar_handler),
        )
        .route("/account", axum::routing::delete(delete_account_handler))
        .with_state(state)
}
