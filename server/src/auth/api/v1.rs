use crate::auth::{AuthState, CurrentUser, decode_jwt, encode_jwt};
use crate::user::api::v1::UserJson;
use crate::user::{UserService, UserServiceError};
use crate::web::api::v1::{ErrorResponse, MessageResponse};
use axum::{
    Json, Router,
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

/// JSON request payload for account registration.
#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    /// Email address to register
    email: String,
    /// Password, at least 6 characters
    password: String,
}

/// JSON request payload for API login.
#[derive(Debug, Deserialize, ToSchema)]
pub struct JsonLoginRequest {
    /// Email address of the account
    email: String,
    /// Password of the account
    password: String,
}

/// JSON response for successful API login.
#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    /// Bearer token for subsequent API requests
    token: String,
    /// The authenticated user
    user: UserJson,
}

/// JSON request payload for requesting a password reset.
#[derive(Debug, Deserialize, ToSchema)]
pub struct PasswordResetRequest {
    /// Email address of the account to reset
    email: String,
}

/// JSON request payload for confirming a password reset.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ConfirmResetRequest {
    /// Reset token previously issued for the account
    token: String,
    /// Replacement password, at least 6 characters
    new_password: String,
}

/// Maps a user service error to the JSON error response for it.
/// Unexpected failures are logged and collapsed into a generic 500.
pub(crate) fn service_error_response(err: UserServiceError) -> (StatusCode, Json<ErrorResponse>) {
    let (status, code) = match &err {
        UserServiceError::EmailTaken(_) => (StatusCode::CONFLICT, "EMAIL_TAKEN"),
        UserServiceError::InvalidEmail(_) => (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_EMAIL"),
        UserServiceError::WeakPassword => (StatusCode::UNPROCESSABLE_ENTITY, "WEAK_PASSWORD"),
        UserServiceError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "INVALID_CREDENTIALS"),
        UserServiceError::UnknownEmail(_) => (StatusCode::NOT_FOUND, "UNKNOWN_EMAIL"),
        UserServiceError::UserNotFound(_) => (StatusCode::NOT_FOUND, "USER_NOT_FOUND"),
        UserServiceError::InvalidResetToken => {
            (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_RESET_TOKEN")
        }
        UserServiceError::PasswordHash(_) | UserServiceError::Database(_) => {
            tracing::error!(error = %err, "user service operation failed");
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

/// Creates a JSON API router for the authentication endpoints.
pub fn create_api_router(state: Arc<AuthState>) -> Router<()> {
    Router::new()
        .route("/register", axum::routing::post(register_handler))
        .route("/login", axum::routing::post(json_login_handler))
        .route(
            "/password-reset",
            axum::routing::post(password_reset_handler),
        )
        .route(
            "/password-reset/confirm",
            axum::routing::post(confirm_password_reset_handler),
        )
        .with_state(state)
}

/// API authentication middleware that extracts the current user from Authorization Bearer header.
/// Sets the CurrentUser extension if a valid JWT token is found in the Authorization header.
pub async fn auth_user_middleware(
    State(state): State<Arc<AuthState>>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(auth_header) = headers.get("authorization") {
        if let Ok(auth_str) = auth_header.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                if let Ok(claims) = decode_jwt(token, &state.jwt_secret).await {
                    if let Ok(user_id) = claims.sub.parse::<i32>() {
                        let current_user = CurrentUser::new(user_id, claims.email);
                        request.extensions_mut().insert(current_user);
                    }
                }
            }
        }
    }

    next.run(request).await
}

/// Middleware that ensures the current user is authenticated.
/// Returns UNAUTHORIZED if the CurrentUser extension is not found in the request.
/// This middleware should be applied after auth_user_middleware.
pub async fn require_auth_middleware(request: Request, next: Next) -> Response {
    // Check if user is authenticated by looking for CurrentUser extension
    let is_authenticated = request.extensions().get::<CurrentUser>().is_some();

    if !is_authenticated {
        let error_response = ErrorResponse::new(
            "UNAUTHORIZED",
            "Authentication required to access this resource",
        );
        return (StatusCode::UNAUTHORIZED, Json(error_response)).into_response();
    }

    next.run(request).await
}

/// Handler for POST /api/v1/register - Creates a new account.
/// No session is issued; the client logs in afterwards.
#[tracing::instrument(skip(state, payload))]
#[utoipa::path(
    post,
    path = "/api/v1/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = UserJson),
        (status = 409, description = "Email already registered", body = ErrorResponse),
        (status = 422, description = "Invalid email or weak password", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Auth"
)]
pub async fn register_handler(
    State(state): State<Arc<AuthState>>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserJson>), (StatusCode, Json<ErrorResponse>)> {
    let service = UserService::new(&state.db);
    let user = service
        .create_user(&payload.email, &payload.password)
        .await
        .map_err(service_error_response)?;

    Ok((StatusCode::CREATED, Json(UserJson::from(user))))
}

/// Handles JSON login requests and returns a JWT token with the user.
/// Validates credentials and returns either a success response or an error.
#[tracing::instrument(skip(state, payload))]
#[utoipa::path(
    post,
    path = "/api/v1/login",
    request_body = JsonLoginRequest,
    responses(
        (status = 200, description = "Successfully authenticated", body = LoginResponse),
        (status = 401, description = "Invalid email or password", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Auth"
)]
pub async fn json_login_handler(
    State(state): State<Arc<AuthState>>,
    Json(payload): Json<JsonLoginRequest>,
) -> Result<Json<LoginResponse>, (StatusCode, Json<ErrorResponse>)> {
    let service = UserService::new(&state.db);
    let user = service
        .authenticate(&payload.email, &payload.password)
        .await
        .map_err(service_error_response)?;

    // Generate JWT token
    let token = encode_jwt(user.id(), user.email(), &state.jwt_secret)
        .await
        .map_err(|_| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new(
                    "JWT_ERROR",
                    "Failed to generate authentication token",
                )),
            )
        })?;

    Ok(Json(LoginResponse {
        token,
        user: UserJson::from(user),
    }))
}

/// Handler for POST /api/v1/password-reset - Issues a reset token.
/// The token is logged for out-of-band delivery; there is no mail integration.
#[tracing::instrument(skip(state, payload))]
#[utoipa::path(
    post,
    path = "/api/v1/password-reset",
    request_body = PasswordResetRequest,
    responses(
        (status = 200, description = "Reset token issued", body = MessageResponse),
        (status = 404, description = "No account with that email", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Auth"
)]
pub async fn password_reset_handler(
    State(state): State<Arc<AuthState>>,
    Json(payload): Json<PasswordResetRequest>,
) -> Result<Json<MessageResponse>, (StatusCode, Json<ErrorResponse>)> {
    let service = UserService::new(&state.db);
    let reset = service
        .create_password_reset(&payload.email)
        .await
        .map_err(service_error_response)?;

    tracing::info!(
        email = %payload.email,
        token = %reset.token(),
        expires_at = %reset.expires_at(),
        "password reset token issued, deliver to the user out of band"
    );

    Ok(Json(MessageResponse::new(
        "Password reset token issued; delivery happens out of band",
    )))
}

/// Handler for POST /api/v1/password-reset/confirm - Consumes a reset token
/// and stores the replacement password.
#[tracing::instrument(skip(state, payload))]
#[utoipa::path(
    post,
    path = "/api/v1/password-reset/confirm",
    request_body = ConfirmResetRequest,
    responses(
        (status = 200, description = "Password replaced", body = UserJson),
        (status = 422, description = "Invalid or expired token, or weak password", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Auth"
)]
pub async fn confirm_password_reset_handler(
    State(state): State<Arc<AuthState>>,
    Json(payload): Json<ConfirmResetRequest>,
) -> Result<Json<UserJson>, (StatusCode, Json<ErrorResponse>)> {
    let service = UserService::new(&state.db);
    let user = service
        .reset_password(&payload.token, &payload.new_password)
        .await
        .map_err(service_error_response)?;

    Ok(Json(UserJson::from(user)))
}
