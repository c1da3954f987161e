use serde::Serialize;
use utoipa::{OpenApi, ToSchema};

/// JSON response for API errors.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Stable machine-readable error code
    error: String,
    /// Human-readable explanation of the failure
    message: String,
}

impl ErrorResponse {
    pub fn new(error: &str, message: &str) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
        }
    }
}

/// JSON response carrying a plain confirmation message.
#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    /// Human-readable confirmation message
    message: String,
}

impl MessageResponse {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

/// OpenAPI document for the v1 JSON API, served by Swagger UI.
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::auth::api::v1::register_handler,
        crate::auth::api::v1::json_login_handler,
        crate::auth::api::v1::password_reset_handler,
        crate::auth::api::v1::confirm_password_reset_handler,
        crate::user::api::v1::get_profile_handler,
        crate::user::api::v1::update_profile_handler,
        crate::user::api::v1::upload_avatar_handler,
        crate::user::api::v1::delete_account_handler,
        crate::task::api::v1::get_tasks_handler,
        crate::task::api::v1::create_task_handler,
        crate::task::api::v1::get_task_handler,
        crate::task::api::v1::update_task_handler,
        crate::task::api::v1::delete_task_handler,
        crate::task::api::v1::complete_task_handler,
        crate::task::api::v1::undo_task_handler
    ),
    components(schemas(
        ErrorResponse,
        MessageResponse,
        crate::auth::api::v1::RegisterRequest,
        crate::auth::api::v1::JsonLoginRequest,
        crate::auth::api::v1::LoginResponse,
        crate::auth::api::v1::PasswordResetRequest,
        crate::auth::api::v1::ConfirmResetRequest,
        crate::user::api::v1::UserJson,
        crate::user::api::v1::UpdateProfileRequest,
        crate::user::api::v1::AvatarResponse,
        crate::user::api::v1::DeleteAccountRequest,
        crate::task::api::v1::TaskJson,
        crate::task::api::v1::TasksResponse,
        crate::task::api::v1::CompleteTaskResponse,
        crate::task::api::v1::CreateTaskRequest,
        crate::task::api::v1::UpdateTaskRequest
    )),
    tags(
        (name = "Auth", description = "Registration, login, and password reset"),
        (name = "Profile", description = "Profile and account management"),
        (name = "Tasks", description = "Task management and the completion undo window")
    )
)]
pub struct ApiDoc;
