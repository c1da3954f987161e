use crate::auth::CurrentUser;
use crate::task::web::TaskState;
use crate::task::{Task, TaskService, TaskServiceError, day_bounds};
use crate::web::api::v1::ErrorResponse;
use axum::{
    Json, Router,
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    routing::get,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

/// JSON representation of a task for API responses.
#[derive(Debug, Serialize, ToSchema)]
pub struct TaskJson {
    /// Unique identifier for the task
    id: i32,
    /// ID of the owning user
    owner_id: i32,
    /// Title of the task
    title: String,
    /// Description of the task
    description: String,
    /// When the task is due
    deadline: DateTime<Utc>,
    /// Whether the task is marked completed
    completed: bool,
    /// When the task was first created
    created_at: DateTime<Utc>,
}

impl From<Task> for TaskJson {
    fn from(task: Task) -> Self {
        Self {
            id: task.id(),
            owner_id: task.owner_id(),
            title: task.title().to_string(),
            description: task.description().to_string(),
            deadline: task.deadline(),
            completed: task.completed(),
            created_at: task.created_at(),
        }
    }
}

/// API response for listing the tasks in a range.
#[derive(Debug, Serialize, ToSchema)]
pub struct TasksResponse {
    /// Tasks whose deadline falls inside the range, ordered by deadline
    tasks: Vec<TaskJson>,
    /// Total number of tasks returned
    count: usize,
}

/// API response for completing a task.
#[derive(Debug, Serialize, ToSchema)]
pub struct CompleteTaskResponse {
    /// Snapshot of the completed task; its row is already deleted
    task: TaskJson,
    /// Instant the undo window closes
    undo_expires_at: DateTime<Utc>,
}

/// JSON request payload for creating a task.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateTaskRequest {
    /// Title of the task, must be non-empty
    title: String,
    /// Description of the task, must be non-empty
    description: String,
    /// When the task is due
    deadline: DateTime<Utc>,
}

/// JSON request payload for editing a task.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateTaskRequest {
    /// Replacement title, must be non-empty
    title: String,
    /// Replacement description, must be non-empty
    description: String,
    /// Replacement deadline
    deadline: DateTime<Utc>,
}

/// Query parameters selecting the deadline range to list.
/// Either `date` or both `from` and `to` must be given.
#[derive(Debug, Deserialize, ToSchema)]
pub struct TasksQuery {
    /// Calendar date expanded to its full UTC day
    #[serde(default)]
    date: Option<NaiveDate>,
    /// Start of the range, inclusive
    #[serde(default)]
    from: Option<DateTime<Utc>>,
    /// End of the range, inclusive
    #[serde(default)]
    to: Option<DateTime<Utc>>,
}

/// Maps a task service error to the JSON error response for it.
/// Unexpected failures are logged and collapsed into a generic 500.
fn task_error_response(err: TaskServiceError) -> (StatusCode, Json<ErrorResponse>) {
    let (status, code) = match &err {
        TaskServiceError::TaskNotFound(_) => (StatusCode::NOT_FOUND, "TASK_NOT_FOUND"),
        TaskServiceError::EmptyTitle => (StatusCode::UNPROCESSABLE_ENTITY, "EMPTY_TITLE"),
        TaskServiceError::EmptyDescription => {
            (StatusCode::UNPROCESSABLE_ENTITY, "EMPTY_DESCRIPTION")
        }
        TaskServiceError::Database(_) => {
            tracing::error!(error = %err, "task service operation failed");
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

/// Handler for GET /api/v1/tasks - Returns the tasks in a deadline range.
/// There is no unbounded listing: a request with neither `date` nor a
/// `from`/`to` pair is rejected.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/api/v1/tasks",
    params(
        ("date" = Option<NaiveDate>, Query, description = "Calendar date expanded to its full UTC day"),
        ("from" = Option<DateTime<Utc>>, Query, description = "Start of the range, inclusive"),
        ("to" = Option<DateTime<Utc>>, Query, description = "End of the range, inclusive")
    ),
    responses(
        (status = 200, description = "Successfully retrieved tasks", body = TasksResponse),
        (status = 400, description = "No range given", body = ErrorResponse),
        (status = 401, description = "Authentication required", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Tasks"
)]
pub async fn get_tasks_handler(
    State(state): State<Arc<TaskState>>,
    Extension(current_user): Extension<CurrentUser>,
    Query(query): Query<TasksQuery>,
) -> Result<Json<TasksResponse>, (StatusCode, Json<ErrorResponse>)> {
    let (from, to) = match (query.date, query.from, query.to) {
        (Some(date), None, None) => day_bounds(date),
        (None, Some(from), Some(to)) => (from, to),
        _ => {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new(
                    "MISSING_RANGE",
                    "Provide either date or both from and to",
                )),
            ));
        }
    };

    let service = TaskService::new(&state.db);
    let tasks = service
        .tasks_in_range(current_user.id, from, to)
        .await
        .map_err(task_error_response)?;

    let tasks: Vec<TaskJson> = tasks.into_iter().map(TaskJson::from).collect();
    let count = tasks.len();

    Ok(Json(TasksResponse { tasks, count }))
}

/// Handler for POST /api/v1/tasks - Creates a new task.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    post,
    path = "/api/v1/tasks",
    request_body = CreateTaskRequest,
    responses(
        (status = 201, description = "Task created", body = TaskJson),
        (status = 401, description = "Authentication required", body = ErrorResponse),
        (status = 422, description = "Blank title or description", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Tasks"
)]
pub async fn create_task_handler(
    State(state): State<Arc<TaskState>>,
    Extension(current_user): Extension<CurrentUser>,
    Json(payload): Json<CreateTaskRequest>,
) -> Result<(StatusCode, Json<TaskJson>), (StatusCode, Json<ErrorResponse>)> {
    let service = TaskService::new(&state.db);
    let task = service
        .create_task(
            current_user.id,
            payload.title,
            payload.description,
            payload.deadline,
        )
        .await
        .map_err(task_error_response)?;

    Ok((StatusCode::CREATED, Json(TaskJson::from(task))))
}

/// Handler for GET /api/v1/tasks/{id} - Returns a single task.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/api/v1/tasks/{id}",
    params(("id" = i32, Path, description = "ID of the task")),
    responses(
        (status = 200, description = "Successfully retrieved task", body = TaskJson),
        (status = 401, description = "Authentication required", body = ErrorResponse),
        (status = 404, description = "No such task for this user", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Tasks"
)]
pub async fn get_task_handler(
    State(state): State<Arc<TaskState>>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i32>,
) -> Result<Json<TaskJson>, (StatusCode, Json<ErrorResponse>)> {
    let service = TaskService::new(&state.db);
    let task = service
        .get_task(current_user.id, id)
        .await
        .map_err(task_error_response)?;

    Ok(Json(TaskJson::from(task)))
}

/// Handler for PUT /api/v1/tasks/{id} - Edits title, description, and deadline.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    put,
    path = "/api/v1/tasks/{id}",
    params(("id" = i32, Path, description = "ID of the task")),
    request_body = UpdateTaskRequest,
    responses(
        (status = 200, description = "Task updated", body = TaskJson),
        (status = 401, description = "Authentication required", body = ErrorResponse),
        (status = 404, description = "No such task for this user", body = ErrorResponse),
        (status = 422, description = "Blank title or description", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Tasks"
)]
pub async fn update_task_handler(
    State(state): State<Arc<TaskState>>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateTaskRequest>,
) -> Result<Json<TaskJson>, (StatusCode, Json<ErrorResponse>)> {
    let service = TaskService::new(&state.db);
    let task = service
        .update_task(
            current_user.id,
            id,
            payload.title,
            payload.description,
            payload.deadline,
        )
        .await
        .map_err(task_error_response)?;

    Ok(Json(TaskJson::from(task)))
}

/// Handler for DELETE /api/v1/tasks/{id} - Deletes a task outright.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    delete,
    path = "/api/v1/tasks/{id}",
    params(("id" = i32, Path, description = "ID of the task")),
    responses(
        (status = 204, description = "Task deleted"),
        (status = 401, description = "Authentication required", body = ErrorResponse),
        (status = 404, description = "No such task for this user", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Tasks"
)]
pub async fn delete_task_handler(
    State(state): State<Arc<TaskState>>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i32>,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    let service = TaskService::new(&state.db);
    service
        .delete_task(current_user.id, id)
        .await
        .map_err(task_error_response)?;

    Ok(StatusCode::NO_CONTENT)
}

/// Handler for POST /api/v1/tasks/{id}/complete - Completes a task.
/// The row is deleted and a snapshot is parked for the undo window.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    post,
    path = "/api/v1/tasks/{id}/complete",
    params(("id" = i32, Path, description = "ID of the task")),
    responses(
        (status = 200, description = "Task completed", body = CompleteTaskResponse),
        (status = 401, description = "Authentication required", body = ErrorResponse),
        (status = 404, description = "No such task for this user", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Tasks"
)]
pub async fn complete_task_handler(
    State(state): State<Arc<TaskState>>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i32>,
) -> Result<Json<CompleteTaskResponse>, (StatusCode, Json<ErrorResponse>)> {
    let service = TaskService::new(&state.db);
    let snapshot = service
        .complete_task(current_user.id, id)
        .await
        .map_err(task_error_response)?;

    let undo_expires_at = Arc::clone(&state.undo)
        .stash(current_user.id, snapshot.clone())
        .await;

    Ok(Json(CompleteTaskResponse {
        task: TaskJson::from(snapshot),
        undo_expires_at,
    }))
}

/// Handler for POST /api/v1/tasks/undo - Restores the last completed task.
/// Works only while the undo window is open; the restored task gets a new ID.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    post,
    path = "/api/v1/tasks/undo",
    responses(
        (status = 200, description = "Task restored", body = TaskJson),
        (status = 401, description = "Authentication required", body = ErrorResponse),
        (status = 410, description = "Nothing to undo", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Tasks"
)]
pub async fn undo_task_handler(
    State(state): State<Arc<TaskState>>,
    Extension(current_user): Extension<CurrentUser>,
) -> Result<Json<TaskJson>, (StatusCode, Json<ErrorResponse>)> {
    match state.undo.take(current_user.id).await {
        Some(snapshot) => {
            let service = TaskService::new(&state.db);
            let restored = service
                .restore_task(&snapshot)
                .await
                .map_err(task_error_response)?;
            Ok(Json(TaskJson::from(restored)))
        }
        None => Err((
            StatusCode::GONE,
            Json(ErrorResponse::new(
                "NOTHING_TO_UNDO",
                "There is no recently completed task to restore",
            )),
        )),
    }
}

/// Creates a JSON API router for the task endpoints.
pub fn create_api_router(state: Arc<TaskState>) -> Router {
    Router::new()
        .route("/tasks", get(get_tasks_handler).post(create_task_handler))
        .route("/tasks/undo", axum::routing::post(undo_task_handler))
        .route(
            "/tasks/{id}",
            get(get_task_handler)
                .put(update_task_handler)
                .delete(delete_task_handler),
        )
        .route(
            "/tasks/{id}/complete",
            axum::routing::post(complete_task_handler),
        )
        .with_state(state)
}
