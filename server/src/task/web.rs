use askama::Template;
use axum::{
    Form, Router,
    extract::{Extension, Query, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::Html,
    routing::get,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use std::sync::Arc;

use crate::auth::CurrentUser;
use crate::task::undo::UndoStash;
use crate::task::{Task, TaskService, TaskServiceError, day_bounds};

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Deserialize)]
pub struct CreateTaskForm {
    title: String,
    description: String,
    deadline: String,
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EditTaskForm {
    title: String,
    description: String,
    deadline: String,
}

/// Query carried by the task fragments so the right day is re-rendered.
#[derive(Debug, Deserialize)]
pub struct RegionQuery {
    date: Option<String>,
}

#[derive(Clone)]
pub struct TaskState {
    pub db: Arc<sea_orm::DatabaseConnection>,
    pub undo: Arc<UndoStash>,
}

/// Custom error type for task handler operations.
#[derive(Debug, thiserror::Error)]
enum TaskError {
    /// Represents an error during template rendering.
    #[error("Template rendering failed")]
    Template(#[from] askama::Error),
    /// Represents a task service error.
    #[error("Task service error")]
    Service(#[from] TaskServiceError),
    /// Represents a date that is not in `YYYY-MM-DD` form.
    #[error("Invalid date: {0}")]
    InvalidDate(String),
    /// Represents a deadline that is not a valid datetime-local value.
    #[error("Invalid deadline: {0}")]
    InvalidDeadline(String),
}

impl axum::response::IntoResponse for TaskError {
    fn into_response(self) -> axum::response::Response {
        let (status_code, user_facing_error_message) = match &self {
            TaskError::Service(TaskServiceError::TaskNotFound(_)) => (
                StatusCode::NOT_FOUND,
                "That task no longer exists. Refresh the list and try again.".to_string(),
            ),
            TaskError::Service(TaskServiceError::EmptyTitle) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "Give the task a title before saving.".to_string(),
            ),
            TaskError::Service(TaskServiceError::EmptyDescription) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "Give the task a description before saving.".to_string(),
            ),
            TaskError::InvalidDate(raw) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                format!("'{}' is not a valid date.", raw),
            ),
            TaskError::InvalidDeadline(raw) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                format!("'{}' is not a valid deadline.", raw),
            ),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "An unexpected error occurred while processing your request. Please try again later."
                    .to_string(),
            ),
        };

        let error_template = ErrorMessageTemplate::new(user_facing_error_message);
        let Ok(rendered) = error_template.render() else {
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        };

        let mut response = (status_code, Html(rendered)).into_response();
        // Add HTMX headers to retarget the error message to the error div
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("hx-reswap"),
            HeaderValue::from_static("innerHTML"),
        );
        response.headers_mut().extend(headers);
        response
    }
}

/// Undo banner contents for the most recently completed task.
struct UndoNotice {
    title: String,
    seconds_left: i64,
}

#[derive(Template)]
#[template(path = "tasks.html")]
struct TasksTemplate {
    date: String,
}

impl TasksTemplate {
    pub fn new(date: String) -> Self {
        Self { date }
    }
}

#[derive(Template)]
#[template(path = "tasks/tasks_region.html")]
struct TasksRegionTemplate {
    date: String,
    undo: Option<UndoNotice>,
    tasks: Vec<Task>,
}

impl TasksRegionTemplate {
    pub fn new(date: String, undo: Option<UndoNotice>, tasks: Vec<Task>) -> Self {
        Self { date, undo, tasks }
    }
}

#[derive(Template)]
#[template(path = "tasks/task_row.html")]
struct TaskRowTemplate {
    task: Task,
    date: String,
}

impl TaskRowTemplate {
    pub fn new(task: Task, date: String) -> Self {
        Self { task, date }
    }
}

#[derive(Template)]
#[template(path = "tasks/add_task_form.html")]
struct AddTaskFormTemplate {
    date: String,
}

impl AddTaskFormTemplate {
    pub fn new(date: String) -> Self {
        Self { date }
    }
}

#[derive(Template)]
#[template(path = "tasks/edit_task_form.html")]
struct EditTaskFormTemplate {
    task: Task,
    date: String,
}

impl EditTaskFormTemplate {
    pub fn new(task: Task, date: String) -> Self {
        Self { task, date }
    }
}

#[derive(Template)]
#[template(path = "tasks/error_message.html")]
struct ErrorMessageTemplate {
    message: String,
}

impl ErrorMessageTemplate {
    pub fn new(message: String) -> Self {
        Self { message }
    }
}

/// Resolves an optional `YYYY-MM-DD` parameter, defaulting to today in UTC.
fn resolve_date(raw: Option<&str>) -> Result<NaiveDate, TaskError> {
    match raw {
        Some(raw) if !raw.trim().is_empty() => NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT)
            .map_err(|_| TaskError::InvalidDate(raw.to_string())),
        _ => Ok(Utc::now().date_naive()),
    }
}

/// Parses the value submitted by a datetime-local input.
fn parse_deadline(raw: &str) -> Result<DateTime<Utc>, TaskError> {
    let trimmed = raw.trim();
    chrono::NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M")
        .or_else(|_| chrono::NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S"))
        .map(|naive| naive.and_utc())
        .map_err(|_| TaskError::InvalidDeadline(raw.to_string()))
}

/// Helper function to render the tasks region for one day: the undo banner
/// (when a completion is still undoable) followed by the day's task table.
/// Every mutating handler returns this fragment so the page stays consistent.
#[tracing::instrument(skip(state))]
async fn render_tasks_region(
    state: &TaskState,
    owner_id: i32,
    date: NaiveDate,
) -> Result<String, TaskError> {
    let task_service = TaskService::new(&state.db);
    let (from, to) = day_bounds(date);
    let tasks = task_service.tasks_in_range(owner_id, from, to).await?;

    let undo = state
        .undo
        .peek(owner_id)
        .await
        .map(|(title, expires_at)| UndoNotice {
            title,
            seconds_left: (expires_at - Utc::now()).num_seconds().max(0),
        });

    let template = TasksRegionTemplate::new(date.format(DATE_FORMAT).to_string(), undo, tasks);
    template.render().map_err(TaskError::from)
}

/// Handler for the /tasks endpoint that displays the day browser page.
#[tracing::instrument]
async fn tasks_page_handler(Query(query): Query<RegionQuery>) -> Result<Html<String>, TaskError> {
    let date = resolve_date(query.date.as_deref())?;
    let template = TasksTemplate::new(date.format(DATE_FORMAT).to_string());
    template.render().map(Html).map_err(TaskError::from)
}

/// Handler for GET /tasks/region that returns the tasks fragment for one day.
#[tracing::instrument(skip(state))]
async fn tasks_region_handler(
    State(state): State<Arc<TaskState>>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<RegionQuery>,
) -> Result<Html<String>, TaskError> {
    let date = resolve_date(query.date.as_deref())?;
    render_tasks_region(&state, user.id, date).await.map(Html)
}

/// Handler for creating a new task via POST request.
#[tracing::instrument(skip(state))]
async fn create_task_handler(
    State(state): State<Arc<TaskState>>,
    Extension(user): Extension<CurrentUser>,
    Form(form): Form<CreateTaskForm>,
) -> Result<Html<String>, TaskError> {
    let deadline = parse_deadline(&form.deadline)?;
    let task_service = TaskService::new(&state.db);
    task_service
        .create_task(user.id, form.title, form.description, deadline)
        .await?;

    let date = resolve_date(form.date.as_deref())?;
    render_tasks_region(&state, user.id, date).await.map(Html)
}

/// Handler for serving the add task form.
#[tracing::instrument]
async fn add_task_form_handler(Query(query): Query<RegionQuery>) -> Result<Html<String>, TaskError> {
    let date = resolve_date(query.date.as_deref())?;
    let template = AddTaskFormTemplate::new(date.format(DATE_FORMAT).to_string());
    template.render().map(Html).map_err(TaskError::from)
}

/// Handler for GET /tasks/{id} that returns a single task row.
#[tracing::instrument(skip(state))]
async fn get_task_row_handler(
    State(state): State<Arc<TaskState>>,
    Extension(user): Extension<CurrentUser>,
    axum::extract::Path(id): axum::extract::Path<i32>,
    Query(query): Query<RegionQuery>,
) -> Result<Html<String>, TaskError> {
    let task_service = TaskService::new(&state.db);
    let task = task_service.get_task(user.id, id).await?;

    let date = resolve_date(query.date.as_deref())?;
    let template = TaskRowTemplate::new(task, date.format(DATE_FORMAT).to_string());
    template.render().map(Html).map_err(TaskError::from)
}

/// Handler for serving the edit task form.
#[tracing::instrument(skip(state))]
async fn edit_task_form_handler(
    State(state): State<Arc<TaskState>>,
    Extension(user): Extension<CurrentUser>,
    axum::extract::Path(id): axum::extract::Path<i32>,
    Query(query): Query<RegionQuery>,
) -> Result<Html<String>, TaskError> {
    let task_service = TaskService::new(&state.db);
    let task = task_service.get_task(user.id, id).await?;

    let date = resolve_date(query.date.as_deref())?;
    let template = EditTaskFormTemplate::new(task, date.format(DATE_FORMAT).to_string());
    template.render().map(Html).map_err(TaskError::from)
}

/// Handler for updating a task via PUT request. Returns just the updated row.
#[tracing::instrument(skip(state))]
async fn update_task_handler(
    State(state): State<Arc<TaskState>>,
    Extension(user): Extension<CurrentUser>,
    axum::extract::Path(id): axum::extract::Path<i32>,
    Query(query): Query<RegionQuery>,
    Form(form): Form<EditTaskForm>,
) -> Result<Html<String>, TaskError> {
    let deadline = parse_deadline(&form.deadline)?;
    let task_service = TaskService::new(&state.db);
    let updated_task = task_service
        .update_task(user.id, id, form.title, form.description, deadline)
        .await?;

    let date = resolve_date(query.date.as_deref())?;
    let template = TaskRowTemplate::new(updated_task, date.format(DATE_FORMAT).to_string());
    template.render().map(Html).map_err(TaskError::from)
}

/// Handler for deleting a task via DELETE request.
#[tracing::instrument(skip(state))]
async fn delete_task_handler(
    State(state): State<Arc<TaskState>>,
    Extension(user): Extension<CurrentUser>,
    axum::extract::Path(id): axum::extract::Path<i32>,
    Query(query): Query<RegionQuery>,
) -> Result<Html<String>, TaskError> {
    let task_service = TaskService::new(&state.db);
    task_service.delete_task(user.id, id).await?;

    let date = resolve_date(query.date.as_deref())?;
    render_tasks_region(&state, user.id, date).await.map(Html)
}

/// Handler for POST /tasks/{id}/complete. Removes the task, parks a snapshot
/// for undo, and returns the region with the undo banner showing.
#[tracing::instrument(skip(state))]
async fn complete_task_handler(
    State(state): State<Arc<TaskState>>,
    Extension(user): Extension<CurrentUser>,
    axum::extract::Path(id): axum::extract::Path<i32>,
    Query(query): Query<RegionQuery>,
) -> Result<Html<String>, TaskError> {
    let task_service = TaskService::new(&state.db);
    let snapshot = task_service.complete_task(user.id, id).await?;
    Arc::clone(&state.undo).stash(user.id, snapshot).await;

    let date = resolve_date(query.date.as_deref())?;
    render_tasks_region(&state, user.id, date).await.map(Html)
}

/// Handler for POST /tasks/undo. Restores the parked snapshot when the window
/// is still open; otherwise just re-renders the region without a banner.
#[tracing::instrument(skip(state))]
async fn undo_task_handler(
    State(state): State<Arc<TaskState>>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<RegionQuery>,
) -> Result<Html<String>, TaskError> {
    if let Some(snapshot) = state.undo.take(user.id).await {
        let task_service = TaskService::new(&state.db);
        task_service.restore_task(&snapshot).await?;
    }

    let date = resolve_date(query.date.as_deref())?;
    render_tasks_region(&state, user.id, date).await.map(Html)
}

/// Creates and returns the task router with all task-related routes.
pub fn create_task_router(state: Arc<TaskState>) -> Router {
    Router::new()
        .route("/tasks", get(tasks_page_handler).post(create_task_handler))
        .route("/tasks/region", get(tasks_region_handler))
        .route("/tasks/add", get(add_task_form_handler))
        .route("/tasks/undo", axum::routing::post(undo_task_handler))
        .route(
            "/tasks/{id}",
            get(get_task_row_handler)
                .put(update_task_handler)
                .delete(delete_task_handler),
        )
        .route("/tasks/{id}/edit", get(edit_task_form_handler))
        .route(
            "/tasks/{id}/complete",
            axum::routing::post(complete_task_handler),
        )
        .with_state(state)
}
