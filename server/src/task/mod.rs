use crate::entities::*;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sea_orm::*;

pub mod api;
pub mod undo;
pub mod web;

#[derive(Debug, PartialEq, Clone, Eq)]
pub struct Task {
    id: i32,
    owner_id: i32,
    title: String,
    description: String,
    deadline: DateTime<Utc>,
    completed: bool,
    created_at: DateTime<Utc>,
}

impl Task {
    pub fn new(
        id: i32,
        owner_id: i32,
        title: String,
        description: String,
        deadline: DateTime<Utc>,
        completed: bool,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            owner_id,
            title,
            description,
            deadline,
            completed,
            created_at,
        }
    }

    /// Returns the ID of the task.
    pub fn id(&self) -> i32 {
        self.id
    }

    /// Returns the ID of the owning user.
    pub fn owner_id(&self) -> i32 {
        self.owner_id
    }

    /// Returns the title of the task.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Returns the description of the task.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the deadline of the task.
    pub fn deadline(&self) -> DateTime<Utc> {
        self.deadline
    }

    /// Returns whether the task is marked completed.
    pub fn completed(&self) -> bool {
        self.completed
    }

    /// Returns when the task was first created.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl From<task::Model> for Task {
    fn from(model: task::Model) -> Self {
        Task::new(
            model.id,
            model.owner_id,
            model.title,
            model.description,
            model.deadline,
            model.completed,
            model.created_at,
        )
    }
}

/// Returns the inclusive UTC bounds of a calendar day,
/// `00:00:00.000` through `23:59:59.999`.
pub fn day_bounds(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = date.and_time(NaiveTime::MIN).and_utc();
    let end = start + chrono::Duration::days(1) - chrono::Duration::milliseconds(1);
    (start, end)
}

/// Error type for TaskService operations.
#[derive(Debug, thiserror::Error)]
pub enum TaskServiceError {
    /// Represents a task that does not exist or belongs to another user.
    #[error("Task with ID {0} not found")]
    TaskNotFound(i32),
    /// Represents a title that is empty after trimming.
    #[error("Task title must not be empty")]
    EmptyTitle,
    /// Represents a description that is empty after trimming.
    #[error("Task description must not be empty")]
    EmptyDescription,
    /// Represents a database error.
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

pub struct TaskService<'a> {
    db: &'a sea_orm::DatabaseConnection,
}

impl TaskService<'_> {
    pub fn new(db: &sea_orm::DatabaseConnection) -> TaskService {
        TaskService { db }
    }

    /// Creates a new task owned by the given user.
    ///
    /// Title and description must be non-empty after trimming. New tasks
    /// always start not completed; `created_at` is set at insert time.
    ///
    /// # Arguments
    ///
    /// * `owner_id` - The ID of the owning user.
    /// * `title` - The title of the task.
    /// * `description` - The description of the task.
    /// * `deadline` - The instant the task is due.
    ///
    /// # Returns
    ///
    /// A `Result` containing the created `Task` if successful, or an error otherwise.
    #[tracing::instrument(skip(self))]
    pub async fn create_task(
        &self,
        owner_id: i32,
        title: String,
        description: String,
        deadline: DateTime<Utc>,
    ) -> Result<Task, TaskServiceError> {
        validate_fields(&title, &description)?;

        let active_model = task::ActiveModel {
            owner_id: ActiveValue::Set(owner_id),
            title: ActiveValue::Set(title),
            description: ActiveValue::Set(description),
            deadline: ActiveValue::Set(deadline),
            completed: ActiveValue::Set(false),
            created_at: ActiveValue::Set(Utc::now()),
            ..Default::default()
        };
        let created_model = active_model.insert(self.db).await?;
        Ok(Task::from(created_model))
    }

    /// Retrieves the tasks of a user whose deadline falls inside the given
    /// inclusive range, ordered by deadline then ID.
    ///
    /// Every listing goes through here: there is no unbounded query.
    ///
    /// # Arguments
    ///
    /// * `owner_id` - The ID of the owning user.
    /// * `from` - Start of the range, inclusive.
    /// * `to` - End of the range, inclusive.
    ///
    /// # Returns
    ///
    /// A `Result` containing a vector of `Task` if successful, or an error otherwise.
    #[tracing::instrument(skip(self))]
    pub async fn tasks_in_range(
        &self,
        owner_id: i32,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Task>, TaskServiceError> {
        let tasks = task::Entity::find()
            .filter(task::Column::OwnerId.eq(owner_id))
            .filter(task::Column::Deadline.gte(from))
            .filter(task::Column::Deadline.lte(to))
            .order_by_asc(task::Column::Deadline)
            .order_by_asc(task::Column::Id)
            .all(self.db)
            .await?
            .into_iter()
            .map(Task::from)
            .collect();
        Ok(tasks)
    }

    /// Retrieves a task by its ID, scoped to the owning user.
    #[tracing::instrument(skip(self))]
    pub async fn get_task(&self, owner_id: i32, id: i32) -> Result<Task, TaskServiceError> {
        let model = self.find_owned(owner_id, id).await?;
        Ok(Task::from(model))
    }

    /// Edits the title, description, and deadline of a task.
    ///
    /// Those are the only mutable fields; `completed` and `created_at` are
    /// never touched by an edit.
    ///
    /// # Returns
    ///
    /// A `Result` containing the updated `Task` if successful, or an error otherwise.
    #[tracing::instrument(skip(self))]
    pub async fn update_task(
        &self,
        owner_id: i32,
        id: i32,
        title: String,
        description: String,
        deadline: DateTime<Utc>,
    ) -> Result<Task, TaskServiceError> {
        validate_fields(&title, &description)?;

        let task_to_update = self.find_owned(owner_id, id).await?;

        let mut active_model: task::ActiveModel = task_to_update.into();
        active_model.title = ActiveValue::Set(title);
        active_model.description = ActiveValue::Set(description);
        active_model.deadline = ActiveValue::Set(deadline);
        let updated_model = active_model.update(self.db).await?;

        Ok(Task::from(updated_model))
    }

    /// Deletes a task by its ID, scoped to the owning user.
    ///
    /// # Returns
    ///
    /// A `Result` containing the deleted `Task` if successful, or an error otherwise.
    #[tracing::instrument(skip(self))]
    pub async fn delete_task(&self, owner_id: i32, id: i32) -> Result<Task, TaskServiceError> {
        let task_to_delete = self.find_owned(owner_id, id).await?;

        let task_copy = Task::from(task_to_delete);
        task::Entity::delete_by_id(id).exec(self.db).await?;
        Ok(task_copy)
    }

    /// Completes a task by removing its row.
    ///
    /// The returned snapshot is all that remains of the task; the caller
    /// stashes it to back the undo window.
    #[tracing::instrument(skip(self))]
    pub async fn complete_task(&self, owner_id: i32, id: i32) -> Result<Task, TaskServiceError> {
        self.delete_task(owner_id, id).await
    }

    /// Re-inserts a completed task from its snapshot.
    ///
    /// The restored row gets a fresh ID; every other field, including
    /// `created_at`, is carried over, and the task comes back not completed.
    #[tracing::instrument(skip(self, snapshot))]
    pub async fn restore_task(&self, snapshot: &Task) -> Result<Task, TaskServiceError> {
        let active_model = task::ActiveModel {
            owner_id: ActiveValue::Set(snapshot.owner_id()),
            title: ActiveValue::Set(snapshot.title().to_string()),
            description: ActiveValue::Set(snapshot.description().to_string()),
            deadline: ActiveValue::Set(snapshot.deadline()),
            completed: ActiveValue::Set(false),
            created_at: ActiveValue::Set(snapshot.created_at()),
            ..Default::default()
        };
        let restored_model = active_model.insert(self.db).await?;
        Ok(Task::from(restored_model))
    }

    async fn find_owned(&self, owner_id: i32, id: i32) -> Result<task::Model, TaskServiceError> {
        task::Entity::find_by_id(id)
            .filter(task::Column::OwnerId.eq(owner_id))
            .one(self.db)
            .await?
            .ok_or(TaskServiceError::TaskNotFound(id))
    }
}

fn validate_fields(title: &str, description: &str) -> Result<(), TaskServiceError> {
    if title.trim().is_empty() {
        return Err(TaskServiceError::EmptyTitle);
    }
    if description.trim().is_empty() {
        return Err(TaskServiceError::EmptyDescription);
    }
    Ok(())
}
