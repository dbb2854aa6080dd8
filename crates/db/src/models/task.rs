use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool, Type};
use strum_macros::{Display, EnumIter, EnumString};
use ts_rs::TS;
use uuid::Uuid;

use super::{like_pattern, priority::Priority, project::Visibility};

#[derive(
    Debug,
    Clone,
    Copy,
    Type,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Hash,
    TS,
    EnumString,
    EnumIter,
    Display,
    Default,
)]
#[sqlx(type_name = "task_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Todo,
    InProgress,
    Review,
    Done,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Task {
    pub id: Uuid,
    pub project_id: Uuid, // Foreign key to Project
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: Priority,
    pub assignee_id: Option<Uuid>,
    pub created_by: Uuid,
    pub start_date: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
    pub estimated_hours: Option<f64>,
    #[ts(type = "number")]
    pub position: i64, // Ordering inside a Kanban column
    pub completed_at: Option<DateTime<Utc>>, // Set while status is Done
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CreateTask {
    pub project_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub assignee_id: Option<Uuid>,
    pub start_date: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
    pub estimated_hours: Option<f64>,
    #[ts(type = "number | null")]
    pub position: Option<i64>,
}

impl CreateTask {
    pub fn from_title_description(
        project_id: Uuid,
        title: String,
        description: Option<String>,
    ) -> Self {
        Self {
            project_id,
            title,
            description,
            status: Some(TaskStatus::Todo),
            priority: None,
            assignee_id: None,
            start_date: None,
            due_date: None,
            estimated_hours: None,
            position: None,
        }
    }
}

/// Partial update. Outer `None` keeps the stored value, `Some(None)` clears a nullable column.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
pub struct UpdateTask {
    pub title: Option<String>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    #[ts(optional, type = "string | null")]
    pub description: Option<Option<String>>,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    #[ts(optional, type = "string | null")]
    pub assignee_id: Option<Option<Uuid>>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    #[ts(optional, type = "string | null")]
    pub start_date: Option<Option<DateTime<Utc>>>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    #[ts(optional, type = "string | null")]
    pub due_date: Option<Option<DateTime<Utc>>>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    #[ts(optional, type = "number | null")]
    pub estimated_hours: Option<Option<f64>>,
    #[ts(type = "number | null")]
    pub position: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct UpdateTaskStatus {
    pub status: TaskStatus,
    #[ts(type = "number | null")]
    pub position: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
pub struct TaskFilter {
    pub project_id: Option<Uuid>,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub assignee_id: Option<Uuid>,
    pub search: Option<String>,
    pub due_before: Option<DateTime<Utc>>,
    pub due_after: Option<DateTime<Utc>>,
    /// Only tasks past their due date that are not done
    pub overdue: Option<bool>,
}

impl Task {
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status != TaskStatus::Done && self.due_date.is_some_and(|due| due < now)
    }

    /// Apply `update` on top of this task without touching the database.
    /// `completed_at` follows the status: stamped when entering Done, cleared when leaving it.
    pub fn merged(&self, update: &UpdateTask, now: DateTime<Utc>) -> Task {
        let status = update.status.unwrap_or(self.status);
        let completed_at = if status == TaskStatus::Done {
            self.completed_at.or(Some(now))
        } else {
            None
        };
        Task {
            title: update.title.clone().unwrap_or_else(|| self.title.clone()),
            description: update
                .description
                .clone()
                .unwrap_or_else(|| self.description.clone()),
            status,
            priority: update.priority.unwrap_or(self.priority),
            assignee_id: update.assignee_id.unwrap_or(self.assignee_id),
            start_date: update.start_date.unwrap_or(self.start_date),
            due_date: update.due_date.unwrap_or(self.due_date),
            estimated_hours: update.estimated_hours.unwrap_or(self.estimated_hours),
            position: update.position.unwrap_or(self.position),
            completed_at,
            ..self.clone()
        }
    }

    pub async fn create(
        pool: &SqlitePool,
        data: &CreateTask,
        created_by: Uuid,
        task_id: Uuid,
    ) -> Result<Self, sqlx::Error> {
        let now = Utc::now();
        let status = data.status.unwrap_or_default();
        let priority = data.priority.unwrap_or_default();
        let completed_at = (status == TaskStatus::Done).then_some(now);
        sqlx::query_as!(
            Task,
            r#"INSERT INTO tasks (id, project_id, title, description, status, priority, assignee_id, created_by,
                                  start_date, due_date, estimated_hours, position, completed_at, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11,
                       COALESCE($12, (SELECT COALESCE(MAX(position), -1) + 1 FROM tasks WHERE project_id = $2 AND status = $5)),
                       $13, $14, $14)
               RETURNING id as "id!: Uuid", project_id as "project_id!: Uuid", title, description, status as "status!: TaskStatus",
                         priority as "priority!: Priority", assignee_id as "assignee_id: Uuid", created_by as "created_by!: Uuid",
                         start_date as "start_date: DateTime<Utc>", due_date as "due_date: DateTime<Utc>",
                         estimated_hours as "estimated_hours: f64", position as "position!: i64",
                         completed_at as "completed_at: DateTime<Utc>", created_at as "created_at!: DateTime<Utc>",
                         updated_at as "updated_at!: DateTime<Utc>""#,
            task_id,
            data.project_id,
            data.title,
            data.description,
            status,
            priority,
            data.assignee_id,
            created_by,
            data.start_date,
            data.due_date,
            data.estimated_hours,
            data.position,
            completed_at,
            now
        )
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as!(
            Task,
            r#"SELECT id as "id!: Uuid", project_id as "project_id!: Uuid", title, description, status as "status!: TaskStatus",
                      priority as "priority!: Priority", assignee_id as "assignee_id: Uuid", created_by as "created_by!: Uuid",
                      start_date as "start_date: DateTime<Utc>", due_date as "due_date: DateTime<Utc>",
                      estimated_hours as "estimated_hours: f64", position as "position!: i64",
                      completed_at as "completed_at: DateTime<Utc>", created_at as "created_at!: DateTime<Utc>",
                      updated_at as "updated_at!: DateTime<Utc>"
               FROM tasks WHERE id = $1"#,
            id
        )
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_project_id(pool: &SqlitePool, project_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as!(
            Task,
            r#"SELECT id as "id!: Uuid", project_id as "project_id!: Uuid", title, description, status as "status!: TaskStatus",
                      priority as "priority!: Priority", assignee_id as "assignee_id: Uuid", created_by as "created_by!: Uuid",
                      start_date as "start_date: DateTime<Utc>", due_date as "due_date: DateTime<Utc>",
                      estimated_hours as "estimated_hours: f64", position as "position!: i64",
                      completed_at as "completed_at: DateTime<Utc>", created_at as "created_at!: DateTime<Utc>",
                      updated_at as "updated_at!: DateTime<Utc>"
               FROM tasks WHERE project_id = $1 ORDER BY position ASC, created_at ASC"#,
            project_id
        )
        .fetch_all(pool)
        .await
    }

    /// Tasks in projects visible to the caller, narrowed by `filter`.
    /// Ordered by due date (undated last), then creation time.
    pub async fn find_filtered(
        pool: &SqlitePool,
        visibility: Visibility,
        filter: &TaskFilter,
        now: DateTime<Utc>,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT t.* FROM tasks t WHERE 1 = 1");

        if !visibility.all {
            query
                .push(
                    " AND t.project_id IN (SELECT p.id FROM projects p WHERE p.owner_id = ",
                )
                .push_bind(visibility.user_id)
                .push(" UNION SELECT m.project_id FROM project_members m WHERE m.user_id = ")
                .push_bind(visibility.user_id)
                .push(")");
        }
        if let Some(project_id) = filter.project_id {
            query.push(" AND t.project_id = ").push_bind(project_id);
        }
        if let Some(status) = filter.status {
            query.push(" AND t.status = ").push_bind(status);
        }
        if let Some(priority) = filter.priority {
            query.push(" AND t.priority = ").push_bind(priority);
        }
        if let Some(assignee_id) = filter.assignee_id {
            query.push(" AND t.assignee_id = ").push_bind(assignee_id);
        }
        if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let pattern = like_pattern(search);
            query
                .push(" AND (t.title LIKE ")
                .push_bind(pattern.clone())
                .push(" ESCAPE '\\' OR t.description LIKE ")
                .push_bind(pattern)
                .push(" ESCAPE '\\')");
        }
        if let Some(due_before) = filter.due_before {
            query
                .push(" AND t.due_date IS NOT NULL AND julianday(t.due_date) <= julianday(")
                .push_bind(due_before)
                .push(")");
        }
        if let Some(due_after) = filter.due_after {
            query
                .push(" AND t.due_date IS NOT NULL AND julianday(t.due_date) >= julianday(")
                .push_bind(due_after)
                .push(")");
        }
        if filter.overdue.unwrap_or(false) {
            query
                .push(" AND t.status != 'done' AND t.due_date IS NOT NULL AND julianday(t.due_date) < julianday(")
                .push_bind(now)
                .push(")");
        }

        query.push(" ORDER BY t.due_date IS NULL, julianday(t.due_date) ASC, t.created_at ASC");
        query.build_query_as::<Task>().fetch_all(pool).await
    }

    /// Persist every mutable column of `task` (see [`Task::merged`]).
    pub async fn save(pool: &SqlitePool, task: &Task) -> Result<Self, sqlx::Error> {
        let now = Utc::now();
        sqlx::query_as!(
            Task,
            r#"UPDATE tasks
               SET title = $2, description = $3, status = $4, priority = $5, assignee_id = $6,
                   start_date = $7, due_date = $8, estimated_hours = $9, position = $10,
                   completed_at = $11, updated_at = $12
               WHERE id = $1
               RETURNING id as "id!: Uuid", project_id as "project_id!: Uuid", title, description, status as "status!: TaskStatus",
                         priority as "priority!: Priority", assignee_id as "assignee_id: Uuid", created_by as "created_by!: Uuid",
                         start_date as "start_date: DateTime<Utc>", due_date as "due_date: DateTime<Utc>",
                         estimated_hours as "estimated_hours: f64", position as "position!: i64",
                         completed_at as "completed_at: DateTime<Utc>", created_at as "created_at!: DateTime<Utc>",
                         updated_at as "updated_at!: DateTime<Utc>""#,
            task.id,
            task.title,
            task.description,
            task.status,
            task.priority,
            task.assignee_id,
            task.start_date,
            task.due_date,
            task.estimated_hours,
            task.position,
            task.completed_at,
            now
        )
        .fetch_one(pool)
        .await
    }

    /// Move a task to `status`, optionally to a new position in the target column.
    pub async fn update_status(
        pool: &SqlitePool,
        id: Uuid,
        status: TaskStatus,
        position: Option<i64>,
    ) -> Result<Option<Self>, sqlx::Error> {
        let now = Utc::now();
        sqlx::query_as!(
            Task,
            r#"UPDATE tasks
               SET status = $2,
                   position = COALESCE($3, position),
                   completed_at = CASE WHEN $2 = 'done' THEN COALESCE(completed_at, $4) ELSE NULL END,
                   updated_at = $4
               WHERE id = $1
               RETURNING id as "id!: Uuid", project_id as "project_id!: Uuid", title, description, status as "status!: TaskStatus",
                         priority as "priority!: Priority", assignee_id as "assignee_id: Uuid", created_by as "created_by!: Uuid",
                         start_date as "start_date: DateTime<Utc>", due_date as "due_date: DateTime<Utc>",
                         estimated_hours as "estimated_hours: f64", position as "position!: i64",
                         completed_at as "completed_at: DateTime<Utc>", created_at as "created_at!: DateTime<Utc>",
                         updated_at as "updated_at!: DateTime<Utc>""#,
            id,
            status,
            position,
            now
        )
        .fetch_optional(pool)
        .await
    }

    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query!("DELETE FROM tasks WHERE id = $1", id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Unfinished tasks due in `(from, to]`.
    pub async fn find_due_between(
        pool: &SqlitePool,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as!(
            Task,
            r#"SELECT id as "id!: Uuid", project_id as "project_id!: Uuid", title, description, status as "status!: TaskStatus",
                      priority as "priority!: Priority", assignee_id as "assignee_id: Uuid", created_by as "created_by!: Uuid",
                      start_date as "start_date: DateTime<Utc>", due_date as "due_date: DateTime<Utc>",
                      estimated_hours as "estimated_hours: f64", position as "position!: i64",
                      completed_at as "completed_at: DateTime<Utc>", created_at as "created_at!: DateTime<Utc>",
                      updated_at as "updated_at!: DateTime<Utc>"
               FROM tasks
               WHERE status != 'done'
                 AND due_date IS NOT NULL
                 AND julianday(due_date) > julianday($1)
                 AND julianday(due_date) <= julianday($2)
               ORDER BY julianday(due_date) ASC"#,
            from,
            to
        )
        .fetch_all(pool)
        .await
    }

    /// Unfinished tasks whose due date is before `now`.
    pub async fn find_overdue(pool: &SqlitePool, now: DateTime<Utc>) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as!(
            Task,
            r#"SELECT id as "id!: Uuid", project_id as "project_id!: Uuid", title, description, status as "status!: TaskStatus",
                      priority as "priority!: Priority", assignee_id as "assignee_id: Uuid", created_by as "created_by!: Uuid",
                      start_date as "start_date: DateTime<Utc>", due_date as "due_date: DateTime<Utc>",
                      estimated_hours as "estimated_hours: f64", position as "position!: i64",
                      completed_at as "completed_at: DateTime<Utc>", created_at as "created_at!: DateTime<Utc>",
                      updated_at as "updated_at!: DateTime<Utc>"
               FROM tasks
               WHERE status != 'done'
                 AND due_date IS NOT NULL
                 AND julianday(due_date) < julianday($1)
               ORDER BY julianday(due_date) ASC"#,
            now
        )
        .fetch_all(pool)
        .await
    }
}
