use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

use super::{like_pattern, priority::Priority};

#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, Hash, TS, EnumString, Display, Default,
)]
#[sqlx(type_name = "project_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProjectStatus {
    #[default]
    Planning,
    Active,
    OnHold,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub status: ProjectStatus,
    pub priority: Priority,
    pub parent_id: Option<Uuid>, // Foreign key to the parent Project
    pub owner_id: Uuid,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub color: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct ProjectWithStats {
    #[sqlx(flatten)]
    #[serde(flatten)]
    #[ts(flatten)]
    pub project: Project,
    #[ts(type = "number")]
    pub task_count: i64,
    #[ts(type = "number")]
    pub completed_task_count: i64,
    /// Percentage of tasks in `done`, 0 when the project has no tasks
    #[ts(type = "number")]
    pub progress: i64,
}

impl std::ops::Deref for ProjectWithStats {
    type Target = Project;
    fn deref(&self) -> &Self::Target {
        &self.project
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CreateProject {
    pub name: String,
    pub description: Option<String>,
    pub status: Option<ProjectStatus>,
    pub priority: Option<Priority>,
    pub parent_id: Option<Uuid>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub color: Option<String>,
}

/// Partial update. Outer `None` keeps the stored value, `Some(None)` clears a nullable column.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
pub struct UpdateProject {
    pub name: Option<String>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    #[ts(optional, type = "string | null")]
    pub description: Option<Option<String>>,
    pub status: Option<ProjectStatus>,
    pub priority: Option<Priority>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    #[ts(optional, type = "string | null")]
    pub parent_id: Option<Option<Uuid>>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    #[ts(optional, type = "string | null")]
    pub start_date: Option<Option<DateTime<Utc>>>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    #[ts(optional, type = "string | null")]
    pub end_date: Option<Option<DateTime<Utc>>>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    #[ts(optional, type = "string | null")]
    pub color: Option<Option<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
pub struct ProjectFilter {
    pub status: Option<ProjectStatus>,
    pub priority: Option<Priority>,
    pub search: Option<String>,
    pub parent_id: Option<Uuid>,
    pub roots_only: Option<bool>,
}

/// Who is asking: visibility is limited to owned and joined projects unless `all` is set.
#[derive(Debug, Clone, Copy)]
pub struct Visibility {
    pub user_id: Uuid,
    pub all: bool,
}

impl Project {
    /// Apply `update` on top of this project without touching the database.
    pub fn merged(&self, update: &UpdateProject) -> Project {
        Project {
            name: update.name.clone().unwrap_or_else(|| self.name.clone()),
            description: update
                .description
                .clone()
                .unwrap_or_else(|| self.description.clone()),
            status: update.status.unwrap_or(self.status),
            priority: update.priority.unwrap_or(self.priority),
            parent_id: update.parent_id.unwrap_or(self.parent_id),
            start_date: update.start_date.unwrap_or(self.start_date),
            end_date: update.end_date.unwrap_or(self.end_date),
            color: update.color.clone().unwrap_or_else(|| self.color.clone()),
            ..self.clone()
        }
    }

    pub async fn create(
        pool: &SqlitePool,
        data: &CreateProject,
        owner_id: Uuid,
        project_id: Uuid,
    ) -> Result<Self, sqlx::Error> {
        let now = Utc::now();
        let status = data.status.unwrap_or_default();
        let priority = data.priority.unwrap_or_default();
        sqlx::query_as!(
            Project,
            r#"INSERT INTO projects (id, name, description, status, priority, parent_id, owner_id, start_date, end_date, color, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11)
               RETURNING id as "id!: Uuid", name, description, status as "status!: ProjectStatus",
                         priority as "priority!: Priority", parent_id as "parent_id: Uuid", owner_id as "owner_id!: Uuid",
                         start_date as "start_date: DateTime<Utc>", end_date as "end_date: DateTime<Utc>", color,
                         created_at as "created_at!: DateTime<Utc>", updated_at as "updated_at!: DateTime<Utc>""#,
            project_id,
            data.name,
            data.description,
            status,
            priority,
            data.parent_id,
            owner_id,
            data.start_date,
            data.end_date,
            data.color,
            now
        )
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as!(
            Project,
            r#"SELECT id as "id!: Uuid", name, description, status as "status!: ProjectStatus",
                      priority as "priority!: Priority", parent_id as "parent_id: Uuid", owner_id as "owner_id!: Uuid",
                      start_date as "start_date: DateTime<Utc>", end_date as "end_date: DateTime<Utc>", color,
                      created_at as "created_at!: DateTime<Utc>", updated_at as "updated_at!: DateTime<Utc>"
               FROM projects
               WHERE id = $1"#,
            id
        )
        .fetch_optional(pool)
        .await
    }

    pub async fn find_children(pool: &SqlitePool, parent_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as!(
            Project,
            r#"SELECT id as "id!: Uuid", name, description, status as "status!: ProjectStatus",
                      priority as "priority!: Priority", parent_id as "parent_id: Uuid", owner_id as "owner_id!: Uuid",
                      start_date as "start_date: DateTime<Utc>", end_date as "end_date: DateTime<Utc>", color,
                      created_at as "created_at!: DateTime<Utc>", updated_at as "updated_at!: DateTime<Utc>"
               FROM projects
               WHERE parent_id = $1
               ORDER BY created_at ASC"#,
            parent_id
        )
        .fetch_all(pool)
        .await
    }

    /// Projects the caller may see, with task counts, oldest first.
    pub async fn find_visible(
        pool: &SqlitePool,
        visibility: Visibility,
        filter: &ProjectFilter,
    ) -> Result<Vec<ProjectWithStats>, sqlx::Error> {
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT p.*,
                    COUNT(t.id) AS task_count,
                    COALESCE(SUM(CASE WHEN t.status = 'done' THEN 1 ELSE 0 END), 0) AS completed_task_count,
                    CASE WHEN COUNT(t.id) = 0 THEN 0
                         ELSE (COALESCE(SUM(CASE WHEN t.status = 'done' THEN 1 ELSE 0 END), 0) * 100) / COUNT(t.id)
                    END AS progress
             FROM projects p
             LEFT JOIN tasks t ON t.project_id = p.id
             WHERE 1 = 1",
        );

        if !visibility.all {
            query
                .push(" AND (p.owner_id = ")
                .push_bind(visibility.user_id)
                .push(" OR EXISTS (SELECT 1 FROM project_members m WHERE m.project_id = p.id AND m.user_id = ")
                .push_bind(visibility.user_id)
                .push("))");
        }
        if let Some(status) = filter.status {
            query.push(" AND p.status = ").push_bind(status);
        }
        if let Some(priority) = filter.priority {
            query.push(" AND p.priority = ").push_bind(priority);
        }
        if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let pattern = like_pattern(search);
            query
                .push(" AND (p.name LIKE ")
                .push_bind(pattern.clone())
                .push(" ESCAPE '\\' OR p.description LIKE ")
                .push_bind(pattern)
                .push(" ESCAPE '\\')");
        }
        if let Some(parent_id) = filter.parent_id {
            query.push(" AND p.parent_id = ").push_bind(parent_id);
        } else if filter.roots_only.unwrap_or(false) {
            query.push(" AND p.parent_id IS NULL");
        }

        query.push(" GROUP BY p.id ORDER BY p.created_at ASC");
        query.build_query_as::<ProjectWithStats>().fetch_all(pool).await
    }

    /// The project itself followed by every ancestor up to its root.
    pub async fn find_ancestor_ids(pool: &SqlitePool, id: Uuid) -> Result<Vec<Uuid>, sqlx::Error> {
        // UNION (not UNION ALL) so a corrupted cycle still terminates
        sqlx::query_scalar!(
            r#"WITH RECURSIVE ancestors(id, parent_id) AS (
                   SELECT id, parent_id FROM projects WHERE id = $1
                   UNION
                   SELECT p.id, p.parent_id FROM projects p JOIN ancestors a ON p.id = a.parent_id
               )
               SELECT id as "id!: Uuid" FROM ancestors"#,
            id
        )
        .fetch_all(pool)
        .await
    }

    pub async fn with_stats(pool: &SqlitePool, project: Project) -> Result<ProjectWithStats, sqlx::Error> {
        let counts = sqlx::query!(
            r#"SELECT COUNT(*) as "total!: i64",
                      COALESCE(SUM(CASE WHEN status = 'done' THEN 1 ELSE 0 END), 0) as "done!: i64"
               FROM tasks
               WHERE project_id = $1"#,
            project.id
        )
        .fetch_one(pool)
        .await?;
        let (task_count, completed_task_count) = (counts.total, counts.done);

        let progress = if task_count == 0 {
            0
        } else {
            completed_task_count * 100 / task_count
        };
        Ok(ProjectWithStats {
            project,
            task_count,
            completed_task_count,
            progress,
        })
    }

    /// Persist every mutable column of `project` (see [`Project::merged`]).
    pub async fn save(pool: &SqlitePool, project: &Project) -> Result<Self, sqlx::Error> {
        let now = Utc::now();
        sqlx::query_as!(
            Project,
            r#"UPDATE projects
               SET name = $2, description = $3, status = $4, priority = $5, parent_id = $6,
                   start_date = $7, end_date = $8, color = $9, updated_at = $10
               WHERE id = $1
               RETURNING id as "id!: Uuid", name, description, status as "status!: ProjectStatus",
                         priority as "priority!: Priority", parent_id as "parent_id: Uuid", owner_id as "owner_id!: Uuid",
                         start_date as "start_date: DateTime<Utc>", end_date as "end_date: DateTime<Utc>", color,
                         created_at as "created_at!: DateTime<Utc>", updated_at as "updated_at!: DateTime<Utc>""#,
            project.id,
            project.name,
            project.description,
            project.status,
            project.priority,
            project.parent_id,
            project.start_date,
            project.end_date,
            project.color,
            now
        )
        .fetch_one(pool)
        .await
    }

    /// Sub-projects, tasks and memberships go with it; notes are detached.
    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query!("DELETE FROM projects WHERE id = $1", id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
