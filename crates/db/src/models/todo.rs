use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use ts_rs::TS;
use uuid::Uuid;

use super::priority::Priority;

/// Personal reminder, visible only to its owner.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Todo {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub completed: bool,
    pub priority: Priority,
    pub due_date: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CreateTodo {
    pub title: String,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub due_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
pub struct UpdateTodo {
    pub title: Option<String>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    #[ts(optional, type = "string | null")]
    pub description: Option<Option<String>>,
    pub completed: Option<bool>,
    pub priority: Option<Priority>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    #[ts(optional, type = "string | null")]
    pub due_date: Option<Option<DateTime<Utc>>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
pub struct TodoFilter {
    pub completed: Option<bool>,
}

impl Todo {
    pub async fn create(
        pool: &SqlitePool,
        user_id: Uuid,
        data: &CreateTodo,
        id: Uuid,
    ) -> Result<Self, sqlx::Error> {
        let priority = data.priority.unwrap_or_default();
        let now = Utc::now();
        sqlx::query_as!(
            Todo,
            r#"INSERT INTO todos (id, user_id, title, description, completed, priority, due_date, created_at, updated_at)
               VALUES ($1, $2, $3, $4, 0, $5, $6, $7, $7)
               RETURNING id as "id!: Uuid", user_id as "user_id!: Uuid", title, description, completed as "completed!: bool",
                         priority as "priority!: Priority", due_date as "due_date: DateTime<Utc>", completed_at as "completed_at: DateTime<Utc>",
                         created_at as "created_at!: DateTime<Utc>", updated_at as "updated_at!: DateTime<Utc>""#,
            id,
            user_id,
            data.title,
            data.description,
            priority,
            data.due_date,
            now
        )
        .fetch_one(pool)
        .await
    }

    /// Scoped to the owner: another user's todo is reported as missing.
    pub async fn find_by_id(
        pool: &SqlitePool,
        user_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as!(
            Todo,
            r#"SELECT id as "id!: Uuid", user_id as "user_id!: Uuid", title, description, completed as "completed!: bool",
                      priority as "priority!: Priority", due_date as "due_date: DateTime<Utc>", completed_at as "completed_at: DateTime<Utc>",
                      created_at as "created_at!: DateTime<Utc>", updated_at as "updated_at!: DateTime<Utc>"
               FROM todos WHERE id = $1 AND user_id = $2"#,
            id,
            user_id
        )
        .fetch_optional(pool)
        .await
    }

    /// Open todos first, then by due date (undated last), newest first as tie-break.
    pub async fn find_by_user(
        pool: &SqlitePool,
        user_id: Uuid,
        filter: &TodoFilter,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as!(
            Todo,
            r#"SELECT id as "id!: Uuid", user_id as "user_id!: Uuid", title, description, completed as "completed!: bool",
                      priority as "priority!: Priority", due_date as "due_date: DateTime<Utc>", completed_at as "completed_at: DateTime<Utc>",
                      created_at as "created_at!: DateTime<Utc>", updated_at as "updated_at!: DateTime<Utc>"
               FROM todos
               WHERE user_id = $1 AND ($2 IS NULL OR completed = $2)
               ORDER BY completed ASC, due_date IS NULL, julianday(due_date) ASC, created_at DESC"#,
            user_id,
            filter.completed
        )
        .fetch_all(pool)
        .await
    }

    pub async fn update(
        pool: &SqlitePool,
        user_id: Uuid,
        id: Uuid,
        update: &UpdateTodo,
    ) -> Result<Option<Self>, sqlx::Error> {
        let Some(existing) = Self::find_by_id(pool, user_id, id).await? else {
            return Ok(None);
        };
        let now = Utc::now();
        let completed = update.completed.unwrap_or(existing.completed);
        let completed_at = if completed {
            existing.completed_at.or(Some(now))
        } else {
            None
        };
        let title = update.title.clone().unwrap_or(existing.title);
        let description = update.description.clone().unwrap_or(existing.description);
        let priority = update.priority.unwrap_or(existing.priority);
        let due_date = update.due_date.unwrap_or(existing.due_date);

        sqlx::query_as!(
            Todo,
            r#"UPDATE todos
               SET title = $3, description = $4, completed = $5, priority = $6, due_date = $7,
                   completed_at = $8, updated_at = $9
               WHERE id = $1 AND user_id = $2
               RETURNING id as "id!: Uuid", user_id as "user_id!: Uuid", title, description, completed as "completed!: bool",
                         priority as "priority!: Priority", due_date as "due_date: DateTime<Utc>", completed_at as "completed_at: DateTime<Utc>",
                         created_at as "created_at!: DateTime<Utc>", updated_at as "updated_at!: DateTime<Utc>""#,
            id,
            user_id,
            title,
            description,
            completed,
            priority,
            due_date,
            completed_at,
            now
        )
        .fetch_optional(pool)
        .await
    }

    pub async fn toggle(pool: &SqlitePool, user_id: Uuid, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let now = Utc::now();
        sqlx::query_as!(
            Todo,
            r#"UPDATE todos
               SET completed = NOT completed,
                   completed_at = CASE WHEN completed THEN NULL ELSE $3 END,
                   updated_at = $3
               WHERE id = $1 AND user_id = $2
               RETURNING id as "id!: Uuid", user_id as "user_id!: Uuid", title, description, completed as "completed!: bool",
                         priority as "priority!: Priority", due_date as "due_date: DateTime<Utc>", completed_at as "completed_at: DateTime<Utc>",
                         created_at as "created_at!: DateTime<Utc>", updated_at as "updated_at!: DateTime<Utc>""#,
            id,
            user_id,
            now
        )
        .fetch_optional(pool)
        .await
    }

    pub async fn delete(pool: &SqlitePool, user_id: Uuid, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query!("DELETE FROM todos WHERE id = $1 AND user_id = $2", id, user_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn delete_completed(pool: &SqlitePool, user_id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query!("DELETE FROM todos WHERE user_id = $1 AND completed = 1", user_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_support;

    fn new_todo(title: &str) -> CreateTodo {
        CreateTodo {
            title: title.to_string(),
            description: None,
            priority: None,
            due_date: None,
        }
    }

    #[tokio::test]
    async fn toggle_flips_completion_and_timestamp() {
        let db = test_support::db().await;
        let user = test_support::user(&db, "olga").await;
        let todo = Todo::create(&db.pool, user.id, &new_todo("buy milk"), Uuid::new_v4())
            .await
            .unwrap();
        assert!(!todo.completed);

        let done = Todo::toggle(&db.pool, user.id, todo.id).await.unwrap().unwrap();
        assert!(done.completed);
        assert!(done.completed_at.is_some());

        let open = Todo::toggle(&db.pool, user.id, todo.id).await.unwrap().unwrap();
        assert!(!open.completed);
        assert!(open.completed_at.is_none());
    }

    #[tokio::test]
    async fn todos_are_private_to_their_owner() {
        let db = test_support::db().await;
        let owner = test_support::user(&db, "pia").await;
        let other = test_support::user(&db, "quinn").await;
        let todo = Todo::create(&db.pool, owner.id, &new_todo("secret"), Uuid::new_v4())
            .await
            .unwrap();

        assert!(Todo::find_by_id(&db.pool, other.id, todo.id).await.unwrap().is_none());
        assert!(Todo::toggle(&db.pool, other.id, todo.id).await.unwrap().is_none());
        assert_eq!(Todo::delete(&db.pool, other.id, todo.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn completed_filter_and_bulk_delete() {
        let db = test_support::db().await;
        let user = test_support::user(&db, "rui").await;
        let a = Todo::create(&db.pool, user.id, &new_todo("a"), Uuid::new_v4())
            .await
            .unwrap();
        Todo::create(&db.pool, user.id, &new_todo("b"), Uuid::new_v4())
            .await
            .unwrap();
        Todo::update(
            &db.pool,
            user.id,
            a.id,
            &UpdateTodo {
                completed: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let open = Todo::find_by_user(&db.pool, user.id, &TodoFilter { completed: Some(false) })
            .await
            .unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].title, "b");

        let all = Todo::find_by_user(&db.pool, user.id, &TodoFilter::default())
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
        assert!(!all[0].completed, "open todos sort first");

        assert_eq!(Todo::delete_completed(&db.pool, user.id).await.unwrap(), 1);
    }
}
