use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display)]
#[sqlx(type_name = "notification_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NotificationKind {
    TaskDueSoon,
    TaskOverdue,
    TaskAssigned,
    ProjectInvite,
    System,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub entity_id: Option<Uuid>, // Task or project the notification is about
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateNotification {
    pub user_id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub entity_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
pub struct NotificationQuery {
    pub unread_only: Option<bool>,
    #[ts(type = "number | null")]
    pub limit: Option<i64>,
}

impl Notification {
    pub const DEFAULT_LIMIT: i64 = 50;
    pub const MAX_LIMIT: i64 = 200;

    pub async fn create(pool: &SqlitePool, data: &CreateNotification) -> Result<Self, sqlx::Error> {
        let id = Uuid::new_v4();
        let created_at = Utc::now();
        sqlx::query_as!(
            Notification,
            r#"INSERT INTO notifications (id, user_id, kind, title, message, entity_id, is_read, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, 0, $7)
               RETURNING id as "id!: Uuid", user_id as "user_id!: Uuid", kind as "kind!: NotificationKind", title, message,
                         entity_id as "entity_id: Uuid", is_read as "is_read!: bool", read_at as "read_at: DateTime<Utc>",
                         created_at as "created_at!: DateTime<Utc>""#,
            id,
            data.user_id,
            data.kind,
            data.title,
            data.message,
            data.entity_id,
            created_at
        )
        .fetch_one(pool)
        .await
    }

    /// Whether `user_id` already got a `kind` notification about `entity_id` at or after `since`.
    pub async fn exists_since(
        pool: &SqlitePool,
        user_id: Uuid,
        kind: NotificationKind,
        entity_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        let count = sqlx::query_scalar!(
            r#"SELECT COUNT(*) as "count!: i64" FROM notifications
               WHERE user_id = $1 AND kind = $2 AND entity_id = $3
                 AND julianday(created_at) >= julianday($4)"#,
            user_id,
            kind,
            entity_id,
            since
        )
        .fetch_one(pool)
        .await?;
        Ok(count > 0)
    }

    pub async fn find_by_user(
        pool: &SqlitePool,
        user_id: Uuid,
        query: &NotificationQuery,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let limit = query
            .limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT);
        let unread_only = query.unread_only.unwrap_or(false);
        sqlx::query_as!(
            Notification,
            r#"SELECT id as "id!: Uuid", user_id as "user_id!: Uuid", kind as "kind!: NotificationKind", title, message,
                      entity_id as "entity_id: Uuid", is_read as "is_read!: bool", read_at as "read_at: DateTime<Utc>",
                      created_at as "created_at!: DateTime<Utc>"
               FROM notifications
               WHERE user_id = $1 AND ($2 = 0 OR is_read = 0)
               ORDER BY created_at DESC
               LIMIT $3"#,
            user_id,
            unread_only,
            limit
        )
        .fetch_all(pool)
        .await
    }

    pub async fn unread_count(pool: &SqlitePool, user_id: Uuid) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar!(
            r#"SELECT COUNT(*) as "count!: i64" FROM notifications WHERE user_id = $1 AND is_read = 0"#,
            user_id
        )
        .fetch_one(pool)
            .await
    }

    pub async fn mark_read(
        pool: &SqlitePool,
        user_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let now = Utc::now();
        sqlx::query_as!(
            Notification,
            r#"UPDATE notifications
               SET is_read = 1, read_at = COALESCE(read_at, $3)
               WHERE id = $1 AND user_id = $2
               RETURNING id as "id!: Uuid", user_id as "user_id!: Uuid", kind as "kind!: NotificationKind", title, message,
                         entity_id as "entity_id: Uuid", is_read as "is_read!: bool", read_at as "read_at: DateTime<Utc>",
                         created_at as "created_at!: DateTime<Utc>""#,
            id,
            user_id,
            now
        )
        .fetch_optional(pool)
        .await
    }

    pub async fn mark_all_read(pool: &SqlitePool, user_id: Uuid) -> Result<u64, sqlx::Error> {
        let now = Utc::now();
        let result = sqlx::query!(
            "UPDATE notifications SET is_read = 1, read_at = $2 WHERE user_id = $1 AND is_read = 0",
            user_id,
            now
        )
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn delete(pool: &SqlitePool, user_id: Uuid, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query!("DELETE FROM notifications WHERE id = $1 AND user_id = $2", id, user_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Drop read notifications created before `cutoff`. Unread ones are kept regardless of age.
    pub async fn delete_read_older_than(
        pool: &SqlitePool,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query!(
            "DELETE FROM notifications WHERE is_read = 1 AND julianday(created_at) < julianday($1)",
            cutoff
        )
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::models::test_support;

    fn system(user_id: Uuid, entity_id: Option<Uuid>) -> CreateNotification {
        CreateNotification {
            user_id,
            kind: NotificationKind::System,
            title: "Hello".to_string(),
            message: "Welcome aboard".to_string(),
            entity_id,
        }
    }

    #[tokio::test]
    async fn read_state_and_counts() {
        let db = test_support::db().await;
        let user = test_support::user(&db, "uma").await;
        let first = Notification::create(&db.pool, &system(user.id, None)).await.unwrap();
        Notification::create(&db.pool, &system(user.id, None)).await.unwrap();
        assert_eq!(Notification::unread_count(&db.pool, user.id).await.unwrap(), 2);

        let read = Notification::mark_read(&db.pool, user.id, first.id)
            .await
            .unwrap()
            .unwrap();
        assert!(read.is_read);
        assert!(read.read_at.is_some());

        let unread = Notification::find_by_user(
            &db.pool,
            user.id,
            &NotificationQuery {
                unread_only: Some(true),
                limit: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(unread.len(), 1);

        assert_eq!(Notification::mark_all_read(&db.pool, user.id).await.unwrap(), 1);
        assert_eq!(Notification::unread_count(&db.pool, user.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn exists_since_matches_kind_entity_and_window() {
        let db = test_support::db().await;
        let user = test_support::user(&db, "vic").await;
        let entity = Uuid::new_v4();
        Notification::create(&db.pool, &system(user.id, Some(entity))).await.unwrap();
        let now = Utc::now();

        assert!(
            Notification::exists_since(&db.pool, user.id, NotificationKind::System, entity, now - Duration::hours(1))
                .await
                .unwrap()
        );
        assert!(
            !Notification::exists_since(&db.pool, user.id, NotificationKind::TaskOverdue, entity, now - Duration::hours(1))
                .await
                .unwrap()
        );
        assert!(
            !Notification::exists_since(&db.pool, user.id, NotificationKind::System, entity, now + Duration::hours(1))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn cleanup_only_removes_old_read_notifications() {
        let db = test_support::db().await;
        let user = test_support::user(&db, "wes").await;
        let read = Notification::create(&db.pool, &system(user.id, None)).await.unwrap();
        Notification::create(&db.pool, &system(user.id, None)).await.unwrap();
        Notification::mark_read(&db.pool, user.id, read.id).await.unwrap();

        let removed = Notification::delete_read_older_than(&db.pool, Utc::now() + Duration::days(1))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(Notification::unread_count(&db.pool, user.id).await.unwrap(), 1);

        let none = Notification::delete_read_older_than(&db.pool, Utc::now() - Duration::days(30))
            .await
            .unwrap();
        assert_eq!(none, 0);
    }
}
