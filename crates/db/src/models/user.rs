use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite, SqlitePool};
use ts_rs::TS;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub full_name: Option<String>,
    pub password_hash: String,
    pub role_id: Option<Uuid>,
    pub avatar_url: Option<String>,
    pub is_active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Public view of a user, never carries the password hash.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub full_name: Option<String>,
    pub role_id: Option<Uuid>,
    pub role_name: Option<String>,
    pub avatar_url: Option<String>,
    pub is_active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl UserResponse {
    pub fn new(user: User, role_name: Option<String>) -> Self {
        Self {
            id: user.id,
            email: user.email,
            username: user.username,
            full_name: user.full_name,
            role_id: user.role_id,
            role_name,
            avatar_url: user.avatar_url,
            is_active: user.is_active,
            last_login_at: user.last_login_at,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreateUser {
    pub email: String,
    pub username: String,
    pub full_name: Option<String>,
    pub password_hash: String,
    pub role_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
pub struct UpdateProfile {
    pub username: Option<String>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    #[ts(optional, type = "string | null")]
    pub full_name: Option<Option<String>>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    #[ts(optional, type = "string | null")]
    pub avatar_url: Option<Option<String>>,
}

impl User {
    pub async fn create<'e, E>(executor: E, data: &CreateUser, id: Uuid) -> Result<Self, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let now = Utc::now();
        sqlx::query_as!(
            User,
            r#"INSERT INTO users (id, email, username, full_name, password_hash, role_id, is_active, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, 1, $7, $7)
               RETURNING id as "id!: Uuid", email, username, full_name, password_hash, role_id as "role_id: Uuid",
                         avatar_url, is_active as "is_active!: bool", last_login_at as "last_login_at: DateTime<Utc>",
                         created_at as "created_at!: DateTime<Utc>", updated_at as "updated_at!: DateTime<Utc>""#,
            id,
            data.email,
            data.username,
            data.full_name,
            data.password_hash,
            data.role_id,
            now
        )
        .fetch_one(executor)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as!(
            User,
            r#"SELECT id as "id!: Uuid", email, username, full_name, password_hash, role_id as "role_id: Uuid",
                      avatar_url, is_active as "is_active!: bool", last_login_at as "last_login_at: DateTime<Utc>",
                      created_at as "created_at!: DateTime<Utc>", updated_at as "updated_at!: DateTime<Utc>"
               FROM users
               WHERE id = $1"#,
            id
        )
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_email(pool: &SqlitePool, email: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as!(
            User,
            r#"SELECT id as "id!: Uuid", email, username, full_name, password_hash, role_id as "role_id: Uuid",
                      avatar_url, is_active as "is_active!: bool", last_login_at as "last_login_at: DateTime<Utc>",
                      created_at as "created_at!: DateTime<Utc>", updated_at as "updated_at!: DateTime<Utc>"
               FROM users
               WHERE email = $1 COLLATE NOCASE"#,
            email
        )
        .fetch_optional(pool)
        .await
    }

    pub async fn find_all(pool: &SqlitePool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as!(
            User,
            r#"SELECT id as "id!: Uuid", email, username, full_name, password_hash, role_id as "role_id: Uuid",
                      avatar_url, is_active as "is_active!: bool", last_login_at as "last_login_at: DateTime<Utc>",
                      created_at as "created_at!: DateTime<Utc>", updated_at as "updated_at!: DateTime<Utc>"
               FROM users
               ORDER BY username COLLATE NOCASE ASC"#
        )
        .fetch_all(pool)
        .await
    }

    pub async fn count<'e, E>(executor: E) -> Result<i64, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_scalar!(r#"SELECT COUNT(*) as "count!: i64" FROM users"#)
            .fetch_one(executor)
            .await
    }

    /// Apply a profile update. Only username, full name and avatar are writable here.
    pub async fn update_profile(
        pool: &SqlitePool,
        id: Uuid,
        update: &UpdateProfile,
    ) -> Result<Self, sqlx::Error> {
        let existing = Self::find_by_id(pool, id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)?;

        let username = update.username.clone().unwrap_or(existing.username);
        let full_name = update.full_name.clone().unwrap_or(existing.full_name);
        let avatar_url = update.avatar_url.clone().unwrap_or(existing.avatar_url);
        let now = Utc::now();

        sqlx::query_as!(
            User,
            r#"UPDATE users SET username = $2, full_name = $3, avatar_url = $4, updated_at = $5
               WHERE id = $1
               RETURNING id as "id!: Uuid", email, username, full_name, password_hash, role_id as "role_id: Uuid",
                         avatar_url, is_active as "is_active!: bool", last_login_at as "last_login_at: DateTime<Utc>",
                         created_at as "created_at!: DateTime<Utc>", updated_at as "updated_at!: DateTime<Utc>""#,
            id,
            username,
            full_name,
            avatar_url,
            now
        )
        .fetch_one(pool)
        .await
    }

    pub async fn update_password(
        pool: &SqlitePool,
        id: Uuid,
        password_hash: &str,
    ) -> Result<(), sqlx::Error> {
        let now = Utc::now();
        sqlx::query!(
            "UPDATE users SET password_hash = $2, updated_at = $3 WHERE id = $1",
            id,
            password_hash,
            now
        )
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn set_role<'e, E>(
        executor: E,
        id: Uuid,
        role_id: Option<Uuid>,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let now = Utc::now();
        sqlx::query_as!(
            User,
            r#"UPDATE users SET role_id = $2, updated_at = $3
               WHERE id = $1
               RETURNING id as "id!: Uuid", email, username, full_name, password_hash, role_id as "role_id: Uuid",
                         avatar_url, is_active as "is_active!: bool", last_login_at as "last_login_at: DateTime<Utc>",
                         created_at as "created_at!: DateTime<Utc>", updated_at as "updated_at!: DateTime<Utc>""#,
            id,
            role_id,
            now
        )
        .fetch_optional(executor)
        .await
    }

    pub async fn set_active(
        pool: &SqlitePool,
        id: Uuid,
        is_active: bool,
    ) -> Result<Option<Self>, sqlx::Error> {
        let now = Utc::now();
        sqlx::query_as!(
            User,
            r#"UPDATE users SET is_active = $2, updated_at = $3
               WHERE id = $1
               RETURNING id as "id!: Uuid", email, username, full_name, password_hash, role_id as "role_id: Uuid",
                         avatar_url, is_active as "is_active!: bool", last_login_at as "last_login_at: DateTime<Utc>",
                         created_at as "created_at!: DateTime<Utc>", updated_at as "updated_at!: DateTime<Utc>""#,
            id,
            is_active,
            now
        )
        .fetch_optional(pool)
        .await
    }

    pub async fn touch_last_login(pool: &SqlitePool, id: Uuid) -> Result<(), sqlx::Error> {
        let now = Utc::now();
        sqlx::query!("UPDATE users SET last_login_at = $2 WHERE id = $1", id, now)
            .execute(pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_support;

    #[tokio::test]
    async fn email_lookup_is_case_insensitive() {
        let db = test_support::db().await;
        let created = test_support::user(&db, "grace").await;

        let found = User::find_by_email(&db.pool, "GRACE@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, created.id);
        assert!(found.is_active);
    }

    #[tokio::test]
    async fn duplicate_email_is_a_unique_violation() {
        let db = test_support::db().await;
        test_support::user(&db, "alan").await;

        let err = User::create(
            &db.pool,
            &CreateUser {
                email: "alan@example.com".to_string(),
                username: "alan2".to_string(),
                full_name: None,
                password_hash: "h".to_string(),
                role_id: None,
            },
            Uuid::new_v4(),
        )
        .await
        .unwrap_err();

        match err {
            sqlx::Error::Database(db_err) => assert!(db_err.is_unique_violation()),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn profile_update_can_clear_optional_fields() {
        let db = test_support::db().await;
        let user = test_support::user(&db, "linus").await;

        let updated = User::update_profile(
            &db.pool,
            user.id,
            &UpdateProfile {
                username: None,
                full_name: Some(Some("Linus T".to_string())),
                avatar_url: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.full_name.as_deref(), Some("Linus T"));
        assert_eq!(updated.username, "linus");

        let cleared = User::update_profile(
            &db.pool,
            user.id,
            &UpdateProfile {
                full_name: Some(None),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert!(cleared.full_name.is_none());
    }
}
