use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool, types::Json};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};
use ts_rs::TS;
use uuid::Uuid;

pub const ADMIN_ROLE: &str = "admin";
pub const DEFAULT_ROLE: &str = "member";
const WILDCARD: &str = "*";

/// Global capabilities a role can grant. Project-level rights come from membership instead.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, EnumString, Display, EnumIter, AsRefStr,
)]
pub enum Permission {
    #[serde(rename = "users:read")]
    #[strum(serialize = "users:read")]
    UsersRead,
    #[serde(rename = "users:manage")]
    #[strum(serialize = "users:manage")]
    UsersManage,
    #[serde(rename = "roles:manage")]
    #[strum(serialize = "roles:manage")]
    RolesManage,
    #[serde(rename = "projects:create")]
    #[strum(serialize = "projects:create")]
    ProjectsCreate,
    #[serde(rename = "projects:manage_all")]
    #[strum(serialize = "projects:manage_all")]
    ProjectsManageAll,
    #[serde(rename = "ai:use")]
    #[strum(serialize = "ai:use")]
    AiUse,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    #[ts(type = "Array<string>")]
    pub permissions: Json<Vec<String>>,
    pub is_system: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CreateRole {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
pub struct UpdateRole {
    pub name: Option<String>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    #[ts(optional, type = "string | null")]
    pub description: Option<Option<String>>,
    pub permissions: Option<Vec<String>>,
}

impl Role {
    pub fn grants(&self, permission: Permission) -> bool {
        self.permissions
            .iter()
            .any(|p| p == WILDCARD || p == permission.as_ref())
    }

    /// Permission strings a role may carry: every [`Permission`] plus the wildcard.
    pub fn is_known_permission(value: &str) -> bool {
        value == WILDCARD || value.parse::<Permission>().is_ok()
    }

    pub async fn create(pool: &SqlitePool, data: &CreateRole, id: Uuid) -> Result<Self, sqlx::Error> {
        let now = Utc::now();
        let permissions = Json(&data.permissions);
        sqlx::query_as!(
            Role,
            r#"INSERT INTO roles (id, name, description, permissions, is_system, created_at, updated_at)
               VALUES ($1, $2, $3, $4, 0, $5, $5)
               RETURNING id as "id!: Uuid", name, description, permissions as "permissions!: Json<Vec<String>>",
                         is_system as "is_system!: bool", created_at as "created_at!: DateTime<Utc>",
                         updated_at as "updated_at!: DateTime<Utc>""#,
            id,
            data.name,
            data.description,
            permissions,
            now
        )
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as!(
            Role,
            r#"SELECT id as "id!: Uuid", name, description, permissions as "permissions!: Json<Vec<String>>",
                      is_system as "is_system!: bool", created_at as "created_at!: DateTime<Utc>",
                      updated_at as "updated_at!: DateTime<Utc>"
               FROM roles
               WHERE id = $1"#,
            id
        )
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_name(pool: &SqlitePool, name: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as!(
            Role,
            r#"SELECT id as "id!: Uuid", name, description, permissions as "permissions!: Json<Vec<String>>",
                      is_system as "is_system!: bool", created_at as "created_at!: DateTime<Utc>",
                      updated_at as "updated_at!: DateTime<Utc>"
               FROM roles
               WHERE name = $1"#,
            name
        )
        .fetch_optional(pool)
        .await
    }

    pub async fn find_all(pool: &SqlitePool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as!(
            Role,
            r#"SELECT id as "id!: Uuid", name, description, permissions as "permissions!: Json<Vec<String>>",
                      is_system as "is_system!: bool", created_at as "created_at!: DateTime<Utc>",
                      updated_at as "updated_at!: DateTime<Utc>"
               FROM roles
               ORDER BY is_system DESC, name ASC"#
        )
        .fetch_all(pool)
        .await
    }

    pub async fn update(pool: &SqlitePool, id: Uuid, update: &UpdateRole) -> Result<Self, sqlx::Error> {
        let existing = Self::find_by_id(pool, id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)?;

        let name = update.name.clone().unwrap_or(existing.name);
        let description = update.description.clone().unwrap_or(existing.description);
        let permissions = Json(
            update
                .permissions
                .clone()
                .unwrap_or(existing.permissions.0),
        );
        let now = Utc::now();

        sqlx::query_as!(
            Role,
            r#"UPDATE roles SET name = $2, description = $3, permissions = $4, updated_at = $5
               WHERE id = $1
               RETURNING id as "id!: Uuid", name, description, permissions as "permissions!: Json<Vec<String>>",
                         is_system as "is_system!: bool", created_at as "created_at!: DateTime<Utc>",
                         updated_at as "updated_at!: DateTime<Utc>""#,
            id,
            name,
            description,
            permissions,
            now
        )
        .fetch_one(pool)
        .await
    }

    /// Users holding the role lose it (`ON DELETE SET NULL`).
    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query!("DELETE FROM roles WHERE id = $1", id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_support;

    #[tokio::test]
    async fn seeded_roles_grant_expected_permissions() {
        let db = test_support::db().await;

        let admin = Role::find_by_name(&db.pool, ADMIN_ROLE).await.unwrap().unwrap();
        assert!(admin.is_system);
        assert!(admin.grants(Permission::RolesManage));
        assert!(admin.grants(Permission::UsersManage));

        let member = Role::find_by_name(&db.pool, DEFAULT_ROLE).await.unwrap().unwrap();
        assert!(member.grants(Permission::ProjectsCreate));
        assert!(member.grants(Permission::AiUse));
        assert!(!member.grants(Permission::UsersRead));

        let viewer = Role::find_by_name(&db.pool, "viewer").await.unwrap().unwrap();
        assert!(!viewer.grants(Permission::ProjectsCreate));
    }

    #[tokio::test]
    async fn deleting_a_role_detaches_its_users() {
        let db = test_support::db().await;
        let role = Role::create(
            &db.pool,
            &CreateRole {
                name: "auditor".to_string(),
                description: None,
                permissions: vec!["users:read".to_string()],
            },
            Uuid::new_v4(),
        )
        .await
        .unwrap();
        let user = test_support::user(&db, "ines").await;
        crate::models::user::User::set_role(&db.pool, user.id, Some(role.id))
            .await
            .unwrap();

        assert_eq!(Role::delete(&db.pool, role.id).await.unwrap(), 1);

        let reloaded = crate::models::user::User::find_by_id(&db.pool, user.id)
            .await
            .unwrap()
            .unwrap();
        assert!(reloaded.role_id.is_none());
    }

    #[test]
    fn permission_strings_round_trip() {
        assert_eq!(Permission::ProjectsManageAll.to_string(), "projects:manage_all");
        assert_eq!("ai:use".parse::<Permission>().unwrap(), Permission::AiUse);
        assert!(Role::is_known_permission("*"));
        assert!(!Role::is_known_permission("projects:fly"));
    }
}
