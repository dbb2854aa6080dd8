use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

/// Role of a user inside one project.
#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, Hash, TS, EnumString, Display, Default,
)]
#[sqlx(type_name = "member_role", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MemberRole {
    Admin,
    #[default]
    Member,
    Observer,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct ProjectMember {
    pub project_id: Uuid,
    pub user_id: Uuid,
    pub role: MemberRole,
    pub joined_at: DateTime<Utc>,
}

/// Membership joined with the user's display fields.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct ProjectMemberWithUser {
    pub project_id: Uuid,
    pub user_id: Uuid,
    pub role: MemberRole,
    pub joined_at: DateTime<Utc>,
    pub username: String,
    pub email: String,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct AddProjectMember {
    pub user_id: Uuid,
    pub role: Option<MemberRole>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct UpdateProjectMember {
    pub role: MemberRole,
}

impl ProjectMember {
    /// Insert the membership, or change the role when it already exists.
    pub async fn upsert(
        pool: &SqlitePool,
        project_id: Uuid,
        user_id: Uuid,
        role: MemberRole,
    ) -> Result<Self, sqlx::Error> {
        let now = Utc::now();
        sqlx::query_as!(
            ProjectMember,
            r#"INSERT INTO project_members (project_id, user_id, role, joined_at)
               VALUES ($1, $2, $3, $4)
               ON CONFLICT(project_id, user_id) DO UPDATE SET role = excluded.role
               RETURNING project_id as "project_id!: Uuid", user_id as "user_id!: Uuid",
                         role as "role!: MemberRole", joined_at as "joined_at!: DateTime<Utc>""#,
            project_id,
            user_id,
            role,
            now
        )
        .fetch_one(pool)
        .await
    }

    pub async fn find(
        pool: &SqlitePool,
        project_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as!(
            ProjectMember,
            r#"SELECT project_id as "project_id!: Uuid", user_id as "user_id!: Uuid",
                      role as "role!: MemberRole", joined_at as "joined_at!: DateTime<Utc>"
               FROM project_members
               WHERE project_id = $1 AND user_id = $2"#,
            project_id,
            user_id
        )
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_project(
        pool: &SqlitePool,
        project_id: Uuid,
    ) -> Result<Vec<ProjectMemberWithUser>, sqlx::Error> {
        sqlx::query_as!(
            ProjectMemberWithUser,
            r#"SELECT m.project_id as "project_id!: Uuid", m.user_id as "user_id!: Uuid",
                      m.role as "role!: MemberRole", m.joined_at as "joined_at!: DateTime<Utc>",
                      u.username, u.email, u.full_name, u.avatar_url
               FROM project_members m
               JOIN users u ON u.id = m.user_id
               WHERE m.project_id = $1
               ORDER BY m.joined_at ASC"#,
            project_id
        )
        .fetch_all(pool)
        .await
    }

    pub async fn update_role(
        pool: &SqlitePool,
        project_id: Uuid,
        user_id: Uuid,
        role: MemberRole,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as!(
            ProjectMember,
            r#"UPDATE project_members SET role = $3
               WHERE project_id = $1 AND user_id = $2
               RETURNING project_id as "project_id!: Uuid", user_id as "user_id!: Uuid",
                         role as "role!: MemberRole", joined_at as "joined_at!: DateTime<Utc>""#,
            project_id,
            user_id,
            role
        )
        .fetch_optional(pool)
        .await
    }

    pub async fn remove(pool: &SqlitePool, project_id: Uuid, user_id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query!(
            "DELETE FROM project_members WHERE project_id = $1 AND user_id = $2",
            project_id,
            user_id
        )
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
    async fn upsert_changes_role_instead_of_duplicating() {
        let db = test_support::db().await;
        let owner = test_support::user(&db, "gus").await;
        let other = test_support::user(&db, "hana").await;
        let project = test_support::project(&db, owner.id, "Shared", None).await;

        ProjectMember::upsert(&db.pool, project.id, other.id, MemberRole::Observer)
            .await
            .unwrap();
        let updated = ProjectMember::upsert(&db.pool, project.id, other.id, MemberRole::Admin)
            .await
            .unwrap();
        assert_eq!(updated.role, MemberRole::Admin);

        let members = ProjectMember::find_by_project(&db.pool, project.id).await.unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].username, "hana");
    }

    #[tokio::test]
    async fn remove_reports_missing_membership() {
        let db = test_support::db().await;
        let owner = test_support::user(&db, "ivan").await;
        let project = test_support::project(&db, owner.id, "Solo", None).await;

        assert_eq!(ProjectMember::remove(&db.pool, project.id, owner.id).await.unwrap(), 0);
        assert!(
            ProjectMember::update_role(&db.pool, project.id, owner.id, MemberRole::Admin)
                .await
                .unwrap()
                .is_none()
        );
    }
}
