//! Project-level authorization.
//!
//! Global capabilities come from the user's [`Role`]; rights inside a single
//! project come from ownership or a `project_members` row.

use db::models::{
    project::{Project, Visibility},
    project_member::{MemberRole, ProjectMember},
    role::{Permission, Role},
};
use sqlx::SqlitePool;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum AccessError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Forbidden(String),
}

/// The authenticated caller of a request.
#[derive(Debug, Clone)]
pub struct Actor {
    pub user_id: Uuid,
    pub role: Option<Role>,
}

impl Actor {
    pub fn has(&self, permission: Permission) -> bool {
        self.role.as_ref().is_some_and(|r| r.grants(permission))
    }

    pub fn require(&self, permission: Permission) -> Result<(), AccessError> {
        if self.has(permission) {
            Ok(())
        } else {
            Err(AccessError::Forbidden(format!(
                "missing permission '{permission}'"
            )))
        }
    }

    pub fn visibility(&self) -> Visibility {
        Visibility {
            user_id: self.user_id,
            all: self.has(Permission::ProjectsManageAll),
        }
    }
}

/// The caller's effective standing in one project.
#[derive(Debug, Clone)]
pub struct ProjectAccess {
    pub project: Project,
    pub role: MemberRole,
    pub is_owner: bool,
    manage_all: bool,
}

impl ProjectAccess {
    pub fn can_edit_tasks(&self) -> bool {
        matches!(self.role, MemberRole::Admin | MemberRole::Member)
    }

    pub fn can_manage(&self) -> bool {
        self.role == MemberRole::Admin
    }

    pub fn can_delete(&self) -> bool {
        self.is_owner || self.manage_all
    }

    pub fn require_edit_tasks(&self) -> Result<(), AccessError> {
        check(self.can_edit_tasks(), "observers cannot modify tasks")
    }

    pub fn require_manage(&self) -> Result<(), AccessError> {
        check(self.can_manage(), "only project admins can do this")
    }

    pub fn require_delete(&self) -> Result<(), AccessError> {
        check(self.can_delete(), "only the project owner can delete it")
    }
}

fn check(allowed: bool, message: &str) -> Result<(), AccessError> {
    if allowed {
        Ok(())
    } else {
        Err(AccessError::Forbidden(message.to_string()))
    }
}

/// Load `project_id` and work out what `actor` may do in it.
pub async fn resolve(pool: &SqlitePool, project_id: Uuid, actor: &Actor) -> Result<ProjectAccess, AccessError> {
    let project = Project::find_by_id(pool, project_id)
        .await?
        .ok_or(AccessError::NotFound("project"))?;
    let manage_all = actor.has(Permission::ProjectsManageAll);

    if project.owner_id == actor.user_id {
        return Ok(ProjectAccess {
            project,
            role: MemberRole::Admin,
            is_owner: true,
            manage_all,
        });
    }

    // An explicit membership row wins over the global manage_all grant
    let role = match ProjectMember::find(pool, project_id, actor.user_id).await? {
        Some(member) => member.role,
        None if manage_all => MemberRole::Admin,
        None => {
            return Err(AccessError::Forbidden(
                "you do not have access to this project".to_string(),
            ));
        }
    };
    Ok(ProjectAccess {
        project,
        role,
        is_owner: false,
        manage_all,
    })
}

#[cfg(test)]
mod tests {
    use db::{
        DBService,
        models::{
            project::CreateProject,
            user::{CreateUser, User},
        },
    };

    use super::*;

    async fn user(db: &DBService, name: &str, role: Option<&str>) -> Actor {
        let role = match role {
            Some(name) => Role::find_by_name(&db.pool, name).await.unwrap(),
            None => None,
        };
        let user = User::create(
            &db.pool,
            &CreateUser {
                email: format!("{name}@example.com"),
                username: name.to_string(),
                full_name: None,
                password_hash: "x".to_string(),
                role_id: role.as_ref().map(|r| r.id),
            },
            Uuid::new_v4(),
        )
        .await
        .unwrap();
        Actor {
            user_id: user.id,
            role,
        }
    }

    async fn project(db: &DBService, owner: Uuid) -> Project {
        Project::create(
            &db.pool,
            &CreateProject {
                name: "Roadmap".to_string(),
                description: None,
                status: None,
                priority: None,
                parent_id: None,
                start_date: None,
                end_date: None,
                color: None,
            },
            owner,
            Uuid::new_v4(),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn effective_roles() {
        let db = DBService::new_in_memory().await.unwrap();
        let owner = user(&db, "owner", Some("member")).await;
        let observer = user(&db, "observer", Some("member")).await;
        let stranger = user(&db, "stranger", Some("member")).await;
        let manager = user(&db, "manager", Some("manager")).await;
        let project = project(&db, owner.user_id).await;
        ProjectMember::upsert(&db.pool, project.id, observer.user_id, MemberRole::Observer)
            .await
            .unwrap();

        let access = resolve(&db.pool, project.id, &owner).await.unwrap();
        assert!(access.is_owner && access.can_manage() && access.can_delete());

        let access = resolve(&db.pool, project.id, &observer).await.unwrap();
        assert_eq!(access.role, MemberRole::Observer);
        assert!(!access.can_edit_tasks());
        assert!(matches!(access.require_edit_tasks(), Err(AccessError::Forbidden(_))));

        let access = resolve(&db.pool, project.id, &manager).await.unwrap();
        assert!(access.can_manage() && access.can_delete() && !access.is_owner);

        assert!(matches!(
            resolve(&db.pool, project.id, &stranger).await,
            Err(AccessError::Forbidden(_))
        ));
        assert!(matches!(
            resolve(&db.pool, Uuid::new_v4(), &owner).await,
            Err(AccessError::NotFound("project"))
        ));
    }

    #[tokio::test]
    async fn member_admin_can_manage_but_not_delete() {
        let db = DBService::new_in_memory().await.unwrap();
        let owner = user(&db, "owner", None).await;
        let co_admin = user(&db, "coadmin", None).await;
        let project = project(&db, owner.user_id).await;
        ProjectMember::upsert(&db.pool, project.id, co_admin.user_id, MemberRole::Admin)
            .await
            .unwrap();

        let access = resolve(&db.pool, project.id, &co_admin).await.unwrap();
        assert!(access.can_manage());
        assert!(access.require_delete().is_err());
    }

    #[tokio::test]
    async fn membership_row_overrides_manage_all() {
        let db = DBService::new_in_memory().await.unwrap();
        let owner = user(&db, "owner", Some("member")).await;
        let manager = user(&db, "manager", Some("manager")).await;
        let project = project(&db, owner.user_id).await;
        ProjectMember::upsert(&db.pool, project.id, manager.user_id, MemberRole::Observer)
            .await
            .unwrap();

        let access = resolve(&db.pool, project.id, &manager).await.unwrap();
        assert_eq!(access.role, MemberRole::Observer);
        assert!(!access.can_edit_tasks());
        assert!(!access.can_manage());
    }

    #[test]
    fn permissions_without_role() {
        let actor = Actor {
            user_id: Uuid::new_v4(),
            role: None,
        };
        assert!(!actor.has(Permission::AiUse));
        assert!(actor.require(Permission::UsersRead).is_err());
        assert!(!actor.visibility().all);
    }
}
