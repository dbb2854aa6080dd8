use axum::{
    Router,
    extract::State,
    response::Json as ResponseJson,
    routing::{get, put},
};
use chrono::{DateTime, Utc};
use db::models::{
    project::{CreateProject, Project, ProjectFilter, ProjectWithStats, UpdateProject},
    project_member::{
        AddProjectMember, MemberRole, ProjectMember, ProjectMemberWithUser, UpdateProjectMember,
    },
    role::Permission,
    task::Task,
    user::User,
};
use deployment::Deployment;
use services::services::{
    access::{self, Actor},
    project_tree::{ProjectNode, ProjectTreeFilter, build_tree, prune},
    task_views::{self, GanttChart, KanbanBoard},
};
use sqlx::SqlitePool;
use tracing::{info, warn};
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{
    DeploymentImpl,
    error::ApiError,
    extract::{Json, Path, Query},
    middleware::AuthUser,
};

fn validate_dates(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Result<(), ApiError> {
    match (start, end) {
        (Some(start), Some(end)) if end < start => Err(ApiError::BadRequest(
            "end_date cannot be before start_date".to_string(),
        )),
        _ => Ok(()),
    }
}

fn validate_name(name: &str) -> Result<String, ApiError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("project name is required".to_string()));
    }
    Ok(name.to_string())
}

/// Sub-projects may only be attached to projects the caller can edit, and never below themselves.
async fn check_parent(
    pool: &SqlitePool,
    actor: &Actor,
    project_id: Option<Uuid>,
    parent_id: Uuid,
) -> Result<(), ApiError> {
    if project_id == Some(parent_id) {
        return Err(ApiError::BadRequest("a project cannot be its own parent".to_string()));
    }
    access::resolve(pool, parent_id, actor)
        .await?
        .require_edit_tasks()?;
    if let Some(project_id) = project_id
        && Project::find_ancestor_ids(pool, parent_id).await?.contains(&project_id)
    {
        return Err(ApiError::BadRequest(
            "a project cannot be moved below one of its own sub-projects".to_string(),
        ));
    }
    Ok(())
}

/// GET /api/projects
pub async fn list_projects(
    State(deployment): State<DeploymentImpl>,
    auth: AuthUser,
    Query(filter): Query<ProjectFilter>,
) -> Result<ResponseJson<ApiResponse<Vec<ProjectWithStats>>>, ApiError> {
    let projects =
        Project::find_visible(&deployment.db().pool, auth.actor.visibility(), &filter).await?;
    Ok(ResponseJson(ApiResponse::success(projects)))
}

/// GET /api/projects/tree
/// Every visible project arranged by parent; filters keep the ancestors of matches
pub async fn project_tree(
    State(deployment): State<DeploymentImpl>,
    auth: AuthUser,
    Query(filter): Query<ProjectTreeFilter>,
) -> Result<ResponseJson<ApiResponse<Vec<ProjectNode>>>, ApiError> {
    let projects = Project::find_visible(
        &deployment.db().pool,
        auth.actor.visibility(),
        &ProjectFilter::default(),
    )
    .await?;

    let tree = build_tree(projects);
    let tree = if filter.is_empty() {
        tree
    } else {
        prune(tree, &|p: &ProjectWithStats| filter.matches(p))
    };
    Ok(ResponseJson(ApiResponse::success(tree)))
}

/// POST /api/projects
pub async fn create_project(
    State(deployment): State<DeploymentImpl>,
    auth: AuthUser,
    Json(mut payload): Json<CreateProject>,
) -> Result<ResponseJson<ApiResponse<ProjectWithStats>>, ApiError> {
    auth.require(Permission::ProjectsCreate)?;
    payload.name = validate_name(&payload.name)?;
    validate_dates(payload.start_date, payload.end_date)?;

    let pool = &deployment.db().pool;
    if let Some(parent_id) = payload.parent_id {
        check_parent(pool, &auth.actor, None, parent_id).await?;
    }

    let id = Uuid::new_v4();
    tracing::debug!("Creating project '{}'", payload.name);
    let project = Project::create(pool, &payload, auth.id(), id).await?;
    info!(project_id = %project.id, owner_id = %auth.id(), "Project created");

    Ok(ResponseJson(ApiResponse::success(
        Project::with_stats(pool, project).await?,
    )))
}

/// GET /api/projects/{id}
pub async fn get_project(
    State(deployment): State<DeploymentImpl>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<ProjectWithStats>>, ApiError> {
    let pool = &deployment.db().pool;
    let access = access::resolve(pool, id, &auth.actor).await?;
    Ok(ResponseJson(ApiResponse::success(
        Project::with_stats(pool, access.project).await?,
    )))
}

/// PUT /api/projects/{id}
pub async fn update_project(
    State(deployment): State<DeploymentImpl>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateProject>,
) -> Result<ResponseJson<ApiResponse<ProjectWithStats>>, ApiError> {
    let pool = &deployment.db().pool;
    let access = access::resolve(pool, id, &auth.actor).await?;
    access.require_manage()?;

    let mut updated = access.project.merged(&payload);
    updated.name = validate_name(&updated.name)?;
    validate_dates(updated.start_date, updated.end_date)?;
    if let Some(Some(parent_id)) = payload.parent_id
        && access.project.parent_id != Some(parent_id)
    {
        check_parent(pool, &auth.actor, Some(id), parent_id).await?;
    }

    let project = Project::save(pool, &updated).await?;
    Ok(ResponseJson(ApiResponse::success(
        Project::with_stats(pool, project).await?,
    )))
}

/// DELETE /api/projects/{id}
/// Removes sub-projects, tasks and memberships with it
pub async fn delete_project(
    State(deployment): State<DeploymentImpl>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    let pool = &deployment.db().pool;
    access::resolve(pool, id, &auth.actor)
        .await?
        .require_delete()?;

    let rows_affected = Project::delete(pool, id).await?;
    if rows_affected == 0 {
        return Err(ApiError::not_found("Project"));
    }
    info!(project_id = %id, deleted_by = %auth.id(), "Project deleted");
    Ok(ResponseJson(ApiResponse::success(())))
}

/// GET /api/projects/{id}/children
/// Seeing a project reveals its direct sub-projects
pub async fn get_children(
    State(deployment): State<DeploymentImpl>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<Vec<ProjectWithStats>>>, ApiError> {
    let pool = &deployment.db().pool;
    access::resolve(pool, id, &auth.actor).await?;

    let mut children = Vec::new();
    for child in Project::find_children(pool, id).await? {
        children.push(Project::with_stats(pool, child).await?);
    }
    Ok(ResponseJson(ApiResponse::success(children)))
}

/// GET /api/projects/{id}/tasks
pub async fn get_project_tasks(
    State(deployment): State<DeploymentImpl>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<Vec<Task>>>, ApiError> {
    let pool = &deployment.db().pool;
    access::resolve(pool, id, &auth.actor).await?;
    let tasks = Task::find_by_project_id(pool, id).await?;
    Ok(ResponseJson(ApiResponse::success(tasks)))
}

/// GET /api/projects/{id}/kanban
pub async fn get_kanban(
    State(deployment): State<DeploymentImpl>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<KanbanBoard>>, ApiError> {
    let pool = &deployment.db().pool;
    access::resolve(pool, id, &auth.actor).await?;
    let tasks = Task::find_by_project_id(pool, id).await?;
    Ok(ResponseJson(ApiResponse::success(task_views::kanban(id, tasks))))
}

/// GET /api/projects/{id}/gantt
pub async fn get_gantt(
    State(deployment): State<DeploymentImpl>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<GanttChart>>, ApiError> {
    let pool = &deployment.db().pool;
    let access = access::resolve(pool, id, &auth.actor).await?;
    let tasks = Task::find_by_project_id(pool, id).await?;
    Ok(ResponseJson(ApiResponse::success(task_views::gantt(
        &access.project,
        &tasks,
    ))))
}

/// GET /api/projects/{id}/members
pub async fn list_members(
    State(deployment): State<DeploymentImpl>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<Vec<ProjectMemberWithUser>>>, ApiError> {
    let pool = &deployment.db().pool;
    access::resolve(pool, id, &auth.actor).await?;
    let members = ProjectMember::find_by_project(pool, id).await?;
    Ok(ResponseJson(ApiResponse::success(members)))
}

/// POST /api/projects/{id}/members
pub async fn add_member(
    State(deployment): State<DeploymentImpl>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<AddProjectMember>,
) -> Result<ResponseJson<ApiResponse<ProjectMember>>, ApiError> {
    let pool = &deployment.db().pool;
    let access = access::resolve(pool, id, &auth.actor).await?;
    access.require_manage()?;

    if payload.user_id == access.project.owner_id {
        return Err(ApiError::BadRequest(
            "the project owner already has full access".to_string(),
        ));
    }
    User::find_by_id(pool, payload.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;

    let role = payload.role.unwrap_or_default();
    let member = ProjectMember::upsert(pool, id, payload.user_id, role).await?;

    if let Err(e) = deployment
        .notifications()
        .notify_project_invite(&access.project, payload.user_id, role, auth.id())
        .await
    {
        warn!(project_id = %id, user_id = %payload.user_id, error = %e, "Failed to send invite notification");
    }
    Ok(ResponseJson(ApiResponse::success(member)))
}

/// PUT /api/projects/{id}/members/{user_id}
pub async fn update_member(
    State(deployment): State<DeploymentImpl>,
    auth: AuthUser,
    Path((id, user_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<UpdateProjectMember>,
) -> Result<ResponseJson<ApiResponse<ProjectMember>>, ApiError> {
    let pool = &deployment.db().pool;
    access::resolve(pool, id, &auth.actor)
        .await?
        .require_manage()?;

    let member = ProjectMember::update_role(pool, id, user_id, payload.role)
        .await?
        .ok_or_else(|| ApiError::not_found("Project member"))?;
    Ok(ResponseJson(ApiResponse::success(member)))
}

/// DELETE /api/projects/{id}/members/{user_id}
/// Admins remove anyone; members may remove themselves
pub async fn remove_member(
    State(deployment): State<DeploymentImpl>,
    auth: AuthUser,
    Path((id, user_id)): Path<(Uuid, Uuid)>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    let pool = &deployment.db().pool;
    let access = access::resolve(pool, id, &auth.actor).await?;
    if user_id != auth.id() {
        access.require_manage()?;
    }

    if ProjectMember::remove(pool, id, user_id).await? == 0 {
        return Err(ApiError::not_found("Project member"));
    }
    Ok(ResponseJson(ApiResponse::success(())))
}

pub fn router() -> Router<DeploymentImpl> {
    let project_id_router = Router::new()
        .route("/", get(get_project).put(update_project).delete(delete_project))
        .route("/children", get(get_children))
        .route("/tasks", get(get_project_tasks))
        .route("/kanban", get(get_kanban))
        .route("/gantt", get(get_gantt))
        .route("/members", get(list_members).post(add_member))
        .route(
            "/members/{user_id}",
            put(update_member).delete(remove_member),
        );

    let projects_router = Router::new()
        .route("/", get(list_projects).post(create_project))
        .route("/tree", get(project_tree))
        .nest("/{id}", project_id_router);

    Router::new().nest("/projects", projects_router)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_order_is_enforced() {
        let now = Utc::now();
        assert!(validate_dates(Some(now), Some(now)).is_ok());
        assert!(validate_dates(Some(now), None).is_ok());
        assert!(validate_dates(Some(now), Some(now - chrono::Duration::days(1))).is_err());
    }

    #[test]
    fn names_are_trimmed_and_required() {
        assert_eq!(validate_name("  Website ").unwrap(), "Website");
        assert!(validate_name("   ").is_err());
    }

    #[test]
    fn default_member_role_is_member() {
        assert_eq!(MemberRole::default(), MemberRole::Member);
    }
}
