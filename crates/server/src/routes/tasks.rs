use axum::{
    Router,
    extract::State,
    response::Json as ResponseJson,
    routing::{get, patch},
};
use chrono::Utc;
use db::models::{
    project::Project,
    project_member::ProjectMember,
    task::{CreateTask, Task, TaskFilter, UpdateTask, UpdateTaskStatus},
};
use deployment::Deployment;
use services::services::access::{self, ProjectAccess};
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

fn validate_title(title: &str) -> Result<String, ApiError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(ApiError::BadRequest("task title is required".to_string()));
    }
    Ok(title.to_string())
}

fn validate_hours(hours: Option<f64>) -> Result<(), ApiError> {
    match hours {
        Some(h) if !h.is_finite() || h < 0.0 => Err(ApiError::BadRequest(
            "estimated_hours must be a non-negative number".to_string(),
        )),
        _ => Ok(()),
    }
}

/// Tasks can only be handed to people who can see the project.
async fn check_assignee(pool: &SqlitePool, project: &Project, assignee_id: Uuid) -> Result<(), ApiError> {
    if assignee_id == project.owner_id
        || ProjectMember::find(pool, project.id, assignee_id).await?.is_some()
    {
        return Ok(());
    }
    Err(ApiError::BadRequest(
        "assignee must be the project owner or a project member".to_string(),
    ))
}

async fn load_task(pool: &SqlitePool, auth: &AuthUser, id: Uuid) -> Result<(Task, ProjectAccess), ApiError> {
    let task = Task::find_by_id(pool, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Task"))?;
    let access = access::resolve(pool, task.project_id, &auth.actor).await?;
    Ok((task, access))
}

async fn notify_assignment(deployment: &DeploymentImpl, task: &Task, assigned_by: Uuid) {
    if let Err(e) = deployment
        .notifications()
        .notify_task_assigned(task, assigned_by)
        .await
    {
        warn!(task_id = %task.id, error = %e, "Failed to send assignment notification");
    }
}

/// GET /api/tasks
pub async fn list_tasks(
    State(deployment): State<DeploymentImpl>,
    auth: AuthUser,
    Query(filter): Query<TaskFilter>,
) -> Result<ResponseJson<ApiResponse<Vec<Task>>>, ApiError> {
    let tasks = Task::find_filtered(
        &deployment.db().pool,
        auth.actor.visibility(),
        &filter,
        Utc::now(),
    )
    .await?;
    Ok(ResponseJson(ApiResponse::success(tasks)))
}

/// POST /api/tasks
pub async fn create_task(
    State(deployment): State<DeploymentImpl>,
    auth: AuthUser,
    Json(mut payload): Json<CreateTask>,
) -> Result<ResponseJson<ApiResponse<Task>>, ApiError> {
    payload.title = validate_title(&payload.title)?;
    validate_hours(payload.estimated_hours)?;

    let pool = &deployment.db().pool;
    let access = access::resolve(pool, payload.project_id, &auth.actor).await?;
    access.require_edit_tasks()?;
    if let Some(assignee_id) = payload.assignee_id {
        check_assignee(pool, &access.project, assignee_id).await?;
    }

    let id = Uuid::new_v4();
    tracing::debug!("Creating task '{}' in project {}", payload.title, payload.project_id);
    let task = Task::create(pool, &payload, auth.id(), id).await?;
    info!(task_id = %task.id, project_id = %task.project_id, "Task created");

    notify_assignment(&deployment, &task, auth.id()).await;
    Ok(ResponseJson(ApiResponse::success(task)))
}

/// GET /api/tasks/{id}
pub async fn get_task(
    State(deployment): State<DeploymentImpl>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<Task>>, ApiError> {
    let (task, _) = load_task(&deployment.db().pool, &auth, id).await?;
    Ok(ResponseJson(ApiResponse::success(task)))
}

/// PUT /api/tasks/{id}
pub async fn update_task(
    State(deployment): State<DeploymentImpl>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateTask>,
) -> Result<ResponseJson<ApiResponse<Task>>, ApiError> {
    let pool = &deployment.db().pool;
    let (existing, access) = load_task(pool, &auth, id).await?;
    access.require_edit_tasks()?;

    let mut updated = existing.merged(&payload, Utc::now());
    updated.title = validate_title(&updated.title)?;
    validate_hours(updated.estimated_hours)?;

    let reassigned = updated.assignee_id.is_some() && updated.assignee_id != existing.assignee_id;
    if let Some(assignee_id) = updated.assignee_id.filter(|_| reassigned) {
        check_assignee(pool, &access.project, assignee_id).await?;
    }

    let task = Task::save(pool, &updated).await?;
    if reassigned {
        notify_assignment(&deployment, &task, auth.id()).await;
    }
    Ok(ResponseJson(ApiResponse::success(task)))
}

/// PATCH /api/tasks/{id}/status
/// Kanban drag and drop: status plus optional position in the new column
pub async fn update_task_status(
    State(deployment): State<DeploymentImpl>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateTaskStatus>,
) -> Result<ResponseJson<ApiResponse<Task>>, ApiError> {
    let pool = &deployment.db().pool;
    let (_, access) = load_task(pool, &auth, id).await?;
    access.require_edit_tasks()?;

    let task = Task::update_status(pool, id, payload.status, payload.position)
        .await?
        .ok_or_else(|| ApiError::not_found("Task"))?;
    Ok(ResponseJson(ApiResponse::success(task)))
}

/// DELETE /api/tasks/{id}
pub async fn delete_task(
    State(deployment): State<DeploymentImpl>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    let pool = &deployment.db().pool;
    let (_, access) = load_task(pool, &auth, id).await?;
    access.require_edit_tasks()?;

    if Task::delete(pool, id).await? == 0 {
        return Err(ApiError::not_found("Task"));
    }
    info!(task_id = %id, deleted_by = %auth.id(), "Task deleted");
    Ok(ResponseJson(ApiResponse::success(())))
}

pub fn router() -> Router<DeploymentImpl> {
    Router::new().nest(
        "/tasks",
        Router::new()
            .route("/", get(list_tasks).post(create_task))
            .route("/{id}", get(get_task).put(update_task).delete(delete_task))
            .route("/{id}/status", patch(update_task_status)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn titles_are_trimmed() {
        assert_eq!(validate_title("  Ship it ").unwrap(), "Ship it");
        assert!(validate_title("").is_err());
    }

    #[test]
    fn negative_estimates_are_rejected() {
        assert!(validate_hours(None).is_ok());
        assert!(validate_hours(Some(2.5)).is_ok());
        assert!(validate_hours(Some(-1.0)).is_err());
        assert!(validate_hours(Some(f64::NAN)).is_err());
    }
}
