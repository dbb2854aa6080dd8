use axum::{
    Router,
    extract::State,
    response::Json as ResponseJson,
    routing::{get, put},
};
use db::models::role::{CreateRole, Permission, Role, UpdateRole};
use deployment::Deployment;
use sqlx::SqlitePool;
use tracing::info;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{
    DeploymentImpl,
    error::ApiError,
    extract::{Json, Path},
    middleware::AuthUser,
};

fn validate_permissions(permissions: &[String]) -> Result<(), ApiError> {
    match permissions.iter().find(|p| !Role::is_known_permission(p)) {
        Some(unknown) => Err(ApiError::BadRequest(format!("unknown permission '{unknown}'"))),
        None => Ok(()),
    }
}

async fn ensure_name_free(pool: &SqlitePool, name: &str, except: Option<Uuid>) -> Result<(), ApiError> {
    match Role::find_by_name(pool, name).await? {
        Some(role) if Some(role.id) != except => {
            Err(ApiError::Conflict(format!("a role named '{name}' already exists")))
        }
        _ => Ok(()),
    }
}

fn validate_name(name: &str) -> Result<String, ApiError> {
    let name = name.trim().to_lowercase();
    if name.is_empty() {
        return Err(ApiError::BadRequest("role name is required".to_string()));
    }
    Ok(name)
}

/// GET /api/roles
pub async fn list_roles(
    State(deployment): State<DeploymentImpl>,
    _auth: AuthUser,
) -> Result<ResponseJson<ApiResponse<Vec<Role>>>, ApiError> {
    let roles = Role::find_all(&deployment.db().pool).await?;
    Ok(ResponseJson(ApiResponse::success(roles)))
}

/// POST /api/roles
pub async fn create_role(
    State(deployment): State<DeploymentImpl>,
    auth: AuthUser,
    Json(mut payload): Json<CreateRole>,
) -> Result<ResponseJson<ApiResponse<Role>>, ApiError> {
    auth.require(Permission::RolesManage)?;
    payload.name = validate_name(&payload.name)?;
    validate_permissions(&payload.permissions)?;
    let pool = &deployment.db().pool;
    ensure_name_free(pool, &payload.name, None).await?;

    let role = Role::create(pool, &payload, Uuid::new_v4()).await?;
    info!(role_id = %role.id, name = %role.name, "Role created");
    Ok(ResponseJson(ApiResponse::success(role)))
}

/// PUT /api/roles/{id}
/// System roles keep their name; their permissions and description can change
pub async fn update_role(
    State(deployment): State<DeploymentImpl>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(mut payload): Json<UpdateRole>,
) -> Result<ResponseJson<ApiResponse<Role>>, ApiError> {
    auth.require(Permission::RolesManage)?;
    let pool = &deployment.db().pool;
    let existing = Role::find_by_id(pool, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Role"))?;

    if let Some(name) = payload.name.take() {
        let name = validate_name(&name)?;
        if existing.is_system && name != existing.name {
            return Err(ApiError::BadRequest("system roles cannot be renamed".to_string()));
        }
        ensure_name_free(pool, &name, Some(id)).await?;
        payload.name = Some(name);
    }
    if let Some(permissions) = &payload.permissions {
        validate_permissions(permissions)?;
    }

    let role = Role::update(pool, id, &payload).await?;
    Ok(ResponseJson(ApiResponse::success(role)))
}

/// DELETE /api/roles/{id}
pub async fn delete_role(
    State(deployment): State<DeploymentImpl>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    auth.require(Permission::RolesManage)?;
    let pool = &deployment.db().pool;
    let role = Role::find_by_id(pool, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Role"))?;
    if role.is_system {
        return Err(ApiError::Forbidden("system roles cannot be deleted".to_string()));
    }

    Role::delete(pool, id).await?;
    info!(role_id = %id, name = %role.name, "Role deleted");
    Ok(ResponseJson(ApiResponse::success(())))
}

pub fn router() -> Router<DeploymentImpl> {
    Router::new().nest(
        "/roles",
        Router::new()
            .route("/", get(list_roles).post(create_role))
            .route("/{id}", put(update_role).delete(delete_role)),
    )
}
