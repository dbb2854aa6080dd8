use std::collections::HashMap;

use axum::{
    Router,
    extract::State,
    response::Json as ResponseJson,
    routing::{get, put},
};
use db::models::{
    role::{Permission, Role},
    user::{User, UserResponse},
};
use deployment::Deployment;
use serde::Deserialize;
use services::services::auth::user_response;
use tracing::info;
use ts_rs::TS;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{
    DeploymentImpl,
    error::ApiError,
    extract::{Json, Path},
    middleware::AuthUser,
};

#[derive(Debug, Deserialize, TS)]
pub struct SetUserRole {
    /// `null` removes the role entirely
    pub role_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, TS)]
pub struct SetUserActive {
    pub is_active: bool,
}

/// GET /api/users
pub async fn list_users(
    State(deployment): State<DeploymentImpl>,
    auth: AuthUser,
) -> Result<ResponseJson<ApiResponse<Vec<UserResponse>>>, ApiError> {
    auth.require(Permission::UsersRead)?;

    let pool = &deployment.db().pool;
    let role_names: HashMap<Uuid, String> = Role::find_all(pool)
        .await?
        .into_iter()
        .map(|r| (r.id, r.name))
        .collect();
    let users = User::find_all(pool)
        .await?
        .into_iter()
        .map(|u| {
            let role_name = u.role_id.and_then(|id| role_names.get(&id).cloned());
            UserResponse::new(u, role_name)
        })
        .collect();
    Ok(ResponseJson(ApiResponse::success(users)))
}

/// GET /api/users/{id}
/// Anyone may read their own record; others need `users:read`
pub async fn get_user(
    State(deployment): State<DeploymentImpl>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<UserResponse>>, ApiError> {
    if id != auth.id() {
        auth.require(Permission::UsersRead)?;
    }
    let pool = &deployment.db().pool;
    let user = User::find_by_id(pool, id)
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;
    Ok(ResponseJson(ApiResponse::success(user_response(pool, user).await?)))
}

/// PUT /api/users/{id}/role
pub async fn set_user_role(
    State(deployment): State<DeploymentImpl>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<SetUserRole>,
) -> Result<ResponseJson<ApiResponse<UserResponse>>, ApiError> {
    auth.require(Permission::RolesManage)?;
    if id == auth.id() {
        return Err(ApiError::BadRequest("you cannot change your own role".to_string()));
    }

    let pool = &deployment.db().pool;
    let role = match payload.role_id {
        Some(role_id) => Some(
            Role::find_by_id(pool, role_id)
                .await?
                .ok_or_else(|| ApiError::not_found("Role"))?,
        ),
        None => None,
    };

    let user = User::set_role(pool, id, payload.role_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;
    info!(user_id = %id, role = ?role.as_ref().map(|r| &r.name), changed_by = %auth.id(), "User role changed");

    Ok(ResponseJson(ApiResponse::success(UserResponse::new(
        user,
        role.map(|r| r.name),
    ))))
}

/// PUT /api/users/{id}/active
pub async fn set_user_active(
    State(deployment): State<DeploymentImpl>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<SetUserActive>,
) -> Result<ResponseJson<ApiResponse<UserResponse>>, ApiError> {
    auth.require(Permission::UsersManage)?;
    if id == auth.id() && !payload.is_active {
        return Err(ApiError::BadRequest("you cannot deactivate yourself".to_string()));
    }

    let pool = &deployment.db().pool;
    let user = User::set_active(pool, id, payload.is_active)
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;
    info!(user_id = %id, is_active = payload.is_active, "User activation changed");
    Ok(ResponseJson(ApiResponse::success(user_response(pool, user).await?)))
}

pub fn router() -> Router<DeploymentImpl> {
    Router::new().nest(
        "/users",
        Router::new()
            .route("/", get(list_users))
            .route("/{id}", get(get_user))
            .route("/{id}/role", put(set_user_role))
            .route("/{id}/active", put(set_user_active)),
    )
}
