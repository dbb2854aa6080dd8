use axum::{
    Router,
    extract::State,
    response::Json as ResponseJson,
    routing::{delete, get, post},
};
use db::models::todo::{CreateTodo, Todo, TodoFilter, UpdateTodo};
use deployment::Deployment;
use serde::Serialize;
use ts_rs::TS;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{
    DeploymentImpl,
    error::ApiError,
    extract::{Json, Path, Query},
    middleware::AuthUser,
};

#[derive(Debug, Serialize, TS)]
pub struct ClearedTodos {
    #[ts(type = "number")]
    pub deleted: u64,
}

fn validate_title(title: &str) -> Result<String, ApiError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(ApiError::BadRequest("todo title is required".to_string()));
    }
    Ok(title.to_string())
}

/// GET /api/todos
pub async fn list_todos(
    State(deployment): State<DeploymentImpl>,
    auth: AuthUser,
    Query(filter): Query<TodoFilter>,
) -> Result<ResponseJson<ApiResponse<Vec<Todo>>>, ApiError> {
    let todos = Todo::find_by_user(&deployment.db().pool, auth.id(), &filter).await?;
    Ok(ResponseJson(ApiResponse::success(todos)))
}

/// POST /api/todos
pub async fn create_todo(
    State(deployment): State<DeploymentImpl>,
    auth: AuthUser,
    Json(mut payload): Json<CreateTodo>,
) -> Result<ResponseJson<ApiResponse<Todo>>, ApiError> {
    payload.title = validate_title(&payload.title)?;
    let todo = Todo::create(&deployment.db().pool, auth.id(), &payload, Uuid::new_v4()).await?;
    Ok(ResponseJson(ApiResponse::success(todo)))
}

/// GET /api/todos/{id}
pub async fn get_todo(
    State(deployment): State<DeploymentImpl>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<Todo>>, ApiError> {
    let todo = Todo::find_by_id(&deployment.db().pool, auth.id(), id)
        .await?
        .ok_or_else(|| ApiError::not_found("Todo"))?;
    Ok(ResponseJson(ApiResponse::success(todo)))
}

/// PUT /api/todos/{id}
pub async fn update_todo(
    State(deployment): State<DeploymentImpl>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(mut payload): Json<UpdateTodo>,
) -> Result<ResponseJson<ApiResponse<Todo>>, ApiError> {
    if let Some(title) = payload.title.as_deref() {
        payload.title = Some(validate_title(title)?);
    }
    let todo = Todo::update(&deployment.db().pool, auth.id(), id, &payload)
        .await?
        .ok_or_else(|| ApiError::not_found("Todo"))?;
    Ok(ResponseJson(ApiResponse::success(todo)))
}

/// POST /api/todos/{id}/toggle
pub async fn toggle_todo(
    State(deployment): State<DeploymentImpl>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<Todo>>, ApiError> {
    let todo = Todo::toggle(&deployment.db().pool, auth.id(), id)
        .await?
        .ok_or_else(|| ApiError::not_found("Todo"))?;
    Ok(ResponseJson(ApiResponse::success(todo)))
}

/// DELETE /api/todos/{id}
pub async fn delete_todo(
    State(deployment): State<DeploymentImpl>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    if Todo::delete(&deployment.db().pool, auth.id(), id).await? == 0 {
        return Err(ApiError::not_found("Todo"));
    }
    Ok(ResponseJson(ApiResponse::success(())))
}

/// DELETE /api/todos/completed
pub async fn clear_completed(
    State(deployment): State<DeploymentImpl>,
    auth: AuthUser,
) -> Result<ResponseJson<ApiResponse<ClearedTodos>>, ApiError> {
    let deleted = Todo::delete_completed(&deployment.db().pool, auth.id()).await?;
    Ok(ResponseJson(ApiResponse::success(ClearedTodos { deleted })))
}

pub fn router() -> Router<DeploymentImpl> {
    Router::new().nest(
        "/todos",
        Router::new()
            .route("/", get(list_todos).post(create_todo))
            .route("/completed", delete(clear_completed))
            .route("/{id}", get(get_todo).put(update_todo).delete(delete_todo))
            .route("/{id}/toggle", post(toggle_todo)),
    )
}
