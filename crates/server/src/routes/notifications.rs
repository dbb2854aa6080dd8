use axum::{
    Router,
    extract::State,
    response::Json as ResponseJson,
    routing::{delete, get, post},
};
use db::models::notification::{Notification, NotificationQuery};
use deployment::Deployment;
use serde::Serialize;
use ts_rs::TS;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{
    DeploymentImpl,
    error::ApiError,
    extract::{Path, Query},
    middleware::AuthUser,
};

#[derive(Debug, Serialize, TS)]
pub struct UnreadCount {
    #[ts(type = "number")]
    pub count: i64,
}

#[derive(Debug, Serialize, TS)]
pub struct MarkedRead {
    #[ts(type = "number")]
    pub updated: u64,
}

/// GET /api/notifications
pub async fn list_notifications(
    State(deployment): State<DeploymentImpl>,
    auth: AuthUser,
    Query(query): Query<NotificationQuery>,
) -> Result<ResponseJson<ApiResponse<Vec<Notification>>>, ApiError> {
    let notifications = Notification::find_by_user(&deployment.db().pool, auth.id(), &query).await?;
    Ok(ResponseJson(ApiResponse::success(notifications)))
}

/// GET /api/notifications/unread-count
pub async fn unread_count(
    State(deployment): State<DeploymentImpl>,
    auth: AuthUser,
) -> Result<ResponseJson<ApiResponse<UnreadCount>>, ApiError> {
    let count = Notification::unread_count(&deployment.db().pool, auth.id()).await?;
    Ok(ResponseJson(ApiResponse::success(UnreadCount { count })))
}

/// POST /api/notifications/{id}/read
pub async fn mark_read(
    State(deployment): State<DeploymentImpl>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<Notification>>, ApiError> {
    let notification = Notification::mark_read(&deployment.db().pool, auth.id(), id)
        .await?
        .ok_or_else(|| ApiError::not_found("Notification"))?;
    Ok(ResponseJson(ApiResponse::success(notification)))
}

/// POST /api/notifications/read-all
pub async fn mark_all_read(
    State(deployment): State<DeploymentImpl>,
    auth: AuthUser,
) -> Result<ResponseJson<ApiResponse<MarkedRead>>, ApiError> {
    let updated = Notification::mark_all_read(&deployment.db().pool, auth.id()).await?;
    Ok(ResponseJson(ApiResponse::success(MarkedRead { updated })))
}

/// DELETE /api/notifications/{id}
pub async fn delete_notification(
    State(deployment): State<DeploymentImpl>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    if Notification::delete(&deployment.db().pool, auth.id(), id).await? == 0 {
        return Err(ApiError::not_found("Notification"));
    }
    Ok(ResponseJson(ApiResponse::success(())))
}

pub fn router() -> Router<DeploymentImpl> {
    Router::new().nest(
        "/notifications",
        Router::new()
            .route("/", get(list_notifications))
            .route("/unread-count", get(unread_count))
            .route("/read-all", post(mark_all_read))
            .route("/{id}", delete(delete_notification))
            .route("/{id}/read", post(mark_read)),
    )
}
