use axum::{Router, extract::State, response::Json as ResponseJson, routing::get};
use db::models::note::{CreateNote, Note, NoteFilter, UpdateNote};
use deployment::Deployment;
use services::services::access::{self, Actor};
use sqlx::SqlitePool;
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
        return Err(ApiError::BadRequest("note title is required".to_string()));
    }
    Ok(title.to_string())
}

/// A note may only be linked to a project its author can see.
async fn check_project(pool: &SqlitePool, actor: &Actor, project_id: Option<Uuid>) -> Result<(), ApiError> {
    if let Some(project_id) = project_id {
        access::resolve(pool, project_id, actor).await?;
    }
    Ok(())
}

/// GET /api/notes
pub async fn list_notes(
    State(deployment): State<DeploymentImpl>,
    auth: AuthUser,
    Query(filter): Query<NoteFilter>,
) -> Result<ResponseJson<ApiResponse<Vec<Note>>>, ApiError> {
    let notes = Note::find_by_user(&deployment.db().pool, auth.id(), &filter).await?;
    Ok(ResponseJson(ApiResponse::success(notes)))
}

/// POST /api/notes
pub async fn create_note(
    State(deployment): State<DeploymentImpl>,
    auth: AuthUser,
    Json(mut payload): Json<CreateNote>,
) -> Result<ResponseJson<ApiResponse<Note>>, ApiError> {
    payload.title = validate_title(&payload.title)?;
    let pool = &deployment.db().pool;
    check_project(pool, &auth.actor, payload.project_id).await?;

    let note = Note::create(pool, auth.id(), &payload, Uuid::new_v4()).await?;
    Ok(ResponseJson(ApiResponse::success(note)))
}

/// GET /api/notes/{id}
pub async fn get_note(
    State(deployment): State<DeploymentImpl>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<Note>>, ApiError> {
    let note = Note::find_by_id(&deployment.db().pool, auth.id(), id)
        .await?
        .ok_or_else(|| ApiError::not_found("Note"))?;
    Ok(ResponseJson(ApiResponse::success(note)))
}

/// PUT /api/notes/{id}
pub async fn update_note(
    State(deployment): State<DeploymentImpl>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(mut payload): Json<UpdateNote>,
) -> Result<ResponseJson<ApiResponse<Note>>, ApiError> {
    if let Some(title) = payload.title.as_deref() {
        payload.title = Some(validate_title(title)?);
    }
    let pool = &deployment.db().pool;
    if let Some(project_id) = payload.project_id {
        check_project(pool, &auth.actor, project_id).await?;
    }

    let note = Note::update(pool, auth.id(), id, &payload)
        .await?
        .ok_or_else(|| ApiError::not_found("Note"))?;
    Ok(ResponseJson(ApiResponse::success(note)))
}

/// DELETE /api/notes/{id}
pub async fn delete_note(
    State(deployment): State<DeploymentImpl>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    if Note::delete(&deployment.db().pool, auth.id(), id).await? == 0 {
        return Err(ApiError::not_found("Note"));
    }
    Ok(ResponseJson(ApiResponse::success(())))
}

pub fn router() -> Router<DeploymentImpl> {
    Router::new().nest(
        "/notes",
        Router::new()
            .route("/", get(list_notes).post(create_note))
            .route("/{id}", get(get_note).put(update_note).delete(delete_note)),
    )
}
