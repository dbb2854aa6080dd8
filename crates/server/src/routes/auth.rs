use axum::{
    Router,
    extract::State,
    response::Json as ResponseJson,
    routing::{get, post, put},
};
use db::models::user::{UpdateProfile, User, UserResponse};
use deployment::Deployment;
use services::services::auth::{
    AuthResponse, ChangePasswordRequest, LoginRequest, RegisterRequest, user_response,
};
use utils::response::ApiResponse;

use crate::{DeploymentImpl, error::ApiError, extract::Json, middleware::AuthUser};

/// POST /api/auth/register
pub async fn register(
    State(deployment): State<DeploymentImpl>,
    Json(payload): Json<RegisterRequest>,
) -> Result<ResponseJson<ApiResponse<AuthResponse>>, ApiError> {
    let response = deployment
        .auth()
        .register(&deployment.db().pool, payload)
        .await?;
    Ok(ResponseJson(ApiResponse::success_with_message(
        response,
        "Registration successful",
    )))
}

/// POST /api/auth/login
pub async fn login(
    State(deployment): State<DeploymentImpl>,
    Json(payload): Json<LoginRequest>,
) -> Result<ResponseJson<ApiResponse<AuthResponse>>, ApiError> {
    let response = deployment.auth().login(&deployment.db().pool, payload).await?;
    Ok(ResponseJson(ApiResponse::success(response)))
}

/// GET /api/auth/me
pub async fn me(
    State(deployment): State<DeploymentImpl>,
    auth: AuthUser,
) -> Result<ResponseJson<ApiResponse<UserResponse>>, ApiError> {
    let user = user_response(&deployment.db().pool, auth.user).await?;
    Ok(ResponseJson(ApiResponse::success(user)))
}

/// PUT /api/auth/me
/// Only username, full name and avatar can be changed here
pub async fn update_me(
    State(deployment): State<DeploymentImpl>,
    auth: AuthUser,
    Json(mut payload): Json<UpdateProfile>,
) -> Result<ResponseJson<ApiResponse<UserResponse>>, ApiError> {
    if let Some(username) = payload.username.as_mut() {
        *username = username.trim().to_string();
        if username.is_empty() {
            return Err(ApiError::BadRequest("username cannot be empty".to_string()));
        }
    }

    let pool = &deployment.db().pool;
    let user = User::update_profile(pool, auth.id(), &payload).await?;
    Ok(ResponseJson(ApiResponse::success(user_response(pool, user).await?)))
}

/// PUT /api/auth/password
pub async fn change_password(
    State(deployment): State<DeploymentImpl>,
    auth: AuthUser,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    deployment
        .auth()
        .change_password(&deployment.db().pool, &auth.user, payload)
        .await?;
    Ok(ResponseJson(ApiResponse::success_with_message((), "Password updated")))
}

pub fn router() -> Router<DeploymentImpl> {
    Router::new().nest(
        "/auth",
        Router::new()
            .route("/register", post(register))
            .route("/login", post(login))
            .route("/me", get(me).put(update_me))
            .route("/password", put(change_password)),
    )
}
