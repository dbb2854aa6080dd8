use axum::{
    Router,
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Json as ResponseJson, Response},
};
use deployment::Deployment;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use utils::response::ApiResponse;

use crate::DeploymentImpl;

pub mod ai;
pub mod auth;
pub mod health;
pub mod notes;
pub mod notifications;
pub mod projects;
pub mod roles;
pub mod tasks;
pub mod todos;
pub mod users;

fn cors_layer(origin: Option<&str>) -> CorsLayer {
    match origin.map(str::parse::<HeaderValue>) {
        Some(Ok(origin)) => CorsLayer::new()
            .allow_origin(origin)
            .allow_methods(Any)
            .allow_headers(Any),
        Some(Err(_)) => {
            tracing::warn!("CORS_ORIGIN is not a valid header value, allowing any origin");
            CorsLayer::permissive()
        }
        None => CorsLayer::permissive(),
    }
}

fn handle_panic(_: Box<dyn std::any::Any + Send + 'static>) -> Response {
    tracing::error!("Request handler panicked");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        ResponseJson(ApiResponse::<()>::error("Internal server error")),
    )
        .into_response()
}

async fn fallback() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        ResponseJson(ApiResponse::<()>::error("Route not found")),
    )
}

/// The full HTTP application: every route under `/api`, wrapped in tracing, panic and CORS layers.
pub fn router(deployment: DeploymentImpl) -> Router {
    let api = Router::new()
        .merge(health::router())
        .merge(auth::router())
        .merge(users::router())
        .merge(roles::router())
        .merge(projects::router())
        .merge(tasks::router())
        .merge(notes::router())
        .merge(todos::router())
        .merge(notifications::router())
        .merge(ai::router());

    let cors = cors_layer(deployment.config().cors_origin.as_deref());

    Router::new()
        .nest("/api", api)
        .fallback(fallback)
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(deployment)
}
