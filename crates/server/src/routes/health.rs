use axum::{Router, extract::State, response::Json as ResponseJson, routing::get};
use deployment::Deployment;
use serde::Serialize;
use services::services::database_validator::{DatabaseValidator, ValidationResult};
use ts_rs::TS;
use utils::response::ApiResponse;

use crate::{DeploymentImpl, error::ApiError};

#[derive(Debug, Serialize, TS)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub ai_enabled: bool,
    pub database: ValidationResult,
}

/// GET /api/health
pub async fn health_check(
    State(deployment): State<DeploymentImpl>,
) -> Result<ResponseJson<ApiResponse<HealthStatus>>, ApiError> {
    let database = DatabaseValidator::new(deployment.db().pool.clone())
        .validate()
        .await?;

    let status = if database.is_ok() {
        "ok"
    } else {
        tracing::warn!("Database not healthy: {}", database.summary());
        "degraded"
    };
    Ok(ResponseJson(ApiResponse::success(HealthStatus {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        ai_enabled: deployment.ai_text().ai_enabled(),
        database,
    })))
}

pub fn router() -> Router<DeploymentImpl> {
    Router::new().route("/health", get(health_check))
}
