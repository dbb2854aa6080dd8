use axum::{
    Router,
    extract::State,
    response::Json as ResponseJson,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use db::models::{
    ai_usage_log::{AiUsageLog, AiUsageSummary},
    role::Permission,
};
use deployment::Deployment;
use serde::Deserialize;
use services::services::text_analysis::{
    ImprovedText, Summary, SummarizeRequest, TaskSuggestions, TextAnalysis, TextRequest,
};
use ts_rs::TS;
use utils::response::ApiResponse;

use crate::{
    DeploymentImpl,
    error::ApiError,
    extract::{Json, Query},
    middleware::AuthUser,
};

const DEFAULT_LOG_LIMIT: i64 = 50;
const MAX_LOG_LIMIT: i64 = 200;

#[derive(Debug, Default, Deserialize, TS)]
pub struct UsageQuery {
    pub since: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize, TS)]
pub struct UsageLogQuery {
    #[ts(type = "number | null")]
    pub limit: Option<i64>,
}

impl UsageLogQuery {
    fn limit(&self) -> i64 {
        self.limit
            .unwrap_or(DEFAULT_LOG_LIMIT)
            .clamp(1, MAX_LOG_LIMIT)
    }
}

/// POST /api/ai/summarize
pub async fn summarize(
    State(deployment): State<DeploymentImpl>,
    auth: AuthUser,
    Json(payload): Json<SummarizeRequest>,
) -> Result<ResponseJson<ApiResponse<Summary>>, ApiError> {
    auth.require(Permission::AiUse)?;
    let summary = deployment.ai_text().summarize(auth.id(), &payload).await?;
    Ok(ResponseJson(ApiResponse::success(summary)))
}

/// POST /api/ai/analyze
pub async fn analyze(
    State(deployment): State<DeploymentImpl>,
    auth: AuthUser,
    Json(payload): Json<TextRequest>,
) -> Result<ResponseJson<ApiResponse<TextAnalysis>>, ApiError> {
    auth.require(Permission::AiUse)?;
    let analysis = deployment.ai_text().analyze(auth.id(), &payload).await?;
    Ok(ResponseJson(ApiResponse::success(analysis)))
}

/// POST /api/ai/improve
pub async fn improve(
    State(deployment): State<DeploymentImpl>,
    auth: AuthUser,
    Json(payload): Json<TextRequest>,
) -> Result<ResponseJson<ApiResponse<ImprovedText>>, ApiError> {
    auth.require(Permission::AiUse)?;
    let improved = deployment.ai_text().improve(auth.id(), &payload).await?;
    Ok(ResponseJson(ApiResponse::success(improved)))
}

/// POST /api/ai/suggest-tasks
pub async fn suggest_tasks(
    State(deployment): State<DeploymentImpl>,
    auth: AuthUser,
    Json(payload): Json<TextRequest>,
) -> Result<ResponseJson<ApiResponse<TaskSuggestions>>, ApiError> {
    auth.require(Permission::AiUse)?;
    let suggestions = deployment.ai_text().suggest_tasks(auth.id(), &payload).await?;
    Ok(ResponseJson(ApiResponse::success(suggestions)))
}

/// GET /api/ai/usage
pub async fn usage_summary(
    State(deployment): State<DeploymentImpl>,
    auth: AuthUser,
    Query(query): Query<UsageQuery>,
) -> Result<ResponseJson<ApiResponse<AiUsageSummary>>, ApiError> {
    auth.require(Permission::AiUse)?;
    let summary =
        AiUsageLog::summary_for_user(&deployment.db().pool, auth.id(), query.since).await?;
    Ok(ResponseJson(ApiResponse::success(summary)))
}

/// GET /api/ai/usage/logs
pub async fn usage_logs(
    State(deployment): State<DeploymentImpl>,
    auth: AuthUser,
    Query(query): Query<UsageLogQuery>,
) -> Result<ResponseJson<ApiResponse<Vec<AiUsageLog>>>, ApiError> {
    auth.require(Permission::AiUse)?;
    let logs = AiUsageLog::find_by_user(&deployment.db().pool, auth.id(), query.limit()).await?;
    Ok(ResponseJson(ApiResponse::success(logs)))
}

pub fn router() -> Router<DeploymentImpl> {
    Router::new().nest(
        "/ai",
        Router::new()
            .route("/summarize", post(summarize))
            .route("/analyze", post(analyze))
            .route("/improve", post(improve))
            .route("/suggest-tasks", post(suggest_tasks))
            .route("/usage", get(usage_summary))
            .route("/usage/logs", get(usage_logs)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_limit_is_clamped() {
        assert_eq!(UsageLogQuery::default().limit(), DEFAULT_LOG_LIMIT);
        assert_eq!(UsageLogQuery { limit: Some(0) }.limit(), 1);
        assert_eq!(UsageLogQuery { limit: Some(10_000) }.limit(), MAX_LOG_LIMIT);
    }
}
