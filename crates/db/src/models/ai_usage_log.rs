use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, Hash, TS, EnumString, Display,
)]
#[sqlx(type_name = "ai_feature", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AiFeature {
    Summarize,
    Analyze,
    Improve,
    SuggestTasks,
}

/// One call to an AI text utility, kept for billing and analytics.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct AiUsageLog {
    pub id: Uuid,
    pub user_id: Uuid,
    pub feature: AiFeature,
    pub model: String,
    #[ts(type = "number")]
    pub input_tokens: i64,
    #[ts(type = "number")]
    pub output_tokens: i64,
    pub estimated_cost_usd: f64,
    pub fallback_used: bool,
    pub success: bool,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateAiUsageLog {
    pub user_id: Uuid,
    pub feature: AiFeature,
    pub model: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub estimated_cost_usd: f64,
    pub fallback_used: bool,
    pub success: bool,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct AiFeatureUsage {
    pub feature: AiFeature,
    #[ts(type = "number")]
    pub calls: i64,
    #[ts(type = "number")]
    pub fallback_calls: i64,
    #[ts(type = "number")]
    pub failed_calls: i64,
    #[ts(type = "number")]
    pub input_tokens: i64,
    #[ts(type = "number")]
    pub output_tokens: i64,
    pub estimated_cost_usd: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct AiUsageSummary {
    pub since: Option<DateTime<Utc>>,
    #[ts(type = "number")]
    pub total_calls: i64,
    #[ts(type = "number")]
    pub total_tokens: i64,
    pub total_cost_usd: f64,
    pub by_feature: Vec<AiFeatureUsage>,
}

impl AiUsageLog {
    pub async fn create(pool: &SqlitePool, data: &CreateAiUsageLog) -> Result<Self, sqlx::Error> {
        let id = Uuid::new_v4();
        let created_at = Utc::now();
        sqlx::query_as!(
            AiUsageLog,
            r#"INSERT INTO ai_usage_logs (id, user_id, feature, model, input_tokens, output_tokens,
                                          estimated_cost_usd, fallback_used, success, error_message, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
               RETURNING id as "id!: Uuid", user_id as "user_id!: Uuid", feature as "feature!: AiFeature", model,
                         input_tokens as "input_tokens!: i64", output_tokens as "output_tokens!: i64",
                         estimated_cost_usd as "estimated_cost_usd!: f64", fallback_used as "fallback_used!: bool", success as "success!: bool",
                         error_message, created_at as "created_at!: DateTime<Utc>""#,
            id,
            data.user_id,
            data.feature,
            data.model,
            data.input_tokens,
            data.output_tokens,
            data.estimated_cost_usd,
            data.fallback_used,
            data.success,
            data.error_message,
            created_at
        )
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_user(
        pool: &SqlitePool,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as!(
            AiUsageLog,
            r#"SELECT id as "id!: Uuid", user_id as "user_id!: Uuid", feature as "feature!: AiFeature", model,
                      input_tokens as "input_tokens!: i64", output_tokens as "output_tokens!: i64",
                      estimated_cost_usd as "estimated_cost_usd!: f64", fallback_used as "fallback_used!: bool", success as "success!: bool",
                      error_message, created_at as "created_at!: DateTime<Utc>"
               FROM ai_usage_logs
               WHERE user_id = $1
               ORDER BY created_at DESC
               LIMIT $2"#,
            user_id,
            limit
        )
        .fetch_all(pool)
        .await
    }

    /// Per-feature totals for `user_id`, optionally limited to calls at or after `since`.
    pub async fn summary_for_user(
        pool: &SqlitePool,
        user_id: Uuid,
        since: Option<DateTime<Utc>>,
    ) -> Result<AiUsageSummary, sqlx::Error> {
        let by_feature = sqlx::query_as!(
            AiFeatureUsage,
            r#"SELECT feature as "feature!: AiFeature",
                      COUNT(*) as "calls!: i64",
                      COALESCE(SUM(fallback_used), 0) as "fallback_calls!: i64",
                      COALESCE(SUM(success = 0), 0) as "failed_calls!: i64",
                      COALESCE(SUM(input_tokens), 0) as "input_tokens!: i64",
                      COALESCE(SUM(output_tokens), 0) as "output_tokens!: i64",
                      COALESCE(SUM(estimated_cost_usd), 0.0) as "estimated_cost_usd!: f64"
               FROM ai_usage_logs
               WHERE user_id = $1 AND ($2 IS NULL OR julianday(created_at) >= julianday($2))
               GROUP BY feature
               ORDER BY feature ASC"#,
            user_id,
            since
        )
        .fetch_all(pool)
        .await?;

        Ok(AiUsageSummary {
            since,
            total_calls: by_feature.iter().map(|f| f.calls).sum(),
            total_tokens: by_feature
                .iter()
                .map(|f| f.input_tokens + f.output_tokens)
                .sum(),
            total_cost_usd: by_feature.iter().map(|f| f.estimated_cost_usd).sum(),
            by_feature,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_support;

    fn entry(user_id: Uuid, feature: AiFeature, fallback_used: bool, tokens: i64) -> CreateAiUsageLog {
        CreateAiUsageLog {
            user_id,
            feature,
            model: if fallback_used { "heuristic" } else { "claude" }.to_string(),
            input_tokens: tokens,
            output_tokens: tokens / 2,
            estimated_cost_usd: if fallback_used { 0.0 } else { 0.01 },
            fallback_used,
            success: true,
            error_message: None,
        }
    }

    fn failed(user_id: Uuid, feature: AiFeature) -> CreateAiUsageLog {
        CreateAiUsageLog {
            success: false,
            error_message: Some("rate limited".to_string()),
            ..entry(user_id, feature, true, 0)
        }
    }

    #[tokio::test]
    async fn summary_aggregates_per_feature() {
        let db = test_support::db().await;
        let user = test_support::user(&db, "xena").await;
        let other = test_support::user(&db, "yuri").await;

        AiUsageLog::create(&db.pool, &entry(user.id, AiFeature::Summarize, false, 100))
            .await
            .unwrap();
        AiUsageLog::create(&db.pool, &failed(user.id, AiFeature::Summarize))
            .await
            .unwrap();
        AiUsageLog::create(&db.pool, &entry(user.id, AiFeature::Analyze, false, 40))
            .await
            .unwrap();
        AiUsageLog::create(&db.pool, &entry(other.id, AiFeature::Analyze, false, 999))
            .await
            .unwrap();

        let summary = AiUsageLog::summary_for_user(&db.pool, user.id, None).await.unwrap();
        assert_eq!(summary.total_calls, 3);
        assert_eq!(summary.total_tokens, 100 + 50 + 40 + 20);
        assert!((summary.total_cost_usd - 0.02).abs() < 1e-9);

        let summarize = summary
            .by_feature
            .iter()
            .find(|f| f.feature == AiFeature::Summarize)
            .unwrap();
        assert_eq!(summarize.calls, 2);
        assert_eq!(summarize.fallback_calls, 1);
        assert_eq!(summarize.failed_calls, 1);
        let analyze = summary
            .by_feature
            .iter()
            .find(|f| f.feature == AiFeature::Analyze)
            .unwrap();
        assert_eq!(analyze.failed_calls, 0);

        let recent = AiUsageLog::find_by_user(&db.pool, user.id, 2).await.unwrap();
        assert_eq!(recent.len(), 2);
    }
}
