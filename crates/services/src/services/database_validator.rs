//! Schema sanity check behind the health endpoint.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{debug, warn};
use ts_rs::TS;

/// Tables every request path depends on.
pub const REQUIRED_TABLES: &[&str] = &[
    "users",
    "roles",
    "projects",
    "project_members",
    "tasks",
    "todos",
    "notes",
    "notifications",
    "ai_usage_logs",
];

const MIGRATIONS_TABLE: &str = "_sqlx_migrations";

#[derive(Debug, Error)]
pub enum DatabaseValidationError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

pub struct DatabaseValidator {
    pool: SqlitePool,
}

impl DatabaseValidator {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn validate(&self) -> Result<ValidationResult, DatabaseValidationError> {
        let tables = self.table_names().await?;
        let missing_tables: Vec<String> = REQUIRED_TABLES
            .iter()
            .filter(|t| !tables.contains(**t))
            .map(|t| t.to_string())
            .collect();
        let foreign_keys_enabled: bool = sqlx::query_scalar("PRAGMA foreign_keys")
            .fetch_one(&self.pool)
            .await?;

        let mut result = ValidationResult {
            is_initialized: tables.contains(MIGRATIONS_TABLE),
            migrations_applied: 0,
            latest_migration: None,
            missing_tables,
            foreign_keys_enabled,
            warnings: Vec::new(),
        };

        if result.is_initialized {
            let (applied, latest) = self.migration_state().await?;
            result.migrations_applied = applied;
            result.latest_migration = latest;
        } else {
            result
                .warnings
                .push("migrations have never been run".to_string());
        }
        if !result.missing_tables.is_empty() {
            result
                .warnings
                .push(format!("missing tables: {}", result.missing_tables.join(", ")));
        }
        if !foreign_keys_enabled {
            result
                .warnings
                .push("foreign key enforcement is off, deletes will not cascade".to_string());
        }

        if result.is_ok() {
            debug!(migrations = result.migrations_applied, "Database schema looks healthy");
        } else {
            warn!(warnings = ?result.warnings, "Database schema check failed");
        }
        Ok(result)
    }

    async fn table_names(&self) -> Result<HashSet<String>, sqlx::Error> {
        let names: Vec<String> =
            sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table'")
                .fetch_all(&self.pool)
                .await?;
        Ok(names.into_iter().collect())
    }

    /// Number of successful migrations and the description of the newest one.
    async fn migration_state(&self) -> Result<(usize, Option<String>), sqlx::Error> {
        let rows: Vec<String> = sqlx::query_scalar(
            "SELECT description FROM _sqlx_migrations WHERE success = 1 ORDER BY version ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok((rows.len(), rows.last().cloned()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct ValidationResult {
    pub is_initialized: bool,
    pub migrations_applied: usize,
    pub latest_migration: Option<String>,
    pub missing_tables: Vec<String>,
    pub foreign_keys_enabled: bool,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn is_ok(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn summary(&self) -> String {
        if self.is_ok() {
            format!("{} migrations applied", self.migrations_applied)
        } else {
            self.warnings.join("; ")
        }
    }
}

#[cfg(test)]
mod tests {
    use db::DBService;
    use sqlx::sqlite::SqlitePoolOptions;

    use super::*;

    #[tokio::test]
    async fn migrated_database_is_healthy() {
        let db = DBService::new_in_memory().await.unwrap();
        let result = DatabaseValidator::new(db.pool.clone()).validate().await.unwrap();
        assert!(result.is_ok(), "{}", result.summary());
        assert!(result.foreign_keys_enabled);
        assert_eq!(result.migrations_applied, 4);
        assert_eq!(
            result.latest_migration.as_deref(),
            Some("notifications and ai usage")
        );
    }

    #[tokio::test]
    async fn blank_database_reports_every_problem() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let result = DatabaseValidator::new(pool).validate().await.unwrap();
        assert!(!result.is_initialized);
        assert_eq!(result.missing_tables.len(), REQUIRED_TABLES.len());
        assert!(result.summary().contains("never been run"));
    }

    #[tokio::test]
    async fn dropped_table_shows_up_as_missing() {
        let db = DBService::new_in_memory().await.unwrap();
        sqlx::query("DROP TABLE ai_usage_logs")
            .execute(&db.pool)
            .await
            .unwrap();
        let result = DatabaseValidator::new(db.pool.clone()).validate().await.unwrap();
        assert_eq!(result.missing_tables, vec!["ai_usage_logs".to_string()]);
        assert!(!result.is_ok());
    }
}
