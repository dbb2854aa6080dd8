use std::{str::FromStr, time::Duration};

use sqlx::{
    Error, SqlitePool,
    migrate::MigrateError,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
};
use tracing::info;

pub mod models;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

#[derive(Clone, Debug)]
pub struct DBService {
    pub pool: SqlitePool,
}

impl DBService {
    /// Open (creating if needed) the database at `database_url` and run pending migrations.
    pub async fn new(database_url: &str) -> Result<DBService, Error> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await?;

        run_migrations(&pool).await?;
        info!(database_url = %database_url, "Database ready");
        Ok(DBService { pool })
    }

    /// Single-connection in-memory database, migrated. Every call yields an isolated database.
    pub async fn new_in_memory() -> Result<DBService, Error> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        // One connection that never expires, otherwise the in-memory database vanishes with it.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        run_migrations(&pool).await?;
        Ok(DBService { pool })
    }
}

async fn run_migrations(pool: &SqlitePool) -> Result<(), Error> {
    MIGRATOR.run(pool).await.map_err(|e| match e {
        MigrateError::Execute(err) => err,
        other => Error::Migrate(Box::new(other)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_database_is_migrated_with_seeded_roles() {
        let db = DBService::new_in_memory().await.unwrap();
        let roles: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM roles WHERE is_system = 1")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(roles, 4);
    }

    #[tokio::test]
    async fn in_memory_databases_are_isolated() {
        let a = DBService::new_in_memory().await.unwrap();
        let b = DBService::new_in_memory().await.unwrap();
        sqlx::query("DELETE FROM roles").execute(&a.pool).await.unwrap();
        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM roles")
            .fetch_one(&b.pool)
            .await
            .unwrap();
        assert_eq!(remaining, 4);
    }
}
