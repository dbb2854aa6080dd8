use std::sync::Arc;

use async_trait::async_trait;
use db::DBService;
use deployment::{Deployment, DeploymentError, config::Config};
use secrecy::ExposeSecret;
use services::services::{
    auth::AuthService,
    claude_api::{ClaudeApiClient, CompletionClient},
    notification::NotificationService,
    text_analysis::AiTextService,
};
use tracing::info;
use utils::jwt::JwtKeys;

#[derive(Clone)]
pub struct LocalDeployment {
    config: Arc<Config>,
    db: DBService,
    auth: AuthService,
    ai_text: AiTextService,
    notifications: NotificationService,
}

impl LocalDeployment {
    /// Wire services around an already opened database.
    pub fn from_parts(
        config: Config,
        db: DBService,
        completion_client: Option<Arc<dyn CompletionClient>>,
    ) -> Self {
        let auth = AuthService::new(JwtKeys::new(config.jwt_secret_bytes(), config.jwt_expiry));
        let ai_text = AiTextService::new(db.pool.clone(), completion_client);
        let notifications = NotificationService::new(db.clone());
        Self {
            config: Arc::new(config),
            db,
            auth,
            ai_text,
            notifications,
        }
    }

    pub async fn with_config(config: Config) -> Result<Self, DeploymentError> {
        let db = DBService::new(&config.database_url).await?;

        let completion_client: Option<Arc<dyn CompletionClient>> = match &config.anthropic_api_key {
            Some(key) => {
                let client = ClaudeApiClient::new(
                    key.expose_secret().to_string(),
                    Some(config.ai_model.clone()),
                    Some(config.ai_api_url.clone()),
                )?;
                info!(model = %config.ai_model, "AI text utilities enabled");
                Some(Arc::new(client) as Arc<dyn CompletionClient>)
            }
            None => {
                info!("ANTHROPIC_API_KEY not set, AI text utilities use heuristics only");
                None
            }
        };

        Ok(Self::from_parts(config, db, completion_client))
    }
}

#[async_trait]
impl Deployment for LocalDeployment {
    async fn new() -> Result<Self, DeploymentError> {
        Self::with_config(Config::from_env()?).await
    }

    fn config(&self) -> &Arc<Config> {
        &self.config
    }

    fn db(&self) -> &DBService {
        &self.db
    }

    fn auth(&self) -> &AuthService {
        &self.auth
    }

    fn ai_text(&self) -> &AiTextService {
        &self.ai_text
    }

    fn notifications(&self) -> &NotificationService {
        &self.notifications
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_deployment_has_heuristic_ai() {
        let db = DBService::new_in_memory().await.unwrap();
        let deployment = LocalDeployment::from_parts(Config::default(), db, None);
        assert!(!deployment.ai_text().ai_enabled());
        assert_eq!(deployment.config().port, 3001);
    }

    #[tokio::test]
    async fn file_database_is_created_and_migrated() {
        let path = std::env::temp_dir().join(format!("taskdeck-{}.db", std::process::id()));
        let config = Config {
            database_url: format!("sqlite://{}?mode=rwc", path.display()),
            ..Config::default()
        };
        let deployment = LocalDeployment::with_config(config).await.unwrap();
        let roles = db::models::role::Role::find_all(&deployment.db().pool)
            .await
            .unwrap();
        assert_eq!(roles.len(), 4);
        deployment.db().pool.close().await;
        let _ = std::fs::remove_file(&path);
    }
}
