use std::sync::Arc;

use async_trait::async_trait;
use db::DBService;
use services::services::{
    auth::AuthService,
    claude_api::ClaudeApiError,
    notification::{NotificationService, NotificationSweeper, SweepHandles},
    text_analysis::AiTextService,
};
use thiserror::Error;

pub mod config;

use config::{Config, ConfigError};

#[derive(Debug, Error)]
pub enum DeploymentError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Claude(#[from] ClaudeApiError),
}

/// Everything a request handler can reach.
#[async_trait]
pub trait Deployment: Clone + Send + Sync + 'static {
    async fn new() -> Result<Self, DeploymentError>;

    fn config(&self) -> &Arc<Config>;

    fn db(&self) -> &DBService;

    fn auth(&self) -> &AuthService;

    fn ai_text(&self) -> &AiTextService;

    fn notifications(&self) -> &NotificationService;

    /// Start the reminder and cleanup loops.
    fn spawn_background_tasks(&self) -> SweepHandles {
        NotificationSweeper::spawn(self.notifications().clone(), self.config().sweep.clone())
    }
}
