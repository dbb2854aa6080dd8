use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use db::models::{role::Permission, user::User};
use deployment::Deployment;
use services::services::{access::Actor, auth::AuthError};
use utils::jwt::bearer_token;

use crate::{DeploymentImpl, error::ApiError};

/// The authenticated, active user behind the request's bearer token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user: User,
    pub actor: Actor,
}

impl AuthUser {
    pub fn id(&self) -> uuid::Uuid {
        self.user.id
    }

    pub fn require(&self, permission: Permission) -> Result<(), ApiError> {
        Ok(self.actor.require(permission)?)
    }
}

impl FromRequestParts<DeploymentImpl> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        deployment: &DeploymentImpl,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(bearer_token)
            .ok_or(AuthError::MissingToken)?;

        let (user, actor) = deployment
            .auth()
            .authenticate(&deployment.db().pool, token)
            .await?;
        Ok(Self { user, actor })
    }
}
