//! Registration, login and bearer-token authentication.

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use db::models::{
    role::{ADMIN_ROLE, DEFAULT_ROLE, Role},
    user::{CreateUser, User, UserResponse},
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{info, warn};
use ts_rs::TS;
use utils::jwt::{JwtKeys, TokenError};
use uuid::Uuid;

use super::access::Actor;

pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("authentication required")]
    MissingToken,
    #[error("invalid or expired token")]
    InvalidToken,
    #[error("account is disabled")]
    Inactive,
    #[error("an account with this email already exists")]
    EmailTaken,
    #[error("{0}")]
    Validation(String),
    #[error("password hashing failed: {0}")]
    Hash(String),
}

impl From<TokenError> for AuthError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::Encode(msg) => AuthError::Hash(msg),
            TokenError::Expired | TokenError::Invalid(_) => AuthError::InvalidToken,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
    pub full_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserResponse,
}

#[derive(Debug, Clone)]
pub struct AuthService {
    keys: JwtKeys,
}

impl AuthService {
    pub fn new(keys: JwtKeys) -> Self {
        Self { keys }
    }

    pub fn hash_password(password: &str) -> Result<String, AuthError> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AuthError::Hash(e.to_string()))
    }

    pub fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
        let parsed = PasswordHash::new(hash).map_err(|e| AuthError::Hash(e.to_string()))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    }

    /// Create an account. The very first account becomes an administrator.
    pub async fn register(
        &self,
        pool: &SqlitePool,
        request: RegisterRequest,
    ) -> Result<AuthResponse, AuthError> {
        let email = normalize_email(&request.email)?;
        let username = request.username.trim().to_string();
        if username.is_empty() {
            return Err(AuthError::Validation("username is required".to_string()));
        }
        validate_password(&request.password)?;

        if User::find_by_email(pool, &email).await?.is_some() {
            return Err(AuthError::EmailTaken);
        }

        let password_hash = Self::hash_password(&request.password)?;
        let member = Role::find_by_name(pool, DEFAULT_ROLE).await?;
        let admin = Role::find_by_name(pool, ADMIN_ROLE).await?;

        // The insert takes the write lock, so the count below sees every committed user
        let mut tx = pool.begin().await?;
        let mut user = User::create(
            &mut *tx,
            &CreateUser {
                email,
                username,
                full_name: request
                    .full_name
                    .map(|n| n.trim().to_string())
                    .filter(|n| !n.is_empty()),
                password_hash,
                role_id: member.as_ref().map(|r| r.id),
            },
            Uuid::new_v4(),
        )
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => AuthError::EmailTaken,
            other => AuthError::Database(other),
        })?;

        let role = if User::count(&mut *tx).await? == 1 {
            if let Some(promoted) = User::set_role(&mut *tx, user.id, admin.as_ref().map(|r| r.id)).await? {
                user = promoted;
            }
            admin
        } else {
            member
        };
        tx.commit().await?;

        info!(user_id = %user.id, role = ?role.as_ref().map(|r| &r.name), "Registered user");

        let token = self.keys.issue(user.id, &user.email)?;
        Ok(AuthResponse {
            token,
            user: UserResponse::new(user, role.map(|r| r.name)),
        })
    }

    pub async fn login(&self, pool: &SqlitePool, request: LoginRequest) -> Result<AuthResponse, AuthError> {
        let email = request.email.trim().to_lowercase();
        let Some(user) = User::find_by_email(pool, &email).await? else {
            return Err(AuthError::InvalidCredentials);
        };
        if !Self::verify_password(&request.password, &user.password_hash)? {
            warn!(user_id = %user.id, "Failed login attempt");
            return Err(AuthError::InvalidCredentials);
        }
        if !user.is_active {
            return Err(AuthError::Inactive);
        }

        User::touch_last_login(pool, user.id).await?;
        let token = self.keys.issue(user.id, &user.email)?;
        let user = User::find_by_id(pool, user.id).await?.unwrap_or(user);
        Ok(AuthResponse {
            token,
            user: user_response(pool, user).await?,
        })
    }

    pub async fn change_password(
        &self,
        pool: &SqlitePool,
        user: &User,
        request: ChangePasswordRequest,
    ) -> Result<(), AuthError> {
        if !Self::verify_password(&request.current_password, &user.password_hash)? {
            return Err(AuthError::InvalidCredentials);
        }
        validate_password(&request.new_password)?;
        User::update_password(pool, user.id, &Self::hash_password(&request.new_password)?).await?;
        info!(user_id = %user.id, "Password changed");
        Ok(())
    }

    /// Resolve a bearer token into the active user behind it.
    pub async fn authenticate(&self, pool: &SqlitePool, token: &str) -> Result<(User, Actor), AuthError> {
        let claims = self.keys.verify(token)?;
        let user = User::find_by_id(pool, claims.sub)
            .await?
            .ok_or(AuthError::InvalidToken)?;
        if !user.is_active {
            return Err(AuthError::Inactive);
        }
        let role = match user.role_id {
            Some(role_id) => Role::find_by_id(pool, role_id).await?,
            None => None,
        };
        let actor = Actor {
            user_id: user.id,
            role,
        };
        Ok((user, actor))
    }
}

/// Public view of `user` with its role name resolved.
pub async fn user_response(pool: &SqlitePool, user: User) -> Result<UserResponse, sqlx::Error> {
    let role_name = match user.role_id {
        Some(role_id) => Role::find_by_id(pool, role_id).await?.map(|r| r.name),
        None => None,
    };
    Ok(UserResponse::new(user, role_name))
}

fn normalize_email(email: &str) -> Result<String, AuthError> {
    let email = email.trim().to_lowercase();
    let valid = email
        .split_once('@')
        .is_some_and(|(local, domain)| {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !domain.contains('@')
        });
    if valid {
        Ok(email)
    } else {
        Err(AuthError::Validation("a valid email address is required".to_string()))
    }
}

fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::Validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}
