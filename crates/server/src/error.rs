use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use services::services::{
    access::AccessError, auth::AuthError, database_validator::DatabaseValidationError,
    notification::NotificationError, text_analysis::TextAnalysisError,
};
use thiserror::Error;
use utils::response::ApiResponse;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Access(#[from] AccessError),
    #[error(transparent)]
    TextAnalysis(#[from] TextAnalysisError),
    #[error(transparent)]
    Notification(#[from] NotificationError),
    #[error(transparent)]
    DatabaseValidation(#[from] DatabaseValidationError),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    Conflict(String),
}

impl ApiError {
    pub fn not_found(what: &str) -> Self {
        ApiError::NotFound(format!("{what} not found"))
    }

    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            ApiError::Database(e) => database_status(e),
            ApiError::Auth(e) => match e {
                AuthError::InvalidCredentials | AuthError::MissingToken | AuthError::InvalidToken => {
                    (StatusCode::UNAUTHORIZED, e.to_string())
                }
                AuthError::Inactive => (StatusCode::FORBIDDEN, e.to_string()),
                AuthError::EmailTaken => (StatusCode::CONFLICT, e.to_string()),
                AuthError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
                AuthError::Database(db) => database_status(db),
                AuthError::Hash(_) => internal(),
            },
            ApiError::Access(e) => match e {
                AccessError::NotFound(_) => (StatusCode::NOT_FOUND, e.to_string()),
                AccessError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
                AccessError::Database(db) => database_status(db),
            },
            ApiError::TextAnalysis(e) => match e {
                TextAnalysisError::EmptyInput | TextAnalysisError::TooLong { .. } => {
                    (StatusCode::BAD_REQUEST, e.to_string())
                }
                TextAnalysisError::Database(db) => database_status(db),
            },
            ApiError::Notification(NotificationError::Database(db)) => database_status(db),
            ApiError::DatabaseValidation(DatabaseValidationError::Database(db)) => database_status(db),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
        }
    }
}

fn internal() -> (StatusCode, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal server error".to_string(),
    )
}

fn database_status(e: &sqlx::Error) -> (StatusCode, String) {
    match e {
        sqlx::Error::RowNotFound => (StatusCode::NOT_FOUND, "Record not found".to_string()),
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            (StatusCode::CONFLICT, "A record with these values already exists".to_string())
        }
        sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => (
            StatusCode::BAD_REQUEST,
            "Referenced record does not exist".to_string(),
        ),
        sqlx::Error::Database(db_err) if db_err.is_check_violation() => {
            (StatusCode::BAD_REQUEST, "Invalid field value".to_string())
        }
        _ => internal(),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self, "Request rejected");
        }
        (status, Json(ApiResponse::<()>::error(message))).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_errors_map_to_statuses() {
        let cases = [
            (ApiError::from(AuthError::EmailTaken), StatusCode::CONFLICT),
            (ApiError::from(AuthError::InvalidToken), StatusCode::UNAUTHORIZED),
            (ApiError::from(AuthError::Inactive), StatusCode::FORBIDDEN),
            (ApiError::from(AccessError::NotFound("project")), StatusCode::NOT_FOUND),
            (
                ApiError::from(AccessError::Forbidden("no".to_string())),
                StatusCode::FORBIDDEN,
            ),
            (ApiError::from(TextAnalysisError::EmptyInput), StatusCode::BAD_REQUEST),
            (ApiError::from(sqlx::Error::RowNotFound), StatusCode::NOT_FOUND),
            (ApiError::from(sqlx::Error::PoolTimedOut), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }

    #[test]
    fn internal_details_are_not_leaked() {
        let (status, message) = ApiError::from(AuthError::Hash("argon2 exploded".to_string())).status_and_message();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(message, "Internal server error");
    }
}
