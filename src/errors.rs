use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

/// Application-specific error types.
#[derive(Debug)]
pub enum AppError {
    /// PostgreSQL storage backend errors.
    DatabaseError(sqlx::Error),
    /// Local persistence failures that are not database errors (serialization, corruption).
    StorageError(String),
    /// Resource not found error (unknown session, no cached results).
    NotFound(String),
    /// Bad request error (invalid answer, wrong step).
    BadRequest(String),
    /// Operation disabled by configuration.
    Forbidden(String),
    /// Error interacting with the remote audit webhook service.
    ExternalApiError(String),
    /// An error wrapped with a description of what was being attempted.
    WithContext {
        source: Box<AppError>,
        context: String,
    },
}

impl AppError {
    /// Innermost error, skipping context wrappers.
    pub fn root(&self) -> &AppError {
        match self {
            AppError::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self.root() {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::ExternalApiError(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code for the front end.
    pub fn code(&self) -> &'static str {
        match self.root() {
            AppError::DatabaseError(_) | AppError::StorageError(_) => "storage_error",
            AppError::NotFound(_) => "not_found",
            AppError::BadRequest(_) => "invalid_input",
            AppError::Forbidden(_) => "forbidden",
            AppError::ExternalApiError(_) => "audit_service_error",
            AppError::WithContext { .. } => "internal_error",
        }
    }

    /// Message safe to show to the user. Infrastructure details stay in the logs.
    fn public_message(&self) -> String {
        match self.root() {
            AppError::NotFound(msg) => format!("{} not found", msg),
            AppError::BadRequest(msg) | AppError::Forbidden(msg) => msg.clone(),
            AppError::ExternalApiError(_) => {
                "The audit service is unavailable. Please try again.".to_string()
            }
            _ => "Internal server error".to_string(),
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::DatabaseError(e) => write!(f, "Database error: {}", e),
            AppError::StorageError(msg) => write!(f, "Storage error: {}", msg),
            AppError::NotFound(msg) => write!(f, "{} not found", msg),
            AppError::BadRequest(msg) => write!(f, "Invalid input: {}", msg),
            AppError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            AppError::ExternalApiError(msg) => write!(f, "Audit service error: {}", msg),
            AppError::WithContext { source, context } => write!(f, "{}: {}", context, source),
        }
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    /// `{ "error": <message>, "code": <code> }` with the root error's status.
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("❌ {}", self);
        } else {
            tracing::warn!("Request rejected ({}): {}", status.as_u16(), self);
        }

        let body = Json(json!({
            "error": self.public_message(),
            "code": self.code(),
        }));

        (status, body).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::DatabaseError(err)
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::ExternalApiError(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::StorageError(format!("JSON error: {}", err))
    }
}

/// Attaches a description of the failed operation to any error convertible
/// into [`AppError`], in the manner of `anyhow::Context`.
pub trait ResultExt<T> {
    fn context(self, context: impl Into<String>) -> Result<T, AppError>;

    /// Lazy variant; `f` only runs on error.
    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: Into<AppError>,
{
    fn context(self, context: impl Into<String>) -> Result<T, AppError> {
        self.with_context(|| context.into())
    }

    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e.into()),
            context: f(),
        })
    }
}
