use axum::{
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
};
use std::fmt;

/// Where anonymous viewers of gated pages are sent. The auth layer itself
/// lives outside this service; we only honor its URL contract.
pub const LOGIN_URL: &str = "/auth/login/";

#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    /// Carries the path the viewer tried to reach so the login redirect
    /// can send them back there afterwards.
    Unauthorized(String),
    Database(anyhow::Error),
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::Unauthorized(path) => write!(f, "Unauthorized: {}", path),
            AppError::Database(err) => write!(f, "Database error: {}", err),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

/// Plain 302, the status the rest of the handlers use for post-submit and
/// follow redirects.
pub fn redirect_found(to: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, to.to_string())]).into_response()
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                Html(format!(
                    "<!doctype html><html><body><h1>404 Not Found</h1><p>{}</p></body></html>",
                    msg
                )),
            )
                .into_response(),
            AppError::Unauthorized(path) => {
                redirect_found(&format!("{}?next={}", LOGIN_URL, path))
            }
            AppError::Database(err) => {
                tracing::error!("Database error: {}", err);
                server_error_page()
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                server_error_page()
            }
        }
    }
}

fn server_error_page() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Html("<!doctype html><html><body><h1>500 Server Error</h1></body></html>".to_string()),
    )
        .into_response()
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Database(err)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err.into())
    }
}

pub type AppResult<T> = Result<T, AppError>;
