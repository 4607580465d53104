use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::auth::session::AuthError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Auth(#[from] AuthError),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("{0}")]
    Forbidden(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Malformed multipart body: {0}")]
    Multipart(#[from] MultipartError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Password hashing error: {0}")]
    Hash(#[from] bcrypt::BcryptError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn not_found(what: &str) -> Self {
        AppError::NotFound(format!("{} not found", what))
    }

    /// Turn a UNIQUE constraint failure into a 400 with the given message;
    /// every other database error passes through untouched.
    pub fn conflict_or(err: rusqlite::Error, message: &str) -> Self {
        if is_unique_violation(&err) {
            AppError::BadRequest(message.to_string())
        } else {
            AppError::Database(err)
        }
    }
}

pub fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Auth(e) => (StatusCode::UNAUTHORIZED, e.to_string()),
            AppError::InvalidCredentials => (StatusCode::UNAUTHORIZED, self.to_string()),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Multipart(e) => {
                tracing::debug!("Multipart error: {}", e);
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                internal()
            }
            AppError::Pool(e) => {
                tracing::error!("Pool error: {}", e);
                internal()
            }
            AppError::Io(e) => {
                tracing::error!("IO error: {}", e);
                internal()
            }
            AppError::Hash(e) => {
                tracing::error!("Password hashing error: {}", e);
                internal()
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                internal()
            }
        };

        (status, Json(serde_json::json!({ "detail": message }))).into_response()
    }
}

fn internal() -> (StatusCode, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal server error".to_string(),
    )
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    fn response_status(err: AppError) -> StatusCode {
        let response = err.into_response();
        response.status()
    }

    #[test]
    fn not_found_returns_404() {
        assert_eq!(
            response_status(AppError::not_found("Post")),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn not_found_message_names_the_entity() {
        assert_eq!(AppError::not_found("Post").to_string(), "Post not found");
    }

    #[test]
    fn auth_errors_return_401() {
        assert_eq!(
            response_status(AppError::Auth(AuthError::Missing)),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            response_status(AppError::Auth(AuthError::InvalidOrExpired)),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            response_status(AppError::InvalidCredentials),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn forbidden_returns_403() {
        assert_eq!(
            response_status(AppError::Forbidden("Access denied".into())),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn bad_request_returns_400() {
        assert_eq!(
            response_status(AppError::BadRequest("oops".into())),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn internal_returns_500() {
        assert_eq!(
            response_status(AppError::Internal("boom".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn unique_violation_maps_to_bad_request() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (name TEXT UNIQUE); INSERT INTO t VALUES ('a');")
            .unwrap();
        let err = conn
            .execute("INSERT INTO t VALUES ('a')", [])
            .unwrap_err();
        assert!(is_unique_violation(&err));
        assert!(matches!(
            AppError::conflict_or(err, "taken"),
            AppError::BadRequest(msg) if msg == "taken"
        ));
    }

    #[test]
    fn other_database_errors_stay_internal() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let err = conn.execute("SELECT * FROM missing", []).unwrap_err();
        assert!(!is_unique_violation(&err));
        assert!(matches!(
            AppError::conflict_or(err, "taken"),
            AppError::Database(_)
        ));
    }
}
