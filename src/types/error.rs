//! Error types for Accolade
//!
//! One enum for the whole service. Lifecycle guards, store adapters and the
//! HTTP layer all speak `AccoladeError`; the router turns it into a status
//! code and a stable machine-readable `code()` for the response envelope.

use hyper::StatusCode;

use crate::lifecycle::{AchievementStatus, Transition};

/// Main error type for Accolade operations
#[derive(Debug, thiserror::Error)]
pub enum AccoladeError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Cannot {requested} an achievement in status '{current}'")]
    InvalidState {
        current: AchievementStatus,
        requested: Transition,
    },

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unique constraint violated: {0}")]
    UniqueConstraintViolation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AccoladeError {
    /// Convert error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidState { .. } => StatusCode::CONFLICT,
            Self::ValidationFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::UniqueConstraintViolation(_) => StatusCode::CONFLICT,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Auth(_) => StatusCode::UNAUTHORIZED,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable error code for API clients
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::InvalidState { .. } => "INVALID_STATE",
            Self::ValidationFailed(_) => "VALIDATION_FAILED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            Self::Conflict(_) | Self::UniqueConstraintViolation(_) => "CONFLICT",
            Self::Unauthorized(_) | Self::Auth(_) => "UNAUTHORIZED",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Config(_) | Self::Internal(_) => "INTERNAL",
        }
    }

    /// Shorthand for the lifecycle guard failure
    pub fn invalid_state(current: AchievementStatus, requested: Transition) -> Self {
        Self::InvalidState { current, requested }
    }
}

impl From<std::io::Error> for AccoladeError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for AccoladeError {
    fn from(err: serde_json::Error) -> Self {
        Self::BadRequest(format!("JSON error: {}", err))
    }
}

impl From<hyper::Error> for AccoladeError {
    fn from(err: hyper::Error) -> Self {
        Self::Internal(format!("HTTP error: {}", err))
    }
}

impl From<mongodb::error::Error> for AccoladeError {
    fn from(err: mongodb::error::Error) -> Self {
        Self::StoreUnavailable(format!("document store: {}", err))
    }
}

impl From<bson::oid::Error> for AccoladeError {
    fn from(err: bson::oid::Error) -> Self {
        Self::NotFound(format!("detail reference: {}", err))
    }
}

impl From<rusqlite::Error> for AccoladeError {
    fn from(err: rusqlite::Error) -> Self {
        use rusqlite::ffi;

        match err {
            rusqlite::Error::QueryReturnedNoRows => Self::NotFound("row not found".into()),
            rusqlite::Error::SqliteFailure(ref e, ref msg)
                if e.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
                    || e.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
            {
                Self::UniqueConstraintViolation(
                    msg.clone().unwrap_or_else(|| "duplicate key".to_string()),
                )
            }
            other => Self::StoreUnavailable(format!("relational store: {}", other)),
        }
    }
}

impl From<tokio::task::JoinError> for AccoladeError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Internal(format!("blocking task failed: {}", err))
    }
}

impl From<jsonwebtoken::errors::Error> for AccoladeError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Self::Unauthorized(format!("JWT error: {}", err))
    }
}

/// Result type alias for Accolade operations
pub type Result<T> = std::result::Result<T, AccoladeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AccoladeError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AccoladeError::invalid_state(AchievementStatus::Verified, Transition::Edit)
                .status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AccoladeError::StoreUnavailable("timeout".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AccoladeError::ValidationFailed("note".into()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[test]
    fn test_invalid_state_message() {
        let err = AccoladeError::invalid_state(AchievementStatus::Submitted, Transition::Edit);
        assert_eq!(err.code(), "INVALID_STATE");
        assert_eq!(
            err.to_string(),
            "Cannot edit an achievement in status 'submitted'"
        );
    }

    #[test]
    fn test_unique_violation_is_typed() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (id TEXT PRIMARY KEY, name TEXT UNIQUE);")
            .unwrap();
        conn.execute("INSERT INTO t VALUES ('a', 'x')", []).unwrap();

        let err: AccoladeError = conn
            .execute("INSERT INTO t VALUES ('b', 'x')", [])
            .unwrap_err()
            .into();
        assert!(matches!(err, AccoladeError::UniqueConstraintViolation(_)));

        let err: AccoladeError = conn
            .execute("INSERT INTO t VALUES ('a', 'y')", [])
            .unwrap_err()
            .into();
        assert!(matches!(err, AccoladeError::UniqueConstraintViolation(_)));
    }

    #[test]
    fn test_no_rows_is_not_found() {
        let err: AccoladeError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, AccoladeError::NotFound(_)));
    }
}
