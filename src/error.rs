// src/error.rs
// Library error type shared by the db, auth, llm and chat layers

use thiserror::Error;

/// Main error type for the finchat library
#[derive(Error, Debug)]
pub enum AppError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("identity provider error: {0}")]
    Identity(#[from] crate::auth::IdentityError),

    #[error("model provider error: {0}")]
    Provider(String),

    #[error("strategy service error: {0}")]
    Remote(String),

    #[error("strategy service unreachable: {0}")]
    Unreachable(String),

    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("unknown error: {0}")]
    Other(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// Convenience type alias for Result using AppError
pub type Result<T> = std::result::Result<T, AppError>;

impl From<String> for AppError {
    fn from(s: String) -> Self {
        AppError::Other(s)
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_input_error() {
        let err = AppError::InvalidInput("bad data".to_string());
        assert!(err.to_string().contains("invalid input"));
        assert!(err.to_string().contains("bad data"));
    }

    #[test]
    fn test_remote_error() {
        let err = AppError::Remote("502 Bad Gateway".to_string());
        assert!(err.to_string().contains("strategy service"));
        assert!(err.to_string().contains("502"));
    }

    #[test]
    fn test_timeout_error() {
        let err = AppError::Timeout(std::time::Duration::from_secs(5));
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn test_from_string() {
        let err: AppError = "some error".to_string().into();
        assert!(matches!(err, AppError::Other(_)));
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<i32>("not json").unwrap_err();
        let err: AppError = json_err.into();
        assert!(matches!(err, AppError::Json(_)));
        assert!(err.to_string().contains("JSON"));
    }
}
