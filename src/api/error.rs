// src/api/error.rs
// Centralized error handling for HTTP API responses

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;
use tracing::error;

use crate::auth::IdentityErrorKind;
use crate::error::AppError;

/// User-facing error category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorType {
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    RateLimit,
    Offline,
}

impl ErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BadRequest => "bad_request",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::NotFound => "not_found",
            Self::RateLimit => "rate_limit",
            Self::Offline => "offline",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::RateLimit => StatusCode::TOO_MANY_REQUESTS,
            Self::Offline => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// Part of the product the error originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    Chat,
    Auth,
    Api,
    Stream,
    Database,
    History,
    Vote,
    Strategy,
}

impl Surface {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Auth => "auth",
            Self::Api => "api",
            Self::Stream => "stream",
            Self::Database => "database",
            Self::History => "history",
            Self::Vote => "vote",
            Self::Strategy => "strategy",
        }
    }
}

/// Standard API error: a `type:surface` code plus an optional cause
#[derive(Debug)]
pub struct ApiError {
    pub error_type: ErrorType,
    pub surface: Surface,
    pub cause: Option<String>,
}

impl ApiError {
    pub fn new(error_type: ErrorType, surface: Surface) -> Self {
        Self {
            error_type,
            surface,
            cause: None,
        }
    }

    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    pub fn bad_request(surface: Surface) -> Self {
        Self::new(ErrorType::BadRequest, surface)
    }

    pub fn unauthorized(surface: Surface) -> Self {
        Self::new(ErrorType::Unauthorized, surface)
    }

    pub fn forbidden(surface: Surface) -> Self {
        Self::new(ErrorType::Forbidden, surface)
    }

    pub fn not_found(surface: Surface) -> Self {
        Self::new(ErrorType::NotFound, surface)
    }

    pub fn rate_limit(surface: Surface) -> Self {
        Self::new(ErrorType::RateLimit, surface)
    }

    pub fn offline(surface: Surface) -> Self {
        Self::new(ErrorType::Offline, surface)
    }

    /// Database failures are reported with a generic message; the cause only goes to the log
    pub fn database(cause: impl Into<String>) -> Self {
        Self::bad_request(Surface::Database).with_cause(cause)
    }

    pub fn code(&self) -> String {
        format!("{}:{}", self.error_type.as_str(), self.surface.as_str())
    }

    pub fn status_code(&self) -> StatusCode {
        self.error_type.status_code()
    }

    /// Fixed user-facing message for this code
    pub fn message(&self) -> &'static str {
        if self.surface == Surface::Database {
            return "An error occurred while executing a database query.";
        }

        match (self.error_type, self.surface) {
            (ErrorType::BadRequest, Surface::Api) => {
                "The request couldn't be processed. Please check your input and try again."
            }
            (ErrorType::BadRequest, Surface::Auth) => {
                "The credentials provided were not accepted. Please check them and try again."
            }
            (ErrorType::Unauthorized, Surface::Auth) => "You need to sign in before continuing.",
            (ErrorType::Forbidden, Surface::Auth) => {
                "Your account does not have access to this feature."
            }
            (ErrorType::RateLimit, Surface::Chat) => {
                "You have exceeded your maximum number of messages for the day. Please try again later."
            }
            (ErrorType::NotFound, Surface::Chat) => {
                "The requested chat was not found. Please check the chat ID and try again."
            }
            (ErrorType::Forbidden, Surface::Chat) => {
                "This chat belongs to another user. Please check the chat ID and try again."
            }
            (ErrorType::Unauthorized, Surface::Chat) => {
                "You need to sign in to view this chat. Please sign in and try again."
            }
            (ErrorType::Offline, Surface::Chat) => {
                "We're having trouble sending your message. Please check your internet connection and try again."
            }
            (ErrorType::Offline, Surface::Strategy) => {
                "The strategy service is unavailable right now. Please try again later."
            }
            (ErrorType::BadRequest, Surface::Strategy) => {
                "The strategy service rejected the request. Please check the strategy and try again."
            }
            (ErrorType::NotFound, Surface::Api) => "The requested resource was not found.",
            (ErrorType::NotFound, Surface::Vote) => {
                "The message you are trying to vote on was not found."
            }
            (ErrorType::Forbidden, Surface::Vote) => {
                "You can only vote on messages in your own chats."
            }
            (ErrorType::BadRequest, Surface::History) => {
                "Only one of starting_after or ending_before can be provided."
            }
            _ => "Something went wrong. Please try again later.",
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code(), self.message())
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.code();
        let status = self.status_code();

        if self.surface == Surface::Database {
            error!(
                code = %code,
                cause = self.cause.as_deref().unwrap_or(""),
                "Database error"
            );
            return (status, Json(json!({ "code": code, "message": self.message() })))
                .into_response();
        }

        let mut body = json!({
            "code": code,
            "message": self.message(),
        });
        if let Some(cause) = self.cause {
            body["cause"] = json!(cause);
        }

        (status, Json(body)).into_response()
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::InvalidInput(msg) => ApiError::bad_request(Surface::Api).with_cause(msg),
            AppError::NotFound(msg) => ApiError::not_found(Surface::Api).with_cause(msg),
            AppError::Db(e) => ApiError::database(e.to_string()),
            AppError::Migrate(e) => ApiError::database(e.to_string()),
            AppError::Identity(e) => match e.kind {
                IdentityErrorKind::InvalidToken | IdentityErrorKind::TokenExpired => {
                    ApiError::unauthorized(Surface::Auth)
                }
                IdentityErrorKind::Unavailable => {
                    ApiError::offline(Surface::Auth).with_cause(e.message)
                }
                _ => ApiError::bad_request(Surface::Auth).with_cause(e.message),
            },
            AppError::Unreachable(msg) => ApiError::offline(Surface::Strategy).with_cause(msg),
            AppError::Timeout(d) => {
                ApiError::offline(Surface::Strategy).with_cause(format!("timed out after {d:?}"))
            }
            AppError::Remote(msg) => ApiError::bad_request(Surface::Strategy).with_cause(msg),
            other => {
                error!(error = %other, "Unhandled internal error");
                ApiError::offline(Surface::Api)
            }
        }
    }
}

/// Result type alias for API operations
pub type ApiResult<T> = Result<T, ApiError>;

/// Extension trait for Option<T> to create ApiError for None cases
pub trait IntoApiErrorOption<T> {
    fn ok_or_not_found(self, surface: Surface) -> Result<T, ApiError>;
    fn ok_or_bad_request(self, surface: Surface) -> Result<T, ApiError>;
}

impl<T> IntoApiErrorOption<T> for Option<T> {
    fn ok_or_not_found(self, surface: Surface) -> Result<T, ApiError> {
        self.ok_or_else(|| ApiError::not_found(surface))
    }

    fn ok_or_bad_request(self, surface: Surface) -> Result<T, ApiError> {
        self.ok_or_else(|| ApiError::bad_request(surface))
    }
}
