// src/auth/session.rs
// Bearer-token extractor resolving the caller to a local user

use axum::extract::{FromRequestParts, OptionalFromRequestParts};
use axum::http::{header, request::Parts};
use tracing::debug;

use crate::api::error::{ApiError, Surface};
use crate::db::users;
use crate::models::{User, UserType};
use crate::state::AppState;

/// Authenticated caller
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub user: User,
    pub token: String,
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

async fn resolve(token: &str, state: &AppState) -> Result<AuthSession, ApiError> {
    let account = state.identity.lookup(token).await.map_err(|e| {
        debug!(error = %e, "Token lookup failed");
        ApiError::from(crate::error::AppError::from(e))
    })?;

    let user_type = if account.anonymous {
        UserType::Guest
    } else {
        UserType::Regular
    };
    let user = users::ensure_user(&state.pool, &account.uid, account.email.as_deref(), user_type)
        .await?;

    Ok(AuthSession {
        user,
        token: token.to_string(),
    })
}

impl FromRequestParts<AppState> for AuthSession {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or_else(|| ApiError::unauthorized(Surface::Auth))?;
        resolve(token, state).await
    }
}

/// A missing header yields `None`; a present but invalid token is still rejected
impl OptionalFromRequestParts<AppState> for AuthSession {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Option<Self>, Self::Rejection> {
        match bearer_token(parts) {
            Some(token) => resolve(token, state).await.map(Some),
            None => Ok(None),
        }
    }
}
