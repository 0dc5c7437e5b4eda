// src/auth/handlers.rs
// Sign-up, sign-in, OAuth, guest and session endpoints

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::identity::{IdentityError, IdentitySession, IdpCredential, validate_credentials};
use super::session::AuthSession;
use crate::api::error::{ApiError, ApiResult};
use crate::db::users;
use crate::error::AppError;
use crate::models::{User, UserType};
use crate::state::AppState;

const DEFAULT_REQUEST_URI: &str = "http://localhost";

#[derive(Debug, Deserialize)]
pub struct CredentialsBody {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthBody {
    /// e.g. `google.com`, `github.com`
    pub provider_id: String,
    #[serde(flatten)]
    pub credential: IdpCredential,
    #[serde(default)]
    pub request_uri: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub user: User,
    pub token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub user: User,
}

fn identity_error(e: IdentityError) -> ApiError {
    AppError::from(e).into()
}

async fn finish(
    state: &AppState,
    session: IdentitySession,
    user_type: UserType,
) -> ApiResult<Json<AuthResponse>> {
    let user = users::ensure_user(&state.pool, &session.uid, session.email.as_deref(), user_type)
        .await?;

    Ok(Json(AuthResponse {
        user,
        token: session.id_token,
        refresh_token: session.refresh_token,
        expires_in: session.expires_in,
    }))
}

/// POST /api/auth/register
pub async fn register_handler(
    State(state): State<AppState>,
    Json(body): Json<CredentialsBody>,
) -> ApiResult<Json<AuthResponse>> {
    validate_credentials(&body.email, &body.password).map_err(identity_error)?;

    let session = state
        .identity
        .sign_up(&body.email, &body.password)
        .await
        .map_err(identity_error)?;

    info!(uid = %session.uid, "Registered new account");
    finish(&state, session, UserType::Regular).await
}

/// POST /api/auth/login
pub async fn login_handler(
    State(state): State<AppState>,
    Json(body): Json<CredentialsBody>,
) -> ApiResult<Json<AuthResponse>> {
    validate_credentials(&body.email, &body.password).map_err(identity_error)?;

    let session = state
        .identity
        .sign_in_with_password(&body.email, &body.password)
        .await
        .map_err(identity_error)?;

    finish(&state, session, UserType::Regular).await
}

/// POST /api/auth/oauth
pub async fn oauth_handler(
    State(state): State<AppState>,
    Json(body): Json<OAuthBody>,
) -> ApiResult<Json<AuthResponse>> {
    let request_uri = body.request_uri.as_deref().unwrap_or(DEFAULT_REQUEST_URI);
    let session = state
        .identity
        .sign_in_with_idp(&body.provider_id, &body.credential, request_uri)
        .await
        .map_err(identity_error)?;

    info!(uid = %session.uid, provider = %body.provider_id, "OAuth sign-in");
    finish(&state, session, UserType::Regular).await
}

/// POST /api/auth/guest
pub async fn guest_handler(State(state): State<AppState>) -> ApiResult<Json<AuthResponse>> {
    let session = state
        .identity
        .sign_up_anonymous()
        .await
        .map_err(identity_error)?;

    finish(&state, session, UserType::Guest).await
}

/// GET /api/auth/session
pub async fn session_handler(auth: AuthSession) -> Json<SessionResponse> {
    Json(SessionResponse { user: auth.user })
}
