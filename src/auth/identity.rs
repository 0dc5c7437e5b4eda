// src/auth/identity.rs
// REST bridge to the identity provider's token API

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

const IDENTITY_TIMEOUT: Duration = Duration::from_secs(15);
const MIN_PASSWORD_LEN: usize = 6;

/// Typed failure reasons reported by the identity provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityErrorKind {
    EmailExists,
    InvalidCredentials,
    InvalidEmail,
    WeakPassword,
    UserDisabled,
    InvalidToken,
    TokenExpired,
    InvalidIdpResponse,
    TooManyAttempts,
    Unavailable,
    Rejected,
}

impl IdentityErrorKind {
    /// Map the provider's error message (`EMAIL_EXISTS`, `WEAK_PASSWORD : ...`) to a kind
    pub fn from_provider_message(message: &str) -> Self {
        let code = message.split([' ', ':']).next().unwrap_or("").trim();
        match code {
            "EMAIL_EXISTS" => Self::EmailExists,
            "EMAIL_NOT_FOUND" | "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" => {
                Self::InvalidCredentials
            }
            "INVALID_EMAIL" | "MISSING_EMAIL" => Self::InvalidEmail,
            "WEAK_PASSWORD" | "MISSING_PASSWORD" => Self::WeakPassword,
            "USER_DISABLED" => Self::UserDisabled,
            "INVALID_ID_TOKEN" | "USER_NOT_FOUND" | "CREDENTIAL_MISMATCH" => Self::InvalidToken,
            "TOKEN_EXPIRED" => Self::TokenExpired,
            "INVALID_IDP_RESPONSE" | "INVALID_CREDENTIAL_OR_PROVIDER_ID" => {
                Self::InvalidIdpResponse
            }
            "TOO_MANY_ATTEMPTS_TRY_LATER" => Self::TooManyAttempts,
            _ => Self::Rejected,
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("{kind:?}: {message}")]
pub struct IdentityError {
    pub kind: IdentityErrorKind,
    pub message: String,
}

impl IdentityError {
    pub fn new(kind: IdentityErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(IdentityErrorKind::Unavailable, message)
    }
}

pub type IdentityResult<T> = std::result::Result<T, IdentityError>;

/// Tokens and profile returned by a successful sign-up or sign-in
#[derive(Debug, Clone, PartialEq)]
pub struct IdentitySession {
    pub uid: String,
    pub email: Option<String>,
    pub id_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<u64>,
}

/// Account resolved from an id token
#[derive(Debug, Clone, PartialEq)]
pub struct IdentityUser {
    pub uid: String,
    pub email: Option<String>,
    pub anonymous: bool,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_up(&self, email: &str, password: &str) -> IdentityResult<IdentitySession>;

    /// Create an anonymous (guest) account
    async fn sign_up_anonymous(&self) -> IdentityResult<IdentitySession>;

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> IdentityResult<IdentitySession>;

    /// Exchange an OAuth credential (provider id token or access token) for a session
    async fn sign_in_with_idp(
        &self,
        provider_id: &str,
        credential: &IdpCredential,
        request_uri: &str,
    ) -> IdentityResult<IdentitySession>;

    async fn lookup(&self, id_token: &str) -> IdentityResult<IdentityUser>;
}

/// OAuth credential handed over by the client after the provider's consent flow
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IdpCredential {
    IdToken(String),
    AccessToken(String),
}

impl IdpCredential {
    /// Form-encoded `postBody` for `signInWithIdp`
    fn post_body(&self, provider_id: &str) -> String {
        let (key, token) = match self {
            Self::IdToken(token) => ("id_token", token),
            Self::AccessToken(token) => ("access_token", token),
        };
        format!(
            "{key}={}&providerId={}",
            urlencoding::encode(token),
            urlencoding::encode(provider_id)
        )
    }
}

/// Check email/password shape before calling the provider
pub fn validate_credentials(email: &str, password: &str) -> IdentityResult<()> {
    let mut pieces = email.split('@');
    let valid_email = match (pieces.next(), pieces.next(), pieces.next()) {
        (Some(local), Some(domain), None) => !local.trim().is_empty() && !domain.trim().is_empty(),
        _ => false,
    };
    if !valid_email {
        return Err(IdentityError::new(
            IdentityErrorKind::InvalidEmail,
            "email must look like name@domain",
        ));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(IdentityError::new(
            IdentityErrorKind::WeakPassword,
            format!("password must be at least {MIN_PASSWORD_LEN} characters"),
        ));
    }
    Ok(())
}

// ============================================================================
// REST client
// ============================================================================

pub struct IdentityToolkitClient {
    client: HttpClient,
    base_url: String,
    api_key: Option<String>,
}

impl IdentityToolkitClient {
    pub fn new(client: HttpClient, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn endpoint(&self, method: &str) -> String {
        match &self.api_key {
            Some(key) => format!("{}/v1/accounts:{}?key={}", self.base_url, method, key),
            None => format!("{}/v1/accounts:{}", self.base_url, method),
        }
    }

    async fn call<B, R>(&self, method: &str, body: &B) -> IdentityResult<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = self
            .client
            .post(self.endpoint(method))
            .json(body)
            .timeout(IDENTITY_TIMEOUT)
            .send()
            .await
            .map_err(|e| {
                warn!(method, error = %e, "Identity provider unreachable");
                IdentityError::unavailable(e.to_string())
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| IdentityError::unavailable(e.to_string()))?;

        if !status.is_success() {
            if status.is_server_error() {
                return Err(IdentityError::unavailable(format!("{status}: {text}")));
            }
            let message = serde_json::from_str::<ErrorEnvelope>(&text)
                .map(|e| e.error.message)
                .unwrap_or_else(|_| format!("HTTP {status}"));
            debug!(method, %status, message = %message, "Identity provider rejected request");
            return Err(IdentityError::new(
                IdentityErrorKind::from_provider_message(&message),
                message,
            ));
        }

        serde_json::from_str(&text).map_err(|e| {
            IdentityError::unavailable(format!("unexpected identity response: {e}"))
        })
    }
}

#[async_trait]
impl IdentityProvider for IdentityToolkitClient {
    async fn sign_up(&self, email: &str, password: &str) -> IdentityResult<IdentitySession> {
        let body = PasswordRequest {
            email,
            password,
            return_secure_token: true,
        };
        let response: TokenResponse = self.call("signUp", &body).await?;
        Ok(response.into())
    }

    async fn sign_up_anonymous(&self) -> IdentityResult<IdentitySession> {
        let body = AnonymousRequest {
            return_secure_token: true,
        };
        let response: TokenResponse = self.call("signUp", &body).await?;
        Ok(response.into())
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> IdentityResult<IdentitySession> {
        let body = PasswordRequest {
            email,
            password,
            return_secure_token: true,
        };
        let response: TokenResponse = self.call("signInWithPassword", &body).await?;
        Ok(response.into())
    }

    async fn sign_in_with_idp(
        &self,
        provider_id: &str,
        credential: &IdpCredential,
        request_uri: &str,
    ) -> IdentityResult<IdentitySession> {
        let body = IdpRequest {
            post_body: credential.post_body(provider_id),
            request_uri,
            return_secure_token: true,
            return_idp_credential: true,
        };
        let response: TokenResponse = self.call("signInWithIdp", &body).await?;
        Ok(response.into())
    }

    async fn lookup(&self, id_token: &str) -> IdentityResult<IdentityUser> {
        let body = LookupRequest { id_token };
        let response: LookupResponse = self.call("lookup", &body).await?;

        let account = response
            .users
            .into_iter()
            .next()
            .ok_or_else(|| IdentityError::new(IdentityErrorKind::InvalidToken, "USER_NOT_FOUND"))?;

        let anonymous = account.email.is_none() && account.provider_user_info.is_empty();
        Ok(IdentityUser {
            uid: account.local_id,
            email: account.email,
            anonymous,
        })
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AnonymousRequest {
    return_secure_token: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IdpRequest<'a> {
    post_body: String,
    request_uri: &'a str,
    return_secure_token: bool,
    return_idp_credential: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LookupRequest<'a> {
    id_token: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    local_id: String,
    #[serde(default)]
    email: Option<String>,
    id_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    /// Seconds, sent as a decimal string
    #[serde(default)]
    expires_in: Option<String>,
}

impl From<TokenResponse> for IdentitySession {
    fn from(r: TokenResponse) -> Self {
        Self {
            uid: r.local_id,
            email: r.email.filter(|e| !e.is_empty()),
            id_token: r.id_token,
            refresh_token: r.refresh_token,
            expires_in: r.expires_in.and_then(|s| s.parse().ok()),
        }
    }
}

#[derive(Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<LookupAccount>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupAccount {
    local_id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    provider_user_info: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}
