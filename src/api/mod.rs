// src/api/mod.rs
// Router composition for the HTTP surface

pub mod error;

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderValue, Method, header},
    routing::{get, patch, post},
};
use serde_json::{Value, json};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};
use tracing::warn;

use crate::auth::handlers as auth;
use crate::chat::handlers as chat;
use crate::state::AppState;

pub use error::{ApiError, ApiResult};

/// Sent as `x-api-version` on every response
pub const API_VERSION: &str = env!("CARGO_PKG_VERSION");

fn cors_layer(origin: &str) -> CorsLayer {
    let allow_origin = if origin.trim() == "*" {
        AllowOrigin::from(Any)
    } else {
        let origins: Vec<HeaderValue> = origin
            .split(',')
            .filter_map(|o| match HeaderValue::from_str(o.trim()) {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(origin = o, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

/// GET /api/health
pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    let database = sqlx::query("SELECT 1").execute(&state.pool).await.is_ok();
    Json(json!({
        "status": if database { "ok" } else { "degraded" },
        "version": API_VERSION,
        "database": database,
        "model": state.model.name(),
    }))
}

/// Create the router with all endpoints
pub fn create_router(state: AppState) -> Router {
    let version_header = SetResponseHeaderLayer::if_not_present(
        header::HeaderName::from_static("x-api-version"),
        HeaderValue::from_static(API_VERSION),
    );
    let cors = cors_layer(&state.config.cors_origin);

    Router::new()
        .route("/api/health", get(health_handler))
        // Auth
        .route("/api/auth/register", post(auth::register_handler))
        .route("/api/auth/login", post(auth::login_handler))
        .route("/api/auth/oauth", post(auth::oauth_handler))
        .route("/api/auth/guest", post(auth::guest_handler))
        .route("/api/auth/session", get(auth::session_handler))
        // Chat
        .route(
            "/api/chat",
            post(chat::chat_handler).delete(chat::delete_chat_handler),
        )
        .route("/api/chat/{id}", get(chat::get_chat_handler))
        .route(
            "/api/chat/{id}/visibility",
            patch(chat::update_visibility_handler),
        )
        .route("/api/history", get(chat::history_handler))
        .route(
            "/api/vote",
            get(chat::get_votes_handler).patch(chat::vote_handler),
        )
        // Strategy service proxy
        .route("/api/strategy/parse", post(chat::parse_strategy_handler))
        .route("/api/strategy/validate", post(chat::validate_strategy_handler))
        .route("/api/strategy/run", post(chat::run_backtest_handler))
        .route("/api/strategy/run-config", post(chat::run_config_handler))
        .layer(version_header)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
