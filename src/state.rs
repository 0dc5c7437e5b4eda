// src/state.rs
// Shared server state handed to every handler

use sqlx::SqlitePool;
use std::sync::Arc;

use crate::{
    auth::{IdentityProvider, IdentityToolkitClient},
    chat::strategy::StrategyClient,
    config::AppConfig,
    http::create_shared_client,
    llm::{GeminiClient, LanguageModel},
};

#[derive(Clone)]
pub struct AppState {
    // -------- Storage --------
    pub pool: SqlitePool,

    // -------- Settings --------
    pub config: Arc<AppConfig>,

    // -------- Upstreams --------
    pub identity: Arc<dyn IdentityProvider>,
    pub model: Arc<dyn LanguageModel>,
    pub strategy: Arc<StrategyClient>,
}

impl AppState {
    /// Wire the production clients against one shared HTTP connection pool
    pub fn new(pool: SqlitePool, config: AppConfig) -> Self {
        let http = create_shared_client(&config);

        let identity = Arc::new(IdentityToolkitClient::new(
            http.clone(),
            config.identity_base_url.clone(),
            config.identity_api_key.clone(),
        ));
        let model = Arc::new(GeminiClient::from_config(http.clone(), &config));
        let strategy = Arc::new(StrategyClient::from_config(http, &config));

        Self {
            pool,
            config: Arc::new(config),
            identity,
            model,
            strategy,
        }
    }

    /// Assemble state from explicit parts (tests swap in mock upstreams)
    pub fn with_parts(
        pool: SqlitePool,
        config: AppConfig,
        identity: Arc<dyn IdentityProvider>,
        model: Arc<dyn LanguageModel>,
    ) -> Self {
        let strategy = Arc::new(StrategyClient::from_config(create_shared_client(&config), &config));
        Self {
            pool,
            config: Arc::new(config),
            identity,
            model,
            strategy,
        }
    }
}
