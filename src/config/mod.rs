// src/config/mod.rs
// Environment-based configuration, loaded once at startup

use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

/// Read an env var, strip trailing `# comments`, and parse it; fall back to `default`
fn env_var_or<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    match std::env::var(key) {
        Ok(val) => {
            let clean_val = val.split('#').next().unwrap_or("").trim();
            match clean_val.parse::<T>() {
                Ok(parsed) => {
                    debug!(key, value = clean_val, "Config value from environment");
                    parsed
                }
                Err(_) => {
                    warn!(key, value = %val, "Config value failed to parse, using default");
                    default
                }
            }
        }
        Err(_) => default,
    }
}

/// Read an optional secret, filtering empty values
fn read_key(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|k| !k.trim().is_empty())
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // ── Server
    pub host: String,
    pub port: u16,
    pub cors_origin: String,

    // ── Database
    pub database_url: String,
    pub database_max_connections: u32,

    // ── Identity provider
    pub identity_base_url: String,
    pub identity_api_key: Option<String>,

    // ── Model provider
    pub model_base_url: String,
    pub model_api_key: Option<String>,
    pub chat_model: String,
    pub reasoning_model: String,
    pub title_model: String,
    pub model_timeout_secs: u64,

    // ── Strategy service
    pub strategy_base_url: String,
    pub strategy_timeout_secs: u64,
    pub strategy_retry_backoff_ms: u64,
    pub strategy_max_retries: u32,

    // ── Replay of remote answers
    pub replay_chunk_size: usize,
    pub replay_delay_ms: u64,

    // ── Entitlements (messages per rolling 24h)
    pub guest_max_messages_per_day: i64,
    pub regular_max_messages_per_day: i64,

    // ── Logging
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            cors_origin: "*".to_string(),
            database_url: "sqlite:./finchat.db?mode=rwc".to_string(),
            database_max_connections: 10,
            identity_base_url: "https://identitytoolkit.googleapis.com".to_string(),
            identity_api_key: None,
            model_base_url: "https://generativelanguage.googleapis.com".to_string(),
            model_api_key: None,
            chat_model: "gemini-2.5-flash".to_string(),
            reasoning_model: "gemini-2.5-pro".to_string(),
            title_model: "gemini-2.5-flash-lite".to_string(),
            model_timeout_secs: 120,
            strategy_base_url: "http://127.0.0.1:8080".to_string(),
            strategy_timeout_secs: 120,
            strategy_retry_backoff_ms: 1500,
            strategy_max_retries: 1,
            replay_chunk_size: 12,
            replay_delay_ms: 15,
            guest_max_messages_per_day: 20,
            regular_max_messages_per_day: 100,
            log_level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from `.env` (if present) and the process environment
    pub fn from_env() -> Self {
        if dotenvy::dotenv().is_err() {
            debug!(".env file not found, using environment variables and defaults");
        }

        let d = Self::default();
        Self {
            host: env_var_or("FINCHAT_HOST", d.host),
            port: env_var_or("PORT", d.port),
            cors_origin: env_var_or("FINCHAT_CORS_ORIGIN", d.cors_origin),
            database_url: env_var_or("DATABASE_URL", d.database_url),
            database_max_connections: env_var_or(
                "DATABASE_MAX_CONNECTIONS",
                d.database_max_connections,
            ),
            identity_base_url: env_var_or("IDENTITY_BASE_URL", d.identity_base_url),
            identity_api_key: read_key("IDENTITY_API_KEY"),
            model_base_url: env_var_or("MODEL_BASE_URL", d.model_base_url),
            model_api_key: read_key("GEMINI_API_KEY").or_else(|| read_key("GOOGLE_API_KEY")),
            chat_model: env_var_or("FINCHAT_CHAT_MODEL", d.chat_model),
            reasoning_model: env_var_or("FINCHAT_REASONING_MODEL", d.reasoning_model),
            title_model: env_var_or("FINCHAT_TITLE_MODEL", d.title_model),
            model_timeout_secs: env_var_or("FINCHAT_MODEL_TIMEOUT", d.model_timeout_secs),
            strategy_base_url: env_var_or("STRATEGY_SERVICE_URL", d.strategy_base_url),
            strategy_timeout_secs: env_var_or("STRATEGY_TIMEOUT", d.strategy_timeout_secs),
            strategy_retry_backoff_ms: env_var_or(
                "STRATEGY_RETRY_BACKOFF_MS",
                d.strategy_retry_backoff_ms,
            ),
            strategy_max_retries: env_var_or("STRATEGY_MAX_RETRIES", d.strategy_max_retries),
            replay_chunk_size: env_var_or("REPLAY_CHUNK_SIZE", d.replay_chunk_size).max(1),
            replay_delay_ms: env_var_or("REPLAY_DELAY_MS", d.replay_delay_ms),
            guest_max_messages_per_day: env_var_or(
                "GUEST_MAX_MESSAGES_PER_DAY",
                d.guest_max_messages_per_day,
            ),
            regular_max_messages_per_day: env_var_or(
                "REGULAR_MAX_MESSAGES_PER_DAY",
                d.regular_max_messages_per_day,
            ),
            log_level: env_var_or("LOG_LEVEL", d.log_level),
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn strategy_timeout(&self) -> Duration {
        Duration::from_secs(self.strategy_timeout_secs)
    }

    pub fn strategy_backoff(&self) -> Duration {
        Duration::from_millis(self.strategy_retry_backoff_ms)
    }

    pub fn replay_delay(&self) -> Duration {
        Duration::from_millis(self.replay_delay_ms)
    }

    /// Log which external collaborators are configured (without exposing keys)
    pub fn log_status(&self) {
        if self.identity_api_key.is_none() {
            warn!("IDENTITY_API_KEY not set - sign-in will fail");
        }
        if self.model_api_key.is_none() {
            warn!("GEMINI_API_KEY not set - model-backed chat and titles will use fallbacks");
        }
        debug!(strategy_url = %self.strategy_base_url, "Strategy service configured");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.port, 3001);
        assert_eq!(config.strategy_max_retries, 1);
        assert_eq!(config.guest_max_messages_per_day, 20);
        assert_eq!(config.regular_max_messages_per_day, 100);
        assert_eq!(config.replay_delay(), Duration::from_millis(15));
    }

    #[test]
    fn test_env_var_or_strips_comments() {
        // SAFETY: test-local variable name, not read elsewhere
        unsafe { std::env::set_var("FINCHAT_TEST_CHUNK", "24  # chars per delta") };
        let value: usize = env_var_or("FINCHAT_TEST_CHUNK", 12);
        assert_eq!(value, 24);
        unsafe { std::env::remove_var("FINCHAT_TEST_CHUNK") };
    }

    #[test]
    fn test_env_var_or_parse_failure_uses_default() {
        unsafe { std::env::set_var("FINCHAT_TEST_PORT", "not-a-port") };
        let value: u16 = env_var_or("FINCHAT_TEST_PORT", 3001);
        assert_eq!(value, 3001);
        unsafe { std::env::remove_var("FINCHAT_TEST_PORT") };
    }

    #[test]
    fn test_missing_var_uses_default() {
        let value: u64 = env_var_or("FINCHAT_TEST_DEFINITELY_UNSET", 42);
        assert_eq!(value, 42);
    }
}
