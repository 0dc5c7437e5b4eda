// src/http.rs
// Outbound HTTP client shared by the identity, model and strategy clients

use std::time::Duration;

use crate::config::AppConfig;

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

const USER_AGENT: &str = concat!("finchat/", env!("CARGO_PKG_VERSION"));

/// Build the pooled client once at startup.
///
/// The overall request timeout is the longest upstream deadline (model
/// streams); shorter per-call deadlines are applied by each client.
pub fn create_shared_client(config: &AppConfig) -> reqwest::Client {
    let ceiling = config
        .model_timeout_secs
        .max(config.strategy_timeout_secs)
        .max(1);

    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(ceiling))
        .connect_timeout(CONNECT_TIMEOUT)
        .pool_max_idle_per_host(10)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_agent_carries_version() {
        assert!(USER_AGENT.starts_with("finchat/"));
        assert!(USER_AGENT.len() > "finchat/".len());
    }

    #[test]
    fn test_client_builds_with_zero_timeouts() {
        let config = AppConfig {
            model_timeout_secs: 0,
            strategy_timeout_secs: 0,
            ..AppConfig::default()
        };
        drop(create_shared_client(&config));
    }
}
