// src/chat/entitlements.rs
// Per-account-class message quotas and model access

use super::request::ChatModel;
use crate::api::error::{ApiError, Surface};
use crate::config::AppConfig;
use crate::models::UserType;

/// Rolling window the daily quota is counted over
pub const QUOTA_WINDOW_HOURS: i64 = 24;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entitlements {
    pub max_messages_per_day: i64,
    pub available_models: &'static [ChatModel],
}

const GUEST_MODELS: &[ChatModel] = &[ChatModel::Chat, ChatModel::Strategy];
const REGULAR_MODELS: &[ChatModel] = &[ChatModel::Chat, ChatModel::ChatReasoning, ChatModel::Strategy];

impl Entitlements {
    pub fn for_user_type(user_type: UserType, config: &AppConfig) -> Self {
        match user_type {
            UserType::Guest => Self {
                max_messages_per_day: config.guest_max_messages_per_day,
                available_models: GUEST_MODELS,
            },
            UserType::Regular => Self {
                max_messages_per_day: config.regular_max_messages_per_day,
                available_models: REGULAR_MODELS,
            },
        }
    }

    pub fn allows_model(&self, model: ChatModel) -> bool {
        self.available_models.contains(&model)
    }

    /// Quota is checked before model access
    pub fn check(&self, messages_in_window: i64, model: ChatModel) -> Result<(), ApiError> {
        if messages_in_window >= self.max_messages_per_day {
            return Err(ApiError::rate_limit(Surface::Chat));
        }
        if !self.allows_model(model) {
            return Err(ApiError::forbidden(Surface::Chat)
                .with_cause(format!("model {} is not available on this account", model.id())));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::error::ErrorType;

    #[test]
    fn test_guest_limits() {
        let e = Entitlements::for_user_type(UserType::Guest, &AppConfig::default());
        assert_eq!(e.max_messages_per_day, 20);
        assert!(e.allows_model(ChatModel::Strategy));
        assert!(!e.allows_model(ChatModel::ChatReasoning));
    }

    #[test]
    fn test_rate_limit_at_threshold() {
        let e = Entitlements::for_user_type(UserType::Regular, &AppConfig::default());
        assert!(e.check(99, ChatModel::Chat).is_ok());

        let err = e.check(100, ChatModel::Chat).unwrap_err();
        assert_eq!(err.error_type, ErrorType::RateLimit);
        assert_eq!(err.code(), "rate_limit:chat");
    }

    #[test]
    fn test_forbidden_model() {
        let e = Entitlements::for_user_type(UserType::Guest, &AppConfig::default());
        let err = e.check(0, ChatModel::ChatReasoning).unwrap_err();
        assert_eq!(err.code(), "forbidden:chat");
    }
}
