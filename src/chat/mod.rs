//! Chat: request validation, entitlements, the UI event stream, the
//! strategy-service relay and the HTTP handlers tying them together.

pub mod entitlements;
pub mod events;
pub mod handlers;
pub mod markers;
pub mod render;
pub mod replay;
pub mod request;
pub mod strategy;
pub mod stream;
pub mod title;

pub use events::UiEvent;
pub use request::{ChatModel, PostRequestBody};
pub use strategy::StrategyClient;
