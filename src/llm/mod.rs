//! Generative model abstraction
//!
//! One trait for both streamed chat replies and one-shot generations
//! (titles), with a Gemini implementation behind it.

mod gemini;
pub mod sse;

pub use gemini::GeminiClient;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::models::{MessagePart, Role};

/// Incremental output of a streamed generation
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    TextDelta(String),
    /// Thought summary text (reasoning model only)
    ReasoningDelta(String),
    Usage(Usage),
    Done,
    Error(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub reasoning_tokens: u32,
}

/// A conversation turn as the model sees it
#[derive(Debug, Clone, PartialEq)]
pub struct ModelMessage {
    pub role: Role,
    pub parts: Vec<MessagePart>,
}

impl ModelMessage {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            parts: vec![MessagePart::text(text)],
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenerateRequest {
    /// Provider model id, e.g. `gemini-2.5-flash`
    pub model: String,
    pub system: Option<String>,
    pub messages: Vec<ModelMessage>,
    /// Ask the provider to stream thought summaries as reasoning
    pub include_thoughts: bool,
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Start a streamed generation. Events arrive on the returned channel,
    /// which always ends with `Done` or `Error`.
    async fn stream(&self, request: GenerateRequest) -> Result<mpsc::Receiver<StreamEvent>>;

    /// Run a generation to completion and return its text
    async fn generate(&self, request: GenerateRequest) -> Result<String>;

    fn name(&self) -> &'static str;
}
