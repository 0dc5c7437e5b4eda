// src/chat/title.rs
// Conversation titles from the first user message

use tracing::{debug, warn};

use crate::llm::{GenerateRequest, LanguageModel, ModelMessage};

pub const MAX_TITLE_CHARS: usize = 80;
pub const DEFAULT_TITLE: &str = "New chat";

const TITLE_INSTRUCTION: &str = "\
You will generate a short title based on the first message a user begins a conversation with. \
Keep it under 80 characters. It is a summary of the user's message. \
Do not use quotes or colons. Reply with the title only.";

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].trim_end().to_string(),
        None => text.to_string(),
    }
}

/// Deterministic title: the first text with whitespace collapsed, capped at 80 chars
pub fn fallback_title(first_text: Option<&str>) -> String {
    let collapsed = first_text
        .map(|t| t.split_whitespace().collect::<Vec<_>>().join(" "))
        .unwrap_or_default();
    let title = truncate_chars(&collapsed, MAX_TITLE_CHARS);
    if title.is_empty() {
        DEFAULT_TITLE.to_string()
    } else {
        title
    }
}

fn clean_model_title(raw: &str) -> String {
    let line = raw.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    let cleaned = line
        .trim()
        .trim_start_matches("Title:")
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '*' || c == '#' || c.is_whitespace());
    truncate_chars(cleaned, MAX_TITLE_CHARS)
}

/// Ask the small model for a title; never fails
pub async fn generate_title(
    model: &dyn LanguageModel,
    model_id: &str,
    first_text: Option<&str>,
) -> String {
    let Some(text) = first_text.filter(|t| !t.trim().is_empty()) else {
        return fallback_title(None);
    };

    let request = GenerateRequest {
        model: model_id.to_string(),
        system: Some(TITLE_INSTRUCTION.to_string()),
        messages: vec![ModelMessage::user_text(text)],
        include_thoughts: false,
    };

    match model.generate(request).await {
        Ok(raw) => {
            let title = clean_model_title(&raw);
            if title.is_empty() {
                debug!("Title model returned nothing usable, using fallback");
                fallback_title(Some(text))
            } else {
                title
            }
        }
        Err(e) => {
            warn!(error = %e, "Title generation failed, using fallback");
            fallback_title(Some(text))
        }
    }
}
