// src/chat/request.rs
// Body of POST /api/chat and its validation rules

use serde::Deserialize;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{MessagePart, Visibility};

const MAX_TEXT_CHARS: usize = 2000;
const MAX_FILE_NAME_CHARS: usize = 100;
const ALLOWED_MEDIA_TYPES: [&str; 2] = ["image/jpeg", "image/png"];

/// Selectable chat models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum ChatModel {
    #[serde(rename = "chat-model")]
    Chat,
    #[serde(rename = "chat-model-reasoning")]
    ChatReasoning,
    /// Answered by the external strategy service instead of the model provider
    #[serde(rename = "strategy-model")]
    Strategy,
}

impl ChatModel {
    pub fn id(&self) -> &'static str {
        match self {
            Self::Chat => "chat-model",
            Self::ChatReasoning => "chat-model-reasoning",
            Self::Strategy => "strategy-model",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestRole {
    User,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RequestPart {
    Text {
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    File {
        media_type: String,
        name: String,
        url: String,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequestMessage {
    pub id: String,
    pub role: RequestRole,
    pub parts: Vec<RequestPart>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostRequestBody {
    pub id: String,
    pub message: RequestMessage,
    pub selected_chat_model: ChatModel,
    pub selected_visibility_type: Visibility,
}

fn invalid(msg: impl Into<String>) -> AppError {
    AppError::InvalidInput(msg.into())
}

fn looks_like_url(url: &str) -> bool {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"));
    match rest {
        Some(rest) => {
            let host = rest.split(['/', '?', '#']).next().unwrap_or("");
            !host.is_empty() && !rest.chars().any(char::is_whitespace)
        }
        None => false,
    }
}

impl RequestPart {
    fn validate(&self) -> Result<()> {
        match self {
            Self::Text { text } => {
                let len = text.chars().count();
                if len == 0 || len > MAX_TEXT_CHARS {
                    return Err(invalid(format!(
                        "text part must be 1-{MAX_TEXT_CHARS} characters"
                    )));
                }
            }
            Self::File {
                media_type,
                name,
                url,
            } => {
                if !ALLOWED_MEDIA_TYPES.contains(&media_type.as_str()) {
                    return Err(invalid(format!("unsupported media type {media_type}")));
                }
                let len = name.chars().count();
                if len == 0 || len > MAX_FILE_NAME_CHARS {
                    return Err(invalid(format!(
                        "file name must be 1-{MAX_FILE_NAME_CHARS} characters"
                    )));
                }
                if !looks_like_url(url) {
                    return Err(invalid("file url is not a valid URL"));
                }
            }
        }
        Ok(())
    }

    pub fn into_part(self) -> MessagePart {
        match self {
            Self::Text { text } => MessagePart::Text { text },
            Self::File {
                media_type,
                name,
                url,
            } => MessagePart::File {
                media_type,
                name,
                url,
            },
        }
    }
}

impl PostRequestBody {
    /// Decode and validate a raw request body
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let body: Self =
            serde_json::from_slice(bytes).map_err(|e| invalid(format!("malformed body: {e}")))?;
        body.validate()?;
        Ok(body)
    }

    pub fn validate(&self) -> Result<()> {
        Uuid::parse_str(&self.id).map_err(|_| invalid("chat id must be a UUID"))?;
        Uuid::parse_str(&self.message.id).map_err(|_| invalid("message id must be a UUID"))?;
        if self.message.parts.is_empty() {
            return Err(invalid("message must have at least one part"));
        }
        self.message.parts.iter().try_for_each(RequestPart::validate)
    }

    /// Text of the first text part, used for titling
    pub fn first_text(&self) -> Option<&str> {
        self.message.parts.iter().find_map(|p| match p {
            RequestPart::Text { text } => Some(text.as_str()),
            RequestPart::File { .. } => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn body() -> Value {
        json!({
            "id": "5b1d4c9e-2f0a-4a51-9a57-54c8e5a0b8f1",
            "message": {
                "id": "0f8e7a2b-6c1d-4e3f-8a9b-1c2d3e4f5a6b",
                "role": "user",
                "parts": [{"type": "text", "text": "Backtest a 50/200 SMA crossover on SPY"}]
            },
            "selectedChatModel": "strategy-model",
            "selectedVisibilityType": "private"
        })
    }

    fn parse(value: &Value) -> Result<PostRequestBody> {
        PostRequestBody::parse(&serde_json::to_vec(value).unwrap())
    }

    #[test]
    fn test_valid_body() {
        let parsed = parse(&body()).unwrap();
        assert_eq!(parsed.selected_chat_model, ChatModel::Strategy);
        assert_eq!(parsed.selected_visibility_type, Visibility::Private);
        assert_eq!(parsed.first_text(), Some("Backtest a 50/200 SMA crossover on SPY"));
    }

    #[test]
    fn test_malformed_json() {
        assert!(PostRequestBody::parse(b"{not json").is_err());
    }

    #[test]
    fn test_rejects_bad_fields() {
        let mut b = body();
        b["id"] = json!("not-a-uuid");
        assert!(parse(&b).is_err());

        let mut b = body();
        b["message"]["role"] = json!("assistant");
        assert!(parse(&b).is_err());

        let mut b = body();
        b["message"]["parts"] = json!([]);
        assert!(parse(&b).is_err());

        let mut b = body();
        b["message"]["parts"][0]["text"] = json!("x".repeat(2001));
        assert!(parse(&b).is_err());

        let mut b = body();
        b["selectedChatModel"] = json!("gpt-9");
        assert!(parse(&b).is_err());
    }

    #[test]
    fn test_text_limit_counts_chars() {
        let mut b = body();
        b["message"]["parts"][0]["text"] = json!("█".repeat(2000));
        assert!(parse(&b).is_ok());
    }

    #[test]
    fn test_file_parts() {
        let mut b = body();
        b["message"]["parts"] = json!([{
            "type": "file",
            "mediaType": "image/png",
            "name": "equity-curve.png",
            "url": "https://cdn.example.com/equity-curve.png"
        }]);
        assert!(parse(&b).is_ok());

        b["message"]["parts"][0]["mediaType"] = json!("application/pdf");
        assert!(parse(&b).is_err());

        b["message"]["parts"][0]["mediaType"] = json!("image/jpeg");
        b["message"]["parts"][0]["url"] = json!("ftp://example.com/x.jpg");
        assert!(parse(&b).is_err());
    }
}
