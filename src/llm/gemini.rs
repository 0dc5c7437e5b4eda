//! Gemini provider
//!
//! Uses `generateContent` for one-shot calls and
//! `streamGenerateContent?alt=sse` for chat. Thought parts are surfaced
//! as reasoning deltas when the request asks for them.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::sse::SseDecoder;
use super::{GenerateRequest, LanguageModel, ModelMessage, StreamEvent, Usage};
use crate::config::AppConfig;
use crate::error::{AppError, Result};
use crate::models::{MessagePart, Role};

pub struct GeminiClient {
    client: HttpClient,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl GeminiClient {
    pub fn new(
        client: HttpClient,
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            timeout,
        }
    }

    pub fn from_config(client: HttpClient, config: &AppConfig) -> Self {
        Self::new(
            client,
            config.model_base_url.clone(),
            config.model_api_key.clone(),
            Duration::from_secs(config.model_timeout_secs),
        )
    }

    fn url(&self, model: &str, method: &str, sse: bool) -> Result<String> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| AppError::Config("GEMINI_API_KEY not set".into()))?;
        let alt = if sse { "alt=sse&" } else { "" };
        Ok(format!(
            "{}/v1beta/models/{}:{}?{}key={}",
            self.base_url, model, method, alt, key
        ))
    }

    fn build_contents(messages: &[ModelMessage]) -> Vec<GeminiContent> {
        messages
            .iter()
            .filter_map(|msg| {
                let role = match msg.role {
                    Role::User => "user",
                    Role::Assistant => "model",
                    Role::System => return None,
                };
                let parts: Vec<GeminiPart> = msg
                    .parts
                    .iter()
                    .filter_map(|part| match part {
                        MessagePart::Text { text } if !text.is_empty() => {
                            Some(GeminiPart::Text { text: text.clone() })
                        }
                        MessagePart::File { media_type, url, .. } => Some(GeminiPart::FileData {
                            file_data: GeminiFileData {
                                mime_type: media_type.clone(),
                                file_uri: url.clone(),
                            },
                        }),
                        // Reasoning and tool parts are not replayed to the model
                        _ => None,
                    })
                    .collect();
                if parts.is_empty() {
                    return None;
                }
                Some(GeminiContent {
                    role: role.to_string(),
                    parts,
                })
            })
            .collect()
    }

    fn build_request(request: &GenerateRequest) -> GeminiRequest {
        GeminiRequest {
            contents: Self::build_contents(&request.messages),
            system_instruction: request.system.as_ref().map(|s| GeminiSystemInstruction {
                parts: vec![GeminiTextPart { text: s.clone() }],
            }),
            generation_config: request.include_thoughts.then_some(GeminiGenerationConfig {
                thinking_config: GeminiThinkingConfig {
                    include_thoughts: true,
                },
            }),
        }
    }

    fn usage_from(u: GeminiUsage) -> Usage {
        Usage {
            input_tokens: u.prompt_token_count.unwrap_or(0),
            output_tokens: u.candidates_token_count.unwrap_or(0),
            reasoning_tokens: u.thoughts_token_count.unwrap_or(0),
        }
    }

    /// Turn one decoded response chunk into stream events
    fn events_from(response: GeminiResponse) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if let Some(error) = response.error {
            events.push(StreamEvent::Error(error.message));
            return events;
        }
        for candidate in response.candidates.unwrap_or_default() {
            let Some(content) = candidate.content else {
                continue;
            };
            for part in content.parts {
                let Some(text) = part.text else { continue };
                if part.thought.unwrap_or(false) {
                    events.push(StreamEvent::ReasoningDelta(text));
                } else {
                    events.push(StreamEvent::TextDelta(text));
                }
            }
        }
        if let Some(usage) = response.usage_metadata {
            events.push(StreamEvent::Usage(Self::usage_from(usage)));
        }
        events
    }
}

#[async_trait]
impl LanguageModel for GeminiClient {
    async fn stream(&self, request: GenerateRequest) -> Result<mpsc::Receiver<StreamEvent>> {
        let (tx, rx) = mpsc::channel(100);

        let url = self.url(&request.model, "streamGenerateContent", true)?;
        let api_request = Self::build_request(&request);
        let client = self.client.clone();
        let timeout = self.timeout;
        let model = request.model;

        tokio::spawn(async move {
            let response = match client.post(&url).json(&api_request).timeout(timeout).send().await {
                Ok(r) => r,
                Err(e) => {
                    warn!(model = %model, error = %e, "Gemini request failed");
                    let _ = tx.send(StreamEvent::Error(e.to_string())).await;
                    return;
                }
            };

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                warn!(model = %model, %status, "Gemini API error");
                let _ = tx
                    .send(StreamEvent::Error(format!("Gemini API error: {status} - {body}")))
                    .await;
                return;
            }

            let mut stream = response.bytes_stream();
            let mut decoder = SseDecoder::new();

            while let Some(chunk) = stream.next().await {
                let bytes = match chunk {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx.send(StreamEvent::Error(e.to_string())).await;
                        return;
                    }
                };
                for frame in decoder.push(&bytes) {
                    if frame.is_done() {
                        continue;
                    }
                    let parsed: GeminiResponse = match frame.parse() {
                        Ok(p) => p,
                        Err(e) => {
                            debug!(error = %e, "Skipping undecodable Gemini frame");
                            continue;
                        }
                    };
                    for event in Self::events_from(parsed) {
                        let is_error = matches!(event, StreamEvent::Error(_));
                        if tx.send(event).await.is_err() {
                            // Receiver dropped: client went away
                            return;
                        }
                        if is_error {
                            return;
                        }
                    }
                }
            }

            let _ = tx.send(StreamEvent::Done).await;
        });

        Ok(rx)
    }

    async fn generate(&self, request: GenerateRequest) -> Result<String> {
        let url = self.url(&request.model, "generateContent", false)?;
        let api_request = Self::build_request(&request);

        let response = self
            .client
            .post(&url)
            .json(&api_request)
            .timeout(self.timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Provider(format!("Gemini API error: {status} - {body}")));
        }

        let parsed: GeminiResponse = response.json().await?;
        let mut text = String::new();
        for event in Self::events_from(parsed) {
            match event {
                StreamEvent::TextDelta(t) => text.push_str(&t),
                StreamEvent::Error(e) => return Err(AppError::Provider(e)),
                _ => {}
            }
        }
        Ok(text)
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiSystemInstruction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GeminiGenerationConfig>,
}

#[derive(Serialize, Debug)]
struct GeminiContent {
    role: String,
    parts: Vec<GeminiPart>,
}

#[derive(Serialize, Debug)]
#[serde(untagged)]
enum GeminiPart {
    Text {
        text: String,
    },
    FileData {
        #[serde(rename = "fileData")]
        file_data: GeminiFileData,
    },
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GeminiFileData {
    mime_type: String,
    file_uri: String,
}

#[derive(Serialize)]
struct GeminiSystemInstruction {
    parts: Vec<GeminiTextPart>,
}

#[derive(Serialize)]
struct GeminiTextPart {
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    thinking_config: GeminiThinkingConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiThinkingConfig {
    include_thoughts: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
    usage_metadata: Option<GeminiUsage>,
    error: Option<GeminiError>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContentResponse>,
}

#[derive(Deserialize)]
struct GeminiContentResponse {
    #[serde(default)]
    parts: Vec<GeminiPartResponse>,
}

#[derive(Deserialize)]
struct GeminiPartResponse {
    text: Option<String>,
    thought: Option<bool>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsage {
    prompt_token_count: Option<u32>,
    candidates_token_count: Option<u32>,
    thoughts_token_count: Option<u32>,
}

#[derive(Deserialize)]
struct GeminiError {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, routing::post};

    fn request(include_thoughts: bool) -> GenerateRequest {
        GenerateRequest {
            model: "gemini-2.5-flash".into(),
            system: Some("You are a markets assistant".into()),
            messages: vec![
                ModelMessage::user_text("Hello"),
                ModelMessage {
                    role: Role::Assistant,
                    parts: vec![
                        MessagePart::Reasoning { text: "hidden".into() },
                        MessagePart::text("Hi there!"),
                    ],
                },
                ModelMessage {
                    role: Role::User,
                    parts: vec![
                        MessagePart::text("What's in this chart?"),
                        MessagePart::File {
                            media_type: "image/png".into(),
                            name: "chart.png".into(),
                            url: "https://cdn.example.com/chart.png".into(),
                        },
                    ],
                },
            ],
            include_thoughts,
        }
    }

    #[test]
    fn test_build_contents() {
        let contents = GeminiClient::build_contents(&request(false).messages);
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[1].role, "model");
        // reasoning part dropped
        assert_eq!(contents[1].parts.len(), 1);
        assert_eq!(contents[2].parts.len(), 2);
    }

    #[test]
    fn test_request_wire_format() {
        let value = serde_json::to_value(GeminiClient::build_request(&request(true))).unwrap();
        assert_eq!(value["generationConfig"]["thinkingConfig"]["includeThoughts"], true);
        assert_eq!(value["contents"][2]["parts"][1]["fileData"]["mimeType"], "image/png");
        assert_eq!(value["systemInstruction"]["parts"][0]["text"], "You are a markets assistant");

        let value = serde_json::to_value(GeminiClient::build_request(&request(false))).unwrap();
        assert!(value.get("generationConfig").is_none());
    }

    #[test]
    fn test_thought_parts_become_reasoning() {
        let response: GeminiResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"weighing","thought":true},{"text":"Answer"}]}}]}"#,
        )
        .unwrap();
        let events = GeminiClient::events_from(response);
        assert_eq!(
            events,
            vec![
                StreamEvent::ReasoningDelta("weighing".into()),
                StreamEvent::TextDelta("Answer".into()),
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_key_is_config_error() {
        let client = GeminiClient::new(
            HttpClient::new(),
            "http://127.0.0.1:1",
            None,
            Duration::from_secs(1),
        );
        let result = client.generate(request(false)).await;
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[tokio::test]
    async fn test_stream_from_mock_server() {
        let body = concat!(
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Hel\"}]}}]}\n\n",
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"lo\"}]}}],",
            "\"usageMetadata\":{\"promptTokenCount\":3,\"candidatesTokenCount\":2}}\n\n",
        );
        let router = Router::new().route(
            "/v1beta/models/{action}",
            post(move || async move { body }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let client = GeminiClient::new(
            HttpClient::new(),
            format!("http://{addr}"),
            Some("test-key".into()),
            Duration::from_secs(5),
        );
        let mut rx = client.stream(request(false)).await.unwrap();

        let mut text = String::new();
        let mut saw_usage = false;
        while let Some(event) = rx.recv().await {
            match event {
                StreamEvent::TextDelta(t) => text.push_str(&t),
                StreamEvent::Usage(u) => saw_usage = u.input_tokens == 3,
                StreamEvent::Done => break,
                other => panic!("unexpected event {other:?}"),
            }
        }
        assert_eq!(text, "Hello");
        assert!(saw_usage);
    }
}
