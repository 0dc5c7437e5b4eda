// src/chat/strategy.rs
// Client for the external strategy/backtest service

use reqwest::{Client as HttpClient, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::AppConfig;
use crate::error::{AppError, Result};

pub const CHAT_PATH: &str = "/api/chat";
pub const PARSE_PATH: &str = "/api/strategy/parse";
pub const VALIDATE_PATH: &str = "/api/strategy/validate";
pub const RUN_PATH: &str = "/api/backtest/run";
pub const RUN_CONFIG_PATH: &str = "/api/backtest/run-config";

/// Conversation turn in the service's format
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StrategyMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StrategyChatRequest {
    pub chat_id: String,
    pub user_id: String,
    pub messages: Vec<StrategyMessage>,
}

/// Envelope the service wraps JSON answers in
#[derive(Debug, Deserialize)]
struct ApiResponse {
    success: bool,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

/// Raw reply of one successful HTTP exchange
#[derive(Debug, Clone)]
pub struct RawReply {
    pub status: StatusCode,
    pub body: String,
}

impl RawReply {
    /// Body as JSON, or wrapped as a JSON string when it is plain text
    pub fn json(&self) -> Value {
        serde_json::from_str(&self.body).unwrap_or_else(|_| Value::String(self.body.clone()))
    }
}

/// `answer` or `summary` text of a payload, or the payload itself when it is a string
fn answer_text(data: &Value) -> Option<String> {
    ["answer", "summary"]
        .iter()
        .find_map(|key| data.get(key).and_then(Value::as_str))
        .or_else(|| data.as_str())
        .map(str::to_string)
}

fn non_empty(answer: Option<String>) -> Result<String> {
    match answer {
        Some(text) if !text.trim().is_empty() => Ok(text),
        _ => Err(AppError::Remote("reply carried no answer".into())),
    }
}

/// Pull the answer text out of a chat reply.
///
/// Accepts `{success, data: {answer|summary}, error}` envelopes, bare JSON
/// strings or answer objects, and plain text.
pub fn decode_answer(reply: &RawReply) -> Result<String> {
    let parsed = serde_json::from_str::<Value>(&reply.body).ok();

    if let Some(envelope) = parsed
        .as_ref()
        .filter(|v| v.get("success").is_some())
        .and_then(|v| ApiResponse::deserialize(v).ok())
    {
        if !envelope.success {
            return Err(AppError::Remote(
                envelope.error.unwrap_or_else(|| format!("request failed ({})", reply.status)),
            ));
        }
        return non_empty(answer_text(&envelope.data.unwrap_or(Value::Null)));
    }

    if !reply.status.is_success() {
        return Err(AppError::Remote(format!("{}: {}", reply.status, reply.body.trim())));
    }

    match parsed.as_ref().and_then(answer_text) {
        Some(text) => non_empty(Some(text)),
        None => {
            let text = reply.body.trim();
            if text.is_empty() {
                return Err(AppError::Remote("empty reply".into()));
            }
            Ok(text.to_string())
        }
    }
}

/// Transcript text shown in place of an answer when the service call failed
pub fn failure_text(err: &AppError) -> String {
    match err {
        AppError::Timeout(d) => format!(
            "The strategy service did not answer within {} seconds. Please try again.",
            d.as_secs()
        ),
        AppError::Unreachable(_) => {
            "The strategy service is unavailable right now. Please try again in a moment.".into()
        }
        AppError::Remote(msg) => format!("The strategy service could not complete the request: {msg}"),
        other => format!("The strategy request failed: {other}"),
    }
}

pub struct StrategyClient {
    client: HttpClient,
    base_url: String,
    attempt_timeout: Duration,
    backoff: Duration,
    max_retries: u32,
}

impl StrategyClient {
    pub fn new(
        client: HttpClient,
        base_url: impl Into<String>,
        attempt_timeout: Duration,
        backoff: Duration,
        max_retries: u32,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            attempt_timeout,
            backoff,
            max_retries,
        }
    }

    pub fn from_config(client: HttpClient, config: &AppConfig) -> Self {
        Self::new(
            client,
            config.strategy_base_url.clone(),
            config.strategy_timeout(),
            config.strategy_backoff(),
            config.strategy_max_retries,
        )
    }

    async fn attempt<B: Serialize + ?Sized>(&self, url: &str, body: &B) -> Result<RawReply> {
        let exchange = async {
            let response = self.client.post(url).json(body).send().await?;
            let status = response.status();
            let body = response.text().await?;
            Ok::<_, reqwest::Error>(RawReply { status, body })
        };

        // Dropping the future on timeout cancels the in-flight request
        match tokio::time::timeout(self.attempt_timeout, exchange).await {
            Err(_) => Err(AppError::Timeout(self.attempt_timeout)),
            Ok(Err(e)) if e.is_connect() || e.is_timeout() => Err(AppError::Unreachable(e.to_string())),
            Ok(Err(e)) => Err(AppError::Http(e)),
            Ok(Ok(reply)) => Ok(reply),
        }
    }

    fn is_transient(result: &Result<RawReply>) -> bool {
        match result {
            Ok(reply) => {
                reply.status == StatusCode::TOO_MANY_REQUESTS || reply.status.is_server_error()
            }
            Err(AppError::Timeout(_)) | Err(AppError::Unreachable(_)) => true,
            Err(_) => false,
        }
    }

    /// POST with bounded retry. A final 429/5xx reply is returned as-is so the
    /// caller can decode the service's own error message.
    pub async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<RawReply> {
        let url = format!("{}{}", self.base_url, path);
        let mut retry_count = 0;

        loop {
            let result = self.attempt(&url, body).await;

            if Self::is_transient(&result) && retry_count < self.max_retries {
                retry_count += 1;
                let reason = match &result {
                    Ok(reply) => reply.status.to_string(),
                    Err(e) => e.to_string(),
                };
                warn!(
                    path,
                    attempt = retry_count,
                    backoff_ms = self.backoff.as_millis() as u64,
                    reason = %reason,
                    "Strategy request failed, retrying"
                );
                tokio::time::sleep(self.backoff).await;
                continue;
            }

            match &result {
                Ok(reply) => debug!(path, status = %reply.status, "Strategy service replied"),
                Err(e) => error!(path, attempts = retry_count + 1, error = %e, "Strategy request failed"),
            }
            return result;
        }
    }

    /// Ask the service to answer a conversation
    pub async fn chat(&self, request: &StrategyChatRequest) -> Result<String> {
        info!(chat_id = %request.chat_id, turns = request.messages.len(), "Forwarding chat to strategy service");
        let reply = self.post(CHAT_PATH, request).await?;
        decode_answer(&reply)
    }

    pub async fn parse(&self, body: &Value) -> Result<RawReply> {
        self.post(PARSE_PATH, body).await
    }

    pub async fn validate(&self, body: &Value) -> Result<RawReply> {
        self.post(VALIDATE_PATH, body).await
    }

    pub async fn run(&self, body: &Value) -> Result<RawReply> {
        self.post(RUN_PATH, body).await
    }

    pub async fn run_config(&self, body: &Value) -> Result<RawReply> {
        self.post(RUN_CONFIG_PATH, body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, http::StatusCode as AxumStatus, routing::post};
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn reply(status: u16, body: &str) -> RawReply {
        RawReply {
            status: StatusCode::from_u16(status).unwrap(),
            body: body.to_string(),
        }
    }

    #[test]
    fn test_decode_envelope() {
        let r = reply(200, r#"{"success":true,"data":{"type":"conversational","answer":"Buy low."}}"#);
        assert_eq!(decode_answer(&r).unwrap(), "Buy low.");

        let r = reply(200, r#"{"success":true,"data":{"summary":"Backtest complete."}}"#);
        assert_eq!(decode_answer(&r).unwrap(), "Backtest complete.");

        let r = reply(400, r#"{"success":false,"data":null,"error":"Orchestration failed: bad goal"}"#);
        assert!(matches!(decode_answer(&r), Err(AppError::Remote(m)) if m.contains("bad goal")));
    }

    #[test]
    fn test_decode_plain_text() {
        assert_eq!(decode_answer(&reply(200, "  just text \n")).unwrap(), "just text");
        assert!(decode_answer(&reply(502, "Bad Gateway")).is_err());
        assert!(decode_answer(&reply(200, "")).is_err());
    }

    #[test]
    fn test_decode_bare_json_answers() {
        assert_eq!(decode_answer(&reply(200, r#""hi""#)).unwrap(), "hi");
        assert_eq!(decode_answer(&reply(200, r#"{"answer":"hi"}"#)).unwrap(), "hi");
        assert_eq!(decode_answer(&reply(200, r#"{"summary":"done"}"#)).unwrap(), "done");
        // JSON without any answer text is shown as sent
        assert_eq!(decode_answer(&reply(200, "[1, 2]")).unwrap(), "[1, 2]");
    }

    #[test]
    fn test_failure_text_is_readable() {
        let text = failure_text(&AppError::Timeout(Duration::from_secs(120)));
        assert!(text.contains("120 seconds"));
    }

    async fn spawn(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn client(base: String, timeout: Duration) -> StrategyClient {
        StrategyClient::new(HttpClient::new(), base, timeout, Duration::from_millis(10), 1)
    }

    #[tokio::test]
    async fn test_retries_once_on_server_error() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let router = Router::new().route(
            CHAT_PATH,
            post(move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        (AxumStatus::SERVICE_UNAVAILABLE, Json(json!({"success": false, "error": "warming up"})))
                    } else {
                        (AxumStatus::OK, Json(json!({"success": true, "data": {"answer": "ok"}})))
                    }
                }
            }),
        );
        let base = spawn(router).await;

        let request = StrategyChatRequest {
            chat_id: "c1".into(),
            user_id: "u1".into(),
            messages: vec![StrategyMessage { role: "user".into(), content: "hi".into() }],
        };
        let answer = client(base, Duration::from_secs(5)).chat(&request).await.unwrap();
        assert_eq!(answer, "ok");
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_gives_up_after_one_retry() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let router = Router::new().route(
            PARSE_PATH,
            post(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    AxumStatus::BAD_GATEWAY
                }
            }),
        );
        let base = spawn(router).await;

        let reply = client(base, Duration::from_secs(5)).parse(&json!({})).await.unwrap();
        assert_eq!(reply.status, StatusCode::BAD_GATEWAY);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_no_retry_on_client_error() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let router = Router::new().route(
            VALIDATE_PATH,
            post(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    (AxumStatus::BAD_REQUEST, "unknown indicator")
                }
            }),
        );
        let base = spawn(router).await;

        let reply = client(base, Duration::from_secs(5)).validate(&json!({})).await.unwrap();
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_attempt_timeout() {
        let router = Router::new().route(
            CHAT_PATH,
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "late"
            }),
        );
        let base = spawn(router).await;

        let request = StrategyChatRequest {
            chat_id: "c1".into(),
            user_id: "u1".into(),
            messages: vec![],
        };
        let started = std::time::Instant::now();
        let result = client(base, Duration::from_millis(100)).chat(&request).await;
        assert!(matches!(result, Err(AppError::Timeout(_))));
        // two attempts plus backoff, far below the handler's sleep
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_unreachable() {
        let result = client("http://127.0.0.1:1".into(), Duration::from_secs(2))
            .run(&json!({}))
            .await;
        assert!(matches!(result, Err(AppError::Unreachable(_))));
    }
}
