//! UI message stream events
//!
//! Every event is one SSE `data:` line holding a JSON object tagged by
//! `type`. A stream ends with the literal `data: [DONE]`.

use axum::response::sse::Event;
use serde::Serialize;
use serde_json::Value;

use super::markers::SkeletonPhase;

/// Terminal sentinel after `finish`
pub const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum UiEvent {
    #[serde(rename_all = "camelCase")]
    Start { message_id: String },
    StartStep,

    // === Text ===
    TextStart { id: String },
    TextDelta { id: String, delta: String },
    TextEnd { id: String },

    // === Reasoning ===
    ReasoningStart { id: String },
    ReasoningDelta { id: String, delta: String },
    ReasoningEnd { id: String },

    // === Tools ===
    #[serde(rename_all = "camelCase")]
    ToolInputAvailable {
        tool_call_id: String,
        tool_name: String,
        input: Value,
    },
    #[serde(rename_all = "camelCase")]
    ToolOutputAvailable { tool_call_id: String, output: Value },

    // === Data parts ===
    /// Placeholder the client shows while a tool phase is in flight
    DataSkeleton { data: SkeletonPhase, transient: bool },
    DataBacktestResults { id: String, data: Value },

    #[serde(rename_all = "camelCase")]
    Error { error_text: String },
    FinishStep,
    Finish,
}

impl UiEvent {
    pub fn skeleton(phase: SkeletonPhase) -> Self {
        Self::DataSkeleton {
            data: phase,
            transient: true,
        }
    }

    pub fn to_sse(&self) -> Event {
        match serde_json::to_string(self) {
            Ok(json) => Event::default().data(json),
            // Only reachable with non-string map keys inside a payload
            Err(e) => Event::default().data(format!(
                r#"{{"type":"error","errorText":"unserializable event: {e}"}}"#
            )),
        }
    }

    pub fn done() -> Event {
        Event::default().data(DONE_SENTINEL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn wire(event: &UiEvent) -> Value {
        serde_json::to_value(event).unwrap()
    }

    #[test]
    fn test_type_tags() {
        assert_eq!(wire(&UiEvent::StartStep), json!({"type": "start-step"}));
        assert_eq!(
            wire(&UiEvent::TextDelta { id: "t1".into(), delta: "Hi".into() }),
            json!({"type": "text-delta", "id": "t1", "delta": "Hi"})
        );
        assert_eq!(
            wire(&UiEvent::Start { message_id: "m1".into() }),
            json!({"type": "start", "messageId": "m1"})
        );
    }

    #[test]
    fn test_tool_and_data_events() {
        let input = wire(&UiEvent::ToolInputAvailable {
            tool_call_id: "call_1".into(),
            tool_name: "backtest".into(),
            input: json!({}),
        });
        assert_eq!(input["type"], "tool-input-available");
        assert_eq!(input["toolCallId"], "call_1");

        let results = wire(&UiEvent::DataBacktestResults {
            id: "call_1".into(),
            data: json!({"sharpe": 1.1}),
        });
        assert_eq!(results["type"], "data-backtest-results");

        let skeleton = wire(&UiEvent::skeleton(SkeletonPhase::Backtest));
        assert_eq!(skeleton["type"], "data-skeleton");
        assert_eq!(skeleton["data"]["phase"], "backtest");

        let error = wire(&UiEvent::Error { error_text: "boom".into() });
        assert_eq!(error, json!({"type": "error", "errorText": "boom"}));
    }
}
