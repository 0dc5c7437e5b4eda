//! Server-side render model for stored messages
//!
//! Clients draw one component per block. Tool parts that are still in
//! flight become skeleton placeholders; finished ones become result cards.

use serde::Serialize;
use serde_json::Value;

use super::markers::strip_backtest_blocks;
use crate::models::{Message, MessagePart, ToolState};

/// Placeholder shape shown while a tool runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkeletonKind {
    Backtest,
    Strategy,
    Generic,
}

pub fn skeleton_for_tool(tool_name: &str) -> SkeletonKind {
    let name = tool_name.to_ascii_lowercase();
    if name.contains("backtest") {
        SkeletonKind::Backtest
    } else if name.contains("strategy") || name.contains("parse") || name.contains("validate") {
        SkeletonKind::Strategy
    } else {
        SkeletonKind::Generic
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum RenderBlock {
    Text {
        text: String,
    },
    Reasoning {
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    Skeleton {
        tool_call_id: String,
        tool_name: String,
        skeleton: SkeletonKind,
    },
    #[serde(rename_all = "camelCase")]
    ToolResult {
        tool_call_id: String,
        tool_name: String,
        skeleton: SkeletonKind,
        output: Value,
    },
    #[serde(rename_all = "camelCase")]
    ToolError {
        tool_call_id: String,
        tool_name: String,
        error_text: String,
    },
    #[serde(rename_all = "camelCase")]
    Attachment {
        name: String,
        media_type: String,
        url: String,
    },
}

fn carries_backtest_payload(message: &Message) -> bool {
    message.parts.iter().any(|p| {
        matches!(
            p,
            MessagePart::Tool {
                state: ToolState::OutputAvailable,
                output: Some(_),
                ..
            }
        )
    })
}

pub fn render_message(message: &Message) -> Vec<RenderBlock> {
    let strip_fences = carries_backtest_payload(message);

    message
        .parts
        .iter()
        .filter_map(|part| match part {
            MessagePart::Text { text } => {
                let text = if strip_fences {
                    strip_backtest_blocks(text)
                } else {
                    text.clone()
                };
                (!text.trim().is_empty()).then_some(RenderBlock::Text { text })
            }
            MessagePart::Reasoning { text } => (!text.trim().is_empty())
                .then(|| RenderBlock::Reasoning { text: text.clone() }),
            MessagePart::File {
                media_type,
                name,
                url,
            } => Some(RenderBlock::Attachment {
                name: name.clone(),
                media_type: media_type.clone(),
                url: url.clone(),
            }),
            MessagePart::Tool {
                tool_call_id,
                tool_name,
                state,
                output,
                error_text,
                ..
            } => Some(match (state, output) {
                (ToolState::OutputAvailable, Some(output)) => RenderBlock::ToolResult {
                    tool_call_id: tool_call_id.clone(),
                    tool_name: tool_name.clone(),
                    skeleton: skeleton_for_tool(tool_name),
                    output: output.clone(),
                },
                (ToolState::OutputError, _) => RenderBlock::ToolError {
                    tool_call_id: tool_call_id.clone(),
                    tool_name: tool_name.clone(),
                    error_text: error_text.clone().unwrap_or_else(|| "Tool failed".to_string()),
                },
                // input-available, or output-available with nothing to show yet
                _ => RenderBlock::Skeleton {
                    tool_call_id: tool_call_id.clone(),
                    tool_name: tool_name.clone(),
                    skeleton: skeleton_for_tool(tool_name),
                },
            }),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use chrono::Utc;
    use serde_json::json;

    fn message(parts: Vec<MessagePart>) -> Message {
        Message {
            id: "m1".into(),
            chat_id: "c1".into(),
            role: Role::Assistant,
            parts,
            created_at: Utc::now(),
        }
    }

    fn tool(state: ToolState, output: Option<Value>) -> MessagePart {
        MessagePart::Tool {
            tool_call_id: "call_1".into(),
            tool_name: "run_backtest".into(),
            state,
            input: None,
            output,
            error_text: None,
        }
    }

    #[test]
    fn test_skeleton_kinds() {
        assert_eq!(skeleton_for_tool("run_backtest"), SkeletonKind::Backtest);
        assert_eq!(skeleton_for_tool("parse_strategy"), SkeletonKind::Strategy);
        assert_eq!(skeleton_for_tool("fetch_quotes"), SkeletonKind::Generic);
    }

    #[test]
    fn test_in_flight_tool_is_skeleton() {
        let blocks = render_message(&message(vec![tool(ToolState::InputAvailable, None)]));
        assert_eq!(
            blocks,
            vec![RenderBlock::Skeleton {
                tool_call_id: "call_1".into(),
                tool_name: "run_backtest".into(),
                skeleton: SkeletonKind::Backtest,
            }]
        );
    }

    #[test]
    fn test_fence_removed_when_tool_carries_payload() {
        let text = "Results below.\n```backtest-results\n{\"sharpe\":1.2}\n```\n";
        let blocks = render_message(&message(vec![
            MessagePart::Reasoning { text: "checking".into() },
            MessagePart::text(text),
            tool(ToolState::OutputAvailable, Some(json!({"sharpe": 1.2}))),
        ]));
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[1], RenderBlock::Text { text: "Results below.".into() });
        assert!(matches!(blocks[2], RenderBlock::ToolResult { .. }));
    }

    #[test]
    fn test_fence_kept_without_tool_part() {
        let text = "```backtest-results\n{}\n```";
        let blocks = render_message(&message(vec![MessagePart::text(text)]));
        assert_eq!(blocks, vec![RenderBlock::Text { text: text.into() }]);
    }

    #[test]
    fn test_tool_error() {
        let blocks = render_message(&message(vec![MessagePart::Tool {
            tool_call_id: "call_2".into(),
            tool_name: "validate".into(),
            state: ToolState::OutputError,
            input: None,
            output: None,
            error_text: Some("unknown indicator".into()),
        }]));
        let value = serde_json::to_value(&blocks[0]).unwrap();
        assert_eq!(value["kind"], "tool-error");
        assert_eq!(value["errorText"], "unknown indicator");
    }
}
