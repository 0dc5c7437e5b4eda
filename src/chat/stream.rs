// src/chat/stream.rs
// Produces the UI event stream for one chat turn and persists the reply

use chrono::Utc;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::events::UiEvent;
use super::markers::SkeletonPhase;
use super::replay::{ReplayOptions, replay_answer};
use super::request::ChatModel;
use super::strategy::{StrategyChatRequest, StrategyMessage, failure_text};
use crate::api::error::{ApiError, Surface};
use crate::db::messages;
use crate::llm::{GenerateRequest, ModelMessage, StreamEvent};
use crate::models::{Message, MessagePart, Role, ToolState};
use crate::state::AppState;

const EVENT_BUFFER: usize = 100;

const SYSTEM_PROMPT: &str = "\
You are a friendly financial research assistant. Keep your responses concise and helpful. \
You explain markets, instruments and trading strategies; you do not give personalised investment advice. \
For strategy construction or backtesting, suggest switching to the strategy model.";

/// Name shown on the placeholder while waiting for the strategy service
const STRATEGY_TOOL: &str = "strategy";

/// Everything one turn needs; `history` already ends with the new user message
#[derive(Debug, Clone)]
pub struct TurnInput {
    pub chat_id: String,
    pub user_id: String,
    pub model: ChatModel,
    pub history: Vec<Message>,
    pub assistant_message_id: String,
}

/// Send, ignoring a disconnected client; the turn still runs to completion so it can be saved
async fn emit(tx: &mpsc::Sender<UiEvent>, event: UiEvent) {
    if tx.send(event).await.is_err() {
        debug!("UI stream receiver gone");
    }
}

/// Run the turn on its own task and hand back the event channel
pub fn spawn_turn(state: AppState, input: TurnInput) -> mpsc::Receiver<UiEvent> {
    let (tx, rx) = mpsc::channel(EVENT_BUFFER);

    tokio::spawn(async move {
        emit(
            &tx,
            UiEvent::Start {
                message_id: input.assistant_message_id.clone(),
            },
        )
        .await;
        emit(&tx, UiEvent::StartStep).await;

        let parts = match input.model {
            ChatModel::Strategy => strategy_turn(&state, &input, &tx).await,
            ChatModel::Chat | ChatModel::ChatReasoning => model_turn(&state, &input, &tx).await,
        };

        if !parts.is_empty() {
            let reply = Message {
                id: input.assistant_message_id.clone(),
                chat_id: input.chat_id.clone(),
                role: Role::Assistant,
                parts,
                created_at: Utc::now(),
            };
            if let Err(e) = messages::save_messages(&state.pool, std::slice::from_ref(&reply)).await {
                error!(chat_id = %input.chat_id, error = %e, "Failed to persist assistant message");
                emit(
                    &tx,
                    UiEvent::Error {
                        error_text: ApiError::database(e.to_string()).message().to_string(),
                    },
                )
                .await;
            }
        }

        emit(&tx, UiEvent::FinishStep).await;
        emit(&tx, UiEvent::Finish).await;
        info!(chat_id = %input.chat_id, model = input.model.id(), "Chat turn complete");
    });

    rx
}

fn to_model_messages(history: &[Message]) -> Vec<ModelMessage> {
    history
        .iter()
        .map(|m| ModelMessage {
            role: m.role,
            parts: m.parts.clone(),
        })
        .collect()
}

/// Stream from the model provider, forwarding reasoning and text blocks
async fn model_turn(
    state: &AppState,
    input: &TurnInput,
    tx: &mpsc::Sender<UiEvent>,
) -> Vec<MessagePart> {
    let reasoning = input.model == ChatModel::ChatReasoning;
    let request = GenerateRequest {
        model: if reasoning {
            state.config.reasoning_model.clone()
        } else {
            state.config.chat_model.clone()
        },
        system: Some(SYSTEM_PROMPT.to_string()),
        messages: to_model_messages(&input.history),
        include_thoughts: reasoning,
    };

    let mut rx = match state.model.stream(request).await {
        Ok(rx) => rx,
        Err(e) => {
            warn!(chat_id = %input.chat_id, error = %e, "Model stream failed to start");
            emit(
                tx,
                UiEvent::Error {
                    error_text: ApiError::offline(Surface::Chat).message().to_string(),
                },
            )
            .await;
            return Vec::new();
        }
    };

    let text_id = format!("text-{}", Uuid::new_v4().simple());
    let reasoning_id = format!("reasoning-{}", Uuid::new_v4().simple());
    let mut text = String::new();
    let mut thoughts = String::new();
    let mut text_open = false;
    let mut reasoning_open = false;

    while let Some(event) = rx.recv().await {
        match event {
            StreamEvent::ReasoningDelta(delta) => {
                if !reasoning_open {
                    emit(tx, UiEvent::ReasoningStart { id: reasoning_id.clone() }).await;
                    reasoning_open = true;
                }
                thoughts.push_str(&delta);
                emit(
                    tx,
                    UiEvent::ReasoningDelta {
                        id: reasoning_id.clone(),
                        delta,
                    },
                )
                .await;
            }
            StreamEvent::TextDelta(delta) => {
                if reasoning_open {
                    emit(tx, UiEvent::ReasoningEnd { id: reasoning_id.clone() }).await;
                    reasoning_open = false;
                }
                if !text_open {
                    emit(tx, UiEvent::TextStart { id: text_id.clone() }).await;
                    text_open = true;
                }
                text.push_str(&delta);
                emit(
                    tx,
                    UiEvent::TextDelta {
                        id: text_id.clone(),
                        delta,
                    },
                )
                .await;
            }
            StreamEvent::Usage(usage) => {
                debug!(
                    input_tokens = usage.input_tokens,
                    output_tokens = usage.output_tokens,
                    reasoning_tokens = usage.reasoning_tokens,
                    "Model usage"
                );
            }
            StreamEvent::Error(e) => {
                warn!(chat_id = %input.chat_id, error = %e, "Model stream error");
                emit(
                    tx,
                    UiEvent::Error {
                        error_text: ApiError::offline(Surface::Stream).message().to_string(),
                    },
                )
                .await;
                break;
            }
            StreamEvent::Done => break,
        }
    }

    if reasoning_open {
        emit(tx, UiEvent::ReasoningEnd { id: reasoning_id }).await;
    }
    if text_open {
        emit(tx, UiEvent::TextEnd { id: text_id }).await;
    }

    let mut parts = Vec::new();
    if !thoughts.is_empty() {
        parts.push(MessagePart::Reasoning { text: thoughts });
    }
    if !text.is_empty() {
        parts.push(MessagePart::Text { text });
    }
    parts
}

fn to_strategy_request(input: &TurnInput) -> StrategyChatRequest {
    StrategyChatRequest {
        chat_id: input.chat_id.clone(),
        user_id: input.user_id.clone(),
        messages: input
            .history
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| StrategyMessage {
                role: m.role.to_string(),
                content: m.text_content(),
            })
            .filter(|m| !m.content.trim().is_empty())
            .collect(),
    }
}

/// One bounded-retry call to the strategy service, then replay of its answer
async fn strategy_turn(
    state: &AppState,
    input: &TurnInput,
    tx: &mpsc::Sender<UiEvent>,
) -> Vec<MessagePart> {
    emit(
        tx,
        UiEvent::skeleton(SkeletonPhase::Tool {
            tool_name: STRATEGY_TOOL.to_string(),
        }),
    )
    .await;

    let answer = match state.strategy.chat(&to_strategy_request(input)).await {
        Ok(answer) => answer,
        // Failures become part of the transcript rather than a stream error
        Err(e) => failure_text(&e),
    };

    emit(tx, UiEvent::skeleton(SkeletonPhase::Idle)).await;

    let options = ReplayOptions {
        chunk_size: state.config.replay_chunk_size,
        delay: state.config.replay_delay(),
    };
    let text_id = format!("text-{}", Uuid::new_v4().simple());
    let outcome = replay_answer(&answer, &text_id, options, tx).await;
    if !outcome.delivered {
        info!(chat_id = %input.chat_id, "Client left during replay; saving full answer");
    }

    let mut parts = vec![MessagePart::Text { text: outcome.text }];
    parts.extend(outcome.backtests.into_iter().map(|call| MessagePart::Tool {
        tool_call_id: call.tool_call_id,
        tool_name: call.tool_name,
        state: ToolState::OutputAvailable,
        input: Some(json!({})),
        output: Some(call.payload),
        error_text: None,
    }));
    parts
}
