// src/chat/replay.rs
// Re-emit a complete remote answer as timed text deltas

use serde_json::{Value, json};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use super::events::UiEvent;
use super::markers::{MarkerEvent, MarkerScanner};

#[derive(Debug, Clone, Copy)]
pub struct ReplayOptions {
    /// Characters per delta
    pub chunk_size: usize,
    pub delay: Duration,
}

/// Backtest block found while replaying
#[derive(Debug, Clone, PartialEq)]
pub struct BacktestCall {
    pub tool_call_id: String,
    pub tool_name: String,
    pub payload: Value,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplayOutcome {
    pub text: String,
    pub backtests: Vec<BacktestCall>,
    /// False if the receiver went away before the replay finished
    pub delivered: bool,
}

/// Split on char boundaries into chunks of `size` chars (the last may be shorter)
pub fn chunk_text(text: &str, size: usize) -> Vec<&str> {
    let size = size.max(1);
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut count = 0;

    for (idx, _) in text.char_indices() {
        if count == size {
            chunks.push(&text[start..idx]);
            start = idx;
            count = 0;
        }
        count += 1;
    }
    if start < text.len() {
        chunks.push(&text[start..]);
    }
    chunks
}

struct Emitter<'a> {
    tx: &'a mpsc::Sender<UiEvent>,
    connected: bool,
}

impl Emitter<'_> {
    async fn send(&mut self, event: UiEvent) {
        if self.connected && self.tx.send(event).await.is_err() {
            debug!("Replay receiver dropped, continuing silently");
            self.connected = false;
        }
    }
}

fn marker_events(events: Vec<MarkerEvent>, backtests: &mut Vec<BacktestCall>) -> Vec<UiEvent> {
    let mut out = Vec::new();
    for event in events {
        match event {
            MarkerEvent::Phase(phase) => out.push(UiEvent::skeleton(phase)),
            MarkerEvent::BacktestResults { tool_name, payload } => {
                let tool_call_id = format!("call_{}", Uuid::new_v4().simple());
                out.push(UiEvent::ToolInputAvailable {
                    tool_call_id: tool_call_id.clone(),
                    tool_name: tool_name.clone(),
                    input: json!({}),
                });
                out.push(UiEvent::ToolOutputAvailable {
                    tool_call_id: tool_call_id.clone(),
                    output: payload.clone(),
                });
                out.push(UiEvent::DataBacktestResults {
                    id: tool_call_id.clone(),
                    data: payload.clone(),
                });
                backtests.push(BacktestCall {
                    tool_call_id,
                    tool_name,
                    payload,
                });
            }
        }
    }
    out
}

/// Replay `answer` as one text block of deltas, feeding each chunk through the
/// marker scanner. Keeps going (without sleeping) if the client disconnects so
/// the caller still gets the full outcome to persist.
pub async fn replay_answer(
    answer: &str,
    text_id: &str,
    options: ReplayOptions,
    tx: &mpsc::Sender<UiEvent>,
) -> ReplayOutcome {
    let mut emitter = Emitter {
        tx,
        connected: true,
    };
    let mut scanner = MarkerScanner::new();
    let mut backtests = Vec::new();

    emitter
        .send(UiEvent::TextStart {
            id: text_id.to_string(),
        })
        .await;

    for chunk in chunk_text(answer, options.chunk_size) {
        if emitter.connected && !options.delay.is_zero() {
            tokio::time::sleep(options.delay).await;
        }
        emitter
            .send(UiEvent::TextDelta {
                id: text_id.to_string(),
                delta: chunk.to_string(),
            })
            .await;
        for event in marker_events(scanner.feed(chunk), &mut backtests) {
            emitter.send(event).await;
        }
    }

    for event in marker_events(scanner.finish(), &mut backtests) {
        emitter.send(event).await;
    }
    emitter
        .send(UiEvent::TextEnd {
            id: text_id.to_string(),
        })
        .await;

    ReplayOutcome {
        text: answer.to_string(),
        backtests,
        delivered: emitter.connected,
    }
}
