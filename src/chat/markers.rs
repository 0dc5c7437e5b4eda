//! Marker scanner for relayed strategy answers
//!
//! The strategy service reports progress inline in its answer text:
//! a `Using tool: <name>` line, progress bars drawn with block glyphs
//! (optionally followed by `NN%`), and a fenced `backtest-results` block
//! holding the JSON result. The scanner is fed text as it is replayed and
//! reports skeleton phase changes plus the parsed backtest payload.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

pub const BACKTEST_FENCE_LANG: &str = "backtest-results";
pub const DEFAULT_BACKTEST_TOOL: &str = "backtest";

const PROGRESS_GLYPHS: [char; 6] = ['█', '▓', '▒', '░', '▰', '▱'];

static TOOL_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Using tool:\s*(.+)$").expect("valid regex"));
static PERCENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{1,3})\s*%").expect("valid regex"));

/// What the client should show while the answer is still arriving
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "kebab-case")]
pub enum SkeletonPhase {
    Idle,
    #[serde(rename_all = "camelCase")]
    Tool { tool_name: String },
    Progress {
        #[serde(skip_serializing_if = "Option::is_none")]
        percent: Option<u8>,
    },
    Backtest,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MarkerEvent {
    Phase(SkeletonPhase),
    /// A closed `backtest-results` fence whose body parsed as JSON
    BacktestResults { tool_name: String, payload: Value },
}

#[derive(Debug, Clone, PartialEq)]
enum Fence {
    None,
    Backtest { body: String },
    /// Any other code block; markers inside it are ignored
    Other,
}

/// Language of a fence-opening line (```lang), if the line opens one
fn fence_language(line: &str) -> Option<&str> {
    let rest = line.trim_start().strip_prefix("```")?;
    Some(rest.split_whitespace().next().unwrap_or(""))
}

fn is_fence(line: &str) -> bool {
    line.trim_start().starts_with("```")
}

fn tool_name(line: &str) -> Option<String> {
    let caps = TOOL_MARKER.captures(line)?;
    let name = caps
        .get(1)?
        .as_str()
        .trim_matches(|c: char| c == '*' || c == '`' || c.is_whitespace());
    (!name.is_empty()).then(|| name.to_string())
}

fn progress(line: &str) -> Option<SkeletonPhase> {
    if !line.contains(PROGRESS_GLYPHS) {
        return None;
    }
    let percent = PERCENT
        .captures(line)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<u16>().ok())
        .map(|p| p.min(100) as u8);
    Some(SkeletonPhase::Progress { percent })
}

#[derive(Debug)]
pub struct MarkerScanner {
    phase: SkeletonPhase,
    line: String,
    fence: Fence,
    last_tool: Option<String>,
}

impl Default for MarkerScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkerScanner {
    pub fn new() -> Self {
        Self {
            phase: SkeletonPhase::Idle,
            line: String::new(),
            fence: Fence::None,
            last_tool: None,
        }
    }

    pub fn phase(&self) -> &SkeletonPhase {
        &self.phase
    }

    fn set_phase(&mut self, phase: SkeletonPhase, events: &mut Vec<MarkerEvent>) {
        if self.phase != phase {
            self.phase = phase.clone();
            events.push(MarkerEvent::Phase(phase));
        }
    }

    /// Feed the next slice of answer text
    pub fn feed(&mut self, delta: &str) -> Vec<MarkerEvent> {
        let mut events = Vec::new();

        for ch in delta.chars() {
            if ch == '\n' {
                let line = std::mem::take(&mut self.line);
                self.complete_line(&line, &mut events);
            } else {
                self.line.push(ch);
            }
        }

        // Progress bars redraw in place, so look at the unfinished line too
        if self.fence == Fence::None && !is_fence(&self.line) {
            if let Some(phase) = progress(&self.line) {
                self.set_phase(phase, &mut events);
            }
        }

        events
    }

    /// Flush the trailing line at end of answer and return to idle
    pub fn finish(&mut self) -> Vec<MarkerEvent> {
        let mut events = Vec::new();
        if !self.line.is_empty() {
            let line = std::mem::take(&mut self.line);
            self.complete_line(&line, &mut events);
        }
        if let Fence::Backtest { .. } = self.fence {
            warn!("Answer ended inside an unclosed backtest-results block");
        }
        self.fence = Fence::None;
        self.set_phase(SkeletonPhase::Idle, &mut events);
        events
    }

    fn complete_line(&mut self, line: &str, events: &mut Vec<MarkerEvent>) {
        match &mut self.fence {
            Fence::Backtest { body } => {
                if is_fence(line) {
                    let body = std::mem::take(body);
                    self.fence = Fence::None;
                    self.close_backtest(&body, events);
                } else {
                    body.push_str(line);
                    body.push('\n');
                }
            }
            Fence::Other => {
                if is_fence(line) {
                    self.fence = Fence::None;
                }
            }
            Fence::None => {
                if let Some(lang) = fence_language(line) {
                    if lang == BACKTEST_FENCE_LANG {
                        self.fence = Fence::Backtest {
                            body: String::new(),
                        };
                        self.set_phase(SkeletonPhase::Backtest, events);
                    } else {
                        self.fence = Fence::Other;
                    }
                } else if let Some(name) = tool_name(line) {
                    self.last_tool = Some(name.clone());
                    self.set_phase(SkeletonPhase::Tool { tool_name: name }, events);
                } else if let Some(phase) = progress(line) {
                    self.set_phase(phase, events);
                }
            }
        }
    }

    fn close_backtest(&mut self, body: &str, events: &mut Vec<MarkerEvent>) {
        match serde_json::from_str::<Value>(body.trim()) {
            Ok(payload) => {
                let tool_name = self
                    .last_tool
                    .clone()
                    .unwrap_or_else(|| DEFAULT_BACKTEST_TOOL.to_string());
                events.push(MarkerEvent::BacktestResults { tool_name, payload });
            }
            Err(e) => warn!(error = %e, "backtest-results block is not valid JSON"),
        }
        self.set_phase(SkeletonPhase::Idle, events);
    }
}

/// Remove every fenced `backtest-results` block from `text`
pub fn strip_backtest_blocks(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut inside = false;
    for line in text.split_inclusive('\n') {
        if inside {
            if is_fence(line) {
                inside = false;
            }
            continue;
        }
        if fence_language(line) == Some(BACKTEST_FENCE_LANG) {
            inside = true;
            continue;
        }
        out.push_str(line);
    }
    out.trim_end().to_string()
}

/// Parsed body of the first complete `backtest-results` block, if any
pub fn extract_backtest_payload(text: &str) -> Option<Value> {
    let mut scanner = MarkerScanner::new();
    let mut events = scanner.feed(text);
    events.extend(scanner.finish());
    events.into_iter().find_map(|e| match e {
        MarkerEvent::BacktestResults { payload, .. } => Some(payload),
        MarkerEvent::Phase(_) => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn phases(events: &[MarkerEvent]) -> Vec<SkeletonPhase> {
        events
            .iter()
            .filter_map(|e| match e {
                MarkerEvent::Phase(p) => Some(p.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_tool_marker() {
        let mut scanner = MarkerScanner::new();
        let events = scanner.feed("Let me check.\n🔧 **Using tool:** `run_backtest`\n");
        assert_eq!(
            phases(&events),
            vec![SkeletonPhase::Tool {
                tool_name: "run_backtest".into()
            }]
        );
    }

    #[test]
    fn test_tool_marker_waits_for_full_line() {
        let mut scanner = MarkerScanner::new();
        assert!(scanner.feed("Using tool: fetch_pr").is_empty());
        let events = scanner.feed("ices\n");
        assert_eq!(
            phases(&events),
            vec![SkeletonPhase::Tool {
                tool_name: "fetch_prices".into()
            }]
        );
    }

    #[test]
    fn test_progress_reported_on_change_only() {
        let mut scanner = MarkerScanner::new();
        let first = scanner.feed("████░░░░ 40%");
        assert_eq!(phases(&first), vec![SkeletonPhase::Progress { percent: Some(40) }]);

        // same percent again: no event
        assert!(scanner.feed("\n████░░░░ 40%").is_empty());

        let next = scanner.feed("\n▰▰▰▰▰▰▱▱ 75%\n");
        assert_eq!(phases(&next), vec![SkeletonPhase::Progress { percent: Some(75) }]);
    }

    #[test]
    fn test_backtest_block_split_across_feeds() {
        let mut scanner = MarkerScanner::new();
        let text = "Using tool: backtest\nRunning...\n```backtest-results\n{\"sharpe\": 1.42, \"trades\": 37}\n```\nDone.";

        let mut events = Vec::new();
        for chunk in text.as_bytes().chunks(5) {
            // chunks of ASCII are valid UTF-8
            events.extend(scanner.feed(std::str::from_utf8(chunk).unwrap()));
        }
        events.extend(scanner.finish());

        assert_eq!(
            phases(&events),
            vec![
                SkeletonPhase::Tool {
                    tool_name: "backtest".into()
                },
                SkeletonPhase::Backtest,
                SkeletonPhase::Idle,
            ]
        );
        let payload = events.iter().find_map(|e| match e {
            MarkerEvent::BacktestResults { payload, tool_name } => {
                assert_eq!(tool_name, "backtest");
                Some(payload.clone())
            }
            _ => None,
        });
        assert_eq!(payload, Some(json!({"sharpe": 1.42, "trades": 37})));
    }

    #[test]
    fn test_invalid_backtest_json_yields_no_payload() {
        assert_eq!(
            extract_backtest_payload("```backtest-results\n{not json\n```\n"),
            None
        );
    }

    #[test]
    fn test_markers_inside_other_code_blocks_ignored() {
        let mut scanner = MarkerScanner::new();
        let mut events = scanner.feed("```python\nprint('Using tool: nope')\n```\n");
        events.extend(scanner.finish());
        assert!(phases(&events).is_empty());
    }

    #[test]
    fn test_strip_backtest_blocks() {
        let text = "Summary first.\n```backtest-results\n{\"a\":1}\n```\nClosing words.";
        assert_eq!(strip_backtest_blocks(text), "Summary first.\nClosing words.");
        assert_eq!(strip_backtest_blocks("plain"), "plain");
    }
}
