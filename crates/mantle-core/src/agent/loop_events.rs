//! Events emitted by the agent loop to its consumer.

use serde::Serialize;
use serde_json::Value;

/// One observable step of a run, streamed to the front end.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LoopEvent {
    TextDelta {
        delta: String,
    },
    ThinkingDelta {
        delta: String,
    },
    ToolCallStart {
        id: String,
        name: String,
    },
    /// Arguments fully received and parsed.
    ToolCallComplete {
        id: String,
        name: String,
        arguments: Value,
    },
    ToolExecuting {
        id: String,
        name: String,
    },
    ToolResult {
        id: String,
        output: String,
        is_error: bool,
    },
    /// A hook injected extra context into the conversation.
    ContextInjected {
        hook_id: String,
        tool: String,
        text: String,
    },
    TurnComplete {
        turn: usize,
        /// Whether the model asked for more tool calls.
        has_more: bool,
    },
    Aborted {
        reason: String,
    },
    Finished,
    Error {
        error: String,
    },
}
