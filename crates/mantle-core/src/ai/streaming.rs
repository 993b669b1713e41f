//! Canonical streaming event vocabulary.
//!
//! Every provider backend normalizes its own wire events into this
//! tagged union - fragmented vs. complete tool JSON, single vs.
//! multiple simultaneous calls, optional reasoning channel. The agent
//! loop consumes only these variants and never branches on provider
//! identity.

use serde::Serialize;

/// Canonical events produced by `ModelClient::stream_turn`.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Text content delta.
    TextDelta { delta: String },

    /// Reasoning-channel delta (providers that expose one).
    ThinkingDelta { delta: String },

    /// The model opened a tool call; arguments follow as deltas.
    ToolCallStart { id: String, name: String },

    /// A fragment of the tool call's JSON arguments.
    ToolCallArgDelta { id: String, delta: String },

    /// The tool call's arguments are complete.
    ToolCallEnd { id: String },

    /// The turn finished.
    TurnEnd,

    /// Stream-level failure. Ends the turn; the session continues.
    Error { error: String },
}
