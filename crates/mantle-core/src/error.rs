//! Error taxonomy for the orchestration engine.
//!
//! None of these terminate the process:
//! - `ProviderError` ends the current turn; the session continues
//! - `ToolError` becomes tool-result error content fed back to the model
//! - directive parse failures (see `agent::directive`) skip one hook
//! - elicitation cancellation is a tagged resolution, not a failure

use thiserror::Error;

/// Transport-level failure talking to a model provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider request failed: {0}")]
    Transport(String),

    #[error("provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        ProviderError::Transport(err.to_string())
    }
}

/// Failure reported by the external tool execution collaborator.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("tool '{name}' timed out after {seconds}s")]
    Timeout { name: String, seconds: u64 },

    #[error("tool '{name}' failed: {message}")]
    Failed { name: String, message: String },
}

impl ToolError {
    /// True when the external timeout guard fired. Used by the broker
    /// to force-cancel a pending elicitation.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ToolError::Timeout { .. })
    }
}

/// Elicitation failures distinct from a user decline.
#[derive(Debug, Error)]
pub enum ElicitError {
    #[error("elicitation cancelled: {reason}")]
    Cancelled { reason: String },

    #[error("prompt I/O failed: {0}")]
    Io(String),
}
