//! History logging seam.
//!
//! Chat-history persistence lives outside this crate; the engine only
//! reports what happened. Every tool execution and every elicitation
//! resolution goes through this trait so the orchestrator, the hook
//! engine, and the IPC router all log identically.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

/// How an elicitation was resolved. `AutoDecline` and
/// `AutoDeclineCancelled` are distinct from a user-chosen decline so
/// scripted runs can be told apart in the transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElicitationAction {
    Accept,
    Decline,
    Cancel,
    AutoDecline,
    AutoDeclineCancelled,
}

impl ElicitationAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ElicitationAction::Accept => "accept",
            ElicitationAction::Decline => "decline",
            ElicitationAction::Cancel => "cancel",
            ElicitationAction::AutoDecline => "auto_decline",
            ElicitationAction::AutoDeclineCancelled => "auto_decline_cancelled",
        }
    }
}

impl std::fmt::Display for ElicitationAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One completed tool execution, as reported to history.
#[derive(Debug, Clone)]
pub struct ToolExecutionRecord {
    pub name: String,
    pub input: Value,
    pub output: String,
    pub success: bool,
    /// True when the call was issued by the agent loop (vs. IPC).
    pub from_orchestrator: bool,
    pub from_ipc: bool,
    pub input_timestamp: DateTime<Utc>,
}

/// External history collaborator.
#[async_trait]
pub trait HistoryLogger: Send + Sync {
    async fn add_user_message(&self, text: &str);
    async fn add_assistant_message(&self, text: &str);
    async fn add_tool_execution(&self, record: ToolExecutionRecord);
    async fn add_elicitation_event(
        &self,
        action: ElicitationAction,
        server_message: Option<&str>,
        reason: Option<&str>,
    );
}

/// No-op logger for tests and headless embedding.
pub struct NullHistory;

#[async_trait]
impl HistoryLogger for NullHistory {
    async fn add_user_message(&self, _text: &str) {}
    async fn add_assistant_message(&self, _text: &str) {}
    async fn add_tool_execution(&self, _record: ToolExecutionRecord) {}
    async fn add_elicitation_event(
        &self,
        _action: ElicitationAction,
        _server_message: Option<&str>,
        _reason: Option<&str>,
    ) {
    }
}
