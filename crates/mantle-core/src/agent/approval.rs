//! Human-in-the-loop confirmation gate.
//!
//! Execution is the default: only an explicit skip answer blocks a
//! call, and an "always" answer lifts the gate for the session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

/// Interactive prompt seam. The terminal front end implements this;
/// tests script it.
#[async_trait]
pub trait Prompter: Send + Sync {
    async fn prompt(&self, message: &str) -> anyhow::Result<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Execute,
    Skip,
}

pub struct ApprovalGate {
    enabled: bool,
    session_approved: AtomicBool,
    prompter: Arc<dyn Prompter>,
}

impl ApprovalGate {
    pub fn new(enabled: bool, prompter: Arc<dyn Prompter>) -> Self {
        Self {
            enabled,
            session_approved: AtomicBool::new(false),
            prompter,
        }
    }

    /// Ask the user whether a tool call may run. Prompt failures count
    /// as approval so a broken terminal never wedges the loop.
    pub async fn confirm(&self, tool: &str, arguments: &Value) -> Confirmation {
        if !self.enabled || self.session_approved.load(Ordering::SeqCst) {
            return Confirmation::Execute;
        }

        let message = format!(
            "Execute tool '{}' with arguments {}? [Enter=yes, s=skip, A=always] ",
            tool, arguments
        );
        let answer = match self.prompter.prompt(&message).await {
            Ok(answer) => answer,
            Err(e) => {
                debug!(tool = %tool, "Confirmation prompt failed, proceeding: {}", e);
                return Confirmation::Execute;
            }
        };

        match answer.trim() {
            "s" | "n" | "skip" | "no" => Confirmation::Skip,
            "A" | "all" | "always" | "session" => {
                self.session_approved.store(true, Ordering::SeqCst);
                Confirmation::Execute
            }
            _ => Confirmation::Execute,
        }
    }

    /// Drop a session-wide approval, re-arming per-call prompts.
    pub fn reset_session(&self) {
        self.session_approved.store(false, Ordering::SeqCst);
    }
}
