//! The agent loop.
//!
//! Alternates model turns and tool execution until the model stops
//! asking for tools, the iteration cap is reached, or the run is
//! aborted. Runs on a spawned task; progress streams out as
//! `LoopEvent`s and the final conversation comes back through the join
//! handle.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::agent::cancel::{AbortHandle, RunFlags};
use crate::agent::loop_events::LoopEvent;
use crate::agent::stream::process_stream;
use crate::ai::streaming::StreamEvent;
use crate::ai::types::{AiTool, Content, ModelMessage, Role};
use crate::ai::ModelClient;
use crate::error::ProviderError;
use crate::history::HistoryLogger;
use crate::tools::broker::{CallOrigin, ToolBroker};
use crate::tools::executor::ToolCallRequest;

/// Source of streamed model turns. `ModelClient` is the real one;
/// tests script their own.
#[async_trait]
pub trait TurnSource: Send + Sync {
    async fn stream_turn(
        &self,
        messages: &[ModelMessage],
        tools: &[AiTool],
        max_tokens: usize,
    ) -> Result<mpsc::UnboundedReceiver<StreamEvent>, ProviderError>;
}

#[async_trait]
impl TurnSource for ModelClient {
    async fn stream_turn(
        &self,
        messages: &[ModelMessage],
        tools: &[AiTool],
        max_tokens: usize,
    ) -> Result<mpsc::UnboundedReceiver<StreamEvent>, ProviderError> {
        ModelClient::stream_turn(self, messages, tools, max_tokens).await
    }
}

#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Maximum model turns per run; 0 means unlimited.
    pub max_iterations: usize,
    pub max_tokens: usize,
}

pub struct LoopServices {
    pub client: Arc<dyn TurnSource>,
    pub broker: Arc<ToolBroker>,
    pub history: Arc<dyn HistoryLogger>,
    pub abort: AbortHandle,
    pub run_flags: RunFlags,
    pub tools: Vec<AiTool>,
}

pub struct AgentLoop {
    config: LoopConfig,
    services: LoopServices,
}

impl AgentLoop {
    pub fn new(config: LoopConfig, services: LoopServices) -> Self {
        Self { config, services }
    }

    /// Start a run. The receiver streams progress; the handle resolves
    /// to the conversation including everything this run appended.
    pub fn run(
        self,
        conversation: Vec<ModelMessage>,
    ) -> (mpsc::UnboundedReceiver<LoopEvent>, JoinHandle<Vec<ModelMessage>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(async move { self.run_inner(tx, conversation).await });
        (rx, handle)
    }

    async fn run_inner(
        self,
        events: mpsc::UnboundedSender<LoopEvent>,
        mut conversation: Vec<ModelMessage>,
    ) -> Vec<ModelMessage> {
        let mut turn = 0usize;

        loop {
            turn += 1;
            if self.config.max_iterations != 0 && turn > self.config.max_iterations {
                warn!(turns = turn - 1, "Iteration cap reached, stopping run");
                let _ = events.send(LoopEvent::Error {
                    error: format!(
                        "run stopped after {} iterations",
                        self.config.max_iterations
                    ),
                });
                break;
            }

            if let Some(reason) = self.abort_reason() {
                let _ = events.send(LoopEvent::Aborted { reason });
                break;
            }

            let stream = match self
                .services
                .client
                .stream_turn(&conversation, &self.services.tools, self.config.max_tokens)
                .await
            {
                Ok(stream) => stream,
                Err(e) => {
                    warn!("Model request failed: {}", e);
                    let _ = events.send(LoopEvent::Error {
                        error: e.to_string(),
                    });
                    break;
                }
            };

            let outcome = process_stream(stream, &events).await;
            if outcome.error.is_some() {
                break;
            }

            // Record what the model said this turn.
            let mut blocks = Vec::new();
            if !outcome.thinking.is_empty() {
                blocks.push(Content::Thinking {
                    thinking: outcome.thinking.clone(),
                });
            }
            if !outcome.text.is_empty() {
                blocks.push(Content::Text {
                    text: outcome.text.clone(),
                });
            }
            for call in &outcome.tool_calls {
                blocks.push(Content::ToolUse {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    input: call.arguments.clone(),
                });
            }
            if !blocks.is_empty() {
                conversation.push(ModelMessage {
                    role: Role::Assistant,
                    content: blocks,
                });
            }
            if !outcome.text.is_empty() {
                self.services
                    .history
                    .add_assistant_message(&outcome.text)
                    .await;
            }

            let has_more = !outcome.tool_calls.is_empty() || !outcome.malformed.is_empty();
            let _ = events.send(LoopEvent::TurnComplete { turn, has_more });
            if !has_more {
                info!(turns = turn, "Run finished");
                let _ = events.send(LoopEvent::Finished);
                break;
            }

            // Malformed calls get error results so the model can retry.
            for bad in &outcome.malformed {
                let output = format!("invalid tool arguments: {}", bad.error);
                conversation.push(tool_result_message(&bad.id, &output, true));
                let _ = events.send(LoopEvent::ToolResult {
                    id: bad.id.clone(),
                    output,
                    is_error: true,
                });
            }

            for call in outcome.tool_calls {
                if let Some(reason) = self.abort_reason() {
                    // Every remaining call still needs a result message.
                    let output = format!("tool call cancelled: {reason}");
                    conversation.push(tool_result_message(&call.id, &output, true));
                    let _ = events.send(LoopEvent::ToolResult {
                        id: call.id,
                        output,
                        is_error: true,
                    });
                    continue;
                }

                let _ = events.send(LoopEvent::ToolExecuting {
                    id: call.id.clone(),
                    name: call.name.clone(),
                });

                let report = self
                    .services
                    .broker
                    .run_call(
                        ToolCallRequest {
                            id: call.id.clone(),
                            name: call.name.clone(),
                            arguments: call.arguments.clone(),
                        },
                        CallOrigin::Model,
                    )
                    .await;

                for injection in &report.injected {
                    conversation.push(ModelMessage::user_text(&injection.text));
                    let _ = events.send(LoopEvent::ContextInjected {
                        hook_id: injection.hook_id.clone(),
                        tool: injection.tool.clone(),
                        text: injection.text.clone(),
                    });
                }

                let (output, is_error) = match &report.result {
                    Ok(outcome) => (outcome.display_text.clone(), !outcome.success),
                    Err(e) => (e.to_string(), true),
                };
                conversation.push(tool_result_message(&call.id, &output, is_error));
                let _ = events.send(LoopEvent::ToolResult {
                    id: call.id,
                    output,
                    is_error,
                });
            }
        }

        conversation
    }

    fn abort_reason(&self) -> Option<String> {
        if self.services.abort.is_set() {
            return Some(
                self.services
                    .abort
                    .reason()
                    .unwrap_or_else(|| "aborted".to_string()),
            );
        }
        if self.services.run_flags.run_aborted() {
            return Some("run aborted by hook".to_string());
        }
        None
    }
}

/// Each tool result travels as its own user-role message.
fn tool_result_message(id: &str, output: &str, is_error: bool) -> ModelMessage {
    ModelMessage {
        role: Role::User,
        content: vec![Content::ToolResult {
            tool_use_id: id.to_string(),
            output: serde_json::Value::String(output.to_string()),
            is_error: Some(is_error),
        }],
    }
}
