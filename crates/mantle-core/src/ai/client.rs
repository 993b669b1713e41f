//! Streaming model client.
//!
//! One client, one `stream_turn` entry point. The wire format is
//! selected by configuration; each format gets its own request builder
//! and its own normalization parser. Everything downstream of the
//! returned receiver is provider-agnostic.

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::ai::parsers::{AnthropicParser, OpenAiParser, SseParser};
use crate::ai::streaming::StreamEvent;
use crate::ai::types::{AiTool, Content, ModelMessage, Role};
use crate::error::ProviderError;

/// Provider wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ApiFormat {
    #[default]
    Anthropic,
    OpenAi,
}

/// Model client configuration.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub format: ApiFormat,
    pub base_url: String,
    pub model: String,
    pub max_tokens: usize,
}

/// Streaming model provider binding.
pub struct ModelClient {
    http: reqwest::Client,
    config: ModelConfig,
    api_key: String,
}

impl ModelClient {
    pub fn new(config: ModelConfig, api_key: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            api_key,
        }
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Stream one model turn. Returns a receiver of canonical events;
    /// transport failures after this point arrive as `StreamEvent::Error`.
    pub async fn stream_turn(
        &self,
        messages: &[ModelMessage],
        tools: &[AiTool],
        max_tokens: usize,
    ) -> Result<mpsc::UnboundedReceiver<StreamEvent>, ProviderError> {
        info!(
            model = %self.config.model,
            messages = messages.len(),
            tools = tools.len(),
            format = ?self.config.format,
            "Starting model turn"
        );

        match self.config.format {
            ApiFormat::Anthropic => self.stream_anthropic(messages, tools, max_tokens).await,
            ApiFormat::OpenAi => self.stream_openai(messages, tools, max_tokens).await,
        }
    }

    async fn stream_anthropic(
        &self,
        messages: &[ModelMessage],
        tools: &[AiTool],
        max_tokens: usize,
    ) -> Result<mpsc::UnboundedReceiver<StreamEvent>, ProviderError> {
        let url = format!("{}/v1/messages", self.config.base_url.trim_end_matches('/'));

        let (system, wire_messages) = convert_messages_anthropic(messages);
        let mut body = json!({
            "model": self.config.model,
            "messages": wire_messages,
            "max_tokens": max_tokens,
            "stream": true,
        });
        if !system.is_empty() {
            body["system"] = Value::String(system);
        }
        if !tools.is_empty() {
            let wire_tools: Vec<Value> = tools
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description,
                        "input_schema": t.input_schema,
                    })
                })
                .collect();
            body["tools"] = Value::Array(wire_tools);
        }

        let response = self
            .http
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await?;

        let response = ensure_success(response).await?;
        Ok(start_sse_stream(response, AnthropicParser::new(), "Anthropic"))
    }

    async fn stream_openai(
        &self,
        messages: &[ModelMessage],
        tools: &[AiTool],
        max_tokens: usize,
    ) -> Result<mpsc::UnboundedReceiver<StreamEvent>, ProviderError> {
        let url = format!(
            "{}/v1/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );

        let mut body = json!({
            "model": self.config.model,
            "messages": convert_messages_openai(messages),
            "max_tokens": max_tokens,
            "stream": true,
        });
        if !tools.is_empty() {
            let wire_tools: Vec<Value> = tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.input_schema,
                        }
                    })
                })
                .collect();
            body["tools"] = Value::Array(wire_tools);
        }

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let response = ensure_success(response).await?;
        Ok(start_sse_stream(response, OpenAiParser::new(), "OpenAI"))
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(ProviderError::Status {
        status: status.as_u16(),
        body,
    })
}

/// Spawn a task reading the SSE byte stream and feeding the parser.
///
/// Sends an explicit error event if the stream fails, so the receiver
/// never waits on a silently-dead channel.
fn start_sse_stream<P>(
    response: reqwest::Response,
    mut parser: P,
    label: &'static str,
) -> mpsc::UnboundedReceiver<StreamEvent>
where
    P: SseParser + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let mut stream = response.bytes_stream();
        let mut line_buffer = String::new();

        while let Some(chunk) = stream.next().await {
            let bytes = match chunk {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("{} stream read error: {}", label, e);
                    let _ = tx.send(StreamEvent::Error {
                        error: format!("{} stream read error: {}", label, e),
                    });
                    return;
                }
            };

            line_buffer.push_str(&String::from_utf8_lossy(&bytes));

            while let Some(newline) = line_buffer.find('\n') {
                let line: String = line_buffer.drain(..=newline).collect();
                let line = line.trim_end();

                let Some(data) = line.strip_prefix("data:") else {
                    continue;
                };
                let data = data.trim_start();
                if data.is_empty() {
                    continue;
                }

                if let Err(e) = parser.parse_data(data, &tx) {
                    debug!("{} skipping unparseable SSE payload: {}", label, e);
                }
            }
        }

        parser.finish(&tx);
    });

    rx
}

/// Split system text out and map the rest onto the Anthropic block
/// schema (which our `Content` serde tags already match).
fn convert_messages_anthropic(messages: &[ModelMessage]) -> (String, Vec<Value>) {
    let mut system = String::new();
    let mut wire = Vec::new();

    for message in messages {
        if message.role == Role::System {
            if let Some(text) = message.text() {
                if !system.is_empty() {
                    system.push_str("\n\n");
                }
                system.push_str(text);
            }
            continue;
        }

        let role = match message.role {
            Role::Assistant => "assistant",
            _ => "user",
        };
        let content = serde_json::to_value(&message.content).unwrap_or(Value::Array(Vec::new()));
        wire.push(json!({ "role": role, "content": content }));
    }

    (system, wire)
}

/// Flatten content blocks onto the OpenAI message schema: tool uses
/// become `tool_calls` on the assistant message, tool results become
/// dedicated `role: "tool"` messages.
fn convert_messages_openai(messages: &[ModelMessage]) -> Vec<Value> {
    let mut wire = Vec::new();

    for message in messages {
        match message.role {
            Role::System => {
                if let Some(text) = message.text() {
                    wire.push(json!({ "role": "system", "content": text }));
                }
            }
            Role::Assistant => {
                let mut text = String::new();
                let mut tool_calls = Vec::new();

                for block in &message.content {
                    match block {
                        Content::Text { text: t } => {
                            if !text.is_empty() {
                                text.push('\n');
                            }
                            text.push_str(t);
                        }
                        Content::ToolUse { id, name, input } => {
                            tool_calls.push(json!({
                                "id": id,
                                "type": "function",
                                "function": {
                                    "name": name,
                                    "arguments": input.to_string(),
                                }
                            }));
                        }
                        _ => {}
                    }
                }

                let mut msg = json!({ "role": "assistant" });
                msg["content"] = if text.is_empty() {
                    Value::Null
                } else {
                    Value::String(text)
                };
                if !tool_calls.is_empty() {
                    msg["tool_calls"] = Value::Array(tool_calls);
                }
                wire.push(msg);
            }
            Role::User | Role::Tool => {
                for block in &message.content {
                    match block {
                        Content::Text { text } => {
                            wire.push(json!({ "role": "user", "content": text }));
                        }
                        Content::ToolResult {
                            tool_use_id,
                            output,
                            ..
                        } => {
                            let content = match output {
                                Value::String(s) => s.clone(),
                                other => other.to_string(),
                            };
                            wire.push(json!({
                                "role": "tool",
                                "tool_call_id": tool_use_id,
                                "content": content,
                            }));
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    wire
}
