//! Anthropic Messages API stream normalization.
//!
//! Anthropic streams indexed content blocks: `content_block_start`
//! opens a block, `content_block_delta` carries text/thinking/JSON
//! fragments, `content_block_stop` closes it. Tool arguments arrive as
//! `input_json_delta` fragments that are only parseable once the block
//! stops.

use std::collections::HashMap;

use serde_json::Value;
use tokio::sync::mpsc;

use super::SseParser;
use crate::ai::streaming::StreamEvent;

#[derive(Default)]
pub struct AnthropicParser {
    /// Block index -> tool call id, for blocks of type `tool_use`.
    tool_blocks: HashMap<u64, String>,
    turn_ended: bool,
}

impl AnthropicParser {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SseParser for AnthropicParser {
    fn parse_data(
        &mut self,
        data: &str,
        tx: &mpsc::UnboundedSender<StreamEvent>,
    ) -> anyhow::Result<()> {
        let event: Value = serde_json::from_str(data)?;
        let event_type = event.get("type").and_then(|t| t.as_str()).unwrap_or("");

        match event_type {
            "content_block_start" => {
                let index = event.get("index").and_then(|i| i.as_u64()).unwrap_or(0);
                let block = event.get("content_block");
                let block_type = block
                    .and_then(|b| b.get("type"))
                    .and_then(|t| t.as_str())
                    .unwrap_or("");

                if block_type == "tool_use" {
                    let id = block
                        .and_then(|b| b.get("id"))
                        .and_then(|i| i.as_str())
                        .unwrap_or_default()
                        .to_string();
                    let name = block
                        .and_then(|b| b.get("name"))
                        .and_then(|n| n.as_str())
                        .unwrap_or_default()
                        .to_string();

                    self.tool_blocks.insert(index, id.clone());
                    let _ = tx.send(StreamEvent::ToolCallStart { id, name });
                }
            }
            "content_block_delta" => {
                let index = event.get("index").and_then(|i| i.as_u64()).unwrap_or(0);
                let delta = event.get("delta");
                let delta_type = delta
                    .and_then(|d| d.get("type"))
                    .and_then(|t| t.as_str())
                    .unwrap_or("");

                match delta_type {
                    "text_delta" => {
                        if let Some(text) = delta.and_then(|d| d.get("text")).and_then(|t| t.as_str())
                        {
                            let _ = tx.send(StreamEvent::TextDelta {
                                delta: text.to_string(),
                            });
                        }
                    }
                    "thinking_delta" => {
                        if let Some(text) = delta
                            .and_then(|d| d.get("thinking"))
                            .and_then(|t| t.as_str())
                        {
                            let _ = tx.send(StreamEvent::ThinkingDelta {
                                delta: text.to_string(),
                            });
                        }
                    }
                    "input_json_delta" => {
                        if let Some(id) = self.tool_blocks.get(&index) {
                            let fragment = delta
                                .and_then(|d| d.get("partial_json"))
                                .and_then(|p| p.as_str())
                                .unwrap_or_default();
                            let _ = tx.send(StreamEvent::ToolCallArgDelta {
                                id: id.clone(),
                                delta: fragment.to_string(),
                            });
                        }
                    }
                    _ => {}
                }
            }
            "content_block_stop" => {
                let index = event.get("index").and_then(|i| i.as_u64()).unwrap_or(0);
                if let Some(id) = self.tool_blocks.remove(&index) {
                    let _ = tx.send(StreamEvent::ToolCallEnd { id });
                }
            }
            "message_stop" => {
                self.turn_ended = true;
                let _ = tx.send(StreamEvent::TurnEnd);
            }
            "error" => {
                let message = event
                    .pointer("/error/message")
                    .and_then(|m| m.as_str())
                    .unwrap_or("unknown provider error");
                let _ = tx.send(StreamEvent::Error {
                    error: message.to_string(),
                });
            }
            // message_start, message_delta, ping: nothing to normalize
            _ => {}
        }

        Ok(())
    }

    fn finish(&mut self, tx: &mpsc::UnboundedSender<StreamEvent>) {
        if !self.turn_ended {
            let _ = tx.send(StreamEvent::TurnEnd);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(events: &[&str]) -> Vec<StreamEvent> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut parser = AnthropicParser::new();
        for data in events {
            parser.parse_data(data, &tx).unwrap();
        }
        parser.finish(&tx);
        drop(tx);

        let mut out = Vec::new();
        while let Ok(e) = rx.try_recv() {
            out.push(e);
        }
        out
    }

    #[test]
    fn tool_use_block_produces_start_deltas_end() {
        let events = collect(&[
            r#"{"type":"content_block_start","index":0,"content_block":{"type":"tool_use","id":"tu_1","name":"fs__read"}}"#,
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"input_json_delta","partial_json":"{\"path\":"}}"#,
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"input_json_delta","partial_json":"\"/tmp\"}"}}"#,
            r#"{"type":"content_block_stop","index":0}"#,
            r#"{"type":"message_stop"}"#,
        ]);

        assert_eq!(
            events,
            vec![
                StreamEvent::ToolCallStart {
                    id: "tu_1".into(),
                    name: "fs__read".into()
                },
                StreamEvent::ToolCallArgDelta {
                    id: "tu_1".into(),
                    delta: "{\"path\":".into()
                },
                StreamEvent::ToolCallArgDelta {
                    id: "tu_1".into(),
                    delta: "\"/tmp\"}".into()
                },
                StreamEvent::ToolCallEnd { id: "tu_1".into() },
                StreamEvent::TurnEnd,
            ]
        );
    }

    #[test]
    fn text_deltas_pass_through() {
        let events = collect(&[
            r#"{"type":"content_block_start","index":0,"content_block":{"type":"text"}}"#,
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"hel"}}"#,
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"lo"}}"#,
        ]);

        assert_eq!(
            events,
            vec![
                StreamEvent::TextDelta { delta: "hel".into() },
                StreamEvent::TextDelta { delta: "lo".into() },
                StreamEvent::TurnEnd,
            ]
        );
    }

    #[test]
    fn stream_without_stop_frame_gets_turn_end_on_finish() {
        let events = collect(&[
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"hi"}}"#,
        ]);
        assert_eq!(events.last(), Some(&StreamEvent::TurnEnd));
    }
}
