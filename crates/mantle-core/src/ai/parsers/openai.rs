//! OpenAI chat-completions stream normalization.
//!
//! OpenAI fragments tool calls across chunks keyed by array index: the
//! first fragment carries id and function name, later fragments append
//! to `function.arguments`. Several calls can be open at once. The
//! stream signals completion with a `finish_reason` on the final chunk
//! and a literal `[DONE]` sentinel.

use std::collections::HashMap;

use serde_json::Value;
use tokio::sync::mpsc;

use super::SseParser;
use crate::ai::streaming::StreamEvent;

#[derive(Default)]
pub struct OpenAiParser {
    /// Tool-call array index -> call id, in order of first appearance.
    open_calls: HashMap<u64, String>,
    open_order: Vec<u64>,
    turn_ended: bool,
}

impl OpenAiParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Close every open call in first-seen order, then end the turn.
    fn close_turn(&mut self, tx: &mpsc::UnboundedSender<StreamEvent>) {
        if self.turn_ended {
            return;
        }
        self.turn_ended = true;

        for index in self.open_order.drain(..) {
            if let Some(id) = self.open_calls.remove(&index) {
                let _ = tx.send(StreamEvent::ToolCallEnd { id });
            }
        }
        let _ = tx.send(StreamEvent::TurnEnd);
    }
}

impl SseParser for OpenAiParser {
    fn parse_data(
        &mut self,
        data: &str,
        tx: &mpsc::UnboundedSender<StreamEvent>,
    ) -> anyhow::Result<()> {
        if data.trim() == "[DONE]" {
            self.close_turn(tx);
            return Ok(());
        }

        let chunk: Value = serde_json::from_str(data)?;

        if let Some(error) = chunk.get("error") {
            let message = error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown provider error");
            let _ = tx.send(StreamEvent::Error {
                error: message.to_string(),
            });
            return Ok(());
        }

        let Some(choice) = chunk
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
        else {
            return Ok(());
        };

        if let Some(delta) = choice.get("delta") {
            if let Some(text) = delta.get("content").and_then(|c| c.as_str()) {
                if !text.is_empty() {
                    let _ = tx.send(StreamEvent::TextDelta {
                        delta: text.to_string(),
                    });
                }
            }

            if let Some(text) = delta.get("reasoning_content").and_then(|c| c.as_str()) {
                if !text.is_empty() {
                    let _ = tx.send(StreamEvent::ThinkingDelta {
                        delta: text.to_string(),
                    });
                }
            }

            if let Some(calls) = delta.get("tool_calls").and_then(|t| t.as_array()) {
                for call in calls {
                    let index = call.get("index").and_then(|i| i.as_u64()).unwrap_or(0);

                    if !self.open_calls.contains_key(&index) {
                        let id = call
                            .get("id")
                            .and_then(|i| i.as_str())
                            .map(ToString::to_string)
                            .unwrap_or_else(|| format!("call-{}", index));
                        let name = call
                            .pointer("/function/name")
                            .and_then(|n| n.as_str())
                            .unwrap_or_default()
                            .to_string();

                        self.open_calls.insert(index, id.clone());
                        self.open_order.push(index);
                        let _ = tx.send(StreamEvent::ToolCallStart { id, name });
                    }

                    if let Some(fragment) =
                        call.pointer("/function/arguments").and_then(|a| a.as_str())
                    {
                        if !fragment.is_empty() {
                            if let Some(id) = self.open_calls.get(&index) {
                                let _ = tx.send(StreamEvent::ToolCallArgDelta {
                                    id: id.clone(),
                                    delta: fragment.to_string(),
                                });
                            }
                        }
                    }
                }
            }
        }

        if choice
            .get("finish_reason")
            .and_then(|f| f.as_str())
            .is_some()
        {
            self.close_turn(tx);
        }

        Ok(())
    }

    fn finish(&mut self, tx: &mpsc::UnboundedSender<StreamEvent>) {
        self.close_turn(tx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(events: &[&str]) -> Vec<StreamEvent> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut parser = OpenAiParser::new();
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
    fn fragmented_tool_call_closes_on_finish_reason() {
        let events = collect(&[
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_a","function":{"name":"db__query","arguments":""}}]}}]}"#,
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"q\":\"x\"}"}}]}}]}"#,
            r#"{"choices":[{"delta":{},"finish_reason":"tool_calls"}]}"#,
            "[DONE]",
        ]);

        assert_eq!(
            events,
            vec![
                StreamEvent::ToolCallStart {
                    id: "call_a".into(),
                    name: "db__query".into()
                },
                StreamEvent::ToolCallArgDelta {
                    id: "call_a".into(),
                    delta: "{\"q\":\"x\"}".into()
                },
                StreamEvent::ToolCallEnd { id: "call_a".into() },
                StreamEvent::TurnEnd,
            ]
        );
    }

    #[test]
    fn two_simultaneous_calls_close_in_first_seen_order() {
        let events = collect(&[
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"c0","function":{"name":"a__x","arguments":"{}"}},{"index":1,"id":"c1","function":{"name":"b__y","arguments":"{}"}}]}}]}"#,
            r#"{"choices":[{"delta":{},"finish_reason":"tool_calls"}]}"#,
        ]);

        let ends: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::ToolCallEnd { id } => Some(id.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(ends, vec!["c0".to_string(), "c1".to_string()]);
        assert_eq!(events.last(), Some(&StreamEvent::TurnEnd));
    }

    #[test]
    fn plain_text_turn() {
        let events = collect(&[
            r#"{"choices":[{"delta":{"content":"hello"}}]}"#,
            r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#,
            "[DONE]",
        ]);
        assert_eq!(
            events,
            vec![
                StreamEvent::TextDelta {
                    delta: "hello".into()
                },
                StreamEvent::TurnEnd,
            ]
        );
    }
}
