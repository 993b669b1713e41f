//! Collects one streamed model turn into text, thinking, and tool
//! calls, forwarding deltas to the loop's consumer as they arrive.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::warn;

use crate::agent::loop_events::LoopEvent;
use crate::ai::streaming::StreamEvent;
use crate::ai::types::AiToolCall;

/// An inactivity ceiling on the provider stream; a healthy stream sends
/// something well within this window.
const STREAM_IDLE_TIMEOUT: Duration = Duration::from_secs(120);

/// A tool call whose argument JSON did not parse.
#[derive(Debug, Clone)]
pub struct MalformedCall {
    pub id: String,
    pub name: String,
    pub error: String,
}

/// Everything the model produced in one turn.
#[derive(Debug, Default)]
pub struct StreamOutcome {
    pub text: String,
    pub thinking: String,
    pub tool_calls: Vec<AiToolCall>,
    pub malformed: Vec<MalformedCall>,
    /// Provider reported an error mid-stream.
    pub error: Option<String>,
}

struct OpenCall {
    name: String,
    args: String,
}

/// Drain the canonical event stream for one turn.
///
/// Tool argument fragments are buffered per call id and parsed when the
/// call ends; an empty argument buffer parses as `{}`. Calls finish in
/// the order they started.
pub async fn process_stream(
    mut rx: mpsc::UnboundedReceiver<StreamEvent>,
    events: &mpsc::UnboundedSender<LoopEvent>,
) -> StreamOutcome {
    let mut outcome = StreamOutcome::default();
    let mut open: HashMap<String, OpenCall> = HashMap::new();
    let mut order: Vec<String> = Vec::new();
    let mut finished: HashMap<String, AiToolCall> = HashMap::new();

    loop {
        let event = match tokio::time::timeout(STREAM_IDLE_TIMEOUT, rx.recv()).await {
            Ok(Some(event)) => event,
            Ok(None) => break,
            Err(_) => {
                warn!("Model stream idle for too long, abandoning turn");
                let error = "model stream timed out".to_string();
                let _ = events.send(LoopEvent::Error {
                    error: error.clone(),
                });
                outcome.error = Some(error);
                break;
            }
        };

        match event {
            StreamEvent::TextDelta { delta } => {
                outcome.text.push_str(&delta);
                let _ = events.send(LoopEvent::TextDelta { delta });
            }
            StreamEvent::ThinkingDelta { delta } => {
                outcome.thinking.push_str(&delta);
                let _ = events.send(LoopEvent::ThinkingDelta { delta });
            }
            StreamEvent::ToolCallStart { id, name } => {
                let _ = events.send(LoopEvent::ToolCallStart {
                    id: id.clone(),
                    name: name.clone(),
                });
                order.push(id.clone());
                open.insert(id, OpenCall {
                    name,
                    args: String::new(),
                });
            }
            StreamEvent::ToolCallArgDelta { id, delta } => {
                if let Some(call) = open.get_mut(&id) {
                    call.args.push_str(&delta);
                }
            }
            StreamEvent::ToolCallEnd { id } => {
                let Some(call) = open.remove(&id) else {
                    continue;
                };
                let raw = call.args.trim();
                let parsed: Result<Value, _> = if raw.is_empty() {
                    Ok(json!({}))
                } else {
                    serde_json::from_str(raw)
                };
                match parsed {
                    Ok(arguments) => {
                        let _ = events.send(LoopEvent::ToolCallComplete {
                            id: id.clone(),
                            name: call.name.clone(),
                            arguments: arguments.clone(),
                        });
                        finished.insert(
                            id.clone(),
                            AiToolCall {
                                id,
                                name: call.name,
                                arguments,
                            },
                        );
                    }
                    Err(e) => {
                        warn!(call_id = %id, tool = %call.name, "Malformed tool arguments: {}", e);
                        outcome.malformed.push(MalformedCall {
                            id,
                            name: call.name,
                            error: e.to_string(),
                        });
                    }
                }
            }
            StreamEvent::TurnEnd => break,
            StreamEvent::Error { error } => {
                let _ = events.send(LoopEvent::Error {
                    error: error.clone(),
                });
                outcome.error = Some(error);
                break;
            }
        }
    }

    // Emit completed calls in start order.
    for id in order {
        if let Some(call) = finished.remove(&id) {
            outcome.tool_calls.push(call);
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn run(events_in: Vec<StreamEvent>) -> (StreamOutcome, Vec<LoopEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        for event in events_in {
            tx.send(event).unwrap();
        }
        drop(tx);

        let (loop_tx, mut loop_rx) = mpsc::unbounded_channel();
        let outcome = process_stream(rx, &loop_tx).await;
        drop(loop_tx);

        let mut forwarded = Vec::new();
        while let Ok(e) = loop_rx.try_recv() {
            forwarded.push(e);
        }
        (outcome, forwarded)
    }

    #[tokio::test]
    async fn buffers_fragments_and_parses_on_end() {
        let (outcome, forwarded) = run(vec![
            StreamEvent::ToolCallStart {
                id: "c1".into(),
                name: "fs__read".into(),
            },
            StreamEvent::ToolCallArgDelta {
                id: "c1".into(),
                delta: "{\"path\":".into(),
            },
            StreamEvent::ToolCallArgDelta {
                id: "c1".into(),
                delta: "\"/x\"}".into(),
            },
            StreamEvent::ToolCallEnd { id: "c1".into() },
            StreamEvent::TurnEnd,
        ])
        .await;

        assert_eq!(outcome.tool_calls.len(), 1);
        assert_eq!(outcome.tool_calls[0].arguments, json!({"path": "/x"}));
        assert!(forwarded
            .iter()
            .any(|e| matches!(e, LoopEvent::ToolCallComplete { .. })));
    }

    #[tokio::test]
    async fn empty_arguments_parse_as_empty_object() {
        let (outcome, _) = run(vec![
            StreamEvent::ToolCallStart {
                id: "c1".into(),
                name: "t__noargs".into(),
            },
            StreamEvent::ToolCallEnd { id: "c1".into() },
            StreamEvent::TurnEnd,
        ])
        .await;

        assert_eq!(outcome.tool_calls[0].arguments, json!({}));
    }

    #[tokio::test]
    async fn malformed_arguments_are_reported_not_dropped() {
        let (outcome, _) = run(vec![
            StreamEvent::ToolCallStart {
                id: "c1".into(),
                name: "t__bad".into(),
            },
            StreamEvent::ToolCallArgDelta {
                id: "c1".into(),
                delta: "{not json".into(),
            },
            StreamEvent::ToolCallEnd { id: "c1".into() },
            StreamEvent::TurnEnd,
        ])
        .await;

        assert!(outcome.tool_calls.is_empty());
        assert_eq!(outcome.malformed.len(), 1);
        assert_eq!(outcome.malformed[0].name, "t__bad");
    }

    #[tokio::test]
    async fn calls_complete_in_start_order() {
        let (outcome, _) = run(vec![
            StreamEvent::ToolCallStart {
                id: "a".into(),
                name: "t__a".into(),
            },
            StreamEvent::ToolCallStart {
                id: "b".into(),
                name: "t__b".into(),
            },
            // b finishes first on the wire.
            StreamEvent::ToolCallEnd { id: "b".into() },
            StreamEvent::ToolCallEnd { id: "a".into() },
            StreamEvent::TurnEnd,
        ])
        .await;

        let names: Vec<_> = outcome.tool_calls.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["t__a", "t__b"]);
    }

    #[tokio::test]
    async fn text_and_thinking_accumulate() {
        let (outcome, _) = run(vec![
            StreamEvent::ThinkingDelta { delta: "hm".into() },
            StreamEvent::TextDelta { delta: "hel".into() },
            StreamEvent::TextDelta { delta: "lo".into() },
            StreamEvent::TurnEnd,
        ])
        .await;

        assert_eq!(outcome.text, "hello");
        assert_eq!(outcome.thinking, "hm");
    }

    #[tokio::test]
    async fn provider_error_ends_the_turn() {
        let (outcome, forwarded) = run(vec![
            StreamEvent::TextDelta { delta: "par".into() },
            StreamEvent::Error {
                error: "overloaded".into(),
            },
        ])
        .await;

        assert_eq!(outcome.error.as_deref(), Some("overloaded"));
        assert!(forwarded
            .iter()
            .any(|e| matches!(e, LoopEvent::Error { .. })));
    }
}
