//! SSE parser implementations for different model providers.
//!
//! One parser per backend; each turns provider-specific SSE payloads
//! into the canonical `StreamEvent` vocabulary.

mod anthropic;
mod openai;

pub use anthropic::AnthropicParser;
pub use openai::OpenAiParser;

use tokio::sync::mpsc;

use crate::ai::streaming::StreamEvent;

/// A stateful normalization adapter for one provider's SSE dialect.
pub trait SseParser: Send {
    /// Handle one SSE `data:` payload, emitting canonical events.
    fn parse_data(
        &mut self,
        data: &str,
        tx: &mpsc::UnboundedSender<StreamEvent>,
    ) -> anyhow::Result<()>;

    /// Called once the byte stream ends. Emits any trailing events
    /// (e.g. a `TurnEnd` for providers without an explicit stop frame).
    fn finish(&mut self, tx: &mpsc::UnboundedSender<StreamEvent>);
}
