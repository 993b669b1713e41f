//! Model provider layer: unified types, canonical streaming events,
//! and one normalization parser per backend.

pub mod client;
pub mod parsers;
pub mod streaming;
pub mod types;

pub use client::{ApiFormat, ModelClient, ModelConfig};
pub use streaming::StreamEvent;
pub use types::{AiTool, AiToolCall, Content, ModelMessage, Role};
