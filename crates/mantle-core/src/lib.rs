//! Core engine for the mantle agent client: model streaming, the agent
//! loop, hook automation, and the tool execution pipeline shared by
//! every call origin.

pub mod agent;
pub mod ai;
pub mod config;
pub mod error;
pub mod history;
pub mod tools;

pub use agent::{AbortHandle, AgentLoop, LoopConfig, LoopEvent, LoopServices, RunFlags};
pub use config::Preferences;
pub use error::{ElicitError, ProviderError, ToolError};
pub use tools::{ToolBroker, ToolExecutor};
