//! Tool layer: the executor seam and the broker pipeline around it.

pub mod broker;
pub mod executor;

pub use broker::{CallOrigin, CallReport, ToolBroker};
pub use executor::{
    namespaced_tool, split_namespaced, ServerTools, ToolCallRequest, ToolDef, ToolExecutor,
    ToolOutcome, TOOL_NAMESPACE_SEPARATOR,
};
