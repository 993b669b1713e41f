//! Tool execution seam.
//!
//! Tools live on named servers; a tool is addressed everywhere by its
//! namespaced form `server__tool`. The executor trait is the only
//! surface the rest of the crate sees, so transports (MCP, built-in,
//! test stubs) are interchangeable.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ToolError;

/// Separator between server name and tool name in a namespaced id.
pub const TOOL_NAMESPACE_SEPARATOR: &str = "__";

/// Build the namespaced form `server__tool`.
pub fn namespaced_tool(server: &str, tool: &str) -> String {
    format!("{server}{TOOL_NAMESPACE_SEPARATOR}{tool}")
}

/// Split a namespaced id at the first separator.
pub fn split_namespaced(name: &str) -> Option<(&str, &str)> {
    name.split_once(TOOL_NAMESPACE_SEPARATOR)
}

/// A tool as advertised by its server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDef {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: Value,
}

/// All tools of one server, for catalog listings.
#[derive(Debug, Clone, Serialize)]
pub struct ServerTools {
    pub server: String,
    pub tools: Vec<ToolDef>,
}

/// The result of a single tool execution.
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    /// Concatenated text content, for display and hook predicates.
    pub display_text: String,
    /// Raw content blocks as the server returned them.
    pub content: Vec<Value>,
    pub success: bool,
    /// Arguments the tool was actually invoked with.
    pub input: Value,
}

impl ToolOutcome {
    pub fn text(text: impl Into<String>, success: bool, input: Value) -> Self {
        let display_text = text.into();
        Self {
            content: vec![serde_json::json!({"type": "text", "text": display_text})],
            display_text,
            success,
            input,
        }
    }
}

/// A pending tool call, as decoded from a model turn or an IPC request.
#[derive(Debug, Clone)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// Transport-agnostic tool backend.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Execute a namespaced tool with the given arguments.
    async fn execute(&self, name: &str, arguments: &Value) -> Result<ToolOutcome, ToolError>;

    /// Every connected server with its advertised tools.
    async fn catalog(&self) -> Vec<ServerTools>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespacing_round_trips() {
        let name = namespaced_tool("fs", "read_file");
        assert_eq!(name, "fs__read_file");
        assert_eq!(split_namespaced(&name), Some(("fs", "read_file")));
    }

    #[test]
    fn split_uses_first_separator() {
        // Tool names may themselves contain double underscores.
        assert_eq!(split_namespaced("a__b__c"), Some(("a", "b__c")));
        assert_eq!(split_namespaced("plain"), None);
    }
}
