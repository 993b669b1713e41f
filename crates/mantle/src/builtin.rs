//! Built-in local tool server.
//!
//! Gives the session a usable tool catalog without any external tool
//! servers configured: a handful of small utilities under the `local`
//! namespace.

use async_trait::async_trait;
use serde_json::{json, Value};

use mantle_core::error::ToolError;
use mantle_core::tools::executor::{
    split_namespaced, ServerTools, ToolDef, ToolExecutor, ToolOutcome,
};

const SERVER: &str = "local";

pub struct BuiltinExecutor;

#[async_trait]
impl ToolExecutor for BuiltinExecutor {
    async fn execute(&self, name: &str, arguments: &Value) -> Result<ToolOutcome, ToolError> {
        let Some((SERVER, tool)) = split_namespaced(name) else {
            return Err(ToolError::UnknownTool(name.to_string()));
        };

        match tool {
            "echo" => {
                let text = arguments
                    .get("text")
                    .and_then(|t| t.as_str())
                    .unwrap_or_default();
                Ok(ToolOutcome::text(text, true, arguments.clone()))
            }
            "now" => {
                let now = chrono::Utc::now().to_rfc3339();
                Ok(ToolOutcome::text(
                    json!({"utc": now}).to_string(),
                    true,
                    arguments.clone(),
                ))
            }
            _ => Err(ToolError::UnknownTool(name.to_string())),
        }
    }

    async fn catalog(&self) -> Vec<ServerTools> {
        vec![ServerTools {
            server: SERVER.to_string(),
            tools: vec![
                ToolDef {
                    name: "echo".into(),
                    description: Some("Echo back the provided text".into()),
                    input_schema: json!({
                        "type": "object",
                        "properties": {
                            "text": {"type": "string"}
                        },
                        "required": ["text"]
                    }),
                },
                ToolDef {
                    name: "now".into(),
                    description: Some("Current UTC time as RFC 3339".into()),
                    input_schema: json!({"type": "object", "properties": {}}),
                },
            ],
        }]
    }
}
