//! IPC route handlers.
//!
//! Three endpoints: `/health`, `/list_tools`, and `/call_tool`. Every
//! call submitted here crosses the same broker pipeline as
//! model-initiated calls, so hooks, confirmation, and history apply
//! uniformly.

use std::collections::HashMap;

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use mantle_core::agent::strip_ansi;
use mantle_core::tools::{namespaced_tool, CallOrigin, ToolCallRequest, ToolDef};

use crate::error::AppError;
use crate::AppState;

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

#[derive(Serialize)]
pub struct ListToolsResponse {
    pub success: bool,
    pub servers: HashMap<String, Vec<ToolDef>>,
    pub total_servers: usize,
    pub total_tools: usize,
}

pub async fn list_tools(State(state): State<AppState>) -> Json<ListToolsResponse> {
    let catalog = state.broker.executor().catalog().await;

    let total_tools = catalog.iter().map(|s| s.tools.len()).sum();
    let servers: HashMap<String, Vec<ToolDef>> = catalog
        .into_iter()
        .map(|s| (s.server, s.tools))
        .collect();

    Json(ListToolsResponse {
        success: true,
        total_servers: servers.len(),
        total_tools,
        servers,
    })
}

pub async fn call_tool(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let server = body
        .get("server")
        .and_then(|v| v.as_str())
        .ok_or_else(|| AppError::BadRequest("missing required field: server".to_string()))?;
    let tool = body
        .get("tool")
        .and_then(|v| v.as_str())
        .ok_or_else(|| AppError::BadRequest("missing required field: tool".to_string()))?;
    let arguments = body.get("arguments").cloned().unwrap_or_else(|| json!({}));

    let name = namespaced_tool(server, tool);
    info!(tool = %name, "IPC call start");

    if state.abort.is_set() {
        return Ok(aborted_response(&name, &state));
    }

    let request = ToolCallRequest {
        id: uuid::Uuid::new_v4().to_string(),
        name: name.clone(),
        arguments,
    };
    let report = state.broker.run_call(request, CallOrigin::Ipc).await;

    if report.aborted {
        return Ok(aborted_response(&name, &state));
    }

    match report.result {
        Ok(outcome) if outcome.success => {
            info!(tool = %name, "IPC call end");
            Ok((
                StatusCode::OK,
                Json(json!({
                    "success": true,
                    "result": decode_result(&outcome.display_text),
                })),
            ))
        }
        Ok(outcome) => {
            info!(tool = %name, "IPC call end with tool failure");
            Ok((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "success": false,
                    "error": outcome.display_text,
                })),
            ))
        }
        Err(e) => {
            warn!(tool = %name, "IPC call end with error: {}", e);
            Ok((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "success": false,
                    "error": e.to_string(),
                })),
            ))
        }
    }
}

fn aborted_response(name: &str, state: &AppState) -> (StatusCode, Json<Value>) {
    let reason = state
        .abort
        .reason()
        .unwrap_or_else(|| "operation aborted".to_string());
    warn!(tool = %name, reason = %reason, "IPC call rejected, abort flag set");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "success": false,
            "error": format!("[ABORTED] {reason}"),
            "status": "aborted",
            "aborted": true,
        })),
    )
}

/// Successful text results are often JSON printed with terminal
/// colors; strip ANSI codes and decode when possible so IPC consumers
/// get structured data back.
fn decode_result(display_text: &str) -> Value {
    let cleaned = strip_ansi(display_text);
    match serde_json::from_str::<Value>(cleaned.trim()) {
        Ok(value) => value,
        Err(_) => Value::String(cleaned),
    }
}
