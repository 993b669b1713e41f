//! Hook run-directive grammar.
//!
//! A hook's `run` field holds exactly one directive:
//!
//! - `@complete-phase` or `@complete-phase:NAME` — mark the (named)
//!   phase complete
//! - `@abort` — abort the whole run
//! - `@tool:NAME ARGS` — invoke a tool, inject its output as context
//! - `@tool-exec:NAME ARGS` — invoke a tool, discard its output
//!
//! ARGS is either a JSON object (`@tool:fs__read {"path": "/x"}`) or a
//! call expression (`@tool:fs__read(path='/x', lines=10)`). Call
//! expressions support quoted strings, numbers, booleans, and null;
//! no nested structures.

use serde_json::{Map, Value};
use thiserror::Error;

/// One parsed hook directive.
#[derive(Debug, Clone, PartialEq)]
pub enum HookDirective {
    CompletePhase { phase: Option<String> },
    AbortRun,
    Invoke(ToolInvocation),
}

/// A tool invocation requested by a hook.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub tool: String,
    pub args: Value,
    /// Whether the tool's output is injected into the conversation.
    pub inject: bool,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DirectiveError {
    #[error("unrecognized directive: {0}")]
    Unrecognized(String),
    #[error("directive has no tool name")]
    MissingTool,
    #[error("invalid JSON arguments: {0}")]
    BadJson(String),
    #[error("invalid call expression: {0}")]
    BadCallExpr(String),
}

/// Parse a raw `run` string into a directive.
pub fn parse_directive(raw: &str) -> Result<HookDirective, DirectiveError> {
    let raw = raw.trim();

    if raw == "@abort" {
        return Ok(HookDirective::AbortRun);
    }

    if raw == "@complete-phase" {
        return Ok(HookDirective::CompletePhase { phase: None });
    }
    if let Some(phase) = raw.strip_prefix("@complete-phase:") {
        let phase = phase.trim();
        if phase.is_empty() {
            return Ok(HookDirective::CompletePhase { phase: None });
        }
        return Ok(HookDirective::CompletePhase {
            phase: Some(phase.to_string()),
        });
    }

    if let Some(rest) = raw.strip_prefix("@tool:") {
        return parse_invocation(rest, true).map(HookDirective::Invoke);
    }
    if let Some(rest) = raw.strip_prefix("@tool-exec:") {
        return parse_invocation(rest, false).map(HookDirective::Invoke);
    }

    Err(DirectiveError::Unrecognized(raw.to_string()))
}

fn parse_invocation(rest: &str, inject: bool) -> Result<ToolInvocation, DirectiveError> {
    let rest = rest.trim();
    if rest.is_empty() {
        return Err(DirectiveError::MissingTool);
    }

    // Call-expression form: NAME(args...)
    if let Some(open) = rest.find('(') {
        let looks_like_call = rest.ends_with(')')
            && !rest[..open].contains(char::is_whitespace)
            && !rest[..open].is_empty();
        if looks_like_call {
            let tool = rest[..open].to_string();
            let inner = &rest[open + 1..rest.len() - 1];
            let args = parse_call_args(inner)?;
            return Ok(ToolInvocation { tool, args, inject });
        }
    }

    // JSON form: NAME {json object}, or bare NAME with no args.
    match rest.split_once(char::is_whitespace) {
        None => Ok(ToolInvocation {
            tool: rest.to_string(),
            args: Value::Object(Map::new()),
            inject,
        }),
        Some((tool, json_part)) => {
            let json_part = json_part.trim();
            let args: Value = serde_json::from_str(json_part)
                .map_err(|e| DirectiveError::BadJson(e.to_string()))?;
            if !args.is_object() {
                return Err(DirectiveError::BadJson(
                    "arguments must be a JSON object".to_string(),
                ));
            }
            Ok(ToolInvocation {
                tool: tool.to_string(),
                args,
                inject,
            })
        }
    }
}

/// Parse `key=value, key=value` argument lists. Values split on commas
/// outside quotes only, so quoted strings may contain commas.
fn parse_call_args(inner: &str) -> Result<Value, DirectiveError> {
    let mut args = Map::new();
    if inner.trim().is_empty() {
        return Ok(Value::Object(args));
    }

    for pair in split_outside_quotes(inner) {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        let Some((key, value)) = pair.split_once('=') else {
            return Err(DirectiveError::BadCallExpr(format!(
                "expected key=value, got '{pair}'"
            )));
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(DirectiveError::BadCallExpr(format!(
                "empty key in '{pair}'"
            )));
        }
        args.insert(key.to_string(), parse_scalar(value.trim())?);
    }

    Ok(Value::Object(args))
}

fn split_outside_quotes(input: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for c in input.chars() {
        match quote {
            Some(q) => {
                current.push(c);
                if c == q {
                    quote = None;
                }
            }
            None => match c {
                '\'' | '"' => {
                    quote = Some(c);
                    current.push(c);
                }
                ',' => {
                    parts.push(std::mem::take(&mut current));
                }
                _ => current.push(c),
            },
        }
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

fn parse_scalar(raw: &str) -> Result<Value, DirectiveError> {
    if raw.len() >= 2 {
        let first = raw.chars().next().unwrap_or_default();
        if (first == '\'' || first == '"') && raw.ends_with(first) {
            return Ok(Value::String(raw[1..raw.len() - 1].to_string()));
        }
    }

    match raw {
        "true" => return Ok(Value::Bool(true)),
        "false" => return Ok(Value::Bool(false)),
        "null" => return Ok(Value::Null),
        _ => {}
    }

    if let Ok(n) = raw.parse::<i64>() {
        return Ok(Value::Number(n.into()));
    }
    if let Ok(f) = raw.parse::<f64>() {
        if let Some(n) = serde_json::Number::from_f64(f) {
            return Ok(Value::Number(n));
        }
    }

    Err(DirectiveError::BadCallExpr(format!(
        "unparseable value '{raw}'"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn complete_phase_with_and_without_scope() {
        assert_eq!(
            parse_directive("@complete-phase"),
            Ok(HookDirective::CompletePhase { phase: None })
        );
        assert_eq!(
            parse_directive("@complete-phase:review"),
            Ok(HookDirective::CompletePhase {
                phase: Some("review".into())
            })
        );
    }

    #[test]
    fn abort_directive() {
        assert_eq!(parse_directive("@abort"), Ok(HookDirective::AbortRun));
    }

    #[test]
    fn tool_with_json_args_injects() {
        let parsed = parse_directive(r#"@tool:fs__read {"path": "/etc/hosts"}"#).unwrap();
        assert_eq!(
            parsed,
            HookDirective::Invoke(ToolInvocation {
                tool: "fs__read".into(),
                args: json!({"path": "/etc/hosts"}),
                inject: true,
            })
        );
    }

    #[test]
    fn tool_exec_does_not_inject() {
        let parsed = parse_directive("@tool-exec:srv__tick {}").unwrap();
        assert_eq!(
            parsed,
            HookDirective::Invoke(ToolInvocation {
                tool: "srv__tick".into(),
                args: json!({}),
                inject: false,
            })
        );
    }

    #[test]
    fn call_expression_with_quoted_comma() {
        let parsed = parse_directive("@tool:srv__tool(x=1, y='a,b')").unwrap();
        assert_eq!(
            parsed,
            HookDirective::Invoke(ToolInvocation {
                tool: "srv__tool".into(),
                args: json!({"x": 1, "y": "a,b"}),
                inject: true,
            })
        );
    }

    #[test]
    fn call_expression_scalar_types() {
        let parsed =
            parse_directive(r#"@tool:s__t(a=true, b=null, c=2.5, d="hi")"#).unwrap();
        assert_eq!(
            parsed,
            HookDirective::Invoke(ToolInvocation {
                tool: "s__t".into(),
                args: json!({"a": true, "b": null, "c": 2.5, "d": "hi"}),
                inject: true,
            })
        );
    }

    #[test]
    fn bare_tool_gets_empty_args() {
        let parsed = parse_directive("@tool-exec:srv__noargs").unwrap();
        assert_eq!(
            parsed,
            HookDirective::Invoke(ToolInvocation {
                tool: "srv__noargs".into(),
                args: json!({}),
                inject: false,
            })
        );
    }

    #[test]
    fn malformed_inputs_error() {
        assert!(matches!(
            parse_directive("@wat"),
            Err(DirectiveError::Unrecognized(_))
        ));
        assert!(matches!(
            parse_directive("@tool:"),
            Err(DirectiveError::MissingTool)
        ));
        assert!(matches!(
            parse_directive("@tool:x [1,2]"),
            Err(DirectiveError::BadJson(_))
        ));
        assert!(matches!(
            parse_directive("@tool:x(no_equals)"),
            Err(DirectiveError::BadCallExpr(_))
        ));
    }
}
