//! Elicitation bridge: schema-driven interactive forms.
//!
//! A tool server can ask the user for structured input mid-call. The
//! bridge renders each field as a terminal prompt, validates answers
//! against the field schema, and resolves to accept, decline, or
//! cancel. At most one elicitation is pending per session; a newer
//! request or a tool timeout cancels the pending one.
//!
//! Once the active phase is marked complete the bridge stops asking and
//! auto-declines, so completed runs never block on a forgotten prompt.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::agent::approval::Prompter;
use crate::agent::cancel::RunFlags;
use crate::error::ElicitError;
use crate::history::{ElicitationAction, HistoryLogger};

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("static regex"));

// ── Field schema ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StringFormat {
    Email,
    Uri,
    Date,
    DateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnumOption {
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    String {
        #[serde(default)]
        min_len: Option<usize>,
        #[serde(default)]
        max_len: Option<usize>,
        #[serde(default)]
        format: Option<StringFormat>,
    },
    Number {
        #[serde(default)]
        integer: bool,
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
    },
    Boolean,
    Enum {
        options: Vec<EnumOption>,
    },
    EnumArray {
        options: Vec<EnumOption>,
        #[serde(default)]
        min_items: Option<usize>,
        #[serde(default)]
        max_items: Option<usize>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(flatten)]
    pub kind: FieldKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElicitRequest {
    /// Server-provided message shown before the form.
    pub message: String,
    pub fields: Vec<FieldSpec>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ElicitResolution {
    Accept(Map<String, Value>),
    Decline,
    Cancelled { reason: String },
}

// ── Bridge ───────────────────────────────────────────────────────────

pub struct ElicitationBridge {
    prompter: Arc<dyn Prompter>,
    history: Arc<dyn HistoryLogger>,
    run_flags: RunFlags,
    pending: tokio::sync::Mutex<Option<CancellationToken>>,
    cancel_reason: parking_lot::Mutex<Option<String>>,
}

impl ElicitationBridge {
    pub fn new(
        prompter: Arc<dyn Prompter>,
        history: Arc<dyn HistoryLogger>,
        run_flags: RunFlags,
    ) -> Self {
        Self {
            prompter,
            history,
            run_flags,
            pending: tokio::sync::Mutex::new(None),
            cancel_reason: parking_lot::Mutex::new(None),
        }
    }

    /// Resolve one elicitation request end to end.
    pub async fn elicit(&self, request: &ElicitRequest) -> Result<ElicitResolution, ElicitError> {
        let token = CancellationToken::new();
        {
            let mut pending = self.pending.lock().await;
            if let Some(previous) = pending.take() {
                warn!("New elicitation supersedes a pending one");
                *self.cancel_reason.lock() = Some("superseded by newer elicitation".to_string());
                previous.cancel();
            }
            *pending = Some(token.clone());
        }

        let resolution = if self.run_flags.phase_complete() {
            let action = if self.cancel_reason.lock().take().is_some() {
                ElicitationAction::AutoDeclineCancelled
            } else {
                ElicitationAction::AutoDecline
            };
            info!(message = %request.message, "Auto-declining elicitation, phase already complete");
            self.history
                .add_elicitation_event(action, Some(&request.message), None)
                .await;
            Ok(ElicitResolution::Decline)
        } else {
            tokio::select! {
                _ = token.cancelled() => {
                    let reason = self
                        .cancel_reason
                        .lock()
                        .take()
                        .unwrap_or_else(|| "cancelled".to_string());
                    self.history
                        .add_elicitation_event(
                            ElicitationAction::Cancel,
                            Some(&request.message),
                            Some(&reason),
                        )
                        .await;
                    Ok(ElicitResolution::Cancelled { reason })
                }
                result = self.collect(request) => {
                    match &result {
                        Ok(ElicitResolution::Accept(_)) => {
                            self.history
                                .add_elicitation_event(
                                    ElicitationAction::Accept,
                                    Some(&request.message),
                                    None,
                                )
                                .await;
                        }
                        Ok(ElicitResolution::Decline) => {
                            self.history
                                .add_elicitation_event(
                                    ElicitationAction::Decline,
                                    Some(&request.message),
                                    None,
                                )
                                .await;
                        }
                        Ok(ElicitResolution::Cancelled { reason }) => {
                            self.history
                                .add_elicitation_event(
                                    ElicitationAction::Cancel,
                                    Some(&request.message),
                                    Some(reason),
                                )
                                .await;
                        }
                        Err(_) => {}
                    }
                    result
                }
            }
        };

        self.pending.lock().await.take();
        resolution
    }

    /// Cancel the pending elicitation, if any.
    pub async fn cancel_pending(&self, reason: &str) {
        let pending = self.pending.lock().await;
        if let Some(token) = pending.as_ref() {
            info!(reason = %reason, "Cancelling pending elicitation");
            *self.cancel_reason.lock() = Some(reason.to_string());
            token.cancel();
        }
    }

    async fn collect(&self, request: &ElicitRequest) -> Result<ElicitResolution, ElicitError> {
        let mut values = Map::new();

        for field in &request.fields {
            let mut prompt_text = render_prompt(&request.message, field);
            loop {
                let answer = self
                    .prompter
                    .prompt(&prompt_text)
                    .await
                    .map_err(|e| ElicitError::Io(e.to_string()))?;
                let answer = answer.trim().to_string();

                match answer.as_str() {
                    "/decline" => return Ok(ElicitResolution::Decline),
                    "/cancel" => {
                        return Ok(ElicitResolution::Cancelled {
                            reason: "cancelled by user".to_string(),
                        })
                    }
                    _ => {}
                }

                if answer.is_empty() {
                    if let Some(default) = &field.default {
                        values.insert(field.name.clone(), default.clone());
                        break;
                    }
                    if !field.required {
                        break;
                    }
                    // Required, no default: ask again.
                    continue;
                }

                match validate_answer(field, &answer) {
                    Ok(value) => {
                        values.insert(field.name.clone(), value);
                        break;
                    }
                    Err(problem) => {
                        // The retry reads from this prompt directly, so
                        // the user's next line is the next answer.
                        prompt_text = format!("Invalid value ({problem}), try again: ");
                    }
                }
            }
        }

        Ok(ElicitResolution::Accept(values))
    }
}

fn render_prompt(message: &str, field: &FieldSpec) -> String {
    let mut prompt = format!("{message}\n{}", field.name);
    if let Some(description) = &field.description {
        prompt.push_str(&format!(" ({description})"));
    }
    match &field.kind {
        FieldKind::Enum { options } | FieldKind::EnumArray { options, .. } => {
            prompt.push('\n');
            for (i, option) in options.iter().enumerate() {
                let label = option.title.as_deref().unwrap_or(&option.value);
                prompt.push_str(&format!("  {}. {}\n", i + 1, label));
            }
        }
        _ => {}
    }
    if let Some(default) = &field.default {
        prompt.push_str(&format!(" [default: {default}]"));
    }
    prompt.push_str(": ");
    prompt
}

/// Validate one raw answer against a field schema.
fn validate_answer(field: &FieldSpec, answer: &str) -> Result<Value, String> {
    match &field.kind {
        FieldKind::String {
            min_len,
            max_len,
            format,
        } => {
            if let Some(min) = min_len {
                if answer.chars().count() < *min {
                    return Err(format!("at least {min} characters required"));
                }
            }
            if let Some(max) = max_len {
                if answer.chars().count() > *max {
                    return Err(format!("at most {max} characters allowed"));
                }
            }
            if let Some(format) = format {
                validate_format(*format, answer)?;
            }
            Ok(Value::String(answer.to_string()))
        }
        FieldKind::Number { integer, min, max } => {
            let parsed = answer
                .parse::<f64>()
                .map_err(|_| "not a number".to_string())?;
            if *integer && parsed.fract() != 0.0 {
                return Err("an integer is required".to_string());
            }
            if let Some(min) = min {
                if parsed < *min {
                    return Err(format!("must be >= {min}"));
                }
            }
            if let Some(max) = max {
                if parsed > *max {
                    return Err(format!("must be <= {max}"));
                }
            }
            if *integer {
                Ok(Value::Number((parsed as i64).into()))
            } else {
                serde_json::Number::from_f64(parsed)
                    .map(Value::Number)
                    .ok_or_else(|| "not a finite number".to_string())
            }
        }
        FieldKind::Boolean => match answer.to_lowercase().as_str() {
            "y" | "yes" | "true" | "1" => Ok(Value::Bool(true)),
            "n" | "no" | "false" | "0" => Ok(Value::Bool(false)),
            _ => Err("expected yes or no".to_string()),
        },
        FieldKind::Enum { options } => {
            resolve_option(options, answer).map(Value::String)
        }
        FieldKind::EnumArray {
            options,
            min_items,
            max_items,
        } => {
            let mut picked = Vec::new();
            for part in answer.split(',') {
                let part = part.trim();
                if part.is_empty() {
                    continue;
                }
                let value = resolve_option(options, part)?;
                if !picked.contains(&value) {
                    picked.push(value);
                }
            }
            if let Some(min) = min_items {
                if picked.len() < *min {
                    return Err(format!("pick at least {min} options"));
                }
            }
            if let Some(max) = max_items {
                if picked.len() > *max {
                    return Err(format!("pick at most {max} options"));
                }
            }
            Ok(Value::Array(picked.into_iter().map(Value::String).collect()))
        }
    }
}

/// Resolve an enum answer: a 1-based index into the option list, or a
/// literal option value.
fn resolve_option(options: &[EnumOption], answer: &str) -> Result<String, String> {
    if let Ok(index) = answer.parse::<usize>() {
        if index >= 1 && index <= options.len() {
            return Ok(options[index - 1].value.clone());
        }
        return Err(format!("choose between 1 and {}", options.len()));
    }
    options
        .iter()
        .find(|o| o.value == answer)
        .map(|o| o.value.clone())
        .ok_or_else(|| "not one of the options".to_string())
}

fn validate_format(format: StringFormat, answer: &str) -> Result<(), String> {
    match format {
        StringFormat::Email => {
            if EMAIL_RE.is_match(answer) {
                Ok(())
            } else {
                Err("not a valid email address".to_string())
            }
        }
        StringFormat::Uri => url::Url::parse(answer)
            .map(|_| ())
            .map_err(|_| "not a valid URI".to_string()),
        StringFormat::Date => chrono::NaiveDate::parse_from_str(answer, "%Y-%m-%d")
            .map(|_| ())
            .map_err(|_| "expected YYYY-MM-DD".to_string()),
        StringFormat::DateTime => chrono::DateTime::parse_from_rfc3339(answer)
            .map(|_| ())
            .map_err(|_| "expected an RFC 3339 timestamp".to_string()),
    }
}
