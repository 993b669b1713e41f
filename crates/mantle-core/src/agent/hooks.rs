//! Hook engine.
//!
//! Hooks attach to an exact tool name at a point (before or after its
//! execution) and carry one run directive. Two registries exist:
//! persistent hooks (user-configured, survive across runs) and ablation
//! hooks (loaded for one experiment, cleared afterwards). Persistent
//! hooks can be suspended as a set while ablation hooks stay active.
//!
//! Hook execution is fail-open: a hook that errors is logged and
//! skipped, never blocking the tool call it decorates.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::agent::cancel::RunFlags;
use crate::agent::directive::{parse_directive, HookDirective};
use crate::tools::executor::ToolExecutor;

static ANSI_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new("\x1b\\[[0-9;]*m").expect("static regex"));

/// Remove ANSI SGR color codes from terminal-flavored tool output.
pub fn strip_ansi(text: &str) -> String {
    ANSI_RE.replace_all(text, "").into_owned()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HookPoint {
    Before,
    After,
}

/// One registered hook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hook {
    pub id: String,
    pub enabled: bool,
    pub point: HookPoint,
    /// Exact namespaced tool name this hook attaches to.
    pub tool: String,
    /// After-hooks only: JSON object the tool output must contain
    /// (every key present with an equal value) for the hook to fire.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<Map<String, Value>>,
    /// Run directive, see the directive module for the grammar.
    pub run: String,
    pub created_at: String,
}

impl Hook {
    pub fn new(
        point: HookPoint,
        tool: impl Into<String>,
        run: impl Into<String>,
        when: Option<Map<String, Value>>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            enabled: true,
            point,
            tool: tool.into(),
            when,
            run: run.into(),
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Context injected into the conversation by a hook invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct InjectedContext {
    pub hook_id: String,
    pub tool: String,
    pub text: String,
}

/// Aggregate outcome of running the hooks for one point.
#[derive(Debug, Default)]
pub struct HookEffects {
    pub phase_completed: bool,
    pub run_aborted: bool,
    pub injections: Vec<InjectedContext>,
}

pub struct HookEngine {
    persistent: RwLock<Vec<Hook>>,
    ablation: RwLock<Vec<Hook>>,
    persistent_suspended: AtomicBool,
    executor: Arc<dyn ToolExecutor>,
    run_flags: RunFlags,
}

impl HookEngine {
    pub fn new(executor: Arc<dyn ToolExecutor>, run_flags: RunFlags) -> Self {
        Self {
            persistent: RwLock::new(Vec::new()),
            ablation: RwLock::new(Vec::new()),
            persistent_suspended: AtomicBool::new(false),
            executor,
            run_flags,
        }
    }

    // ── Registry management ──────────────────────────────────────────

    pub fn add_hook(&self, hook: Hook) {
        info!(hook_id = %hook.id, tool = %hook.tool, "Registering hook");
        self.persistent.write().push(hook);
    }

    pub fn remove_hook(&self, id: &str) -> bool {
        let mut hooks = self.persistent.write();
        let before = hooks.len();
        hooks.retain(|h| h.id != id);
        hooks.len() != before
    }

    pub fn list_hooks(&self) -> Vec<Hook> {
        self.persistent.read().clone()
    }

    pub fn suspend_persistent(&self) {
        self.persistent_suspended.store(true, Ordering::SeqCst);
    }

    pub fn resume_persistent(&self) {
        self.persistent_suspended.store(false, Ordering::SeqCst);
    }

    /// Replace the ablation set wholesale.
    pub fn load_ablation(&self, hooks: Vec<Hook>) {
        info!(count = hooks.len(), "Loading ablation hooks");
        *self.ablation.write() = hooks;
    }

    pub fn clear_ablation(&self) {
        self.ablation.write().clear();
    }

    // ── Execution ────────────────────────────────────────────────────

    /// Run every matching hook for this point and tool, in registry
    /// order (persistent first, then ablation). `context` is the tool's
    /// output text, present only at the after point.
    pub async fn run_hooks(
        &self,
        point: HookPoint,
        tool: &str,
        context: Option<&str>,
    ) -> HookEffects {
        let mut effects = HookEffects::default();

        let matching = self.matching_hooks(point, tool);
        for hook in matching {
            if point == HookPoint::After {
                if let Some(when) = &hook.when {
                    let output = context.unwrap_or_default();
                    if !predicate_matches(when, output) {
                        continue;
                    }
                }
            }
            self.apply_hook(&hook, &mut effects).await;
        }

        effects
    }

    fn matching_hooks(&self, point: HookPoint, tool: &str) -> Vec<Hook> {
        let mut matching = Vec::new();
        if !self.persistent_suspended.load(Ordering::SeqCst) {
            matching.extend(
                self.persistent
                    .read()
                    .iter()
                    .filter(|h| h.enabled && h.point == point && h.tool == tool)
                    .cloned(),
            );
        }
        matching.extend(
            self.ablation
                .read()
                .iter()
                .filter(|h| h.enabled && h.point == point && h.tool == tool)
                .cloned(),
        );
        matching
    }

    async fn apply_hook(&self, hook: &Hook, effects: &mut HookEffects) {
        let directive = match parse_directive(&hook.run) {
            Ok(d) => d,
            Err(e) => {
                warn!(hook_id = %hook.id, "Skipping hook with invalid directive: {}", e);
                return;
            }
        };

        match directive {
            HookDirective::CompletePhase { phase } => {
                let applied = self.run_flags.complete_phase(phase.as_deref());
                if applied {
                    info!(hook_id = %hook.id, "Hook completed active phase");
                    effects.phase_completed = true;
                } else {
                    debug!(
                        hook_id = %hook.id,
                        scope = phase.as_deref().unwrap_or(""),
                        "Phase completion ignored, scope does not match active phase"
                    );
                }
            }
            HookDirective::AbortRun => {
                info!(hook_id = %hook.id, "Hook aborted the run");
                self.run_flags.abort_run();
                effects.run_aborted = true;
            }
            HookDirective::Invoke(invocation) => {
                // Straight to the executor: hook-invoked tools never
                // cross the broker, so they cannot fire hooks in turn.
                match self.executor.execute(&invocation.tool, &invocation.args).await {
                    Ok(outcome) => {
                        debug!(
                            hook_id = %hook.id,
                            tool = %invocation.tool,
                            inject = invocation.inject,
                            "Hook tool invocation finished"
                        );
                        if invocation.inject {
                            effects.injections.push(InjectedContext {
                                hook_id: hook.id.clone(),
                                tool: invocation.tool,
                                text: outcome.display_text,
                            });
                        }
                    }
                    Err(e) => {
                        warn!(
                            hook_id = %hook.id,
                            tool = %invocation.tool,
                            "Hook tool invocation failed: {}", e
                        );
                    }
                }
            }
        }
    }
}

/// True when the output parses as a JSON object containing every key of
/// `when` with an equal value. ANSI codes are stripped first since tool
/// output is often terminal-flavored.
fn predicate_matches(when: &Map<String, Value>, output: &str) -> bool {
    let cleaned = strip_ansi(output);
    let Ok(Value::Object(parsed)) = serde_json::from_str::<Value>(cleaned.trim()) else {
        return false;
    };
    when.iter()
        .all(|(key, expected)| parsed.get(key) == Some(expected))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ToolError;
    use crate::tools::executor::{ServerTools, ToolOutcome};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    struct RecordingExecutor {
        calls: Mutex<Vec<(String, Value)>>,
    }

    impl RecordingExecutor {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ToolExecutor for RecordingExecutor {
        async fn execute(&self, name: &str, arguments: &Value) -> Result<ToolOutcome, ToolError> {
            self.calls
                .lock()
                .unwrap()
                .push((name.to_string(), arguments.clone()));
            Ok(ToolOutcome::text("hook output", true, arguments.clone()))
        }

        async fn catalog(&self) -> Vec<ServerTools> {
            Vec::new()
        }
    }

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[tokio::test]
    async fn before_hook_invokes_tool_and_injects() {
        let executor = RecordingExecutor::new();
        let engine = HookEngine::new(executor.clone(), RunFlags::new());
        engine.add_hook(Hook::new(
            HookPoint::Before,
            "fs__read",
            "@tool:aux__note(tag='pre')",
            None,
        ));

        let effects = engine.run_hooks(HookPoint::Before, "fs__read", None).await;

        assert_eq!(effects.injections.len(), 1);
        assert_eq!(effects.injections[0].tool, "aux__note");
        assert_eq!(effects.injections[0].text, "hook output");
        let calls = executor.calls.lock().unwrap();
        assert_eq!(calls[0], ("aux__note".to_string(), json!({"tag": "pre"})));
    }

    #[tokio::test]
    async fn hooks_only_fire_for_their_exact_tool_and_point() {
        let engine = HookEngine::new(RecordingExecutor::new(), RunFlags::new());
        engine.add_hook(Hook::new(
            HookPoint::After,
            "fs__read",
            "@tool:aux__note {}",
            None,
        ));

        let before = engine.run_hooks(HookPoint::Before, "fs__read", None).await;
        let other = engine.run_hooks(HookPoint::After, "fs__write", Some("x")).await;

        assert!(before.injections.is_empty());
        assert!(other.injections.is_empty());
    }

    #[tokio::test]
    async fn after_predicate_requires_matching_subset() {
        let engine = HookEngine::new(RecordingExecutor::new(), RunFlags::new());
        engine.add_hook(Hook::new(
            HookPoint::After,
            "job__status",
            "@tool:aux__note {}",
            Some(object(json!({"status": "done"}))),
        ));

        // Superset object with matching key fires.
        let hit = engine
            .run_hooks(
                HookPoint::After,
                "job__status",
                Some(r#"{"status":"done","n":3}"#),
            )
            .await;
        assert_eq!(hit.injections.len(), 1);

        // Mismatched value does not.
        let miss = engine
            .run_hooks(HookPoint::After, "job__status", Some(r#"{"status":"running"}"#))
            .await;
        assert!(miss.injections.is_empty());

        // Non-JSON output does not.
        let text = engine
            .run_hooks(HookPoint::After, "job__status", Some("plain text"))
            .await;
        assert!(text.injections.is_empty());
    }

    #[tokio::test]
    async fn predicate_sees_through_ansi_codes() {
        let flags = RunFlags::new();
        let engine = HookEngine::new(RecordingExecutor::new(), flags.clone());
        engine.add_hook(Hook::new(
            HookPoint::After,
            "job__status",
            "@complete-phase",
            Some(object(json!({"status": "done"}))),
        ));
        flags.begin_phase("main");

        let effects = engine
            .run_hooks(
                HookPoint::After,
                "job__status",
                Some("\x1b[32m{\"status\":\"done\"}\x1b[0m"),
            )
            .await;

        assert!(effects.phase_completed);
        assert!(flags.phase_complete());
    }

    #[tokio::test]
    async fn suspended_persistent_hooks_leave_ablation_active() {
        let executor = RecordingExecutor::new();
        let engine = HookEngine::new(executor.clone(), RunFlags::new());
        engine.add_hook(Hook::new(
            HookPoint::Before,
            "fs__read",
            "@tool:persistent__probe {}",
            None,
        ));
        engine.load_ablation(vec![Hook::new(
            HookPoint::Before,
            "fs__read",
            "@tool:ablation__probe {}",
            None,
        )]);
        engine.suspend_persistent();

        let effects = engine.run_hooks(HookPoint::Before, "fs__read", None).await;

        assert_eq!(effects.injections.len(), 1);
        assert_eq!(effects.injections[0].tool, "ablation__probe");

        engine.resume_persistent();
        let effects = engine.run_hooks(HookPoint::Before, "fs__read", None).await;
        assert_eq!(effects.injections.len(), 2);
    }

    #[tokio::test]
    async fn overlapping_callers_each_get_their_hooks() {
        struct SlowExecutor;

        #[async_trait]
        impl ToolExecutor for SlowExecutor {
            async fn execute(
                &self,
                _name: &str,
                arguments: &Value,
            ) -> Result<ToolOutcome, ToolError> {
                tokio::time::sleep(std::time::Duration::from_millis(30)).await;
                Ok(ToolOutcome::text("slow output", true, arguments.clone()))
            }

            async fn catalog(&self) -> Vec<ServerTools> {
                Vec::new()
            }
        }

        // One call origin per tool, both in flight at once.
        let engine = Arc::new(HookEngine::new(Arc::new(SlowExecutor), RunFlags::new()));
        engine.add_hook(Hook::new(
            HookPoint::Before,
            "fs__read",
            "@tool:aux__one {}",
            None,
        ));
        engine.add_hook(Hook::new(
            HookPoint::Before,
            "web__fetch",
            "@tool:aux__two {}",
            None,
        ));

        let (first, second) = tokio::join!(
            engine.run_hooks(HookPoint::Before, "fs__read", None),
            engine.run_hooks(HookPoint::Before, "web__fetch", None),
        );

        assert_eq!(first.injections.len(), 1);
        assert_eq!(first.injections[0].tool, "aux__one");
        assert_eq!(second.injections.len(), 1);
        assert_eq!(second.injections[0].tool, "aux__two");
    }

    #[tokio::test]
    async fn abort_directive_sets_run_flag() {
        let flags = RunFlags::new();
        let engine = HookEngine::new(RecordingExecutor::new(), flags.clone());
        engine.add_hook(Hook::new(HookPoint::Before, "any__tool", "@abort", None));

        let effects = engine.run_hooks(HookPoint::Before, "any__tool", None).await;

        assert!(effects.run_aborted);
        assert!(flags.run_aborted());
    }

    #[tokio::test]
    async fn invalid_directive_is_skipped_fail_open() {
        let engine = HookEngine::new(RecordingExecutor::new(), RunFlags::new());
        engine.add_hook(Hook::new(HookPoint::Before, "fs__read", "@bogus", None));
        engine.add_hook(Hook::new(
            HookPoint::Before,
            "fs__read",
            "@tool:aux__note {}",
            None,
        ));

        let effects = engine.run_hooks(HookPoint::Before, "fs__read", None).await;
        assert_eq!(effects.injections.len(), 1);
    }

    #[test]
    fn strip_ansi_removes_sgr_sequences() {
        assert_eq!(strip_ansi("\x1b[1;31mred\x1b[0m"), "red");
        assert_eq!(strip_ansi("plain"), "plain");
    }
}
