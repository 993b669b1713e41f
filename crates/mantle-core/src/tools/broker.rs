//! The single boundary every tool call crosses.
//!
//! Both the agent loop and the IPC router hand their calls to the
//! broker, so before/after hooks, human confirmation, abort checks,
//! history logging, and execution serialization behave identically no
//! matter where a call originated.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::agent::approval::{ApprovalGate, Confirmation};
use crate::agent::cancel::AbortHandle;
use crate::agent::elicit::ElicitationBridge;
use crate::agent::hooks::{HookEngine, HookPoint, InjectedContext};
use crate::error::ToolError;
use crate::history::{HistoryLogger, ToolExecutionRecord};
use crate::tools::executor::{ToolCallRequest, ToolExecutor, ToolOutcome};

/// Where a call entered the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOrigin {
    /// Requested by the model inside an agent loop turn.
    Model,
    /// Requested over the loopback IPC router.
    Ipc,
}

/// Everything the caller needs to know about one brokered call.
#[derive(Debug)]
pub struct CallReport {
    pub request_id: String,
    pub result: Result<ToolOutcome, ToolError>,
    /// Context injected by hooks around this call, in hook order.
    pub injected: Vec<InjectedContext>,
    /// The user declined execution at the confirmation gate.
    pub skipped: bool,
    /// The call was cancelled by an abort before it could execute.
    pub aborted: bool,
}

pub struct ToolBroker {
    executor: Arc<dyn ToolExecutor>,
    hooks: Arc<HookEngine>,
    gate: Arc<ApprovalGate>,
    history: Arc<dyn HistoryLogger>,
    abort: AbortHandle,
    elicit: parking_lot::RwLock<Option<Arc<ElicitationBridge>>>,
    /// Serializes actual tool execution across origins.
    exec_lock: Mutex<()>,
    timeout_secs: u64,
}

impl ToolBroker {
    pub fn new(
        executor: Arc<dyn ToolExecutor>,
        hooks: Arc<HookEngine>,
        gate: Arc<ApprovalGate>,
        history: Arc<dyn HistoryLogger>,
        abort: AbortHandle,
        timeout_secs: u64,
    ) -> Self {
        Self {
            executor,
            hooks,
            gate,
            history,
            abort,
            elicit: parking_lot::RwLock::new(None),
            exec_lock: Mutex::new(()),
            timeout_secs,
        }
    }

    /// Wire up the elicitation bridge after construction. The bridge is
    /// optional; without one, timeouts simply have nothing to cancel.
    pub fn set_elicitation(&self, bridge: Arc<ElicitationBridge>) {
        *self.elicit.write() = Some(bridge);
    }

    pub fn executor(&self) -> &Arc<dyn ToolExecutor> {
        &self.executor
    }

    pub fn abort_handle(&self) -> &AbortHandle {
        &self.abort
    }

    /// Run one tool call through the full pipeline.
    pub async fn run_call(&self, request: ToolCallRequest, origin: CallOrigin) -> CallReport {
        let name = request.name.clone();
        let mut injected = Vec::new();

        let effects = self
            .hooks
            .run_hooks(HookPoint::Before, &name, None)
            .await;
        injected.extend(effects.injections);

        if self.gate.confirm(&name, &request.arguments).await == Confirmation::Skip {
            info!(tool = %name, "Tool call skipped at confirmation gate");
            let outcome = ToolOutcome::text(
                "Tool execution skipped by user",
                false,
                request.arguments.clone(),
            );
            self.record(&request, origin, &Ok(outcome.clone())).await;
            return CallReport {
                request_id: request.id,
                result: Ok(outcome),
                injected,
                skipped: true,
                aborted: false,
            };
        }

        if self.abort.is_set() {
            let reason = self
                .abort
                .reason()
                .unwrap_or_else(|| "aborted".to_string());
            warn!(tool = %name, reason = %reason, "Tool call cancelled before execution");
            return CallReport {
                request_id: request.id,
                result: Err(ToolError::Failed {
                    name,
                    message: format!("cancelled before execution: {reason}"),
                }),
                injected,
                skipped: false,
                aborted: true,
            };
        }

        let result = {
            let _guard = self.exec_lock.lock().await;
            self.execute_with_timeout(&name, &request.arguments).await
        };

        if let Err(e) = &result {
            if e.is_timeout() {
                let bridge = self.elicit.read().clone();
                if let Some(bridge) = bridge {
                    bridge
                        .cancel_pending(&format!("tool '{name}' timed out"))
                        .await;
                }
            }
        }

        if let Ok(outcome) = &result {
            let effects = self
                .hooks
                .run_hooks(HookPoint::After, &name, Some(&outcome.display_text))
                .await;
            injected.extend(effects.injections);
        }

        self.record(&request, origin, &result).await;

        CallReport {
            request_id: request.id,
            result,
            injected,
            skipped: false,
            aborted: false,
        }
    }

    async fn execute_with_timeout(
        &self,
        name: &str,
        arguments: &Value,
    ) -> Result<ToolOutcome, ToolError> {
        let fut = self.executor.execute(name, arguments);
        match tokio::time::timeout(std::time::Duration::from_secs(self.timeout_secs), fut).await {
            Ok(result) => result,
            Err(_) => Err(ToolError::Timeout {
                name: name.to_string(),
                seconds: self.timeout_secs,
            }),
        }
    }

    async fn record(
        &self,
        request: &ToolCallRequest,
        origin: CallOrigin,
        result: &Result<ToolOutcome, ToolError>,
    ) {
        let (output, success) = match result {
            Ok(outcome) => (outcome.display_text.clone(), outcome.success),
            Err(e) => (e.to_string(), false),
        };
        self.history
            .add_tool_execution(ToolExecutionRecord {
                name: request.name.clone(),
                input: request.arguments.clone(),
                output,
                success,
                from_orchestrator: origin == CallOrigin::Model,
                from_ipc: origin == CallOrigin::Ipc,
                input_timestamp: chrono::Utc::now(),
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::approval::Prompter;
    use crate::agent::cancel::RunFlags;
    use crate::history::NullHistory;
    use crate::tools::executor::ServerTools;
    use async_trait::async_trait;
    use serde_json::json;

    struct EchoExecutor;

    #[async_trait]
    impl ToolExecutor for EchoExecutor {
        async fn execute(&self, name: &str, arguments: &Value) -> Result<ToolOutcome, ToolError> {
            if name == "local__boom" {
                return Err(ToolError::Failed {
                    name: name.to_string(),
                    message: "boom".into(),
                });
            }
            Ok(ToolOutcome::text(
                format!("{name}: {arguments}"),
                true,
                arguments.clone(),
            ))
        }

        async fn catalog(&self) -> Vec<ServerTools> {
            Vec::new()
        }
    }

    struct ScriptedPrompter(String);

    #[async_trait]
    impl Prompter for ScriptedPrompter {
        async fn prompt(&self, _message: &str) -> anyhow::Result<String> {
            Ok(self.0.clone())
        }
    }

    fn broker(gate: ApprovalGate, abort: AbortHandle) -> ToolBroker {
        let executor: Arc<dyn ToolExecutor> = Arc::new(EchoExecutor);
        let hooks = Arc::new(HookEngine::new(executor.clone(), RunFlags::new()));
        ToolBroker::new(
            executor,
            hooks,
            Arc::new(gate),
            Arc::new(NullHistory),
            abort,
            5,
        )
    }

    fn request(name: &str) -> ToolCallRequest {
        ToolCallRequest {
            id: "r1".into(),
            name: name.into(),
            arguments: json!({"x": 1}),
        }
    }

    #[tokio::test]
    async fn successful_call_passes_through() {
        let gate = ApprovalGate::new(false, Arc::new(ScriptedPrompter(String::new())));
        let report = broker(gate, AbortHandle::new())
            .run_call(request("local__echo"), CallOrigin::Model)
            .await;

        let outcome = report.result.unwrap();
        assert!(outcome.success);
        assert!(outcome.display_text.starts_with("local__echo"));
        assert!(!report.skipped);
        assert!(!report.aborted);
    }

    #[tokio::test]
    async fn declined_call_is_skipped_not_executed() {
        let gate = ApprovalGate::new(true, Arc::new(ScriptedPrompter("s".into())));
        let report = broker(gate, AbortHandle::new())
            .run_call(request("local__echo"), CallOrigin::Model)
            .await;

        assert!(report.skipped);
        let outcome = report.result.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.display_text, "Tool execution skipped by user");
    }

    #[tokio::test]
    async fn abort_set_before_execution_cancels_call() {
        let abort = AbortHandle::new();
        abort.set("user pressed abort key");
        let gate = ApprovalGate::new(false, Arc::new(ScriptedPrompter(String::new())));
        let report = broker(gate, abort)
            .run_call(request("local__echo"), CallOrigin::Ipc)
            .await;

        assert!(report.aborted);
        assert!(report.result.is_err());
    }

    #[tokio::test]
    async fn executor_failure_surfaces_as_error() {
        let gate = ApprovalGate::new(false, Arc::new(ScriptedPrompter(String::new())));
        let report = broker(gate, AbortHandle::new())
            .run_call(request("local__boom"), CallOrigin::Model)
            .await;

        match report.result {
            Err(ToolError::Failed { message, .. }) => assert_eq!(message, "boom"),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
