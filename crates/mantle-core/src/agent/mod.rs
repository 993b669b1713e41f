//! Run orchestration: the agent loop and everything that steers it.
//!
//! - `orchestrator` drives model turns and tool execution
//! - `hooks` and `directive` decorate tool calls with user automation
//! - `approval` gates execution behind human confirmation
//! - `elicit` bridges server-initiated forms to the terminal
//! - `cancel` and `keyboard` provide cooperative abort

pub mod approval;
pub mod cancel;
pub mod directive;
pub mod elicit;
pub mod hooks;
pub mod keyboard;
pub mod loop_events;
pub mod orchestrator;
pub mod stream;

pub use approval::{ApprovalGate, Confirmation, Prompter};
pub use cancel::{AbortHandle, RunFlags};
pub use directive::{parse_directive, DirectiveError, HookDirective, ToolInvocation};
pub use elicit::{ElicitRequest, ElicitResolution, ElicitationBridge, FieldKind, FieldSpec};
pub use hooks::{strip_ansi, Hook, HookEngine, HookPoint, InjectedContext};
pub use keyboard::{KeyPress, KeyboardMonitor, RawKeyCapture};
pub use loop_events::LoopEvent;
pub use orchestrator::{AgentLoop, LoopConfig, LoopServices, TurnSource};
