//! Mantle - terminal agent client
//!
//! An interactive AI agent session in the terminal:
//! - streamed model turns with tool execution
//! - before/after hooks with run directives
//! - human-in-the-loop confirmation and elicitation forms
//! - a loopback IPC router exposing the session's tools

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use mantle_core::agent::approval::{ApprovalGate, Prompter};
use mantle_core::agent::cancel::{AbortHandle, RunFlags};
use mantle_core::agent::elicit::ElicitationBridge;
use mantle_core::agent::hooks::HookEngine;
use mantle_core::agent::keyboard::KeyboardMonitor;
use mantle_core::agent::loop_events::LoopEvent;
use mantle_core::agent::orchestrator::{AgentLoop, LoopConfig, LoopServices};
use mantle_core::ai::types::{AiTool, ModelMessage};
use mantle_core::ai::{ModelClient, ModelConfig};
use mantle_core::config::{config_dir, Preferences};
use mantle_core::history::{HistoryLogger, NullHistory};
use mantle_core::tools::executor::{namespaced_tool, ToolExecutor};
use mantle_core::tools::ToolBroker;

mod builtin;
mod keyboard;
mod prompt;

use builtin::BuiltinExecutor;
use keyboard::CrosstermKeyCapture;
use prompt::TerminalPrompter;

/// Mantle - AI agent client
#[derive(Parser)]
#[command(name = "mantle")]
#[command(about = "Terminal AI agent with hooks and a loopback tool router", long_about = None)]
struct Cli {
    /// Model id override
    #[arg(long)]
    model: Option<String>,

    /// Provider base URL override
    #[arg(long)]
    base_url: Option<String>,

    /// Skip starting the loopback IPC router
    #[arg(long)]
    no_router: bool,
}

/// Restore terminal state - called on panic or unexpected exit
fn restore_terminal() {
    let _ = crossterm::terminal::disable_raw_mode();
}

fn init_logging() -> Result<()> {
    let log_dir = config_dir().join("logs");
    std::fs::create_dir_all(&log_dir)?;
    let log_file = std::fs::File::create(log_dir.join("mantle.log"))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::sync::Mutex::new(log_file))
        .with_ansi(false)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        restore_terminal();
        original_hook(panic_info);
    }));

    init_logging()?;

    let mut preferences = Preferences::load();
    if let Some(model) = cli.model {
        preferences.model = model;
    }
    if let Some(base_url) = cli.base_url {
        preferences.base_url = base_url;
    }

    let api_key = std::env::var("MANTLE_API_KEY").unwrap_or_default();
    if api_key.is_empty() {
        eprintln!("warning: MANTLE_API_KEY is not set; model requests will fail");
    }

    let abort = AbortHandle::new();
    let run_flags = RunFlags::new();
    let prompter = Arc::new(TerminalPrompter);
    let history = Arc::new(NullHistory);

    let executor: Arc<dyn ToolExecutor> = Arc::new(BuiltinExecutor);
    let hooks = Arc::new(HookEngine::new(executor.clone(), run_flags.clone()));
    let gate = Arc::new(ApprovalGate::new(preferences.hil_enabled, prompter.clone()));
    let broker = Arc::new(ToolBroker::new(
        executor.clone(),
        hooks.clone(),
        gate.clone(),
        history.clone(),
        abort.clone(),
        preferences.tool_timeout_secs,
    ));
    let bridge = Arc::new(ElicitationBridge::new(
        prompter.clone(),
        history.clone(),
        run_flags.clone(),
    ));
    broker.set_elicitation(bridge);

    let router = if cli.no_router {
        None
    } else {
        let handle = mantle_server::start_router(mantle_server::AppState {
            broker: broker.clone(),
            abort: abort.clone(),
        })
        .await?;
        println!("IPC router on http://{}", handle.addr);
        Some(handle)
    };

    let client = Arc::new(ModelClient::new(
        ModelConfig {
            format: preferences.api_format,
            base_url: preferences.base_url.clone(),
            model: preferences.model.clone(),
            max_tokens: preferences.max_tokens,
        },
        api_key,
    ));

    let tools = advertised_tools(&executor).await;
    let monitor = KeyboardMonitor::new(
        Arc::new(CrosstermKeyCapture::new()),
        abort.clone(),
        preferences.abort_key,
    );

    // While a run is active, Ctrl-C raises the same abort flag as the
    // abort key; at the idle prompt it shuts the session down.
    let run_active = Arc::new(AtomicBool::new(false));
    {
        let abort = abort.clone();
        let run_active = run_active.clone();
        tokio::spawn(async move {
            loop {
                if tokio::signal::ctrl_c().await.is_err() {
                    break;
                }
                if run_active.load(Ordering::SeqCst) {
                    abort.set("interrupted");
                } else {
                    restore_terminal();
                    std::process::exit(0);
                }
            }
        });
    }

    let mut conversation: Vec<ModelMessage> = Vec::new();
    loop {
        let input = prompter.prompt("> ").await?;
        let input = input.trim().to_string();
        if input.is_empty() {
            continue;
        }
        if input == "exit" || input == "quit" {
            break;
        }

        abort.reset();
        run_flags.clear();
        run_flags.begin_phase("main");
        gate.reset_session();
        history.add_user_message(&input).await;
        conversation.push(ModelMessage::user_text(&input));

        if let Err(e) = monitor.start().await {
            tracing::warn!("Keyboard monitoring unavailable: {}", e);
        }

        let agent = AgentLoop::new(
            LoopConfig {
                max_iterations: preferences.max_iterations,
                max_tokens: preferences.max_tokens,
            },
            LoopServices {
                client: client.clone(),
                broker: broker.clone(),
                history: history.clone(),
                abort: abort.clone(),
                run_flags: run_flags.clone(),
                tools: tools.clone(),
            },
        );

        run_active.store(true, Ordering::SeqCst);
        let (mut events, handle) = agent.run(std::mem::take(&mut conversation));
        while let Some(event) = events.recv().await {
            render_event(&event);
        }
        conversation = handle.await?;
        run_active.store(false, Ordering::SeqCst);

        let typed = monitor.stop().await;
        if !typed.is_empty() {
            println!("(buffered input: {typed})");
        }
    }

    if let Some(router) = router {
        router.shutdown();
    }
    restore_terminal();
    Ok(())
}

/// Flatten the executor catalog into namespaced tool definitions for
/// the model.
async fn advertised_tools(executor: &Arc<dyn ToolExecutor>) -> Vec<AiTool> {
    let mut tools = Vec::new();
    for server in executor.catalog().await {
        for tool in server.tools {
            tools.push(AiTool {
                name: namespaced_tool(&server.server, &tool.name),
                description: tool.description.unwrap_or_default(),
                input_schema: tool.input_schema,
            });
        }
    }
    tools
}

fn render_event(event: &LoopEvent) {
    use std::io::Write;
    match event {
        LoopEvent::TextDelta { delta } => {
            print!("{delta}");
            let _ = std::io::stdout().flush();
        }
        LoopEvent::ThinkingDelta { .. } => {}
        LoopEvent::ToolCallStart { name, .. } => {
            println!("\n[tool] {name}");
        }
        LoopEvent::ToolCallComplete { .. } => {}
        LoopEvent::ToolExecuting { name, .. } => {
            println!("[tool] running {name}...");
        }
        LoopEvent::ToolResult {
            output, is_error, ..
        } => {
            if *is_error {
                println!("[tool] error: {output}");
            } else {
                println!("[tool] {output}");
            }
        }
        LoopEvent::ContextInjected { tool, .. } => {
            println!("[hook] injected context from {tool}");
        }
        LoopEvent::TurnComplete { .. } => {}
        LoopEvent::Aborted { reason } => {
            println!("\n[aborted] {reason}");
        }
        LoopEvent::Finished => {
            println!();
        }
        LoopEvent::Error { error } => {
            eprintln!("\n[error] {error}");
        }
    }
}
