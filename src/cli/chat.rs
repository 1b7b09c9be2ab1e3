use crate::bus::MessageBus;
use crate::config::Config;
use crate::driver::{AgentDriver, DriverConfig, ToolSource};
use crate::events::EventLog;
use crate::providers::MockProvider;
use crate::subagent::SubagentManager;
use crate::tools::ToolRegistry;
use crate::tools::builtin::{CurrentTimeTool, EchoTool};
use crate::ui::{ConsoleUI, UI};
use anyhow::Result;
use std::sync::Arc;

const PLANNER_PROMPT: &str = "You are the Planner. Decide what the Coder should do next; you never call tools yourself. \
Reply with TERMINATE once the user's request is fully satisfied.";
const CODER_PROMPT: &str = "You are the Coder. Use tools when needed and report results back to the Planner.";

fn build_registry() -> Arc<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(EchoTool));
    registry.register(Arc::new(CurrentTimeTool));
    Arc::new(registry)
}

/// Runs the interactive Planner/Coder session. The provider here is a
/// `MockProvider` since a concrete LLM wire format is out of scope for this
/// crate (see Non-goals); wiring a real provider means implementing
/// `LLMProvider` against an HTTP client and passing it in here instead.
pub async fn run(config: Config, message: Option<String>) -> Result<()> {
    let provider = Arc::new(MockProvider::text("This build has no network-backed model provider wired up; \
        the Planner/Coder loop, tool registry, cron service, and subagent manager are otherwise fully live. TERMINATE"));
    let tools = build_registry();
    let bus = Arc::new(MessageBus::default());
    let events = Arc::new(EventLog::default());
    let ui: Arc<dyn UI> = Arc::new(ConsoleUI::new());

    let subagents = Arc::new(SubagentManager::new(
        provider.clone(),
        tools.clone(),
        bus.clone(),
        events.clone(),
        config.provider.model.clone(),
        config.subagents.max_concurrent,
    ));

    let driver_config = DriverConfig {
        planner_model: config.provider.model.clone(),
        coder_model: config.provider.model.clone(),
        max_tool_iterations: config.driver.max_tool_iterations,
        message_cap: config.driver.max_messages,
        emergency_truncate_window: config.driver.emergency_truncate_window,
        compression_threshold: config.compaction.threshold,
        keep_recent: config.compaction.keep_recent,
        ..Default::default()
    };

    let driver = Arc::new(AgentDriver::new(
        provider,
        ToolSource::Full(tools),
        Some(bus),
        ui.clone(),
        driver_config,
        PLANNER_PROMPT.to_string(),
        CODER_PROMPT.to_string(),
    ));
    let _detector = driver.spawn_detector();

    if let Some(message) = message {
        let reply = driver.run_turn(message).await?;
        ui.print_agent_message(&reply, "Coder", false);
        return Ok(());
    }

    ui.print_info("agentcore chat — /subagents to list background tasks, /spawn <task> to start one, /exit to quit");
    loop {
        let line = ui.get_user_input(">");
        if line.trim().is_empty() {
            continue;
        }
        match line.trim() {
            "/exit" | "/quit" => break,
            "/subagents" => {
                let running = subagents.list_running().await;
                if running.is_empty() {
                    ui.print_info("no subagents currently running");
                } else {
                    for s in running {
                        ui.print_info(&format!("{} [{}]: {}", s.id, s.label, s.task));
                    }
                }
                continue;
            }
            cmd if cmd.starts_with("/spawn ") => {
                let task = cmd.trim_start_matches("/spawn ").to_string();
                match subagents.spawn(task, None, "main".to_string()).await {
                    Ok(id) => ui.print_subagent_spawned(&id),
                    Err(e) => ui.print_error(&e.to_string()),
                }
                continue;
            }
            _ => {}
        }

        match driver.run_turn(line).await {
            Ok(reply) => ui.print_agent_message(&reply, "Coder", false),
            Err(e) => ui.print_error(&e.to_string()),
        }
    }

    Ok(())
}
