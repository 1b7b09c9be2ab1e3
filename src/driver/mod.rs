//! Agent Driver (C7): the main loop. Runs a two-role team — a Planner that
//! never acts twice in a row, and a Coder that executes tools and produces
//! the user-visible replies — driven by a small selector routing function.

use crate::bus::{MessageBus, SystemMessage};
use crate::compaction;
use crate::providers::base::{ChatRequest, LLMProvider, LLMResponse, Message, ToolCallRequest};
use crate::tools::{ExecutionContext, ToolRegistry, ToolRegistryView};
use crate::ui::{NullUI, UI};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub const TERMINATE_SENTINEL: &str = "TERMINATE";
const DEFAULT_MESSAGE_CAP: usize = 1000;
const DEFAULT_MAX_TOOL_ITERATIONS: usize = 300;
const DEFAULT_EMERGENCY_TRUNCATE_WINDOW: usize = 30;
const DEFAULT_COMPRESSION_THRESHOLD: f64 = 0.80;
const DEFAULT_KEEP_RECENT: usize = 20;
const DETECTOR_POLL_TIMEOUT: Duration = Duration::from_millis(200);
/// How many times a role may return an empty response before the run gives up.
const EMPTY_RESPONSE_RETRIES: usize = 2;
const RETRY_BACKOFF_BASE: u64 = 2;
const MAX_RETRY_DELAY_SECS: f64 = 10.0;
/// Default cap on a subagent worker's tool-calling iterations, per spec.
pub const DEFAULT_SUBAGENT_MAX_ITERATIONS: usize = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Planner,
    Coder,
}

/// The last thing that happened in the team, used to pick the next speaker.
/// Mirrors the routing table directly so it can be unit tested on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LastEvent {
    None,
    PlannerSpoke,
    CoderToolCallPending,
    CoderToolResult,
    CoderFinalAnswer,
}

/// Pick the next speaker given what just happened. Returns `None` for
/// `CoderFinalAnswer` — that case needs the "continuing or terminate"
/// decision, which the caller resolves (by sentinel or Planner review),
/// not a pure function of the last event alone.
pub fn select_next(last: LastEvent) -> Option<Role> {
    match last {
        LastEvent::None => Some(Role::Planner),
        LastEvent::PlannerSpoke => Some(Role::Coder),
        LastEvent::CoderToolCallPending => Some(Role::Coder),
        LastEvent::CoderToolResult => Some(Role::Planner),
        LastEvent::CoderFinalAnswer => None,
    }
}

#[derive(Debug, Clone)]
pub enum TeamEvent {
    TextMessage { role: Role, content: String, is_reasoning: bool },
    ToolCallRequest(ToolCallRequest),
    ToolCallExecution { call_id: String, name: String, result_preview: String, is_error: bool },
    ModelClientStreamingChunk(String),
}

/// Either the full registry or a subagent's restricted view. Lets the
/// driver be constructed identically for the main session and for headless
/// subagent runs.
pub enum ToolSource {
    Full(Arc<ToolRegistry>),
    Restricted(ToolRegistryView),
}

impl ToolSource {
    pub fn list_definitions(&self) -> Vec<crate::providers::base::ToolDefinition> {
        match self {
            ToolSource::Full(r) => r.list_definitions(),
            ToolSource::Restricted(v) => v.list_definitions(),
        }
    }

    pub async fn execute(
        &self,
        name: &str,
        params: serde_json::Value,
        ctx: &ExecutionContext,
    ) -> anyhow::Result<crate::tools::ToolResult> {
        match self {
            ToolSource::Full(r) => r.execute(name, params, ctx).await,
            ToolSource::Restricted(v) => v.execute(name, params, ctx).await,
        }
    }
}

pub struct DriverConfig {
    pub planner_model: String,
    pub coder_model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub max_tool_iterations: usize,
    pub message_cap: usize,
    pub emergency_truncate_window: usize,
    pub compression_threshold: f64,
    pub keep_recent: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            planner_model: "planner".to_string(),
            coder_model: "coder".to_string(),
            max_tokens: 4096,
            temperature: 0.7,
            max_tool_iterations: DEFAULT_MAX_TOOL_ITERATIONS,
            message_cap: DEFAULT_MESSAGE_CAP,
            emergency_truncate_window: DEFAULT_EMERGENCY_TRUNCATE_WINDOW,
            compression_threshold: DEFAULT_COMPRESSION_THRESHOLD,
            keep_recent: DEFAULT_KEEP_RECENT,
        }
    }
}

fn strip_sentinel(text: &str) -> String {
    text.replace(TERMINATE_SENTINEL, "").trim().to_string()
}

fn is_token_limit_error(err: &anyhow::Error) -> bool {
    let msg = err.to_string().to_lowercase();
    msg.contains("context length") || msg.contains("token limit") || msg.contains("maximum context")
}

/// One driver instance per conversation (interactive) or per subagent task
/// (headless). Owns its own message history; never shared across tasks.
pub struct AgentDriver {
    provider: Arc<dyn LLMProvider>,
    tools: ToolSource,
    bus: Option<Arc<MessageBus>>,
    ui: Arc<dyn UI>,
    config: DriverConfig,
    messages: Mutex<Vec<Message>>,
    active: AtomicBool,
    pending_injections: Mutex<VecDeque<SystemMessage>>,
    planner_system_prompt: String,
    coder_system_prompt: String,
}

impl AgentDriver {
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        tools: ToolSource,
        bus: Option<Arc<MessageBus>>,
        ui: Arc<dyn UI>,
        config: DriverConfig,
        planner_system_prompt: String,
        coder_system_prompt: String,
    ) -> Self {
        Self {
            provider,
            tools,
            bus,
            ui,
            config,
            messages: Mutex::new(vec![Message::system(coder_system_prompt.clone())]),
            active: AtomicBool::new(false),
            pending_injections: Mutex::new(VecDeque::new()),
            planner_system_prompt,
            coder_system_prompt,
        }
    }

    /// Construct a headless driver for a subagent worker: no UI prints, no
    /// bus wiring (subagents don't themselves consume C4), system prompt
    /// replaced with the task-carrying restricted prompt.
    pub fn headless(provider: Arc<dyn LLMProvider>, tools: ToolRegistryView, system_prompt: String, max_iterations: usize) -> Self {
        let config = DriverConfig {
            max_tool_iterations: max_iterations,
            ..Default::default()
        };
        Self::new(
            provider,
            ToolSource::Restricted(tools),
            None,
            Arc::new(NullUI),
            config,
            system_prompt.clone(),
            system_prompt,
        )
    }

    /// Feed an externally observed `SystemMessage` into the driver. If a
    /// team is currently active, it's queued for injection as a new
    /// user-style turn at the next boundary; otherwise it's displayed
    /// directly.
    pub async fn process_system_message(&self, msg: SystemMessage) {
        if self.active.load(Ordering::SeqCst) {
            self.pending_injections.lock().await.push_back(msg);
        } else {
            self.ui.print_info(&msg.content);
        }
    }

    /// Spawn the detector task that polls C4 with a small timeout and hands
    /// every message to `process_system_message`. Returns a handle the
    /// caller can abort on shutdown.
    pub fn spawn_detector(self: &Arc<Self>) -> Option<tokio::task::JoinHandle<()>> {
        let bus = self.bus.clone()?;
        let driver = self.clone();
        Some(tokio::spawn(async move {
            loop {
                if let Some(msg) = bus.consume(DETECTOR_POLL_TIMEOUT).await {
                    driver.process_system_message(msg).await;
                }
            }
        }))
    }

    async fn drain_injections(&self) {
        let mut pending = self.pending_injections.lock().await;
        if pending.is_empty() {
            return;
        }
        let mut messages = self.messages.lock().await;
        while let Some(msg) = pending.pop_front() {
            messages.push(Message::user(msg.content));
        }
    }

    async fn push_message(&self, msg: Message) {
        self.messages.lock().await.push(msg);
    }

    async fn compress_if_needed(&self) {
        let mut messages = self.messages.lock().await;
        let compressed = compaction::maybe_compress(
            &messages,
            &self.config.coder_model,
            self.provider.as_ref(),
            self.config.compression_threshold,
            self.config.keep_recent,
        )
        .await;
        *messages = compressed;
    }

    async fn emergency_truncate(&self) {
        let mut messages = self.messages.lock().await;
        if messages.len() > self.config.emergency_truncate_window {
            let start = messages.len() - self.config.emergency_truncate_window;
            *messages = messages[start..].to_vec();
        }
        warn!("emergency context truncation applied after a provider token-limit error");
    }

    /// Called when a role returns a blank response. Decrements the shared
    /// retry budget and returns the backoff delay in seconds to wait before
    /// retrying, or `None` once the budget is exhausted.
    fn empty_response_backoff(&self, empty_retries_left: &mut usize, role: &str) -> Option<f64> {
        if *empty_retries_left == 0 {
            warn!("{} returned empty, no retries left - giving up", role);
            return None;
        }
        *empty_retries_left -= 1;
        let retry_num = EMPTY_RESPONSE_RETRIES - *empty_retries_left;
        let delay = (RETRY_BACKOFF_BASE.pow(retry_num as u32) as f64 + fastrand::f64()).min(MAX_RETRY_DELAY_SECS);
        warn!("{} returned empty, retries left: {}, backing off {:.1}s", role, empty_retries_left, delay);
        Some(delay)
    }

    async fn call_model(&self, system_prompt: &str, model: &str, offer_tools: bool) -> anyhow::Result<LLMResponse> {
        let history = self.messages.lock().await.clone();
        let mut messages = vec![Message::system(system_prompt.to_string())];
        messages.extend(history.into_iter().filter(|m| m.role != "system"));

        let tools = if offer_tools {
            Some(self.tools.list_definitions())
        } else {
            None
        };

        let result = self
            .provider
            .chat_with_retry(
                ChatRequest {
                    messages,
                    tools,
                    model: Some(model),
                    max_tokens: self.config.max_tokens,
                    temperature: self.config.temperature,
                },
                None,
            )
            .await;

        if let Err(ref e) = result
            && is_token_limit_error(e)
        {
            self.emergency_truncate().await;
        }
        result
    }

    /// Run one user turn, or — for a headless subagent — the whole task, to
    /// completion. Returns the final Coder answer with any `TERMINATE`
    /// sentinel stripped.
    pub async fn run_team(&self) -> anyhow::Result<String> {
        self.active.store(true, Ordering::SeqCst);
        let outcome = self.run_team_inner().await;
        self.active.store(false, Ordering::SeqCst);
        outcome
    }

    async fn run_team_inner(&self) -> anyhow::Result<String> {
        let mut last_event = LastEvent::None;
        let mut tool_call_count = 0usize;
        let mut message_count = 0usize;
        let mut empty_retries_left = EMPTY_RESPONSE_RETRIES;
        let ctx = ExecutionContext::default();

        loop {
            self.drain_injections().await;

            if message_count >= self.config.message_cap {
                warn!("message cap ({}) reached, stopping team", self.config.message_cap);
                return Ok(String::new());
            }

            self.compress_if_needed().await;

            let speaker = match last_event {
                LastEvent::CoderFinalAnswer => Role::Planner,
                other => select_next(other).unwrap_or(Role::Planner),
            };

            match speaker {
                Role::Planner => {
                    let response = self.call_model(&self.planner_system_prompt, &self.config.planner_model, false).await?;
                    message_count += 1;
                    let text = response.content.unwrap_or_default();
                    if text.trim().is_empty() {
                        if let Some(delay) = self.empty_response_backoff(&mut empty_retries_left, "Planner") {
                            tokio::time::sleep(Duration::from_secs_f64(delay)).await;
                            continue;
                        }
                        return Ok(String::new());
                    }
                    self.push_message(Message::assistant(text.clone(), None)).await;
                    self.ui.print_agent_message(&text, "Planner", false);
                    if text.contains(TERMINATE_SENTINEL) {
                        return Ok(strip_sentinel(&text));
                    }
                    last_event = LastEvent::PlannerSpoke;
                }
                Role::Coder => {
                    let offer_tools = tool_call_count < self.config.max_tool_iterations;
                    let response = self.call_model(&self.coder_system_prompt, &self.config.coder_model, offer_tools).await?;
                    message_count += 1;

                    if response.has_tool_calls() {
                        self.push_message(Message::assistant(
                            response.content.clone().unwrap_or_default(),
                            Some(response.tool_calls.clone()),
                        ))
                        .await;

                        for call in &response.tool_calls {
                            self.ui.start_thinking(&format!("running {}", call.name));
                            tool_call_count += 1;
                            let outcome = self.tools.execute(&call.name, call.arguments.clone(), &ctx).await;
                            self.ui.stop_thinking();
                            let (content, is_error) = match outcome {
                                Ok(result) => (result.content, result.is_error),
                                Err(e) => (e.to_string(), true),
                            };
                            debug!("tool '{}' -> {} chars (error={})", call.name, content.len(), is_error);
                            self.push_message(Message::tool_result(call.id.clone(), content, is_error)).await;
                        }
                        last_event = LastEvent::CoderToolResult;
                    } else {
                        let text = response.content.unwrap_or_default();
                        if text.trim().is_empty() {
                            if let Some(delay) = self.empty_response_backoff(&mut empty_retries_left, "Coder") {
                                tokio::time::sleep(Duration::from_secs_f64(delay)).await;
                                continue;
                            }
                            return Ok(String::new());
                        }
                        let is_reasoning = crate::ui::is_reasoning_text(&text);
                        self.push_message(Message::assistant(text.clone(), None)).await;
                        self.ui.print_agent_message(&text, "Coder", is_reasoning);
                        if text.contains(TERMINATE_SENTINEL) {
                            return Ok(strip_sentinel(&text));
                        }
                        last_event = LastEvent::CoderFinalAnswer;
                    }
                }
            }
        }
    }

    /// Interactive turn: append the user's message, then run the team.
    pub async fn run_turn(&self, user_message: impl Into<String>) -> anyhow::Result<String> {
        self.push_message(Message::user(user_message)).await;
        self.run_team().await
    }

    /// Single-shot headless run for a subagent worker.
    pub async fn run_task(&self, task: impl Into<String>) -> anyhow::Result<String> {
        self.push_message(Message::user(task)).await;
        self.run_team().await
    }
}

/// Standard subagent-prompt prefix, carrying the restriction list the
/// worker procedure requires ("no further spawning, produce a clear
/// summary when done").
pub fn subagent_system_prompt(task: &str) -> String {
    format!(
        "You are a background subagent executing a single task on behalf of a parent agent.\n\
        Task: {task}\n\n\
        You may not spawn further subagents. When finished, produce a clear, \
        self-contained summary of the result as your final answer."
    )
}

pub fn excluded_for_subagents() -> HashSet<String> {
    let mut set = HashSet::new();
    set.insert("spawn_subagent".to_string());
    set
}
