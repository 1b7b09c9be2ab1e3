//! Subagent Manager (C5): spawns bounded-concurrency background workers,
//! each running a headless Agent Driver, and reports results back to the
//! main driver over the message bus.

mod activity_log;

use crate::bus::{MessageBus, MessageType, SystemMessage};
use crate::driver::{self, AgentDriver};
use crate::errors::CoreError;
use crate::events::{EventLog, SubagentEvent, SubagentEventType};
use crate::providers::base::LLMProvider;
use crate::tools::ToolRegistry;
use activity_log::ActivityLog;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{Mutex, Semaphore};
use tracing::{info, warn};
use uuid::Uuid;

const DEFAULT_LABEL: &str = "background task";
const MAX_TRACKED_TASKS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubagentState {
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Subagent {
    pub id: String,
    pub label: String,
    pub task: String,
    pub parent_id: String,
    pub state: SubagentState,
    pub result: Option<String>,
    pub error: Option<String>,
    pub started_at_ms: i64,
    pub completed_at_ms: Option<i64>,
    pub max_iterations: usize,
}

pub struct SubagentManager {
    provider: Arc<dyn LLMProvider>,
    tools: Arc<ToolRegistry>,
    bus: Arc<MessageBus>,
    events: Arc<EventLog>,
    model: String,
    max_concurrent: usize,
    semaphore: Arc<Semaphore>,
    running: Mutex<HashMap<String, tokio::task::JoinHandle<()>>>,
    results: Arc<Mutex<HashMap<String, Subagent>>>,
}

impl SubagentManager {
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        tools: Arc<ToolRegistry>,
        bus: Arc<MessageBus>,
        events: Arc<EventLog>,
        model: String,
        max_concurrent: usize,
    ) -> Self {
        Self {
            provider,
            tools,
            bus,
            events,
            model,
            max_concurrent,
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            running: Mutex::new(HashMap::new()),
            results: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Spawn a background worker. Fails with `LimitReached` once
    /// `max_concurrent` workers are already running; spawns are never
    /// queued internally — the caller decides whether to wait or serialize.
    pub async fn spawn(&self, task: String, label: Option<String>, parent_id: String) -> Result<String, CoreError> {
        self.spawn_with_iterations(task, label, parent_id, driver::DEFAULT_SUBAGENT_MAX_ITERATIONS).await
    }

    /// Like [`Self::spawn`] but with an explicit cap on the worker's
    /// tool-calling iterations (spec §4.5's `max_iterations` parameter).
    pub async fn spawn_with_iterations(
        &self,
        task: String,
        label: Option<String>,
        parent_id: String,
        max_iterations: usize,
    ) -> Result<String, CoreError> {
        let mut running = self.running.lock().await;
        running.retain(|_, handle| !handle.is_finished());
        if running.len() >= self.max_concurrent {
            return Err(CoreError::LimitReached {
                running: running.len(),
                max: self.max_concurrent,
            });
        }
        if running.len() >= MAX_TRACKED_TASKS {
            return Err(CoreError::Internal(anyhow::anyhow!(
                "too many tracked subagent tasks, try again later"
            )));
        }

        let id = Uuid::new_v4().to_string()[..8].to_string();
        let label = label.unwrap_or_else(|| DEFAULT_LABEL.to_string());
        let started_at_ms = chrono::Utc::now().timestamp_millis();

        let entry = Subagent {
            id: id.clone(),
            label: label.clone(),
            task: task.clone(),
            parent_id: parent_id.clone(),
            state: SubagentState::Running,
            result: None,
            error: None,
            started_at_ms,
            completed_at_ms: None,
            max_iterations,
        };
        self.results.lock().await.insert(id.clone(), entry);
        self.events.record(SubagentEvent::new(
            id.clone(),
            parent_id.clone(),
            SubagentEventType::Spawned,
            serde_json::json!({ "label": label, "task": task }),
        ));

        let provider = self.provider.clone();
        let tools = self.tools.clone();
        let bus = self.bus.clone();
        let events = self.events.clone();
        let results = self.results.clone();
        let model = self.model.clone();
        let semaphore = self.semaphore.clone();
        let worker_id = id.clone();
        let worker_label = label.clone();
        let worker_task = task.clone();

        let handle = tokio::spawn(async move {
            let Ok(_permit) = semaphore.acquire().await else {
                warn!("subagent [{}] semaphore closed before start", worker_id);
                return;
            };
            run_worker(
                worker_id,
                worker_label,
                worker_task,
                provider,
                tools,
                bus,
                events,
                results,
                model,
                max_iterations,
            )
            .await;
        });
        running.insert(id.clone(), handle);

        info!("spawned subagent [{}]: {}", id, label);
        Ok(id)
    }

    pub async fn status(&self, id: &str) -> Option<Subagent> {
        self.results.lock().await.get(id).cloned()
    }

    pub async fn list_running(&self) -> Vec<Subagent> {
        self.results
            .lock()
            .await
            .values()
            .filter(|s| s.state == SubagentState::Running)
            .cloned()
            .collect()
    }

    pub async fn capacity(&self) -> (usize, usize) {
        let running = self.running.lock().await.len();
        (running, self.max_concurrent)
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_worker(
    id: String,
    label: String,
    task: String,
    provider: Arc<dyn LLMProvider>,
    tools: Arc<ToolRegistry>,
    bus: Arc<MessageBus>,
    events: Arc<EventLog>,
    results: Arc<Mutex<HashMap<String, Subagent>>>,
    model: String,
    max_iterations: usize,
) {
    let excluded = driver::excluded_for_subagents();
    let view = tools.subset(&excluded);

    let activity = ActivityLog::new(&id).map(StdMutex::new).map(Arc::new);
    if let Some(log) = &activity {
        let mut guard = log.lock().unwrap_or_else(|e| e.into_inner());
        info!("subagent [{}] activity log: {}", id, guard.path().display());
        guard.log_start(&task);
        let registered = view.tool_names();
        let blocked: Vec<String> = tools.tool_names().into_iter().filter(|n| !registered.contains(n)).collect();
        guard.log_tools(&registered, &blocked);
    }
    let view = match &activity {
        Some(log) => {
            let log = log.clone();
            view.with_tool_call_hook(Arc::new(move |name: &str, params: &serde_json::Value, result: &crate::tools::base::ToolResult| {
                let mut guard = log.lock().unwrap_or_else(|e| e.into_inner());
                guard.log_tool_call(name, params);
                guard.log_tool_result(name, &result.content, result.is_error);
            }))
        }
        None => view,
    };

    let system_prompt = driver::subagent_system_prompt(&task);
    let worker_driver = AgentDriver::headless(provider, view, system_prompt, max_iterations);

    let outcome = worker_driver.run_task(task.clone()).await;
    let completed_at_ms = chrono::Utc::now().timestamp_millis();
    let _ = model;

    if let Some(log) = &activity {
        let mut guard = log.lock().unwrap_or_else(|e| e.into_inner());
        match &outcome {
            Ok(result) => guard.log_end(true, result),
            Err(e) => guard.log_end(false, &e.to_string()),
        }
    }

    let mut table = results.lock().await;
    let entry = table.get_mut(&id);

    match outcome {
        Ok(result) => {
            if let Some(entry) = entry {
                entry.state = SubagentState::Completed;
                entry.result = Some(result.clone());
                entry.completed_at_ms = Some(completed_at_ms);
            }
            drop(table);
            info!("subagent [{}] completed", id);
            events.record(SubagentEvent::new(
                id.clone(),
                String::new(),
                SubagentEventType::Completed,
                serde_json::json!({ "result": result }),
            ));
            announce(&bus, &id, &label, &task, &result, true);
        }
        Err(e) => {
            let error_text = e.to_string();
            if let Some(entry) = entry {
                entry.state = SubagentState::Failed;
                entry.error = Some(error_text.clone());
                entry.completed_at_ms = Some(completed_at_ms);
            }
            drop(table);
            warn!("subagent [{}] failed: {}", id, error_text);
            events.record(SubagentEvent::new(
                id.clone(),
                String::new(),
                SubagentEventType::Failed,
                serde_json::json!({ "error": error_text }),
            ));
            announce(&bus, &id, &label, &task, &error_text, false);
        }
    }
}

fn announce(bus: &MessageBus, id: &str, label: &str, task: &str, result: &str, success: bool) {
    let header = if success {
        format!("[Background Task '{label}' completed successfully]")
    } else {
        format!("[Background Task '{label}' failed]")
    };
    let content = format!(
        "{header}\nTask: {task}\nResult:\n{result}\nPlease summarize this naturally for the user in 1\u{2013}2 sentences. Do not mention \"subagent\" or task ids."
    );
    let msg = SystemMessage::new(MessageType::SubagentResult, format!("subagent:{id}"), content)
        .with_metadata(serde_json::json!({ "subagent_id": id, "success": success }));
    if let Err(e) = bus.publish(msg) {
        warn!("subagent [{}] could not publish result: {}", id, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::MockProvider;

    fn make_manager(max_concurrent: usize) -> SubagentManager {
        let provider = Arc::new(MockProvider::text(format!("done. {}", driver::TERMINATE_SENTINEL)));
        let tools = Arc::new(ToolRegistry::new());
        let bus = Arc::new(MessageBus::default());
        let events = Arc::new(EventLog::default());
        SubagentManager::new(provider, tools, bus, events, "mock-model".to_string(), max_concurrent)
    }

    #[tokio::test]
    async fn spawn_allocates_an_eight_char_id_and_tracks_running_state() {
        let manager = make_manager(10);
        let id = manager.spawn("count to 3".to_string(), Some("counter".to_string()), "main".to_string()).await.unwrap();
        assert_eq!(id.len(), 8);
        let status = manager.status(&id).await.unwrap();
        assert_eq!(status.label, "counter");
    }

    #[tokio::test]
    async fn spawn_fails_with_limit_reached_once_at_capacity() {
        let manager = make_manager(0);
        let err = manager.spawn("task".to_string(), None, "main".to_string()).await.unwrap_err();
        assert!(matches!(err, CoreError::LimitReached { running: 0, max: 0 }));
    }

    #[tokio::test]
    async fn absent_label_falls_back_to_background_task() {
        let manager = make_manager(10);
        let id = manager.spawn("task".to_string(), None, "main".to_string()).await.unwrap();
        let status = manager.status(&id).await.unwrap();
        assert_eq!(status.label, DEFAULT_LABEL);
    }

    #[tokio::test]
    async fn completed_subagent_publishes_system_message_with_exact_header() {
        let provider = Arc::new(MockProvider::text(format!("42. {}", driver::TERMINATE_SENTINEL)));
        let tools = Arc::new(ToolRegistry::new());
        let bus = Arc::new(MessageBus::default());
        let events = Arc::new(EventLog::default());
        let manager = SubagentManager::new(provider, tools, bus.clone(), events, "mock-model".to_string(), 10);

        let id = manager.spawn("count".to_string(), Some("x".to_string()), "main".to_string()).await.unwrap();

        let msg = tokio::time::timeout(std::time::Duration::from_secs(2), async {
            loop {
                if let Some(msg) = bus.consume(std::time::Duration::from_millis(50)).await {
                    return msg;
                }
            }
        })
        .await
        .unwrap();

        assert!(msg.content.starts_with("[Background Task 'x' completed successfully]"));
        assert_eq!(msg.sender_id, format!("subagent:{id}"));

        let status = manager.status(&id).await.unwrap();
        assert_eq!(status.state, SubagentState::Completed);
        assert!(manager.list_running().await.is_empty());
    }
}
