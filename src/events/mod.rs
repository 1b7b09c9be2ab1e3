//! Append-only observability log for subagent lifecycle events. Distinct
//! from the message bus: events here are never consumed for auto-injection,
//! they exist purely so a UI or log sink can show subagent progress.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubagentEventType {
    Spawned,
    Progress,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubagentEvent {
    pub subagent_id: String,
    pub parent_id: String,
    pub event_type: SubagentEventType,
    pub payload: Value,
    pub timestamp: i64,
}

impl SubagentEvent {
    pub fn new(
        subagent_id: impl Into<String>,
        parent_id: impl Into<String>,
        event_type: SubagentEventType,
        payload: Value,
    ) -> Self {
        Self {
            subagent_id: subagent_id.into(),
            parent_id: parent_id.into(),
            event_type,
            payload,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// In-memory append-only event log, capped so a long-running driver process
/// doesn't accumulate unbounded history.
pub struct EventLog {
    events: Mutex<Vec<SubagentEvent>>,
    max_entries: usize,
}

impl EventLog {
    pub fn new(max_entries: usize) -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            max_entries,
        }
    }

    pub fn record(&self, event: SubagentEvent) {
        let mut events = self.events.lock().unwrap();
        events.push(event);
        if events.len() > self.max_entries {
            let overflow = events.len() - self.max_entries;
            events.drain(0..overflow);
        }
    }

    pub fn for_subagent(&self, subagent_id: &str) -> Vec<SubagentEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.subagent_id == subagent_id)
            .cloned()
            .collect()
    }

    pub fn all(&self) -> Vec<SubagentEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(1000)
    }
}
